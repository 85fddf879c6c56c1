mod common;

use common::{temp_path, Harness};
use std::time::Duration;
use tokio::sync::watch;
use tryon_core::AdjustmentKey;
use tryon_hw::FacingMode;
use tryon_session::{spawn_session, SessionError, SessionMetrics, SessionState};

async fn wait_for(
    rx: &mut watch::Receiver<SessionMetrics>,
    done: impl Fn(&SessionMetrics) -> bool,
) -> SessionMetrics {
    let result = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|m| done(m))).await;
    match result {
        Ok(Ok(metrics)) => metrics.clone(),
        other => panic!("metrics condition not reached: {:?}", other.map(|r| r.is_ok())),
    }
}

#[tokio::test]
async fn test_handle_drives_session_thread() {
    let h = Harness::new();
    let loader = h.loader.clone();
    let handle = spawn_session(h.session, Duration::from_millis(2)).unwrap();
    let mut rx = handle.subscribe();

    handle.open().await.unwrap();
    let metrics = wait_for(&mut rx, |m| m.state == SessionState::Tracking).await;
    assert!(metrics.face_detected);

    loader.release("alpha");
    handle.select_model("alpha").await.unwrap();
    wait_for(&mut rx, |m| m.displayed_model.as_deref() == Some("alpha")).await;

    handle.set_adjustment(AdjustmentKey::Scale, 1.2).await.unwrap();
    assert!(matches!(
        handle.select_model("missing").await,
        Err(SessionError::UnknownModel(_))
    ));

    let path = handle.capture(temp_path("handle.png")).await.unwrap();
    assert!(path.exists());
    let _ = std::fs::remove_file(&path);

    assert_eq!(handle.switch_camera().await.unwrap(), FacingMode::Environment);
    wait_for(&mut rx, |m| m.facing == FacingMode::Environment && m.state.is_active()).await;

    handle.reset_tracking().await.unwrap();
    handle.clear_adjustments().await.unwrap();

    handle.close().await.unwrap();
    assert_eq!(handle.metrics().state, SessionState::Idle);

    handle.shutdown().await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match handle.open().await {
            Err(SessionError::ChannelClosed) => break,
            _ if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            other => panic!("session thread still running: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_fatal_error_is_published() {
    let h = Harness::new();
    h.camera.lock().unwrap().acquire_error = Some(tryon_hw::CameraError::DeviceBusy);
    let camera = h.camera.clone();
    let handle = spawn_session(h.session, Duration::from_millis(2)).unwrap();

    assert!(matches!(
        handle.open().await,
        Err(SessionError::Fatal(tryon_session::FatalError::CameraBusy(_)))
    ));
    assert!(matches!(handle.metrics().state, SessionState::Failed(_)));

    camera.lock().unwrap().acquire_error = None;
    handle.retry().await.unwrap();
    assert!(handle.metrics().state.is_active());

    drop(handle);
}
