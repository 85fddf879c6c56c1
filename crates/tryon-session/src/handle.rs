//! Runs a session on a dedicated OS thread and exposes it to async code.
//!
//! Requests arrive over an mpsc channel with oneshot replies and are applied
//! between frame ticks, so frames are processed strictly in order by one
//! thread. Metrics flow out through a watch channel.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tryon_core::AdjustmentKey;
use tryon_hw::FacingMode;

use crate::error::SessionError;
use crate::metrics::SessionMetrics;
use crate::session::Session;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum SessionRequest {
    Open { reply: Reply<()> },
    Close { reply: Reply<()> },
    Retry { reply: Reply<()> },
    SwitchCamera { reply: Reply<FacingMode> },
    SelectModel { id: String, reply: Reply<()> },
    RetryModel { id: String, reply: Reply<()> },
    SetAdjustment { key: AdjustmentKey, value: f32, reply: Reply<()> },
    ClearAdjustments { reply: Reply<()> },
    ResetTracking { reply: Reply<()> },
    Capture { path: PathBuf, reply: Reply<PathBuf> },
    Shutdown,
}

/// Clone-safe handle to the session thread.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
    metrics: watch::Receiver<SessionMetrics>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionRequest,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    pub async fn open(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::Open { reply }).await
    }

    pub async fn close(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::Close { reply }).await
    }

    pub async fn retry(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::Retry { reply }).await
    }

    pub async fn switch_camera(&self) -> Result<FacingMode, SessionError> {
        self.request(|reply| SessionRequest::SwitchCamera { reply }).await
    }

    pub async fn select_model(&self, id: impl Into<String>) -> Result<(), SessionError> {
        let id = id.into();
        self.request(|reply| SessionRequest::SelectModel { id, reply }).await
    }

    pub async fn retry_model(&self, id: impl Into<String>) -> Result<(), SessionError> {
        let id = id.into();
        self.request(|reply| SessionRequest::RetryModel { id, reply }).await
    }

    pub async fn set_adjustment(&self, key: AdjustmentKey, value: f32) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::SetAdjustment { key, value, reply })
            .await
    }

    pub async fn clear_adjustments(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::ClearAdjustments { reply }).await
    }

    pub async fn reset_tracking(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::ResetTracking { reply }).await
    }

    pub async fn capture(&self, path: impl Into<PathBuf>) -> Result<PathBuf, SessionError> {
        let path = path.into();
        self.request(|reply| SessionRequest::Capture { path, reply }).await
    }

    /// Latest published metrics.
    pub fn metrics(&self) -> SessionMetrics {
        self.metrics.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionMetrics> {
        self.metrics.clone()
    }

    /// Close the session and stop its thread.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.tx
            .send(SessionRequest::Shutdown)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

/// Spawn `session` on its own thread, ticking at most once per `frame_interval`.
///
/// The thread closes the session and exits on `shutdown` or when every
/// handle has been dropped.
pub fn spawn_session(
    session: Session,
    frame_interval: Duration,
) -> Result<SessionHandle, SessionError> {
    let (tx, rx) = mpsc::channel::<SessionRequest>(16);
    let metrics = session.subscribe();

    std::thread::Builder::new()
        .name("tryon-session".into())
        .spawn(move || run_loop(session, rx, frame_interval))
        .map_err(|e| SessionError::Spawn(e.to_string()))?;

    Ok(SessionHandle { tx, metrics })
}

fn run_loop(mut session: Session, mut rx: mpsc::Receiver<SessionRequest>, interval: Duration) {
    tracing::info!("session thread started");
    let mut next_tick = Instant::now();

    'outer: loop {
        loop {
            match rx.try_recv() {
                Ok(SessionRequest::Shutdown) | Err(TryRecvError::Disconnected) => break 'outer,
                Ok(request) => apply(&mut session, request),
                Err(TryRecvError::Empty) => break,
            }
        }

        if session.state().is_active() {
            if let Err(fatal) = session.tick(Instant::now()) {
                tracing::error!(error = %fatal, message = fatal.user_message(), "session failed");
            }
        } else {
            session.poll_assets();
        }

        next_tick += interval;
        let now = Instant::now();
        match next_tick.checked_duration_since(now) {
            Some(wait) => std::thread::sleep(wait),
            None => next_tick = now,
        }
    }

    session.close();
    tracing::info!("session thread exiting");
}

fn apply(session: &mut Session, request: SessionRequest) {
    match request {
        SessionRequest::Open { reply } => {
            let _ = reply.send(session.open());
        }
        SessionRequest::Close { reply } => {
            session.close();
            let _ = reply.send(Ok(()));
        }
        SessionRequest::Retry { reply } => {
            let _ = reply.send(session.retry());
        }
        SessionRequest::SwitchCamera { reply } => {
            let _ = reply.send(session.switch_camera());
        }
        SessionRequest::SelectModel { id, reply } => {
            let _ = reply.send(session.select_model(&id));
        }
        SessionRequest::RetryModel { id, reply } => {
            let _ = reply.send(session.retry_model(&id));
        }
        SessionRequest::SetAdjustment { key, value, reply } => {
            let _ = reply.send(session.set_adjustment(key, value));
        }
        SessionRequest::ClearAdjustments { reply } => {
            session.clear_adjustments();
            let _ = reply.send(Ok(()));
        }
        SessionRequest::ResetTracking { reply } => {
            session.reset_tracking();
            let _ = reply.send(Ok(()));
        }
        SessionRequest::Capture { path, reply } => {
            let _ = reply.send(session.capture(&path));
        }
        SessionRequest::Shutdown => {}
    }
}
