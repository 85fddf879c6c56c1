use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tryon_core::{solve_with, AdjustmentKey, LandmarkSet, ManualAdjustment, Viewport};
use tryon_hw::{Camera, FacingMode};
use tryon_session::{spawn_session, AssetLoader, Config, GltfLoader, Session, SessionError};

#[derive(Parser)]
#[command(name = "tryon", about = "Eyewear virtual try-on")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a live try-on session on the camera
    Run {
        /// Catalog model to wear
        #[arg(short, long)]
        model: Option<String>,
        /// Camera to use: user (front) or environment (rear)
        #[arg(long, default_value = "user")]
        facing: FacingMode,
        /// Manual adjustment, e.g. offsetY=-4 (repeatable)
        #[arg(long = "adjust", value_name = "KEY=VALUE")]
        adjust: Vec<String>,
        /// Stop after this many processed frames (0 runs until Ctrl-C)
        #[arg(long, default_value_t = 0)]
        frames: u64,
        /// Save a snapshot once this many frames have been processed
        #[arg(long)]
        capture_after: Option<u64>,
    },
    /// Solve the overlay transform for a landmarks JSON file
    Solve {
        /// JSON array of 468 {x, y, z} points
        landmarks: PathBuf,
        #[arg(long, default_value_t = 1280.0)]
        width: f32,
        #[arg(long, default_value_t = 720.0)]
        height: f32,
        /// Manual adjustment, e.g. scale=1.1 (repeatable)
        #[arg(long = "adjust", value_name = "KEY=VALUE")]
        adjust: Vec<String>,
    },
    /// List catalog models
    Models {
        /// Load every asset and report its scene contents
        #[arg(long)]
        verify: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Run {
            model,
            facing,
            adjust,
            frames,
            capture_after,
        } => run(&config, model, facing, &adjust, frames, capture_after).await,
        Commands::Solve {
            landmarks,
            width,
            height,
            adjust,
        } => solve(&config, &landmarks, width, height, &adjust),
        Commands::Models { verify } => models(&config, verify),
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
            Ok(())
        }
    }
}

fn parse_adjustments(pairs: &[String]) -> Result<ManualAdjustment> {
    let mut adjustments = ManualAdjustment::new();
    for pair in pairs {
        let (key, value) = ManualAdjustment::parse_pair(pair)?;
        adjustments.set(key, value);
    }
    Ok(adjustments)
}

async fn run(
    config: &Config,
    model: Option<String>,
    facing: FacingMode,
    adjust: &[String],
    max_frames: u64,
    capture_after: Option<u64>,
) -> Result<()> {
    let adjustments = parse_adjustments(adjust)?;
    let session = Session::from_config(config)?;
    let handle = spawn_session(session, config.frame_interval())?;

    if facing != handle.metrics().facing {
        handle.switch_camera().await?;
    }

    if let Err(e) = handle.open().await {
        if let SessionError::Fatal(fatal) = &e {
            eprintln!("{}", fatal.user_message());
        }
        handle.shutdown().await.ok();
        return Err(e.into());
    }

    if let Some(id) = model {
        handle.select_model(id).await?;
    }
    for key in AdjustmentKey::ALL {
        let value = adjustments.get(key);
        if value != key.neutral() {
            handle.set_adjustment(key, value).await?;
        }
    }

    let mut metrics = handle.subscribe();
    let mut report = tokio::time::interval(Duration::from_secs(1));
    let mut captured = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            _ = report.tick() => {
                let snapshot = handle.metrics();
                println!("{}", serde_json::to_string(&snapshot)?);
            }
            changed = metrics.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = metrics.borrow_and_update().clone();
                if let Some(fatal) = snapshot.state.fatal_error() {
                    eprintln!("{}", fatal.user_message());
                    break;
                }
                if !captured && capture_after.is_some_and(|n| snapshot.frames_processed >= n) {
                    captured = true;
                    let name = format!("tryon-{}.png", chrono::Local::now().format("%Y%m%d-%H%M%S"));
                    let path = handle.capture(config.capture_dir.join(name)).await?;
                    println!("Saved {}", path.display());
                }
                if max_frames > 0 && snapshot.frames_processed >= max_frames {
                    break;
                }
            }
        }
    }

    handle.close().await?;
    handle.shutdown().await?;
    Ok(())
}

fn solve(config: &Config, path: &Path, width: f32, height: f32, adjust: &[String]) -> Result<()> {
    if !(width > 0.0 && height > 0.0) {
        bail!("viewport must be positive, got {width}x{height}");
    }
    let adjustments = parse_adjustments(adjust)?;
    let calibration = config.load_calibration()?;

    let src = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let landmarks: LandmarkSet = serde_json::from_str(&src)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    match solve_with(
        &calibration,
        Some(&landmarks),
        Viewport::new(width, height),
        &adjustments,
    ) {
        Some(raw) => println!("{}", serde_json::to_string_pretty(&raw)?),
        None => bail!(
            "no transform: need {} complete landmarks, got {}",
            tryon_core::landmarks::FACE_MESH_POINTS,
            landmarks.len()
        ),
    }
    Ok(())
}

fn models(config: &Config, verify: bool) -> Result<()> {
    let catalog = config.load_catalog()?;
    for model in catalog.iter() {
        let path = catalog.resolve(model);
        println!(
            "{:<12} {:<20} scale {:<5} {}",
            model.id,
            model.name,
            model.base_scale,
            path.display()
        );
        if verify {
            match GltfLoader.load(&path, &mut |_| {}) {
                Ok(asset) => println!("             ok: {} nodes, {} meshes", asset.nodes, asset.meshes),
                Err(e) => println!("             error: {e}"),
            }
        }
    }
    Ok(())
}
