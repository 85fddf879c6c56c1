//! tryon-session: Session controller for live eyewear try-on.
//!
//! Owns the camera stream, landmark provider, motion tracker, detection
//! quality counters, model catalog, and overlay for one session, and drives
//! them from a single-threaded frame loop.

pub mod catalog;
pub mod config;
pub mod error;
pub mod handle;
pub mod loader;
pub mod metrics;
pub mod overlay;
pub mod session;

pub use catalog::{Catalog, CatalogError, LoadState, ModelDescriptor};
pub use config::Config;
pub use error::{FatalError, SessionError};
pub use handle::{spawn_session, SessionHandle};
pub use loader::{AssetError, AssetEvent, AssetFormat, AssetLoader, AssetLoads, GltfLoader, SceneAsset};
pub use metrics::{SessionMetrics, SessionState};
pub use overlay::{ActiveModel, ModelNode, OverlayFrame, OverlayRenderer, SceneOverlay};
pub use session::{ProviderFactory, Session, SessionOptions, SessionParts};
