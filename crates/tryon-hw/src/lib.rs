//! tryon-hw: Camera acquisition and frame handling.
//!
//! Provides V4L2-based camera streams selected by facing mode, RGB frame
//! conversion, and PNG snapshot export with a watermark.

pub mod camera;
pub mod capture;
pub mod font;
pub mod frame;

pub use camera::{
    Camera, CameraError, CameraProvider, DeviceInfo, FacingMode, MediaStream, PixelFormat,
    StreamConstraints, V4lCameraProvider, V4lStream,
};
pub use capture::{snapshot, write_png, CaptureError};
pub use frame::{Frame, FrameError};
