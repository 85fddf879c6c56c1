//! Camera acquisition: facing-mode stream constraints and V4L2 capture via the `v4l` crate.

use crate::frame::{self, Frame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("unsupported camera: {0}")]
    Unsupported(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("stream stopped")]
    Stopped,
}

/// Which way the requested camera faces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, pointing at the user. Shown mirrored.
    #[default]
    User,
    /// Rear camera.
    Environment,
}

impl FacingMode {
    pub fn flipped(self) -> Self {
        match self {
            Self::User => Self::Environment,
            Self::Environment => Self::User,
        }
    }

    /// Front-camera feeds are displayed (and captured) mirrored.
    pub fn is_mirrored(self) -> bool {
        self == Self::User
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Environment => "environment",
        })
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(Self::User),
            "environment" | "rear" | "back" => Ok(Self::Environment),
            other => Err(format!("unknown facing mode: {other}")),
        }
    }
}

/// Requested stream parameters. Width, height, and frame rate are ideals;
/// the device may negotiate something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
    pub frame_rate: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            facing: FacingMode::User,
            frame_rate: 30,
        }
    }
}

/// A live camera stream. Dropping it must release the device.
pub trait MediaStream: Send {
    /// Next frame, or `Ok(None)` when no new frame is ready yet.
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Stop all tracks and release the device. Idempotent.
    fn stop(&mut self);

    fn is_live(&self) -> bool;

    /// Negotiated (width, height).
    fn resolution(&self) -> (u32, u32);

    fn facing(&self) -> FacingMode;
}

/// Source of camera streams.
pub trait CameraProvider: Send {
    fn acquire(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError>;
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG per buffer.
    Mjpg,
    /// Packed RGB24.
    Rgb3,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(Self::Yuyv)
        } else if fourcc == FourCC::new(b"MJPG") {
            Some(Self::Mjpg)
        } else if fourcc == FourCC::new(b"RGB3") {
            Some(Self::Rgb3)
        } else {
            None
        }
    }
}

/// Map an OS error from opening or streaming a device to a camera error.
pub fn classify_io_error(device_path: &str, err: &io::Error) -> CameraError {
    let path = device_path.to_string();
    match err.kind() {
        io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(path),
        io::ErrorKind::NotFound => CameraError::DeviceNotFound(path),
        _ if err.raw_os_error() == Some(libc::EBUSY) => CameraError::DeviceBusy(path),
        _ if err.raw_os_error() == Some(libc::EACCES) || err.raw_os_error() == Some(libc::EPERM) => {
            CameraError::PermissionDenied(path)
        }
        _ if err.raw_os_error() == Some(libc::ENODEV) || err.raw_os_error() == Some(libc::ENXIO) => {
            CameraError::DeviceNotFound(path)
        }
        _ => CameraError::CaptureFailed(format!("{device_path}: {err}")),
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    /// Negotiated pixel format.
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and negotiate
    /// a format as close to `constraints` as the driver allows.
    pub fn open(device_path: &str, constraints: &StreamConstraints) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device =
            Device::with_path(device_path).map_err(|e| classify_io_error(device_path, &e))?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        let cap_flags = caps.capabilities;
        if !cap_flags.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::Unsupported(format!(
                "{device_path} is not a video capture device"
            )));
        }
        if !cap_flags.contains(v4l::capability::Flags::STREAMING) {
            return Err(CameraError::Unsupported(format!(
                "{device_path} does not support streaming I/O"
            )));
        }

        // Prefer YUYV; many webcams only offer the requested size as MJPG,
        // so accept whatever supported format the driver settles on.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = constraints.width;
        fmt.height = constraints.height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::Unsupported(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG, or RGB3)"
            ))
        })?;

        if constraints.frame_rate > 0 {
            if let Err(e) = device.set_params(&Parameters::with_fps(constraints.frame_rate)) {
                tracing::warn!(error = %e, fps = constraints.frame_rate, "frame rate not applied");
            }
        }

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Start streaming. The returned stream owns the mmap buffers.
    pub fn start_stream(self, facing: FacingMode) -> Result<V4lStream, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| classify_io_error(&self.device_path, &e))?;
        Ok(V4lStream {
            camera: Some(self),
            stream: Some(stream),
            facing,
        })
    }

    /// Convert a raw buffer to RGB based on the negotiated format.
    fn buf_to_rgb(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let expected = self.width as usize * self.height as usize * 3;

        match self.pixel_format {
            PixelFormat::Rgb3 => {
                if buf.len() < expected {
                    return Err(CameraError::CaptureFailed(format!(
                        "RGB3 buffer too short: expected {expected}, got {}",
                        buf.len()
                    )));
                }
                Ok(buf[..expected].to_vec())
            }
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
            PixelFormat::Mjpg => frame::mjpeg_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("MJPG decode failed: {e}"))),
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// A streaming V4L2 camera. Blocks in `read_frame` until the driver hands
/// over the next buffer.
pub struct V4lStream {
    camera: Option<Camera>,
    stream: Option<MmapStream<'static>>,
    facing: FacingMode,
}

impl MediaStream for V4lStream {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        let (Some(camera), Some(stream)) = (self.camera.as_ref(), self.stream.as_mut()) else {
            return Err(CameraError::Stopped);
        };

        let (buf, meta) = stream
            .next()
            .map_err(|e| classify_io_error(&camera.device_path, &e))?;
        let sequence = meta.sequence;
        let rgb = camera.buf_to_rgb(buf)?;

        Ok(Some(Frame {
            rgb,
            width: camera.width,
            height: camera.height,
            timestamp: std::time::Instant::now(),
            sequence,
        }))
    }

    fn stop(&mut self) {
        // Dropping the stream issues STREAMOFF and unmaps buffers; dropping
        // the camera closes the device fd.
        if self.stream.take().is_some() {
            tracing::debug!("camera stream stopped");
        }
        if let Some(camera) = self.camera.take() {
            tracing::info!(device = %camera.device_path, "camera released");
        }
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    fn resolution(&self) -> (u32, u32) {
        self.camera.as_ref().map_or((0, 0), |c| (c.width, c.height))
    }

    fn facing(&self) -> FacingMode {
        self.facing
    }
}

impl Drop for V4lStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Opens V4L2 devices, choosing the device by facing mode.
pub struct V4lCameraProvider {
    pub user_device: String,
    pub environment_device: Option<String>,
}

impl V4lCameraProvider {
    pub fn new(user_device: impl Into<String>, environment_device: Option<String>) -> Self {
        Self {
            user_device: user_device.into(),
            environment_device,
        }
    }

    fn device_for(&self, facing: FacingMode) -> Result<&str, CameraError> {
        match facing {
            FacingMode::User => Ok(&self.user_device),
            FacingMode::Environment => self
                .environment_device
                .as_deref()
                .ok_or_else(|| CameraError::DeviceNotFound("no environment-facing camera configured".into())),
        }
    }
}

impl CameraProvider for V4lCameraProvider {
    fn acquire(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        let path = self.device_for(constraints.facing)?;
        let camera = Camera::open(path, constraints)?;
        let stream = camera.start_stream(constraints.facing)?;
        Ok(Box::new(stream))
    }
}
