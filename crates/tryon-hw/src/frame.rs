//! Frame type and pixel conversion: YUYV and MJPG to RGB, dark detection.

use std::time::Instant;

/// A captured RGB8 camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub sequence: u32,
}

impl Frame {
    /// True when the pixel buffer matches the advertised dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.rgb.len() == rgb_len(self.width, self.height)
    }

    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.rgb.is_empty() {
            return 0.0;
        }
        let pixels = self.rgb.len() / 3;
        let sum: f32 = self.rgb.chunks_exact(3).map(luma).map(f32::from).sum();
        sum / pixels as f32
    }

    pub fn is_dark(&self) -> bool {
        is_dark_frame(&self.rgb, 0.95)
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// BT.601 luma of one RGB pixel.
fn luma(px: &[u8]) -> u8 {
    let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
    y.round().clamp(0.0, 255.0) as u8
}

/// Convert packed YUYV (4:2:2) to RGB8 using BT.601 full-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(rgb_len(width, height));
    for quad in yuyv[..expected].chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            let y = y as f32;
            rgb.push(to_u8(y + 1.402 * v));
            rgb.push(to_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(to_u8(y + 1.772 * u));
        }
    }
    Ok(rgb)
}

/// Decode a Motion-JPEG buffer to RGB8, checking it matches the negotiated size.
pub fn mjpeg_to_rgb(jpeg: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let decoded = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)?.to_rgb8();
    if decoded.width() != width || decoded.height() != height {
        return Err(FrameError::SizeMismatch {
            expected: (width, height),
            actual: (decoded.width(), decoded.height()),
        });
    }
    Ok(decoded.into_raw())
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Check if an RGB frame is dark: more than `threshold_pct` of pixels have luma < 32.
pub fn is_dark_frame(rgb: &[u8], threshold_pct: f32) -> bool {
    let pixels = rgb.len() / 3;
    if pixels == 0 {
        return true;
    }
    let dark_count = rgb.chunks_exact(3).filter(|px| luma(px) < 32).count();
    (dark_count as f32 / pixels as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("decoded frame is {actual:?}, expected {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
}
