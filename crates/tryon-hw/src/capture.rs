//! Snapshot export: the current frame as a PNG, mirrored to match the
//! on-screen view and stamped with a watermark in the bottom-left corner.

use crate::font;
use crate::frame::Frame;
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;
use thiserror::Error;

const WATERMARK_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const WATERMARK_SHADOW: Rgb<u8> = Rgb([0, 0, 0]);

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame buffer does not match {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Watermark glyph scale: about 2% of the frame height, reduced until the
/// text and its margins fit the width. Never below 1.
fn watermark_scale(width: u32, height: u32, text: &str) -> u32 {
    let mut scale = (height / (font::GLYPH_HEIGHT * 10)).max(1);
    while scale > 1 && font::measure(text, scale) + 2 * watermark_margin(scale) > width {
        scale -= 1;
    }
    scale
}

fn watermark_margin(scale: u32) -> u32 {
    scale * 4
}

/// Compose a snapshot of `frame`. The output has the frame's dimensions.
pub fn snapshot(frame: &Frame, mirror: bool, watermark: &str) -> Result<RgbImage, CaptureError> {
    let mut img = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())
        .filter(|_| frame.is_valid())
        .ok_or(CaptureError::InvalidFrame {
            width: frame.width,
            height: frame.height,
        })?;

    if mirror {
        image::imageops::flip_horizontal_in_place(&mut img);
    }

    if !watermark.is_empty() {
        stamp_watermark(&mut img, watermark);
    }

    Ok(img)
}

fn stamp_watermark(img: &mut RgbImage, text: &str) {
    let scale = watermark_scale(img.width(), img.height(), text);
    let margin = watermark_margin(scale) as i64;
    let x = margin;
    let y = img.height() as i64 - margin - (font::GLYPH_HEIGHT * scale) as i64;
    let shadow = scale.div_ceil(2) as i64;

    font::draw_text(img, x + shadow, y + shadow, text, WATERMARK_SHADOW, scale);
    font::draw_text(img, x, y, text, WATERMARK_COLOR, scale);
}

/// Write `img` to `path` as PNG, creating parent directories as needed.
pub fn write_png(img: &RgbImage, path: &Path) -> Result<(), CaptureError> {
    let write_err = |source| CaptureError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(image::ImageError::IoError(e)))?;
    }

    img.save_with_format(path, ImageFormat::Png).map_err(write_err)?;
    tracing::info!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "snapshot written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Left half red, right half blue.
    fn split_frame(width: u32, height: u32) -> Frame {
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..height {
            for x in 0..width {
                if x < width / 2 {
                    rgb.extend_from_slice(&[200, 0, 0]);
                } else {
                    rgb.extend_from_slice(&[0, 0, 200]);
                }
            }
        }
        Frame {
            rgb,
            width,
            height,
            timestamp: Instant::now(),
            sequence: 1,
        }
    }

    #[test]
    fn test_snapshot_keeps_dimensions() {
        let img = snapshot(&split_frame(64, 48), true, "TRY ON").unwrap();
        assert_eq!(img.dimensions(), (64, 48));
    }

    #[test]
    fn test_snapshot_mirror() {
        let frame = split_frame(64, 48);
        let plain = snapshot(&frame, false, "").unwrap();
        let mirrored = snapshot(&frame, true, "").unwrap();
        assert_eq!(plain.get_pixel(0, 0).0, [200, 0, 0]);
        assert_eq!(mirrored.get_pixel(0, 0).0, [0, 0, 200]);
        assert_eq!(mirrored.get_pixel(63, 0).0, [200, 0, 0]);
    }

    #[test]
    fn test_watermark_in_bottom_left() {
        let frame = split_frame(200, 100);
        let plain = snapshot(&frame, false, "").unwrap();
        let marked = snapshot(&frame, false, "TRY ON").unwrap();

        let changed: Vec<(u32, u32)> = plain
            .enumerate_pixels()
            .filter(|(x, y, p)| marked.get_pixel(*x, *y) != *p)
            .map(|(x, y, _)| (x, y))
            .collect();

        assert!(!changed.is_empty());
        assert!(changed.iter().all(|&(x, y)| x < 100 && y >= 50));
    }

    #[test]
    fn test_watermark_scale_fits_width() {
        assert_eq!(watermark_scale(400, 100, "TRY ON"), 2);
        assert_eq!(watermark_scale(60, 100, "TRY ON"), 1);
        assert_eq!(watermark_scale(10, 100, "TRY ON"), 1);
    }

    #[test]
    fn test_long_watermark_keeps_right_margin() {
        let frame = split_frame(120, 100);
        let plain = snapshot(&frame, false, "").unwrap();
        let marked = snapshot(&frame, false, "WATERMARK TEXT").unwrap();

        let max_x = plain
            .enumerate_pixels()
            .filter(|(x, y, p)| marked.get_pixel(*x, *y) != *p)
            .map(|(x, _, _)| x)
            .max()
            .unwrap();
        assert!(max_x < 120 - watermark_margin(1), "ink reaches column {max_x}");
    }

    #[test]
    fn test_snapshot_rejects_short_buffer() {
        let mut frame = split_frame(8, 8);
        frame.rgb.truncate(10);
        assert!(matches!(
            snapshot(&frame, false, "X"),
            Err(CaptureError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn test_write_png_roundtrip() {
        let dir = std::env::temp_dir().join(format!("tryon-capture-{}", std::process::id()));
        let path = dir.join("nested").join("shot.png");
        let img = snapshot(&split_frame(32, 16), true, "OK").unwrap();

        write_png(&img, &path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (32, 16));
        assert_eq!(loaded, img);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
