//! Minimal 3x5 bitmap font for stamping short labels onto RGB images.

use image::{Rgb, RgbImage};

pub const GLYPH_WIDTH: u32 = 3;
pub const GLYPH_HEIGHT: u32 = 5;

/// Rows of a glyph, top to bottom. Bit 2 is the leftmost column.
fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        '0' => [0x7, 0x5, 0x5, 0x5, 0x7],
        '1' => [0x2, 0x6, 0x2, 0x2, 0x7],
        '2' => [0x7, 0x1, 0x7, 0x4, 0x7],
        '3' => [0x7, 0x1, 0x7, 0x1, 0x7],
        '4' => [0x5, 0x5, 0x7, 0x1, 0x1],
        '5' => [0x7, 0x4, 0x7, 0x1, 0x7],
        '6' => [0x7, 0x4, 0x7, 0x5, 0x7],
        '7' => [0x7, 0x1, 0x2, 0x4, 0x4],
        '8' => [0x7, 0x5, 0x7, 0x5, 0x7],
        '9' => [0x7, 0x5, 0x7, 0x1, 0x7],
        'A' => [0x2, 0x5, 0x7, 0x5, 0x5],
        'B' => [0x6, 0x5, 0x6, 0x5, 0x6],
        'C' => [0x7, 0x4, 0x4, 0x4, 0x7],
        'D' => [0x6, 0x5, 0x5, 0x5, 0x6],
        'E' => [0x7, 0x4, 0x6, 0x4, 0x7],
        'F' => [0x7, 0x4, 0x6, 0x4, 0x4],
        'G' => [0x7, 0x4, 0x5, 0x5, 0x7],
        'H' => [0x5, 0x5, 0x7, 0x5, 0x5],
        'I' => [0x7, 0x2, 0x2, 0x2, 0x7],
        'J' => [0x1, 0x1, 0x1, 0x5, 0x7],
        'K' => [0x5, 0x5, 0x6, 0x5, 0x5],
        'L' => [0x4, 0x4, 0x4, 0x4, 0x7],
        'M' => [0x5, 0x7, 0x7, 0x5, 0x5],
        'N' => [0x6, 0x5, 0x5, 0x5, 0x5],
        'O' => [0x7, 0x5, 0x5, 0x5, 0x7],
        'P' => [0x7, 0x5, 0x7, 0x4, 0x4],
        'Q' => [0x7, 0x5, 0x5, 0x7, 0x1],
        'R' => [0x6, 0x5, 0x6, 0x5, 0x5],
        'S' => [0x3, 0x4, 0x2, 0x1, 0x6],
        'T' => [0x7, 0x2, 0x2, 0x2, 0x2],
        'U' => [0x5, 0x5, 0x5, 0x5, 0x7],
        'V' => [0x5, 0x5, 0x5, 0x5, 0x2],
        'W' => [0x5, 0x5, 0x7, 0x7, 0x5],
        'X' => [0x5, 0x5, 0x2, 0x5, 0x5],
        'Y' => [0x5, 0x5, 0x2, 0x2, 0x2],
        'Z' => [0x7, 0x1, 0x2, 0x4, 0x7],
        ' ' => [0x0, 0x0, 0x0, 0x0, 0x0],
        '.' => [0x0, 0x0, 0x0, 0x0, 0x2],
        ',' => [0x0, 0x0, 0x0, 0x2, 0x4],
        '-' => [0x0, 0x0, 0x7, 0x0, 0x0],
        '_' => [0x0, 0x0, 0x0, 0x0, 0x7],
        ':' => [0x0, 0x2, 0x0, 0x2, 0x0],
        '/' => [0x1, 0x1, 0x2, 0x4, 0x4],
        '(' => [0x2, 0x4, 0x4, 0x4, 0x2],
        ')' => [0x2, 0x1, 0x1, 0x1, 0x2],
        '?' => [0x7, 0x1, 0x2, 0x0, 0x2],
        _ => [0x7, 0x7, 0x7, 0x7, 0x7],
    }
}

/// Horizontal advance of one character: glyph width plus one column of spacing.
pub fn advance(scale: u32) -> u32 {
    (GLYPH_WIDTH + 1) * scale
}

/// Width in pixels of `text` at `scale`, excluding trailing spacing.
pub fn measure(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        0
    } else {
        n * advance(scale) - scale
    }
}

/// Draw `text` with its top-left corner at (x, y). Pixels outside the image are clipped.
pub fn draw_text(img: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>, scale: u32) {
    let mut cx = x;
    for c in text.chars() {
        draw_char(img, cx, y, c, color, scale);
        cx += advance(scale) as i64;
    }
}

fn draw_char(img: &mut RgbImage, x: i64, y: i64, c: char, color: Rgb<u8>, scale: u32) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let scale = scale as i64;

    for (row, bits) in glyph(c).iter().enumerate() {
        for col in 0..GLYPH_WIDTH as i64 {
            if (bits >> (2 - col)) & 1 == 0 {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x + col * scale + dx;
                    let py = y + row as i64 * scale + dy;
                    if (0..w).contains(&px) && (0..h).contains(&py) {
                        img.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn lit(img: &RgbImage) -> usize {
        img.pixels().filter(|p| p.0 != [0, 0, 0]).count()
    }

    #[test]
    fn test_measure() {
        assert_eq!(measure("", 2), 0);
        assert_eq!(measure("A", 1), 3);
        assert_eq!(measure("AB", 1), 7);
        assert_eq!(measure("AB", 3), 21);
    }

    #[test]
    fn test_draw_glyph_pixels() {
        let mut img = RgbImage::new(8, 8);
        draw_text(&mut img, 0, 0, "-", WHITE, 1);
        assert_eq!(lit(&img), 3);
        assert_eq!(*img.get_pixel(0, 2), WHITE);
        assert_eq!(*img.get_pixel(2, 2), WHITE);
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_scale_multiplies_area() {
        let mut small = RgbImage::new(32, 32);
        let mut big = RgbImage::new(32, 32);
        draw_text(&mut small, 0, 0, "8", WHITE, 1);
        draw_text(&mut big, 0, 0, "8", WHITE, 2);
        assert_eq!(lit(&big), lit(&small) * 4);
    }

    #[test]
    fn test_clipping_at_edges() {
        let mut img = RgbImage::new(4, 4);
        draw_text(&mut img, -2, -2, "TRY ON", WHITE, 2);
        draw_text(&mut img, 3, 3, "TRY ON", WHITE, 2);
        assert!(lit(&img) > 0);
    }

    #[test]
    fn test_lowercase_matches_uppercase() {
        assert_eq!(glyph('q'), glyph('Q'));
        assert_eq!(glyph('~'), [0x7; 5]);
    }
}
