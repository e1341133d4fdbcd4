use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::Path;
use tracing::{debug, warn};

/// A font that can always draw something. When no TrueType file is usable
/// the 8x8 bitmap glyphs are scaled up instead.
#[derive(Clone)]
pub enum Typeface {
    Vector(FontArc),
    Bitmap,
}

impl Typeface {
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("font {} unreadable ({}), using bitmap glyphs", path.display(), err);
                return Typeface::Bitmap;
            }
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => Typeface::Vector(font),
            Err(err) => {
                warn!("font {} invalid ({}), using bitmap glyphs", path.display(), err);
                Typeface::Bitmap
            }
        }
    }

    /// Width and line height of `text` at `px` pixels. Vector widths use the
    /// same glyph layout as `draw`.
    pub fn measure(&self, text: &str, px: f32) -> (u32, u32) {
        match self {
            Typeface::Vector(font) => {
                let scale = PxScale::from(px);
                let (width, _) = text_size(scale, font, text);
                let scaled = font.as_scaled(scale);
                let height = scaled.ascent() - scaled.descent();
                (width, height.ceil().max(0.0) as u32)
            }
            Typeface::Bitmap => {
                let cell = bitmap_cell(px);
                (text.chars().count() as u32 * 8 * cell, 8 * cell)
            }
        }
    }

    /// Draws `text` with its top-left corner at (`x`, `y`).
    pub fn draw(&self, canvas: &mut RgbaImage, text: &str, x: i32, y: i32, px: f32, color: Rgba<u8>) {
        match self {
            Typeface::Vector(font) => draw_text_mut(canvas, color, x, y, PxScale::from(px), font, text),
            Typeface::Bitmap => draw_bitmap_text(canvas, text, x, y, bitmap_cell(px), color),
        }
    }
}

fn bitmap_cell(px: f32) -> u32 {
    ((px / 8.0).round() as u32).max(1)
}

fn draw_bitmap_text(canvas: &mut RgbaImage, text: &str, x: i32, y: i32, cell: u32, color: Rgba<u8>) {
    let advance = (8 * cell) as i32;
    for (i, ch) in text.chars().enumerate() {
        let glyph = BASIC_FONTS
            .get(ch)
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);
        let origin_x = x + i as i32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let px0 = origin_x + col * cell as i32;
                let py0 = y + row as i32 * cell as i32;
                fill_block(canvas, px0, py0, cell, color);
            }
        }
    }
}

fn fill_block(canvas: &mut RgbaImage, x: i32, y: i32, size: u32, color: Rgba<u8>) {
    for dy in 0..size as i32 {
        for dx in 0..size as i32 {
            let (px, py) = (x + dx, y + dy);
            if px < 0 || py < 0 {
                continue;
            }
            if let Some(pixel) = canvas.get_pixel_mut_checked(px as u32, py as u32) {
                if color[3] == u8::MAX {
                    *pixel = color;
                } else {
                    pixel.blend(&color);
                }
            }
        }
    }
}

/// The two weights the compositor draws with.
#[derive(Clone)]
pub struct Fonts {
    pub bold: Typeface,
    pub regular: Typeface,
}

impl Fonts {
    pub fn load(bold: &Path, regular: &Path) -> Self {
        Self {
            bold: Typeface::load(bold),
            regular: Typeface::load(regular),
        }
    }

    pub fn fallback() -> Self {
        Self {
            bold: Typeface::Bitmap,
            regular: Typeface::Bitmap,
        }
    }
}
