use super::badge::apply_badge;
use super::faces::FaceDetector;
use super::fonts::Fonts;
use super::pool::CancelFlag;
use super::ComposeError;
use crate::caption::rating_label;
use crate::media::MediaRecord;
use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};

pub const CANVAS_WIDTH: u32 = 1280;
pub const CANVAS_HEIGHT: u32 = 720;
const CANVAS_BASE: Rgba<u8> = Rgba([10, 10, 20, 255]);
const BACKGROUND_BLUR_SIGMA: f32 = 4.0;
const BACKGROUND_SHADE: Rgba<u8> = Rgba([0, 0, 0, 150]);

pub const POSTER_WIDTH: u32 = 400;
pub const POSTER_HEIGHT: u32 = 600;
const POSTER_X: i64 = 50;
const POSTER_Y: i64 = 60;

const TEXT_X: i32 = 480;
const TITLE_Y: i32 = 80;
const TITLE_PX: f32 = 32.0;
const RATING_Y: i32 = 140;
const RATING_PX: f32 = 24.0;
const GENRES_Y: i32 = 180;
const GENRES_PX: f32 = 18.0;
const OVERVIEW_Y: i32 = 250;
const OVERVIEW_PX: f32 = 24.0;
const OVERVIEW_LINE_STEP: i32 = 30;

pub const WRAP_CHARS: usize = 80;
pub const MAX_OVERVIEW_LINES: usize = 6;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const RATING_GREEN: Rgba<u8> = Rgba([0, 230, 118, 255]);
const GENRE_CYAN: Rgba<u8> = Rgba([0, 188, 212, 255]);
const OVERVIEW_GREY: Rgba<u8> = Rgba([224, 224, 224, 255]);

/// Fixed-width chunks of `text`, at most `max_lines` of them.
pub fn wrap_overview(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width.max(1))
        .take(max_lines)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn shade(image: &mut RgbaImage, overlay: Rgba<u8>) {
    for pixel in image.pixels_mut() {
        pixel.blend(&overlay);
    }
}

/// Blurred, darkened full-canvas copy of `source`.
fn background_from(source: &RgbaImage) -> RgbaImage {
    let scaled = imageops::resize(source, CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::Triangle);
    let mut blurred = imageops::blur(&scaled, BACKGROUND_BLUR_SIGMA);
    shade(&mut blurred, BACKGROUND_SHADE);
    blurred
}

fn draw_outlined(canvas: &mut RgbaImage, fonts: &Fonts, text: &str, x: i32, y: i32) {
    for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
        fonts.bold.draw(canvas, text, x + dx, y + dy, TITLE_PX, BLACK);
    }
    fonts.bold.draw(canvas, text, x, y, TITLE_PX, WHITE);
}

/// Builds the 1280x720 promotional image. The poster is badged first (when
/// the record carries badge text), then scaled into the left column.
pub fn compose_scene(
    record: &MediaRecord,
    mut poster: RgbaImage,
    backdrop: Option<RgbaImage>,
    fonts: &Fonts,
    detector: &dyn FaceDetector,
    cancel: &CancelFlag,
) -> Result<RgbaImage, ComposeError> {
    if poster.width() == 0 || poster.height() == 0 {
        return Err(ComposeError::Decode("poster has no pixels".into()));
    }

    if let Some(caption) = record.badge_text.as_deref() {
        apply_badge(&mut poster, caption, detector, &fonts.bold);
    }
    cancel.check()?;

    let mut canvas = RgbaImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, CANVAS_BASE);
    let background = match backdrop.as_ref() {
        Some(backdrop) => background_from(backdrop),
        None => background_from(&poster),
    };
    imageops::overlay(&mut canvas, &background, 0, 0);
    cancel.check()?;

    let thumb = imageops::resize(&poster, POSTER_WIDTH, POSTER_HEIGHT, FilterType::Lanczos3);
    imageops::overlay(&mut canvas, &thumb, POSTER_X, POSTER_Y);

    let title = format!("{} ({})", record.display_title(), record.year());
    draw_outlined(&mut canvas, fonts, &title, TEXT_X, TITLE_Y);
    fonts.regular.draw(
        &mut canvas,
        &format!("Rating: {}", rating_label(record)),
        TEXT_X,
        RATING_Y,
        RATING_PX,
        RATING_GREEN,
    );
    fonts.regular.draw(
        &mut canvas,
        &record.genre_names().join(" | "),
        TEXT_X,
        GENRES_Y,
        GENRES_PX,
        GENRE_CYAN,
    );

    let mut y = OVERVIEW_Y;
    for line in wrap_overview(&record.overview, WRAP_CHARS, MAX_OVERVIEW_LINES) {
        fonts.regular.draw(&mut canvas, &line, TEXT_X, y, OVERVIEW_PX, OVERVIEW_GREY);
        y += OVERVIEW_LINE_STEP;
    }
    cancel.check()?;

    Ok(canvas)
}
