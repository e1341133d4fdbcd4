//! Caption badges drawn onto posters, placed so they stay clear of faces.

use super::faces::{DetectError, FaceBox, FaceDetector};
use super::fonts::Typeface;
use image::{Pixel, Rgba, RgbaImage, imageops};
use imageproc::rect::Rect;
use tracing::{debug, warn};

pub const FACE_MARGIN: i64 = 20;
/// Minimum room that must remain below a badge placed under a face.
pub const BOTTOM_CLEARANCE: i64 = 130;
pub const TOP_FALLBACK_Y: u32 = 30;
pub const NO_FACE_RATIO: f32 = 0.40;
pub const DETECTOR_FAILURE_Y: u32 = 80;

pub const BADGE_FONT_PX: f32 = 22.0;
pub const PAD_X: u32 = 15;
pub const PAD_Y: u32 = 10;
pub const BOX_FILL: Rgba<u8> = Rgba([0, 0, 0, 160]);
pub const ACCENT_HEAD: Rgba<u8> = Rgba([255, 214, 0, 255]);
pub const ACCENT_TAIL: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Vertical badge offset for a poster of `height` given the detector result.
pub fn badge_offset(faces: Result<Vec<FaceBox>, DetectError>, height: u32) -> u32 {
    let faces = match faces {
        Ok(faces) => faces,
        Err(err) => {
            warn!("face detection failed, using fixed badge offset: {}", err);
            return DETECTOR_FAILURE_Y;
        }
    };

    // Lowest face, not the largest: the badge must clear whoever sits lowest.
    let Some(lowest) = faces.iter().max_by_key(|f| f.bottom()) else {
        return (height as f32 * NO_FACE_RATIO).round() as u32;
    };

    let candidate = lowest.bottom() + FACE_MARGIN;
    if candidate >= 0 && candidate <= height as i64 - BOTTOM_CLEARANCE {
        candidate as u32
    } else {
        TOP_FALLBACK_Y
    }
}

pub fn place_badge(poster: &RgbaImage, detector: &dyn FaceDetector) -> u32 {
    let gray = imageops::grayscale(poster);
    let faces = detector.detect(&gray);
    if let Ok(found) = &faces {
        debug!("detected {} face(s) on poster", found.len());
    }
    badge_offset(faces, poster.height())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub x: i32,
    pub width: u32,
}

impl Span {
    pub fn end(&self) -> i32 {
        self.x + self.width as i32
    }
}

/// Where a badge landed. Computed per draw, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgePlacement {
    pub y: u32,
    pub rect: Rect,
    pub head: Span,
    pub tail: Option<Span>,
}

/// Splits on the first whitespace run. A caption without a second token has
/// no tail.
pub fn split_caption(caption: &str) -> (&str, Option<&str>) {
    let caption = caption.trim();
    match caption.split_once(char::is_whitespace) {
        Some((head, tail)) => {
            let tail = tail.trim_start();
            (head, (!tail.is_empty()).then_some(tail))
        }
        None => (caption, None),
    }
}

fn shade_rect(image: &mut RgbaImage, rect: Rect, fill: Rgba<u8>) {
    for y in rect.top()..rect.bottom() + 1 {
        for x in rect.left()..rect.right() + 1 {
            if x < 0 || y < 0 {
                continue;
            }
            if let Some(pixel) = image.get_pixel_mut_checked(x as u32, y as u32) {
                pixel.blend(&fill);
            }
        }
    }
}

/// Draws `caption` in a shaded box centred horizontally with its top at `y`
/// (moved up if it would run off the bottom). Returns `None` and leaves the
/// image untouched for an empty caption.
pub fn draw_badge(
    image: &mut RgbaImage,
    caption: &str,
    y: u32,
    font: &Typeface,
) -> Option<BadgePlacement> {
    let (head, tail) = split_caption(caption);
    if head.is_empty() {
        return None;
    }

    let (head_w, text_h) = font.measure(head, BADGE_FONT_PX);
    let space_w = font.measure(" ", BADGE_FONT_PX).0;
    let tail_w = tail.map(|t| font.measure(t, BADGE_FONT_PX).0).unwrap_or(0);
    let text_w = match tail {
        Some(_) => head_w + space_w + tail_w,
        None => head_w,
    };

    let box_w = (text_w + 2 * PAD_X).min(image.width().max(1));
    let box_h = (text_h + 2 * PAD_Y).min(image.height().max(1));
    let box_x = (image.width().saturating_sub(box_w) / 2) as i32;
    let box_y = y.min(image.height().saturating_sub(box_h));
    let rect = Rect::at(box_x, box_y as i32).of_size(box_w, box_h);

    shade_rect(image, rect, BOX_FILL);

    let text_y = box_y as i32 + PAD_Y as i32;
    let head_span = Span {
        x: box_x + PAD_X as i32,
        width: head_w,
    };
    font.draw(image, head, head_span.x, text_y, BADGE_FONT_PX, ACCENT_HEAD);

    let tail_span = tail.map(|text| {
        let span = Span {
            x: head_span.end() + space_w as i32,
            width: tail_w,
        };
        font.draw(image, text, span.x, text_y, BADGE_FONT_PX, ACCENT_TAIL);
        span
    });

    Some(BadgePlacement {
        y: box_y,
        rect,
        head: head_span,
        tail: tail_span,
    })
}

/// Finds a face-free offset and draws the badge there.
pub fn apply_badge(
    poster: &mut RgbaImage,
    caption: &str,
    detector: &dyn FaceDetector,
    font: &Typeface,
) -> Option<BadgePlacement> {
    if caption.trim().is_empty() {
        return None;
    }
    let y = place_badge(poster, detector);
    draw_badge(poster, caption, y, font)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::GrayImage;

    pub(crate) struct FixedFaces(pub Vec<FaceBox>);

    impl FaceDetector for FixedFaces {
        fn detect(&self, _image: &GrayImage) -> Result<Vec<FaceBox>, DetectError> {
            Ok(self.0.clone())
        }
    }

    pub(crate) struct BrokenDetector;

    impl FaceDetector for BrokenDetector {
        fn detect(&self, _image: &GrayImage) -> Result<Vec<FaceBox>, DetectError> {
            Err(DetectError::Model("missing".into()))
        }
    }

    fn face(y: i32, height: u32) -> FaceBox {
        FaceBox { x: 100, y, width: height, height }
    }

    #[test]
    fn badge_goes_below_the_face_with_margin() {
        let poster = RgbaImage::new(500, 750);
        let y = place_badge(&poster, &FixedFaces(vec![face(100, 150)]));
        assert_eq!(y, 100 + 150 + 20);
    }

    #[test]
    fn boundary_is_inclusive() {
        // 750 - 130 = 620 is still allowed.
        assert_eq!(badge_offset(Ok(vec![face(450, 150)]), 750), 620);
        assert_eq!(badge_offset(Ok(vec![face(451, 150)]), 750), TOP_FALLBACK_Y);
    }

    #[test]
    fn lowest_face_wins_over_largest_and_first() {
        let faces = vec![face(50, 300), face(400, 60), face(200, 100)];
        assert_eq!(badge_offset(Ok(faces), 750), 400 + 60 + 20);
    }

    #[test]
    fn no_faces_uses_proportional_offset() {
        for height in [600u32, 750, 1000] {
            let poster = RgbaImage::from_pixel(400, height, Rgba([200, 10, 10, 255]));
            assert_eq!(
                place_badge(&poster, &FixedFaces(vec![])),
                (height as f32 * 0.40).round() as u32
            );
        }
    }

    #[test]
    fn detector_failure_uses_constant_offset() {
        let poster = RgbaImage::new(500, 750);
        assert_eq!(place_badge(&poster, &BrokenDetector), DETECTOR_FAILURE_Y);
    }

    #[test]
    fn caption_splits_on_first_whitespace_run() {
        assert_eq!(split_caption("Hindi  Dubbed HQ"), ("Hindi", Some("Dubbed HQ")));
        assert_eq!(split_caption(" Dual "), ("Dual", None));
        assert_eq!(split_caption(""), ("", None));
    }

    fn count_color(image: &RgbaImage, color: Rgba<u8>, from_x: i32, to_x: i32) -> (usize, usize) {
        let (mut inside, mut outside) = (0, 0);
        for (x, _, p) in image.enumerate_pixels() {
            if *p == color {
                if (x as i32) >= from_x && (x as i32) < to_x {
                    inside += 1;
                } else {
                    outside += 1;
                }
            }
        }
        (inside, outside)
    }

    #[test]
    fn two_tokens_render_in_two_non_overlapping_colors() {
        let mut poster = RgbaImage::from_pixel(500, 750, Rgba([90, 90, 90, 255]));
        let placement = draw_badge(&mut poster, "HINDI DUBBED", 300, &Typeface::Bitmap).unwrap();
        let tail = placement.tail.unwrap();

        assert!(placement.head.end() <= tail.x);
        let (head_in, head_out) = count_color(&poster, ACCENT_HEAD, placement.head.x, placement.head.end());
        let (tail_in, tail_out) = count_color(&poster, ACCENT_TAIL, tail.x, tail.end());
        assert!(head_in > 0 && tail_in > 0);
        assert_eq!((head_out, tail_out), (0, 0));
    }

    #[test]
    fn single_token_uses_first_accent_only() {
        let mut poster = RgbaImage::from_pixel(500, 750, Rgba([90, 90, 90, 255]));
        let placement = draw_badge(&mut poster, "DUAL", 300, &Typeface::Bitmap).unwrap();
        assert!(placement.tail.is_none());
        assert!(count_color(&poster, ACCENT_HEAD, 0, 500).0 > 0);
        assert_eq!(count_color(&poster, ACCENT_TAIL, 0, 500), (0, 0));
    }

    #[test]
    fn box_is_centred_shaded_and_kept_on_canvas() {
        let mut poster = RgbaImage::from_pixel(500, 750, Rgba([200, 200, 200, 255]));
        let placement = draw_badge(&mut poster, "Hindi Dubbed", 745, &Typeface::Bitmap).unwrap();
        let rect = placement.rect;

        assert!(rect.bottom() < 750);
        let left_gap = rect.left();
        let right_gap = 500 - (rect.right() + 1);
        assert!((left_gap - right_gap).abs() <= 1);
        // Corner of the box is darkened, outside is untouched.
        let corner = poster.get_pixel(rect.left() as u32, rect.top() as u32);
        assert!(corner[0] < 200);
        assert_eq!(poster.get_pixel(0, 0), &Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn drawn_badge_never_covers_the_lowest_face() {
        let cases = [
            vec![face(100, 150)],
            vec![face(50, 300), face(400, 60), face(200, 100)],
            // Lowest face that still leaves room for the badge below it.
            vec![face(450, 150)],
        ];
        for faces in cases {
            let lowest = faces.iter().map(FaceBox::bottom).max().unwrap();
            let mut poster = RgbaImage::new(500, 750);
            let placement =
                apply_badge(&mut poster, "Hindi 720p", &FixedFaces(faces), &Typeface::Bitmap).unwrap();
            assert!(placement.rect.top() as i64 > lowest);
            assert_eq!(placement.rect.top() as i64, lowest + FACE_MARGIN);
            assert!(placement.rect.bottom() < 750);
        }
    }

    #[test]
    fn empty_caption_leaves_poster_untouched() {
        let mut poster = RgbaImage::from_pixel(50, 50, Rgba([1, 2, 3, 255]));
        let before = poster.clone();
        assert!(apply_badge(&mut poster, "   ", &FixedFaces(vec![]), &Typeface::Bitmap).is_none());
        assert_eq!(poster, before);
    }
}
