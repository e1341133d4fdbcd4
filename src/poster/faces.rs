use image::GrayImage;
use rustface::ImageData;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("face model unavailable: {0}")]
    Model(String),
    #[error("image unusable for detection: {0}")]
    Image(String),
}

pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &GrayImage) -> Result<Vec<FaceBox>, DetectError>;
}

/// SeetaFace frontal detector. A fresh detector is built from the model file
/// on every call so concurrent render jobs never share one.
pub struct SeetaFaceDetector {
    model_path: PathBuf,
    min_face_size: u32,
}

impl SeetaFaceDetector {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            min_face_size: 30,
        }
    }
}

impl FaceDetector for SeetaFaceDetector {
    fn detect(&self, image: &GrayImage) -> Result<Vec<FaceBox>, DetectError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectError::Image("empty image".into()));
        }
        let path = self
            .model_path
            .to_str()
            .ok_or_else(|| DetectError::Model("model path is not UTF-8".into()))?;

        let mut detector =
            rustface::create_detector(path).map_err(|e| DetectError::Model(e.to_string()))?;
        detector.set_min_face_size(self.min_face_size);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let data = ImageData::new(image.as_raw(), image.width(), image.height());
        Ok(detector
            .detect(&data)
            .into_iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceBox {
                    x: bbox.x(),
                    y: bbox.y(),
                    width: bbox.width(),
                    height: bbox.height(),
                }
            })
            .collect())
    }
}
