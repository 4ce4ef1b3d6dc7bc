//! ONNX-backed [`FacePipeline`]: SCRFD for locating faces, ArcFace for encoding them.

use crate::detector::FaceDetector;
use crate::recognition::{FacePipeline, PipelineError};
use crate::recognizer::FaceRecognizer;
use crate::types::{BoundingBox, Descriptor};
use std::path::Path;

/// Model file names expected inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

pub struct OnnxPipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxPipeline {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, PipelineError> {
        let scrfd = model_dir.join(SCRFD_MODEL_FILE);
        let arcface = model_dir.join(ARCFACE_MODEL_FILE);
        let detector = FaceDetector::load(&scrfd.to_string_lossy())?;
        let recognizer = FaceRecognizer::load(&arcface.to_string_lossy())?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FacePipeline for OnnxPipeline {
    fn locate(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, PipelineError> {
        Ok(self.detector.detect(rgb, width, height)?)
    }

    fn encode(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Descriptor>, PipelineError> {
        boxes
            .iter()
            .map(|face| Ok(self.recognizer.extract(rgb, width, height, face)?))
            .collect()
    }
}
