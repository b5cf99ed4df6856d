//! Recognition engine boundary.
//!
//! The daemon only ever talks to [`RecognitionEngine`]: given a probe image
//! path and the reference directory, return the reference images the probe
//! matched. [`OnnxEngine`] is the SCRFD + ArcFace implementation.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::reference::scan_reference_dir;
use crate::types::{BoundingBox, Candidate, CosineMatcher, Matcher, ReferenceFace};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("cannot read image: {0}")]
    Image(#[from] image::ImageError),
    #[error("reference store: {0}")]
    Io(#[from] std::io::Error),
}

/// Face matching against a directory of reference images.
///
/// A probe with no detectable face is not an error: it yields no candidates.
pub trait RecognitionEngine {
    fn find(&mut self, probe: &Path, reference_dir: &Path) -> Result<Vec<Candidate>, EngineError>;
}

/// SCRFD detection + ArcFace embeddings + cosine ranking.
///
/// Reference embeddings are recomputed on every call so out-of-band edits to
/// the store are always honoured.
pub struct OnnxEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    threshold: f32,
}

impl OnnxEngine {
    pub fn load(scrfd_path: &str, arcface_path: &str, threshold: f32) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self { detector, recognizer, threshold })
    }

    /// Embed the best face of every reference image; images without a face are skipped.
    fn gallery(&mut self, reference_dir: &Path) -> Result<Vec<ReferenceFace>, EngineError> {
        let mut gallery = Vec::new();
        for reference in scan_reference_dir(reference_dir)? {
            let image = match image::open(&reference.path) {
                Ok(img) => img.to_rgb8(),
                Err(err) => {
                    tracing::warn!(path = %reference.path.display(), error = %err, "unreadable reference image");
                    continue;
                }
            };
            let faces = self.detector.detect(&image)?;
            let Some(face) = faces.first() else {
                tracing::debug!(identity = %reference.identity, "no face in reference image");
                continue;
            };
            let embedding = self.recognizer.extract(&image, face)?;
            gallery.push(ReferenceFace {
                identity: reference.identity,
                path: reference.path,
                embedding,
            });
        }
        Ok(gallery)
    }
}

impl RecognitionEngine for OnnxEngine {
    fn find(&mut self, probe: &Path, reference_dir: &Path) -> Result<Vec<Candidate>, EngineError> {
        let image = image::open(probe)?.to_rgb8();
        let faces = self.detector.detect(&image)?;
        tracing::debug!(faces = faces.len(), "probe: faces detected");
        let Some(face) = primary_face(&faces) else {
            return Ok(Vec::new());
        };

        let gallery = self.gallery(reference_dir)?;
        tracing::debug!(references = gallery.len(), "gallery embedded");

        let embedding = self.recognizer.extract(&image, face)?;
        Ok(CosineMatcher.rank(&embedding, &gallery, self.threshold))
    }
}

/// The probe face that gets matched: the most confident detection.
fn primary_face(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    faces.iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}
