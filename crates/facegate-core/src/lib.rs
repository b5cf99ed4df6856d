//! facegate-core — face matching against a directory of reference images.
//!
//! SCRFD detection and ArcFace embeddings run via ONNX Runtime behind the
//! [`RecognitionEngine`] trait; the rest of the crate covers the reference
//! store layout and probe decoding.

pub mod alignment;
pub mod detector;
pub mod engine;
pub mod probe;
pub mod recognizer;
pub mod reference;
pub mod types;

pub use engine::{EngineError, OnnxEngine, RecognitionEngine};
pub use probe::{decode_data_url, ProbeError, ProbeFile};
pub use reference::{identity_label, scan_reference_dir, supported_extension, ReferenceImage};
pub use types::{BoundingBox, Candidate, Embedding};

/// File name of the SCRFD detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";
