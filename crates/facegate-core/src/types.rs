use std::path::PathBuf;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Cosine similarity between two embeddings, in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// A reference image from the store, with the embedding of its best face.
#[derive(Debug, Clone)]
pub struct ReferenceFace {
    pub identity: String,
    pub path: PathBuf,
    pub embedding: Embedding,
}

/// One row of a recognition result: a reference image the probe matched.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub identity: String,
    /// Reference file that produced the match.
    pub reference_path: PathBuf,
    /// Cosine similarity of the match [-1, 1].
    pub confidence: f32,
}

/// Strategy for ranking a probe embedding against a gallery of reference faces.
pub trait Matcher {
    /// Every gallery entry at or above `threshold`, best first.
    fn rank(&self, probe: &Embedding, gallery: &[ReferenceFace], threshold: f32) -> Vec<Candidate>;
}

/// Cosine similarity matcher.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn rank(&self, probe: &Embedding, gallery: &[ReferenceFace], threshold: f32) -> Vec<Candidate> {
        let mut hits: Vec<Candidate> = gallery
            .iter()
            .filter_map(|face| {
                let sim = probe.similarity(&face.embedding);
                (sim >= threshold).then(|| Candidate {
                    identity: face.identity.clone(),
                    reference_path: face.path.clone(),
                    confidence: sim,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }
}
