use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dimension of MobileFaceNet embeddings.
pub const EMBEDDING_DIM: usize = 192;

/// Largest tolerated deviation of a stored embedding's norm from 1.
pub const NORM_TOLERANCE: f32 = 1e-4;

/// Bounding box of a detected face, in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height, confidence: 1.0 }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Box area; degenerate boxes count as zero.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (192-dimensional for MobileFaceNet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Build an embedding from a raw model output, L2-normalizing it.
    ///
    /// A zero vector is kept as-is rather than divided by zero.
    pub fn from_raw(raw: Vec<f32>) -> Self {
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw
        };
        Self { values }
    }

    /// Cosine similarity between two pre-normalized embeddings.
    ///
    /// Both sides are unit vectors, so this is a plain dot product in [-1, 1].
    /// Embeddings of different dimension are incomparable and score -1.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            tracing::warn!(
                left = self.values.len(),
                right = other.values.len(),
                "embedding dimensions differ"
            );
            return -1.0;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// True when the embedding has the dimension the registry requires.
    pub fn is_valid(&self) -> bool {
        self.values.len() == EMBEDDING_DIM
    }

    /// True when the L2 norm is 1 within [`NORM_TOLERANCE`].
    pub fn is_unit(&self) -> bool {
        (self.norm() - 1.0).abs() <= NORM_TOLERANCE
    }

    /// L2 norm of the stored values.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

/// A registered employee face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceProfile {
    pub id: String,
    /// Employee name shown on a successful match.
    pub name: String,
    pub embedding: Embedding,
    pub registered_at: DateTime<Utc>,
}

impl FaceProfile {
    /// New profile with a fresh id, stamped now.
    pub fn new(name: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            embedding,
            registered_at: Utc::now(),
        }
    }
}
