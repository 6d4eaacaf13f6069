//! Face match pipeline: detect → crop → embed → match → decide.
//!
//! Recognition never fails: every stage problem degrades to [`Recognition::Idle`]
//! or [`Recognition::NoMatch`] and is logged. Enrollment, which an operator
//! can retry, reports typed errors instead.

use crate::crop;
use crate::detector::{largest_face, Detector, DetectorError};
use crate::matcher::{CosineMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::recognizer::{extract_embedding, Embedder, RecognizerError};
use crate::registry::Registry;
use crate::types::{BoundingBox, Embedding, FaceProfile};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of analyzing one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recognition {
    /// No face in the frame.
    Idle,
    /// A face was seen but not recognized.
    NoMatch {
        bbox: BoundingBox,
        /// Best similarity reached, when an embedding could be compared at all.
        best_score: Option<f32>,
    },
    /// A registered employee was recognized.
    Match {
        name: String,
        profile_id: String,
        score: f32,
        bbox: BoundingBox,
    },
}

impl Recognition {
    pub fn bbox(&self) -> Option<&BoundingBox> {
        match self {
            Recognition::Idle => None,
            Recognition::NoMatch { bbox, .. } | Recognition::Match { bbox, .. } => Some(bbox),
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Recognition::Match { .. })
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("employee name must not be empty")]
    EmptyName,
    #[error("no face detected")]
    NoFaceDetected,
    #[error("face crop has no area")]
    InvalidCrop,
    #[error("embedding model produced a zero vector")]
    DegenerateEmbedding,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

pub struct FacePipeline<D, E, M = CosineMatcher> {
    detector: D,
    embedder: E,
    matcher: M,
    threshold: f32,
}

impl<D: Detector, E: Embedder> FacePipeline<D, E> {
    pub fn new(detector: D, embedder: E) -> Self {
        Self {
            detector,
            embedder,
            matcher: CosineMatcher,
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl<D: Detector, E: Embedder, M: Matcher> FacePipeline<D, E, M> {
    pub fn with_matcher<N: Matcher>(self, matcher: N) -> FacePipeline<D, E, N> {
        FacePipeline {
            detector: self.detector,
            embedder: self.embedder,
            matcher,
            threshold: self.threshold,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Analyze one admitted frame against the registry.
    pub fn analyze(&mut self, image: &RgbImage, registry: &Registry) -> Recognition {
        let faces = match self.detector.detect(image) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed");
                return Recognition::Idle;
            }
        };

        let Some(face) = largest_face(&faces).copied() else {
            return Recognition::Idle;
        };
        tracing::debug!(faces = faces.len(), ?face, "face selected");

        let Some(crop) = crop::crop_face(image, &face) else {
            return Recognition::NoMatch { bbox: face, best_score: None };
        };

        let probe = match extract_embedding(&mut self.embedder, &crop) {
            Ok(probe) => probe,
            Err(e) => {
                tracing::warn!(error = %e, "embedding extraction failed");
                return Recognition::NoMatch { bbox: face, best_score: None };
            }
        };

        self.decide(&probe, face, registry)
    }

    /// Match a probe embedding and apply the acceptance threshold.
    pub fn decide(&self, probe: &Embedding, bbox: BoundingBox, registry: &Registry) -> Recognition {
        match self.matcher.best_match(probe, registry.profiles()) {
            Some(best) if best.score >= self.threshold => {
                tracing::info!(name = %best.profile.name, score = best.score, "face recognized");
                Recognition::Match {
                    name: best.profile.name.clone(),
                    profile_id: best.profile.id.clone(),
                    score: best.score,
                    bbox,
                }
            }
            best => {
                let best_score = best.map(|b| b.score);
                tracing::debug!(?best_score, threshold = self.threshold, "face not recognized");
                Recognition::NoMatch { bbox, best_score }
            }
        }
    }

    /// Build a new profile for `name` from the largest face in `image`.
    pub fn enroll(&mut self, image: &RgbImage, name: &str) -> Result<FaceProfile, PipelineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::EmptyName);
        }

        let faces = self.detector.detect(image)?;
        let face = largest_face(&faces).ok_or(PipelineError::NoFaceDetected)?;
        let crop = crop::crop_face(image, face).ok_or(PipelineError::InvalidCrop)?;
        let embedding = extract_embedding(&mut self.embedder, &crop)?;
        if !embedding.is_unit() {
            return Err(PipelineError::DegenerateEmbedding);
        }

        tracing::info!(name, confidence = face.confidence, "enrolled face");
        Ok(FaceProfile::new(name, embedding))
    }
}
