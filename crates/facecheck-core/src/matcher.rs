//! Nearest-neighbour matching of a probe embedding against the registry.

use crate::types::{Embedding, FaceProfile};

/// Acceptance threshold for a positive match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.7;

/// Highest-scoring profile for a probe.
#[derive(Debug, Clone, Copy)]
pub struct BestMatch<'a> {
    pub profile: &'a FaceProfile,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

/// Strategy for finding the closest enrolled face to a probe embedding.
pub trait Matcher {
    fn best_match<'a>(&self, probe: &Embedding, gallery: &'a [FaceProfile]) -> Option<BestMatch<'a>>;
}

/// Cosine similarity matcher.
///
/// Walks every gallery entry. Profiles whose embedding dimension differs from
/// the probe are skipped. On equal scores the earlier profile is kept.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn best_match<'a>(&self, probe: &Embedding, gallery: &'a [FaceProfile]) -> Option<BestMatch<'a>> {
        let mut best: Option<BestMatch<'a>> = None;

        for profile in gallery {
            if profile.embedding.dim() != probe.dim() {
                tracing::debug!(
                    name = %profile.name,
                    dim = profile.embedding.dim(),
                    expected = probe.dim(),
                    "skipping profile with mismatched embedding dimension"
                );
                continue;
            }

            let score = probe.similarity(&profile.embedding);
            let better = match &best {
                None => true,
                Some(current) => score > current.score,
            };
            if better {
                best = Some(BestMatch { profile, score });
            }
        }

        best
    }
}
