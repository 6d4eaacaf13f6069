//! In-memory registry of enrolled faces.
//!
//! A registry is an immutable snapshot: edits build a new one and the
//! recognition loop swaps it in wholesale.

use crate::types::FaceProfile;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    profiles: Arc<[FaceProfile]>,
}

impl Registry {
    /// Build a registry, dropping profiles whose embedding has the wrong
    /// dimension or is not unit length.
    pub fn new(profiles: Vec<FaceProfile>) -> Self {
        let total = profiles.len();
        let valid: Vec<FaceProfile> = profiles
            .into_iter()
            .filter(|p| {
                if !p.embedding.is_valid() {
                    tracing::warn!(
                        name = %p.name,
                        dim = p.embedding.dim(),
                        "dropping profile with invalid embedding dimension"
                    );
                    false
                } else if !p.embedding.is_unit() {
                    tracing::warn!(
                        name = %p.name,
                        norm = p.embedding.norm(),
                        "dropping profile with non-normalized embedding"
                    );
                    false
                } else {
                    true
                }
            })
            .collect();

        tracing::debug!(valid = valid.len(), total, "registry built");
        Self { profiles: valid.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A new registry containing every current profile plus `profile`.
    pub fn with_added(&self, profile: FaceProfile) -> Self {
        let mut profiles = self.profiles.to_vec();
        profiles.push(profile);
        Self::new(profiles)
    }

    pub fn profiles(&self) -> &[FaceProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Embedding, EMBEDDING_DIM};

    fn valid(name: &str) -> FaceProfile {
        FaceProfile::new(name, Embedding::from_raw(vec![1.0; EMBEDDING_DIM]))
    }

    #[test]
    fn test_invalid_profiles_dropped() {
        let bad = FaceProfile::new("bad", Embedding::from_raw(vec![1.0; 128]));
        let reg = Registry::new(vec![valid("a"), bad, valid("b")]);
        assert_eq!(reg.len(), 2);
        assert!(reg.profiles().iter().all(|p| p.name != "bad"));
    }

    #[test]
    fn test_non_unit_profiles_dropped() {
        let zero = FaceProfile::new("zero", Embedding::from_raw(vec![0.0; EMBEDDING_DIM]));
        let big = FaceProfile::new("big", Embedding { values: vec![5.0; EMBEDDING_DIM] });
        let reg = Registry::new(vec![zero, valid("a"), big]);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.profiles()[0].name, "a");
        assert!(reg.profiles().iter().all(|p| p.embedding.is_unit()));
    }

    #[test]
    fn test_with_added_leaves_original_untouched() {
        let reg = Registry::new(vec![valid("a")]);
        let next = reg.with_added(valid("b"));
        assert_eq!(reg.len(), 1);
        assert_eq!(next.len(), 2);
        assert_eq!(next.profiles()[1].name, "b");
    }

    #[test]
    fn test_empty() {
        let reg = Registry::empty();
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
    }
}
