//! Recognizer - Face Identity Front-End
//!
//! ## Responsibilities
//!
//! - Intern identity strings into compact ids with a trust-set membership
//!   check
//! - Apply the confidence threshold: below it, a face is "Unknown" and
//!   never trusted
//! - Adapt a `FaceClassifier` collaborator (HTTP sidecar, stub, ...) into
//!   the annotations the orchestrator consumes
//!
//! The classifier itself (embeddings, matching) is an external
//! collaborator; this module only owns the trust policy around it.

pub mod http;

use crate::error::Result;
use crate::frame::{Frame, Rect};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Label used when the best match falls below the confidence threshold
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Interned identity key. Comparing ids is an integer compare; the
/// string form lives in the `IdentityInterner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityId(pub u32);

/// String-to-id interner for identity labels
#[derive(Debug, Default)]
pub struct IdentityInterner {
    by_name: HashMap<String, IdentityId>,
    names: Vec<String>,
}

impl IdentityInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> IdentityId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = IdentityId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<IdentityId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: IdentityId) -> &str {
        &self.names[id.0 as usize]
    }
}

/// Set of identities whose presence suppresses recording
#[derive(Debug, Default)]
pub struct TrustSet {
    ids: HashSet<IdentityId>,
}

impl TrustSet {
    pub fn from_names<I, S>(interner: &mut IdentityInterner, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = names
            .into_iter()
            .map(|n| interner.intern(n.as_ref()))
            .collect();
        Self { ids }
    }

    pub fn contains(&self, id: IdentityId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A classified face in a frame. Sticky between recognition ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceAnnotation {
    pub bounds: Rect,
    pub identity: String,
    pub trusted: bool,
}

/// Raw candidate from the classifier collaborator, before the trust
/// policy is applied
#[derive(Debug, Clone, PartialEq)]
pub struct FaceCandidate {
    pub bounds: Rect,
    pub identity: String,
    /// Best-match confidence, 0-1
    pub confidence: f32,
}

/// External face-classification collaborator
///
/// Implementations return every face found in the frame with its
/// best-matching identity and confidence. How the confidence is computed
/// is not specified here.
#[async_trait]
pub trait FaceClassifier: Send + Sync {
    async fn classify(&self, frame: &Frame) -> Result<Vec<FaceCandidate>>;

    /// Startup availability probe. A classifier that cannot be reached at
    /// startup is fatal; mid-loop failures are not.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Threshold- and trust-applying front-end over a `FaceClassifier`
pub struct Recognizer {
    classifier: Box<dyn FaceClassifier>,
    interner: IdentityInterner,
    trusted: TrustSet,
    threshold: f32,
}

impl Recognizer {
    pub fn new(
        classifier: Box<dyn FaceClassifier>,
        mut interner: IdentityInterner,
        trusted_names: &[String],
        threshold: f32,
    ) -> Self {
        let trusted = TrustSet::from_names(&mut interner, trusted_names);
        Self {
            classifier,
            interner,
            trusted,
            threshold,
        }
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.classifier.health_check().await
    }

    /// Classify the frame and apply the trust policy: candidates below the
    /// threshold become "Unknown" with `trusted = false`; the rest are
    /// trusted iff their identity is in the trust set.
    pub async fn recognize(&mut self, frame: &Frame) -> Result<Vec<FaceAnnotation>> {
        let candidates = self.classifier.classify(frame).await?;

        let annotations = candidates
            .into_iter()
            .map(|c| {
                if c.confidence < self.threshold {
                    FaceAnnotation {
                        bounds: c.bounds,
                        identity: UNKNOWN_IDENTITY.to_string(),
                        trusted: false,
                    }
                } else {
                    let id = self.interner.intern(&c.identity);
                    FaceAnnotation {
                        bounds: c.bounds,
                        identity: c.identity,
                        trusted: self.trusted.contains(id),
                    }
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            faces = annotations.len(),
            trusted = annotations.iter().filter(|a| a.trusted).count(),
            "Frame classified"
        );

        Ok(annotations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClassifier(Vec<FaceCandidate>);

    #[async_trait]
    impl FaceClassifier for FixedClassifier {
        async fn classify(&self, _frame: &Frame) -> Result<Vec<FaceCandidate>> {
            Ok(self.0.clone())
        }
    }

    fn candidate(identity: &str, confidence: f32) -> FaceCandidate {
        FaceCandidate {
            bounds: Rect::new(10, 10, 40, 40),
            identity: identity.to_string(),
            confidence,
        }
    }

    fn recognizer(candidates: Vec<FaceCandidate>, threshold: f32) -> Recognizer {
        Recognizer::new(
            Box::new(FixedClassifier(candidates)),
            IdentityInterner::new(),
            &["alice".to_string(), "bob".to_string()],
            threshold,
        )
    }

    #[test]
    fn test_interner_reuses_ids() {
        let mut interner = IdentityInterner::new();
        let a = interner.intern("alice");
        let b = interner.intern("bob");
        assert_ne!(a, b);
        assert_eq!(interner.intern("alice"), a);
        assert_eq!(interner.name(b), "bob");
    }

    #[tokio::test]
    async fn test_below_threshold_is_unknown_untrusted() {
        let mut rec = recognizer(vec![candidate("alice", 0.5)], 0.7);
        let anns = rec.recognize(&Frame::filled(8, 8, [0, 0, 0])).await.unwrap();
        assert_eq!(anns.len(), 1);
        assert_eq!(anns[0].identity, UNKNOWN_IDENTITY);
        assert!(!anns[0].trusted);
    }

    #[tokio::test]
    async fn test_trusted_identity_above_threshold() {
        let mut rec = recognizer(
            vec![candidate("alice", 0.9), candidate("mallory", 0.95)],
            0.7,
        );
        let anns = rec.recognize(&Frame::filled(8, 8, [0, 0, 0])).await.unwrap();
        assert!(anns[0].trusted);
        assert_eq!(anns[0].identity, "alice");
        // Known with high confidence but outside the trust set
        assert!(!anns[1].trusted);
        assert_eq!(anns[1].identity, "mallory");
    }

    #[tokio::test]
    async fn test_threshold_boundary_is_exclusive() {
        // Exactly at the threshold counts as a match
        let mut rec = recognizer(vec![candidate("bob", 0.7)], 0.7);
        let anns = rec.recognize(&Frame::filled(8, 8, [0, 0, 0])).await.unwrap();
        assert_eq!(anns[0].identity, "bob");
        assert!(anns[0].trusted);
    }
}
