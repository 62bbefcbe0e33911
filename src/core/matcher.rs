//! Exhaustive 1:N search over every enrolled template.
//!
//! Each template is opened and scored independently on the rayon pool, then
//! the scores are folded sequentially into the best result. A template that
//! fails to open is skipped and reported, never fatal to the scan. Equal
//! scores resolve to the lowest identity, so the result does not depend on
//! store iteration order.

use rayon::prelude::*;
use std::fmt;
use zeroize::Zeroizing;

use crate::common::error::FaceAuthError;
use crate::core::cipher::EmbeddingCipher;
use crate::core::similarity::cosine_similarity;
use crate::core::types::{FaceTemplate, Identity};

/// Score reported when nothing could be compared.
pub const NO_MATCH_SCORE: f32 = -1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Option<Identity>,
    pub score: f32,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self { identity: None, score: NO_MATCH_SCORE }
    }

    fn outranked_by(&self, identity: &Identity, score: f32) -> bool {
        if score > self.score {
            return true;
        }
        score == self.score
            && self.identity.as_ref().map_or(true, |current| identity < current)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    AuthenticationFailed,
    Malformed(String),
    DimensionMismatch { expected: usize, found: usize },
    NonFiniteScore,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AuthenticationFailed => f.write_str("authentication tag mismatch"),
            SkipReason::Malformed(msg) => write!(f, "malformed payload: {}", msg),
            SkipReason::DimensionMismatch { expected, found } => {
                write!(f, "dimension {} does not match probe dimension {}", found, expected)
            }
            SkipReason::NonFiniteScore => f.write_str("non-finite similarity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTemplate {
    pub identity: Identity,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct MatchReport {
    pub result: MatchResult,
    /// Templates that were opened and scored.
    pub scanned: usize,
    pub skipped: Vec<SkippedTemplate>,
}

impl MatchReport {
    fn empty() -> Self {
        Self { result: MatchResult::no_match(), scanned: 0, skipped: Vec::new() }
    }
}

pub struct MatchEngine<'a> {
    cipher: &'a EmbeddingCipher,
}

impl<'a> MatchEngine<'a> {
    pub fn new(cipher: &'a EmbeddingCipher) -> Self {
        Self { cipher }
    }

    pub fn best_match(&self, probe: &[f32], templates: &[FaceTemplate]) -> MatchReport {
        let scored: Vec<Result<(&Identity, f32), SkippedTemplate>> = templates
            .par_iter()
            .map(|template| self.score_template(probe, template))
            .collect();

        scored.into_iter().fold(MatchReport::empty(), |mut report, outcome| {
            match outcome {
                Ok((identity, score)) => {
                    report.scanned += 1;
                    if report.result.outranked_by(identity, score) {
                        report.result = MatchResult { identity: Some(identity.clone()), score };
                    }
                }
                Err(skipped) => {
                    tracing::warn!(
                        "Skipping template for {}: {}",
                        skipped.identity,
                        skipped.reason
                    );
                    report.skipped.push(skipped);
                }
            }
            report
        })
    }

    fn score_template<'t>(
        &self,
        probe: &[f32],
        template: &'t FaceTemplate,
    ) -> Result<(&'t Identity, f32), SkippedTemplate> {
        let skip = |reason| SkippedTemplate { identity: template.identity.clone(), reason };

        let vector = Zeroizing::new(self.cipher.open(&template.sealed).map_err(|err| {
            skip(match err {
                FaceAuthError::AuthenticationFailed => SkipReason::AuthenticationFailed,
                other => SkipReason::Malformed(other.to_string()),
            })
        })?);

        if vector.len() != probe.len() {
            return Err(skip(SkipReason::DimensionMismatch {
                expected: probe.len(),
                found: vector.len(),
            }));
        }

        let score = cosine_similarity(probe, &vector);
        if !score.is_finite() {
            return Err(skip(SkipReason::NonFiniteScore));
        }

        Ok((&template.identity, score))
    }
}
