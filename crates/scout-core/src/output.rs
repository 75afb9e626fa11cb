//! Canonical session output: assembly, summary statistics, and schema
//! validation.

use std::collections::BTreeMap;

use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::candidate::{Candidate, SourceRef};
use crate::domain::error::{EngineError, Result};

/// Candidates at or above this score count as high confidence.
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.9;

/// One accepted candidate in the canonical output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateRecord {
    pub identity: String,
    pub score: f32,
    pub source: SourceRef,
    pub evidence: Vec<String>,
}

/// Derived summary statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputSummary {
    /// Total accepted candidates.
    pub total: usize,

    /// Candidates scoring at or above [`HIGH_CONFIDENCE_THRESHOLD`].
    pub high_confidence_count: usize,

    /// Candidate count per subreddit.
    pub source_breakdown: BTreeMap<String, usize>,

    /// Textual pattern highlights from the scoring rationales, most
    /// frequent first.
    pub observed_patterns: Vec<String>,
}

/// The single canonical output object every export derives from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionOutput {
    pub results: Vec<CandidateRecord>,
    pub summary: OutputSummary,
}

/// Assemble the canonical output from the store's candidates, preserving
/// insertion order.
pub fn assemble(candidates: &[Candidate]) -> SessionOutput {
    let results: Vec<CandidateRecord> = candidates
        .iter()
        .map(|c| CandidateRecord {
            identity: c.identity.clone(),
            score: c.score,
            source: c.source.clone(),
            evidence: c.evidence.clone(),
        })
        .collect();

    let high_confidence_count = candidates
        .iter()
        .filter(|c| c.score >= HIGH_CONFIDENCE_THRESHOLD)
        .count();

    let mut source_breakdown = BTreeMap::new();
    for c in candidates {
        *source_breakdown.entry(c.source.subreddit.clone()).or_insert(0) += 1;
    }

    SessionOutput {
        summary: OutputSummary {
            total: results.len(),
            high_confidence_count,
            source_breakdown,
            observed_patterns: observed_patterns(candidates),
        },
        results,
    }
}

/// Rationale highlights ordered by frequency (first-seen order breaks ties).
fn observed_patterns(candidates: &[Candidate]) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for c in candidates {
        match counts.iter_mut().find(|(p, _)| p == &c.rationale) {
            Some((_, n)) => *n += 1,
            None => counts.push((c.rationale.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(p, _)| p).collect()
}

/// Validates assembled output against the agent spec's declared schema.
///
/// A mismatch is a schema-validation failure reported as such, never
/// silently coerced.
pub struct OutputValidator {
    validator: jsonschema::Validator,
}

impl OutputValidator {
    /// Compile the declared output schema.
    pub fn new(schema: &Value) -> Result<Self> {
        let validator = validator_for(schema)
            .map_err(|e| EngineError::SchemaValidation(format!("invalid schema: {e}")))?;
        Ok(Self { validator })
    }

    /// Validate the output; returns the serialized JSON value on success.
    pub fn validate(&self, output: &SessionOutput) -> Result<Value> {
        let value = serde_json::to_value(output)?;
        if !self.validator.is_valid(&value) {
            let messages = self
                .validator
                .iter_errors(&value)
                .map(|e| e.to_string())
                .collect::<Vec<_>>();
            return Err(EngineError::SchemaValidation(messages.join("; ")));
        }
        Ok(value)
    }
}
