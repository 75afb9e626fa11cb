//! Purchase-intent scoring heuristic.
//!
//! Pure mapping from evidence text to a score in 0.0-1.0 plus a rationale.
//! The acceptance threshold is a session parameter applied by the engine;
//! the banding here is the scorer's own heuristic.

use crate::domain::error::{EngineError, Result};

/// Score for explicit willingness-to-pay phrases.
pub const HIGH_BAND_SCORE: f32 = 0.95;

/// Score for dissatisfaction-with-free / considering-paid phrases.
pub const MID_BAND_SCORE: f32 = 0.80;

/// Score when no intent phrase matches; below any sane threshold.
pub const NO_SIGNAL_SCORE: f32 = 0.30;

/// Phrases expressing explicit willingness to pay.
const HIGH_BAND_PHRASES: &[&str] = &[
    "i'd pay",
    "willing to pay",
    "happily pay",
    "don't mind paying",
];

/// Phrases expressing dissatisfaction with free options or intent to switch.
const MID_BAND_PHRASES: &[&str] = &[
    "paid alternative",
    "free apps aren't",
    "invest in",
    "subscription",
    "worth it",
    "pricing",
];

/// A scored piece of evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentSignal {
    /// Score in 0.0-1.0.
    pub score: f32,

    /// Which phrase produced the score, or why none did.
    pub rationale: String,
}

/// Stateless intent scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentScorer;

impl IntentScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score one piece of evidence text.
    ///
    /// Empty text is a scoring error; the engine skips the item and
    /// continues.
    pub fn score(&self, text: &str) -> Result<IntentSignal> {
        if text.trim().is_empty() {
            return Err(EngineError::Scoring("empty evidence text".into()));
        }

        let lowered = text.to_lowercase();

        for phrase in HIGH_BAND_PHRASES {
            if lowered.contains(phrase) {
                return Ok(IntentSignal {
                    score: HIGH_BAND_SCORE,
                    rationale: format!("matched \"{phrase}\""),
                });
            }
        }

        for phrase in MID_BAND_PHRASES {
            if lowered.contains(phrase) {
                return Ok(IntentSignal {
                    score: MID_BAND_SCORE,
                    rationale: format!("matched \"{phrase}\""),
                });
            }
        }

        Ok(IntentSignal {
            score: NO_SIGNAL_SCORE,
            rationale: "no purchase-intent phrase matched".into(),
        })
    }
}
