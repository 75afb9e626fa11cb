//! Stop-condition evaluation for the iteration loop.
//!
//! A pure function over the loop counters: replaying the same history
//! always yields the same decision.

use serde::{Deserialize, Serialize};

use crate::domain::session::CompletionReason;

/// Diminishing returns is only evaluated once this many iterations have run.
/// Heuristic policy constant, not derived from data.
pub const DIMINISHING_RETURNS_AFTER: u32 = 5;

/// Candidates found must keep up with this fraction of the iteration index.
pub const DIMINISHING_RETURNS_RATIO: f64 = 0.5;

/// Outcome of evaluating stop conditions after an iteration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopDecision {
    Continue,
    ReachedTarget,
    IterationLimit,
    DiminishingReturns,
}

impl StopDecision {
    pub fn should_stop(self) -> bool {
        self != Self::Continue
    }

    /// Completion reason for terminal decisions; None for `Continue`.
    pub fn completion_reason(self) -> Option<CompletionReason> {
        match self {
            Self::Continue => None,
            Self::ReachedTarget => Some(CompletionReason::TargetReached),
            Self::IterationLimit => Some(CompletionReason::IterationLimit),
            Self::DiminishingReturns => Some(CompletionReason::DiminishingReturns),
        }
    }
}

/// Evaluate stop conditions after iteration `iteration` has completed.
///
/// Check order: target reached, iteration limit, diminishing returns.
pub fn evaluate(
    iteration: u32,
    candidates_found: usize,
    max_iterations: u32,
    max_users: usize,
) -> StopDecision {
    if candidates_found >= max_users {
        return StopDecision::ReachedTarget;
    }
    if iteration >= max_iterations {
        return StopDecision::IterationLimit;
    }
    if iteration > DIMINISHING_RETURNS_AFTER
        && (candidates_found as f64) < f64::from(iteration) * DIMINISHING_RETURNS_RATIO
    {
        return StopDecision::DiminishingReturns;
    }
    StopDecision::Continue
}
