//! Execution session lifecycle and iteration history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{EngineError, Result};

/// Status of an execution session.
///
/// Transitions are monotone: `Pending -> Running -> terminal`, or
/// `Pending -> terminal` when validation fails before the loop starts.
/// Terminal states never transition again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Why a session reached `Completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    TargetReached,
    IterationLimit,
    DiminishingReturns,
    BudgetLimit,
}

/// One run of one agent spec.
///
/// Owned exclusively by the engine instance driving it; observers only ever
/// see copies of derived data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSession {
    /// Unique identifier for this session.
    pub session_id: Uuid,

    /// Digest of the agent spec this session executes.
    pub spec_digest: String,

    /// Name of the agent, for logs and reports.
    pub agent_name: String,

    /// Resolved user inputs, validated against the spec.
    pub inputs: serde_json::Value,

    /// Current session status.
    pub status: SessionStatus,

    /// Number of completed loop iterations.
    pub iterations: u32,

    /// When execution started (None while pending).
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished (None until terminal).
    pub finished_at: Option<DateTime<Utc>>,

    /// Completion reason, set when status is `Completed`.
    pub completion: Option<CompletionReason>,
}

impl ExecutionSession {
    /// Create a new pending session.
    pub fn new(spec_digest: String, agent_name: String, inputs: serde_json::Value) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            spec_digest,
            agent_name,
            inputs,
            status: SessionStatus::Pending,
            iterations: 0,
            started_at: None,
            finished_at: None,
            completion: None,
        }
    }

    /// Transition to a new status, enforcing monotonicity.
    ///
    /// Allowed: `Pending -> Running`, `Pending -> terminal` (pre-run
    /// failure or cancellation), `Running -> terminal`. Anything else is an
    /// `InvalidTransition` error.
    pub fn transition(&mut self, to: SessionStatus) -> Result<()> {
        let from = self.status;
        let allowed = match (from, to) {
            (SessionStatus::Pending, SessionStatus::Running) => true,
            (SessionStatus::Pending, t) if t.is_terminal() => true,
            (SessionStatus::Running, t) if t.is_terminal() => true,
            _ => false,
        };
        if !allowed {
            return Err(EngineError::InvalidTransition { from, to });
        }

        if to == SessionStatus::Running {
            self.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        self.status = to;
        Ok(())
    }
}

/// One tool call made during an iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    /// Tool name.
    pub tool: String,

    /// Arguments passed to the tool.
    pub arguments: serde_json::Value,

    /// Tool output on success, None on failure.
    pub output: Option<serde_json::Value>,

    /// Number of attempts made (1 = no retries).
    pub attempts: u32,

    /// Wall-clock duration across all attempts, in milliseconds.
    pub duration_ms: u64,

    /// Whether the call ultimately succeeded.
    pub ok: bool,
}

/// One pass of the iteration loop, immutable once appended to the history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationRecord {
    /// 1-based iteration index.
    pub index: u32,

    /// Tool calls made during this pass.
    pub tool_calls: Vec<ToolCallRecord>,

    /// New candidates accepted during this pass.
    pub candidates_found: usize,

    /// Elapsed time for the pass, in milliseconds.
    pub elapsed_ms: u64,
}
