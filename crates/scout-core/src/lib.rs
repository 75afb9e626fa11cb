//! Scout Core Library
//!
//! A bounded, observable execution engine for audience-scouting agents:
//! a declarative spec drives an iteration loop that invokes tools, scores
//! evidence, deduplicates candidates, tracks cost, and streams progress to
//! independent observers.

pub mod bus;
pub mod cost;
pub mod domain;
pub mod engine;
pub mod export;
pub mod oracle;
pub mod output;
pub mod scoring;
pub mod stop;
pub mod store;
pub mod telemetry;
pub mod tools;

pub use bus::{CallbackBus, Observer};
pub use cost::CostLedger;
pub use domain::{
    resolve_inputs, AgentSpec, Candidate, CompletionReason, EngineError, ExecutionSession,
    InputDecl, InputType, IterationRecord, Mention, ProgressEvent, ProgressKind, ResolvedInputs,
    Result, SessionStatus, SourceRef, ToolCallRecord,
};
pub use engine::{CancelToken, SessionConfig, SessionEngine, SessionReport};
pub use oracle::{NextActionPlanner, Plan, PlanningContext, ScoutPlanner};
pub use output::{assemble, CandidateRecord, OutputSummary, OutputValidator, SessionOutput};
pub use scoring::{IntentScorer, IntentSignal};
pub use stop::{evaluate as evaluate_stop, StopDecision};
pub use store::CandidateStore;
pub use telemetry::init_tracing;
pub use tools::{Tool, ToolCall, ToolError, ToolInvoker, ToolOutcome, ToolRegistry};

/// Scout version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
