//! Domain model: spec, session lifecycle, candidates, events, errors.

pub mod agent_spec;
pub mod candidate;
pub mod error;
pub mod event;
pub mod session;

pub use agent_spec::{
    resolve_inputs, AgentSpec, EnvSpec, InputConstraints, InputDecl, InputType, OutputsSpec,
    PricingModel, PricingSpec, RequirementsSpec, ResolvedInputs,
};
pub use candidate::{extract_mentions, Candidate, Mention, SourceRef};
pub use error::{EngineError, Result};
pub use event::{ProgressEvent, ProgressKind};
pub use session::{
    CompletionReason, ExecutionSession, IterationRecord, SessionStatus, ToolCallRecord,
};
