//! The session engine: a bounded, observable iteration loop.
//!
//! One engine instance drives one session sequentially. Within an
//! iteration, planned tool calls run concurrently up to a bounded fan-out;
//! the iteration completes only once every call has returned or timed out.
//! The engine exclusively owns the candidate store, cost ledger, and
//! iteration history; observers only ever receive copies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::bus::{CallbackBus, Observer};
use crate::cost::CostLedger;
use crate::domain::agent_spec::{resolve_inputs, AgentSpec, ResolvedInputs};
use crate::domain::candidate::{extract_mentions, Candidate};
use crate::domain::error::{EngineError, Result};
use crate::domain::event::ProgressEvent;
use crate::domain::session::{
    CompletionReason, ExecutionSession, IterationRecord, SessionStatus, ToolCallRecord,
};
use crate::oracle::{NextActionPlanner, PlanningContext};
use crate::output::{self, OutputValidator, SessionOutput};
use crate::scoring::IntentScorer;
use crate::stop::{self, StopDecision};
use crate::store::CandidateStore;
use crate::tools::{ToolCall, ToolInvoker, ToolRegistry};

/// Retry bound for retryable tool failures, including the first attempt.
pub const TOOL_MAX_ATTEMPTS: u32 = 3;

/// Concurrent tool calls per iteration when the spec does not say.
pub const DEFAULT_FAN_OUT: usize = 4;

/// Candidate target when the inputs do not declare `max_users`.
pub const DEFAULT_MAX_USERS: usize = 5;

/// Acceptance threshold when the inputs do not declare `min_intent_score`.
pub const DEFAULT_MIN_INTENT_SCORE: f64 = 0.7;

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Resolved per-session knobs, extracted once so the loop never gropes
/// through raw JSON.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_iterations: u32,
    pub max_users: usize,
    pub min_intent_score: f32,
    pub budget: f64,
    pub base_cost: f64,
    pub per_call_cost: f64,
    pub tool_timeout: Duration,
    pub fan_out: usize,
    pub retry_backoff: Duration,
}

impl SessionConfig {
    /// Derive the config from the spec and the resolved inputs.
    ///
    /// `max_users` and `min_intent_score` come from the inputs by
    /// convention; everything else comes from the spec's requirements and
    /// pricing sections.
    pub fn from_spec(spec: &AgentSpec, inputs: &ResolvedInputs) -> Result<Self> {
        let max_users = inputs.get_usize("max_users").unwrap_or(DEFAULT_MAX_USERS);
        if max_users == 0 {
            return Err(EngineError::InvalidInput(
                "max_users must be at least 1".into(),
            ));
        }

        let min_intent_score = inputs
            .get_f64("min_intent_score")
            .unwrap_or(DEFAULT_MIN_INTENT_SCORE);
        if !(0.0..=1.0).contains(&min_intent_score) {
            return Err(EngineError::InvalidInput(
                "min_intent_score must be within 0.0..=1.0".into(),
            ));
        }

        Ok(Self {
            max_iterations: spec.requirements.max_iterations,
            max_users,
            min_intent_score: min_intent_score as f32,
            budget: spec.pricing.max_cost,
            base_cost: spec.pricing.base_cost,
            per_call_cost: spec.pricing.per_call_cost,
            tool_timeout: Duration::from_secs(spec.requirements.timeout),
            fan_out: spec.requirements.fan_out.unwrap_or(DEFAULT_FAN_OUT).max(1),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }
}

/// Cancellation handle for a running session.
///
/// The signal is observed at the top of each loop pass; in-flight tool
/// calls complete or time out before the session honors it.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Final report of a session run. Partial results are never discarded: the
/// output is populated even when the session failed or was cancelled.
#[derive(Debug)]
pub struct SessionReport {
    pub session: ExecutionSession,
    pub output: SessionOutput,
    pub error: Option<EngineError>,
    pub total_cost: f64,
    pub history: Vec<IterationRecord>,
    pub events_published: u64,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.session.status == SessionStatus::Completed
    }
}

enum Drive {
    Completed(CompletionReason),
    Failed(EngineError),
    Cancelled,
}

/// Drives one session of one agent spec through the iteration loop.
///
/// `run` consumes the engine, so at most one execution per session can ever
/// exist; the status machine enforces the same invariant at runtime.
pub struct SessionEngine {
    spec: Arc<AgentSpec>,
    inputs: ResolvedInputs,
    config: SessionConfig,
    session: ExecutionSession,
    store: CandidateStore,
    ledger: CostLedger,
    history: Vec<IterationRecord>,
    invoker: ToolInvoker,
    scorer: IntentScorer,
    planner: Arc<dyn NextActionPlanner>,
    validator: OutputValidator,
    bus: CallbackBus,
    cancel_rx: watch::Receiver<bool>,
    cancel: CancelToken,
}

impl SessionEngine {
    /// Build an engine for one session, failing fast on invalid specs,
    /// invalid inputs, missing tool bindings, or an uncompilable output
    /// schema.
    pub fn new(
        spec: AgentSpec,
        user_inputs: &Value,
        registry: ToolRegistry,
        planner: Arc<dyn NextActionPlanner>,
    ) -> Result<Self> {
        spec.validate()?;
        let inputs = resolve_inputs(&spec, user_inputs)?;

        for name in &spec.requirements.tool_names {
            if !registry.contains(name) {
                return Err(EngineError::InvalidSpec(format!(
                    "required tool '{name}' has no registered implementation"
                )));
            }
        }

        let config = SessionConfig::from_spec(&spec, &inputs)?;
        let validator = OutputValidator::new(spec.output_schema()?)?;
        let session = ExecutionSession::new(spec.digest()?, spec.name.clone(), inputs.as_json());
        let invoker = ToolInvoker::new(registry, config.tool_timeout);
        let ledger = CostLedger::new(config.budget);
        let (tx, cancel_rx) = watch::channel(false);

        Ok(Self {
            spec: Arc::new(spec),
            inputs,
            config,
            session,
            store: CandidateStore::new(),
            ledger,
            history: Vec::new(),
            invoker,
            scorer: IntentScorer::new(),
            planner,
            validator,
            bus: CallbackBus::new(),
            cancel_rx,
            cancel: CancelToken { tx: Arc::new(tx) },
        })
    }

    /// Register an observer. Only possible before `run`.
    pub fn subscribe(&mut self, observer: Arc<dyn Observer>) -> Result<()> {
        self.bus.subscribe(observer)
    }

    /// Handle for cancelling the session from outside.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn session(&self) -> &ExecutionSession {
        &self.session
    }

    /// Override the retry backoff base (tests mostly).
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    fn publish(&self, event: ProgressEvent) {
        self.bus.publish(event);
    }

    /// Run the session to a terminal status. Never panics; failures are
    /// reported in the returned [`SessionReport`].
    pub async fn run(mut self) -> SessionReport {
        self.bus.seal();
        info!(
            session_id = %self.session.session_id,
            agent = %self.session.agent_name,
            "session starting"
        );

        let outcome = match self.session.transition(SessionStatus::Running) {
            Ok(()) => {
                self.publish(ProgressEvent::status(
                    "session started",
                    json!({
                        "session_id": self.session.session_id,
                        "agent": self.session.agent_name,
                        "status": SessionStatus::Running,
                    }),
                ));
                self.drive().await
            }
            Err(e) => Drive::Failed(e),
        };

        self.finish(outcome).await
    }

    /// The iteration loop. Each pass: plan, invoke, score, insert, charge,
    /// publish, evaluate stop conditions.
    async fn drive(&mut self) -> Drive {
        loop {
            // Cancellation is observed between iterations only.
            if *self.cancel_rx.borrow() {
                return Drive::Cancelled;
            }

            // Proactive budget check: never start an iteration whose
            // minimum committed cost cannot be paid.
            if self.ledger.would_exceed(self.config.base_cost) {
                self.publish(ProgressEvent::status(
                    "stopping before budget limit",
                    json!({
                        "total_cost": self.ledger.total(),
                        "budget": self.ledger.limit(),
                    }),
                ));
                return Drive::Completed(CompletionReason::BudgetLimit);
            }

            let iteration = self.session.iterations + 1;
            let pass_started = Instant::now();

            // (a) decide the next action.
            let plan = {
                let ctx = PlanningContext {
                    spec: self.spec.as_ref(),
                    inputs: &self.inputs,
                    history: &self.history,
                    remaining_budget: self.ledger.remaining(),
                };
                match self.planner.plan(ctx).await {
                    Ok(plan) => plan,
                    Err(e) => return Drive::Failed(e),
                }
            };

            // (b) invoke tools with bounded fan-out; every call finishes
            // before the iteration does.
            let (records, fatal) = self.invoke_all(iteration, &plan.calls).await;

            // (c) score results, (d) insert accepted candidates.
            let mut new_candidates = 0usize;
            for record in records.iter().filter(|r| r.ok) {
                let Some(output) = &record.output else { continue };
                for mention in extract_mentions(output) {
                    if self.store.size() >= self.config.max_users {
                        break;
                    }
                    let signal = match self.scorer.score(&mention.text) {
                        Ok(signal) => signal,
                        Err(e) => {
                            warn!(error = %e, author = %mention.author, "skipping unscorable evidence");
                            continue;
                        }
                    };
                    if signal.score < self.config.min_intent_score {
                        continue;
                    }

                    let candidate = Candidate {
                        identity: mention.author,
                        score: signal.score,
                        rationale: signal.rationale,
                        evidence: vec![mention.text],
                        source: mention.source,
                        first_seen_iteration: iteration,
                    };
                    let identity = candidate.identity.clone();
                    let score = candidate.score;
                    let subreddit = candidate.source.subreddit.clone();
                    let url = candidate.source.url.clone();
                    if self.store.insert(candidate) {
                        new_candidates += 1;
                        self.publish(ProgressEvent::finding(
                            format!("new candidate: {identity} (score {score:.2})"),
                            json!({
                                "iteration": iteration,
                                "identity": identity,
                                "score": score,
                                "subreddit": subreddit,
                                "url": url,
                            }),
                        ));
                    }
                }
            }

            // (e) meter the pass. A refused charge means the budget is
            // spent: stop with the candidates accepted so far.
            let pass_cost =
                self.config.base_cost + self.config.per_call_cost * records.len() as f64;
            let budget_spent = self.ledger.try_charge(pass_cost).is_err();

            self.session.iterations = iteration;
            self.history.push(IterationRecord {
                index: iteration,
                tool_calls: records,
                candidates_found: new_candidates,
                elapsed_ms: pass_started.elapsed().as_millis() as u64,
            });

            // (f) publish the pass.
            self.publish(ProgressEvent::iteration(
                format!(
                    "iteration {iteration}: {new_candidates} new, {} total",
                    self.store.size()
                ),
                json!({
                    "iteration": iteration,
                    "new_candidates": new_candidates,
                    "total_candidates": self.store.size(),
                    "total_cost": self.ledger.total(),
                }),
            ));

            if let Some(e) = fatal {
                return Drive::Failed(e);
            }
            if budget_spent {
                self.publish(ProgressEvent::status(
                    "budget exhausted",
                    json!({
                        "total_cost": self.ledger.total(),
                        "budget": self.ledger.limit(),
                    }),
                ));
                return Drive::Completed(CompletionReason::BudgetLimit);
            }

            // (g) evaluate stop conditions.
            let decision = stop::evaluate(
                iteration,
                self.store.size(),
                self.config.max_iterations,
                self.config.max_users,
            );
            match decision {
                StopDecision::Continue => {}
                StopDecision::ReachedTarget => {
                    return Drive::Completed(CompletionReason::TargetReached)
                }
                StopDecision::IterationLimit => {
                    return Drive::Completed(CompletionReason::IterationLimit)
                }
                StopDecision::DiminishingReturns => {
                    return Drive::Completed(CompletionReason::DiminishingReturns)
                }
            }
        }
    }

    /// Invoke all planned calls concurrently (bounded), preserving call
    /// order in the returned records. The first fatal failure, if any, is
    /// reported after every in-flight call has finished.
    async fn invoke_all(
        &self,
        iteration: u32,
        calls: &[ToolCall],
    ) -> (Vec<ToolCallRecord>, Option<EngineError>) {
        let results: Vec<(ToolCallRecord, Option<EngineError>)> =
            stream::iter(calls.iter().map(|call| self.invoke_with_retry(iteration, call)))
                .buffered(self.config.fan_out)
                .collect()
                .await;

        let mut records = Vec::with_capacity(results.len());
        let mut fatal = None;
        for (record, error) in results {
            records.push(record);
            if fatal.is_none() {
                fatal = error;
            }
        }
        (records, fatal)
    }

    /// One tool call with the engine's retry policy: retryable failures are
    /// retried up to [`TOOL_MAX_ATTEMPTS`] with linear backoff; exhaustion
    /// or a fatal classification escalates to a session-fatal error.
    async fn invoke_with_retry(
        &self,
        iteration: u32,
        call: &ToolCall,
    ) -> (ToolCallRecord, Option<EngineError>) {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            self.publish(ProgressEvent::tool_call(
                format!("calling {} (attempt {attempts})", call.tool),
                json!({
                    "iteration": iteration,
                    "tool": call.tool,
                    "attempt": attempts,
                    "arguments": call.arguments,
                }),
            ));

            match self.invoker.invoke(call).await {
                Ok(outcome) => {
                    return (
                        ToolCallRecord {
                            tool: call.tool.clone(),
                            arguments: call.arguments.clone(),
                            output: Some(outcome.output),
                            attempts,
                            duration_ms: started.elapsed().as_millis() as u64,
                            ok: true,
                        },
                        None,
                    );
                }
                Err(e) if e.is_retryable() && attempts < TOOL_MAX_ATTEMPTS => {
                    warn!(
                        tool = %call.tool,
                        attempt = attempts,
                        error = %e,
                        "retryable tool failure; backing off"
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempts).await;
                }
                Err(e) => {
                    let record = ToolCallRecord {
                        tool: call.tool.clone(),
                        arguments: call.arguments.clone(),
                        output: None,
                        attempts,
                        duration_ms: started.elapsed().as_millis() as u64,
                        ok: false,
                    };
                    let fatal = EngineError::ToolFailed {
                        tool: call.tool.clone(),
                        attempts,
                        message: e.to_string(),
                    };
                    return (record, Some(fatal));
                }
            }
        }
    }

    /// Assemble output, validate it for completed runs, publish the
    /// terminal events, and drain the bus.
    async fn finish(mut self, outcome: Drive) -> SessionReport {
        let output = output::assemble(self.store.candidates());
        let summary_json = serde_json::to_value(&output.summary).unwrap_or(Value::Null);
        let mut error = None;

        match outcome {
            Drive::Completed(reason) => match self.validator.validate(&output) {
                Ok(validated) => {
                    self.session.completion = Some(reason);
                    self.publish(ProgressEvent::status(
                        "session completed",
                        json!({
                            "session_id": self.session.session_id,
                            "status": SessionStatus::Completed,
                            "reason": reason,
                            "summary": validated.get("summary").cloned().unwrap_or(Value::Null),
                            "total_cost": self.ledger.total(),
                        }),
                    ));
                    self.transition_or_log(SessionStatus::Completed);
                }
                Err(e) => {
                    self.publish(ProgressEvent::error(
                        "assembled output failed schema validation",
                        json!({ "error": e.to_string() }),
                    ));
                    self.publish(ProgressEvent::status(
                        "session failed",
                        json!({
                            "session_id": self.session.session_id,
                            "status": SessionStatus::Failed,
                            "summary": summary_json,
                        }),
                    ));
                    self.transition_or_log(SessionStatus::Failed);
                    error = Some(e);
                }
            },
            Drive::Failed(e) => {
                self.publish(ProgressEvent::error(
                    "session failed",
                    json!({
                        "error": e.to_string(),
                        "partial_results": output.summary.total,
                    }),
                ));
                self.publish(ProgressEvent::status(
                    "session failed; partial results retained",
                    json!({
                        "session_id": self.session.session_id,
                        "status": SessionStatus::Failed,
                        "summary": summary_json,
                    }),
                ));
                self.transition_or_log(SessionStatus::Failed);
                error = Some(e);
            }
            Drive::Cancelled => {
                self.publish(ProgressEvent::status(
                    "session cancelled; partial results flushed",
                    json!({
                        "session_id": self.session.session_id,
                        "status": SessionStatus::Cancelled,
                        "summary": summary_json,
                    }),
                ));
                self.transition_or_log(SessionStatus::Cancelled);
            }
        }

        info!(
            session_id = %self.session.session_id,
            status = %self.session.status,
            candidates = output.summary.total,
            total_cost = self.ledger.total(),
            "session finished"
        );

        let events_published = self.bus.published();
        let bus = std::mem::take(&mut self.bus);
        bus.shutdown().await;

        SessionReport {
            session: self.session,
            output,
            error,
            total_cost: self.ledger.total(),
            history: self.history,
            events_published,
        }
    }

    fn transition_or_log(&mut self, to: SessionStatus) {
        if let Err(e) = self.session.transition(to) {
            warn!(error = %e, "session transition rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> AgentSpec {
        AgentSpec::from_yaml_str(
            r#"
name: reddit-scout
version: 0.2.0
inputs:
  - name: query
    type: string
  - name: target_subreddits
    type: string_list
  - name: max_users
    type: integer
    default: 5
  - name: min_intent_score
    type: number
    default: 0.7
outputs:
  schema:
    type: object
    required: [results, summary]
pricing:
  model: per_iteration
  base_cost: 0.01
  per_call_cost: 0.002
  max_cost: 1.0
  currency: USD
requirements:
  tool_names: [reddit_search, reddit_comments]
  max_iterations: 10
  timeout: 30
"#,
        )
        .expect("spec")
    }

    #[test]
    fn test_session_config_from_spec() {
        let spec = spec();
        let inputs = resolve_inputs(
            &spec,
            &json!({"query": "q", "target_subreddits": ["apps"], "max_users": 3}),
        )
        .expect("inputs");
        let config = SessionConfig::from_spec(&spec, &inputs).expect("config");

        assert_eq!(config.max_users, 3);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.tool_timeout, Duration::from_secs(30));
        assert_eq!(config.fan_out, DEFAULT_FAN_OUT);
        assert!((config.min_intent_score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_session_config_rejects_zero_max_users() {
        let spec = spec();
        let inputs = resolve_inputs(
            &spec,
            &json!({"query": "q", "target_subreddits": ["apps"], "max_users": 0}),
        )
        .expect("inputs");
        assert!(SessionConfig::from_spec(&spec, &inputs).is_err());
    }

    #[tokio::test]
    async fn test_engine_rejects_unbound_tools() {
        let registry = ToolRegistry::new();
        let result = SessionEngine::new(
            spec(),
            &json!({"query": "q", "target_subreddits": ["apps"]}),
            registry,
            Arc::new(crate::oracle::ScoutPlanner::new()),
        );
        let err = result.err().expect("must fail");
        assert!(err.to_string().contains("no registered implementation"));
    }

    #[tokio::test]
    async fn test_cancel_token() {
        let (tx, _rx) = watch::channel(false);
        let token = CancelToken { tx: Arc::new(tx) };
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
