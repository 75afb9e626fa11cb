//! Tool contract, registry, and the timeout-enforcing invoker.
//!
//! Every tool is a named black box taking and returning JSON. The invoker
//! enforces a per-call timeout and classifies failures as retryable or
//! fatal; retry policy itself belongs to the caller.

pub mod reddit;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// A proposed tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// Result of one successful tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutcome {
    pub tool: String,
    pub output: Value,
    pub duration_ms: u64,
}

/// Tool failure taxonomy.
///
/// `Timeout` and `Transport` are transient and worth retrying; the rest are
/// fatal for the call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {tool}")]
    Unknown { tool: String },

    #[error("duplicate tool registration: {tool}")]
    Duplicate { tool: String },

    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    #[error("tool '{tool}' transport failure: {message}")]
    Transport { tool: String, message: String },

    #[error("tool '{tool}' rejected the call: {message}")]
    Unauthorized { tool: String, message: String },

    #[error("tool '{tool}' returned malformed output: {message}")]
    Malformed { tool: String, message: String },
}

impl ToolError {
    /// Whether the caller may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }

    /// Tool name the failure belongs to.
    pub fn tool(&self) -> &str {
        match self {
            Self::Unknown { tool }
            | Self::Duplicate { tool }
            | Self::Timeout { tool, .. }
            | Self::Transport { tool, .. }
            | Self::Unauthorized { tool, .. }
            | Self::Malformed { tool, .. } => tool,
        }
    }
}

/// A named external capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, arguments: &Value) -> Result<Value, ToolError>;
}

/// Name-keyed registry of tool implementations.
///
/// Adding a tool to an agent requires only declaring its name in the spec's
/// requirements and registering an implementation here.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate { tool: name });
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

/// Invokes registered tools with a per-call timeout.
///
/// Does not retry: the engine owns the retry policy and the attempt count.
pub struct ToolInvoker {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub async fn invoke(&self, call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        let tool = self
            .registry
            .get(&call.tool)
            .ok_or_else(|| ToolError::Unknown {
                tool: call.tool.clone(),
            })?;

        let started = Instant::now();
        debug!(tool = %call.tool, "invoking tool");

        match tokio::time::timeout(self.timeout, tool.call(&call.arguments)).await {
            Err(_) => Err(ToolError::Timeout {
                tool: call.tool.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(output)) => Ok(ToolOutcome {
                tool: call.tool.clone(),
                output,
                duration_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn call(&self, arguments: &Value) -> Result<Value, ToolError> {
            Ok(arguments.clone())
        }
    }

    struct Sleepy;

    #[async_trait]
    impl Tool for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        async fn call(&self, _arguments: &Value) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!({}))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).expect("register");
        registry.register(Arc::new(Sleepy)).expect("register");
        registry
    }

    #[tokio::test]
    async fn test_invoke_returns_output() {
        let invoker = ToolInvoker::new(registry(), Duration::from_secs(5));
        let outcome = invoker
            .invoke(&ToolCall::new("echo", json!({"q": "hi"})))
            .await
            .expect("invoke");
        assert_eq!(outcome.output, json!({"q": "hi"}));
        assert_eq!(outcome.tool, "echo");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fatal() {
        let invoker = ToolInvoker::new(registry(), Duration::from_secs(5));
        let err = invoker
            .invoke(&ToolCall::new("missing", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unknown { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_retryable() {
        let invoker = ToolInvoker::new(registry(), Duration::from_millis(20));
        let err = invoker
            .invoke(&ToolCall::new("sleepy", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.tool(), "sleepy");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).expect("first");
        let err = registry.register(Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, ToolError::Duplicate { .. }));
    }
}
