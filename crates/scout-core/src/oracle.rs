//! The per-iteration decision oracle, modeled as an injected planner.
//!
//! The reasoning step that chooses the next action is opaque to the engine:
//! it sees the iteration history, the resolved inputs, and the remaining
//! budget, and proposes tool calls. Substituting a scripted implementation
//! keeps the engine deterministic and testable.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::agent_spec::{AgentSpec, ResolvedInputs};
use crate::domain::error::Result;
use crate::domain::session::IterationRecord;
use crate::tools::reddit::{COMMENTS_TOOL, SEARCH_TOOL};
use crate::tools::ToolCall;

/// Fixed input contract for the planner.
pub struct PlanningContext<'a> {
    pub spec: &'a AgentSpec,
    pub inputs: &'a ResolvedInputs,
    pub history: &'a [IterationRecord],
    pub remaining_budget: f64,
}

/// Fixed output contract: the tool calls to make this iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub calls: Vec<ToolCall>,
}

impl Plan {
    pub fn new(calls: Vec<ToolCall>) -> Self {
        Self { calls }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Chooses the next tool calls each iteration.
#[async_trait]
pub trait NextActionPlanner: Send + Sync {
    async fn plan(&self, ctx: PlanningContext<'_>) -> Result<Plan>;
}

/// Threads fetched for comments per iteration.
const THREADS_PER_PASS: usize = 4;

/// Default planner for the scouting cadence: search every target subreddit,
/// then work through unvisited threads discovered in history.
///
/// Stateless by construction — the visited set is derived from the history
/// every pass, so replaying the same history yields the same plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoutPlanner;

impl ScoutPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Threads discovered by successful search calls, in discovery order,
    /// minus threads whose comments were already fetched.
    fn unvisited_threads(history: &[IterationRecord]) -> Vec<serde_json::Value> {
        let mut visited = std::collections::HashSet::new();
        for record in history {
            for call in &record.tool_calls {
                if call.tool == COMMENTS_TOOL {
                    if let Some(url) = call.arguments.get("url").and_then(|v| v.as_str()) {
                        visited.insert(url.to_string());
                    }
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        let mut unvisited = Vec::new();
        for record in history {
            for call in &record.tool_calls {
                if call.tool != SEARCH_TOOL || !call.ok {
                    continue;
                }
                let Some(output) = &call.output else { continue };
                let Some(threads) = output.get("threads").and_then(|t| t.as_array()) else {
                    continue;
                };
                for thread in threads {
                    let Some(url) = thread.get("url").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    if visited.contains(url) || !seen.insert(url.to_string()) {
                        continue;
                    }
                    unvisited.push(thread.clone());
                }
            }
        }
        unvisited
    }
}

#[async_trait]
impl NextActionPlanner for ScoutPlanner {
    async fn plan(&self, ctx: PlanningContext<'_>) -> Result<Plan> {
        let unvisited = Self::unvisited_threads(ctx.history);

        if !unvisited.is_empty() {
            let calls = unvisited
                .into_iter()
                .take(THREADS_PER_PASS)
                .map(|thread| {
                    ToolCall::new(
                        COMMENTS_TOOL,
                        json!({
                            "url": thread.get("url").cloned().unwrap_or_default(),
                            "subreddit": thread.get("subreddit").cloned().unwrap_or_default(),
                            "thread_title": thread.get("title").cloned().unwrap_or_default(),
                        }),
                    )
                })
                .collect();
            return Ok(Plan::new(calls));
        }

        let query = ctx.inputs.get_str("query").unwrap_or_default().to_string();
        let calls = ctx
            .inputs
            .get_str_list("target_subreddits")
            .into_iter()
            .map(|subreddit| {
                ToolCall::new(
                    SEARCH_TOOL,
                    json!({ "subreddit": subreddit, "query": query }),
                )
            })
            .collect();
        Ok(Plan::new(calls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent_spec::resolve_inputs;
    use crate::domain::session::ToolCallRecord;

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
outputs:
  schema:
    type: object
pricing:
  model: per_iteration
  base_cost: 0.01
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

    fn search_record(urls: &[&str]) -> IterationRecord {
        let threads: Vec<serde_json::Value> = urls
            .iter()
            .map(|u| json!({"id": "x", "title": "t", "url": u, "subreddit": "apps"}))
            .collect();
        IterationRecord {
            index: 1,
            tool_calls: vec![ToolCallRecord {
                tool: SEARCH_TOOL.to_string(),
                arguments: json!({"subreddit": "apps", "query": "q"}),
                output: Some(json!({ "threads": threads })),
                attempts: 1,
                duration_ms: 10,
                ok: true,
            }],
            candidates_found: 0,
            elapsed_ms: 10,
        }
    }

    fn comments_record(url: &str) -> IterationRecord {
        IterationRecord {
            index: 2,
            tool_calls: vec![ToolCallRecord {
                tool: COMMENTS_TOOL.to_string(),
                arguments: json!({"url": url, "subreddit": "apps", "thread_title": "t"}),
                output: Some(json!({"mentions": []})),
                attempts: 1,
                duration_ms: 10,
                ok: true,
            }],
            candidates_found: 0,
            elapsed_ms: 10,
        }
    }

    #[tokio::test]
    async fn test_first_pass_searches_every_subreddit() {
        let spec = spec();
        let inputs = resolve_inputs(
            &spec,
            &json!({"query": "practice apps", "target_subreddits": ["a", "b"]}),
        )
        .expect("inputs");

        let plan = ScoutPlanner::new()
            .plan(PlanningContext {
                spec: &spec,
                inputs: &inputs,
                history: &[],
                remaining_budget: 1.0,
            })
            .await
            .expect("plan");

        assert_eq!(plan.calls.len(), 2);
        assert!(plan.calls.iter().all(|c| c.tool == SEARCH_TOOL));
        assert_eq!(plan.calls[0].arguments["query"], "practice apps");
    }

    #[tokio::test]
    async fn test_discovered_threads_get_comment_calls() {
        let spec = spec();
        let inputs = resolve_inputs(
            &spec,
            &json!({"query": "q", "target_subreddits": ["apps"]}),
        )
        .expect("inputs");
        let history = vec![search_record(&["https://reddit.com/r/apps/comments/1/"])];

        let plan = ScoutPlanner::new()
            .plan(PlanningContext {
                spec: &spec,
                inputs: &inputs,
                history: &history,
                remaining_budget: 1.0,
            })
            .await
            .expect("plan");

        assert_eq!(plan.calls.len(), 1);
        assert_eq!(plan.calls[0].tool, COMMENTS_TOOL);
        assert_eq!(
            plan.calls[0].arguments["url"],
            "https://reddit.com/r/apps/comments/1/"
        );
    }

    #[tokio::test]
    async fn test_visited_threads_are_not_refetched() {
        let spec = spec();
        let inputs = resolve_inputs(
            &spec,
            &json!({"query": "q", "target_subreddits": ["apps"]}),
        )
        .expect("inputs");
        let url = "https://reddit.com/r/apps/comments/1/";
        let history = vec![search_record(&[url]), comments_record(url)];

        let plan = ScoutPlanner::new()
            .plan(PlanningContext {
                spec: &spec,
                inputs: &inputs,
                history: &history,
                remaining_budget: 1.0,
            })
            .await
            .expect("plan");

        // Everything visited: fall back to searching again.
        assert!(plan.calls.iter().all(|c| c.tool == SEARCH_TOOL));
    }

    #[tokio::test]
    async fn test_fetch_is_bounded_per_pass() {
        let spec = spec();
        let inputs = resolve_inputs(
            &spec,
            &json!({"query": "q", "target_subreddits": ["apps"]}),
        )
        .expect("inputs");
        let urls: Vec<String> = (0..10)
            .map(|i| format!("https://reddit.com/r/apps/comments/{i}/"))
            .collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let history = vec![search_record(&refs)];

        let plan = ScoutPlanner::new()
            .plan(PlanningContext {
                spec: &spec,
                inputs: &inputs,
                history: &history,
                remaining_budget: 1.0,
            })
            .await
            .expect("plan");

        assert_eq!(plan.calls.len(), THREADS_PER_PASS);
    }
}
