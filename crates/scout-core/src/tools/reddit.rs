//! Reddit source tools over the public JSON listing endpoints.
//!
//! `reddit_search` finds threads in a subreddit; `reddit_comments` pulls a
//! thread's comments as scoreable mentions. The listing endpoints take no
//! credentials, only a descriptive User-Agent.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{Tool, ToolError};

/// Tool name for subreddit search.
pub const SEARCH_TOOL: &str = "reddit_search";

/// Tool name for thread comment listing.
pub const COMMENTS_TOOL: &str = "reddit_comments";

/// Threads fetched per search call.
pub const DEFAULT_SEARCH_LIMIT: usize = 3;

/// Comments fetched per thread.
pub const DEFAULT_COMMENT_LIMIT: usize = 20;

/// Shared HTTP client for the Reddit listing endpoints.
pub struct RedditClient {
    http: reqwest::Client,
    base_url: String,
}

impl RedditClient {
    /// Create a client with a descriptive user agent, e.g.
    /// `"scout:reddit-scout:v0.2.1"`.
    pub fn new(user_agent: &str) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ToolError::Transport {
                tool: SEARCH_TOOL.to_string(),
                message: format!("building http client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: "https://www.reddit.com".to_string(),
        })
    }

    /// Point the client at a different host (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json(&self, tool: &str, path_and_query: &str) -> Result<Value, ToolError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!(%url, "fetching reddit listing");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Transport {
                tool: tool.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ToolError::Unauthorized {
                tool: tool.to_string(),
                message: format!("status {status}"),
            });
        }
        if !status.is_success() {
            return Err(ToolError::Transport {
                tool: tool.to_string(),
                message: format!("status {status}"),
            });
        }

        response.json().await.map_err(|e| ToolError::Malformed {
            tool: tool.to_string(),
            message: e.to_string(),
        })
    }
}

fn require_str<'a>(tool: &str, arguments: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::Malformed {
            tool: tool.to_string(),
            message: format!("missing argument '{field}'"),
        })
}

/// Searches a subreddit for threads matching a query.
///
/// Arguments: `{subreddit, query, limit?}`.
/// Output: `{threads: [{id, title, url, subreddit}]}`.
pub struct RedditSearchTool {
    client: Arc<RedditClient>,
}

impl RedditSearchTool {
    pub fn new(client: Arc<RedditClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for RedditSearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL
    }

    async fn call(&self, arguments: &Value) -> Result<Value, ToolError> {
        let subreddit = require_str(SEARCH_TOOL, arguments, "subreddit")?;
        let query = require_str(SEARCH_TOOL, arguments, "query")?;
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_SEARCH_LIMIT as u64);

        let encoded = query.replace(' ', "+");
        let path = format!(
            "/r/{subreddit}/search.json?q={encoded}&restrict_sr=1&sort=relevance&limit={limit}"
        );
        let listing = self.client.get_json(SEARCH_TOOL, &path).await?;

        let children = listing
            .pointer("/data/children")
            .and_then(|c| c.as_array())
            .ok_or_else(|| ToolError::Malformed {
                tool: SEARCH_TOOL.to_string(),
                message: "listing has no data.children".to_string(),
            })?;

        let mut threads = Vec::with_capacity(children.len());
        for child in children {
            let Some(data) = child.get("data") else {
                continue;
            };
            let (Some(id), Some(title), Some(permalink)) = (
                data.get("id").and_then(|v| v.as_str()),
                data.get("title").and_then(|v| v.as_str()),
                data.get("permalink").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            threads.push(json!({
                "id": id,
                "title": title,
                "url": format!("https://reddit.com{permalink}"),
                "subreddit": subreddit,
            }));
        }

        Ok(json!({ "threads": threads }))
    }
}

/// Fetches a thread's comments as scoreable mentions.
///
/// Arguments: `{url, subreddit, thread_title, limit?}` where `url` is the
/// canonical thread URL from a search result.
/// Output: `{mentions: [{author, text, source: {subreddit, thread_title, url}}]}`.
pub struct RedditCommentsTool {
    client: Arc<RedditClient>,
}

impl RedditCommentsTool {
    pub fn new(client: Arc<RedditClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for RedditCommentsTool {
    fn name(&self) -> &str {
        COMMENTS_TOOL
    }

    async fn call(&self, arguments: &Value) -> Result<Value, ToolError> {
        let url = require_str(COMMENTS_TOOL, arguments, "url")?;
        let subreddit = require_str(COMMENTS_TOOL, arguments, "subreddit")?;
        let thread_title = require_str(COMMENTS_TOOL, arguments, "thread_title")?;
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_COMMENT_LIMIT as u64) as usize;

        // The thread URL is absolute; only the path is sent to our host.
        let path = url
            .find("/r/")
            .map(|i| &url[i..])
            .ok_or_else(|| ToolError::Malformed {
                tool: COMMENTS_TOOL.to_string(),
                message: format!("not a thread url: {url}"),
            })?;
        let path = format!("{}.json?limit={limit}", path.trim_end_matches('/'));

        let listings = self.client.get_json(COMMENTS_TOOL, &path).await?;

        // Response shape: [post listing, comment listing].
        let children = listings
            .pointer("/1/data/children")
            .and_then(|c| c.as_array())
            .ok_or_else(|| ToolError::Malformed {
                tool: COMMENTS_TOOL.to_string(),
                message: "no comment listing in response".to_string(),
            })?;

        let mut mentions = Vec::new();
        for child in children {
            if mentions.len() >= limit {
                break;
            }
            if child.get("kind").and_then(|k| k.as_str()) != Some("t1") {
                continue;
            }
            let Some(data) = child.get("data") else {
                continue;
            };
            let (Some(author), Some(body)) = (
                data.get("author").and_then(|v| v.as_str()),
                data.get("body").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            if author == "[deleted]" {
                continue;
            }
            mentions.push(json!({
                "author": author,
                "text": body,
                "source": {
                    "subreddit": subreddit,
                    "thread_title": thread_title,
                    "url": url,
                },
            }));
        }

        Ok(json!({ "mentions": mentions }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_str() {
        let args = json!({"subreddit": "apps"});
        assert_eq!(require_str("t", &args, "subreddit").unwrap(), "apps");
        assert!(require_str("t", &args, "query").is_err());
    }

    #[test]
    fn test_missing_argument_is_fatal() {
        let err = require_str("reddit_search", &json!({}), "query").unwrap_err();
        assert!(matches!(err, ToolError::Malformed { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_search_requires_arguments() {
        let client = Arc::new(RedditClient::new("scout:test:v0").expect("client"));
        let tool = RedditSearchTool::new(client);
        let err = tool.call(&json!({"subreddit": "apps"})).await.unwrap_err();
        assert!(matches!(err, ToolError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_comments_rejects_non_thread_url() {
        let client = Arc::new(RedditClient::new("scout:test:v0").expect("client"));
        let tool = RedditCommentsTool::new(client);
        let err = tool
            .call(&json!({
                "url": "https://example.com/elsewhere",
                "subreddit": "apps",
                "thread_title": "t",
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Malformed { .. }));
    }
}
