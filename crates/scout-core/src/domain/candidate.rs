//! Discovered candidates and the evidence that qualified them.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where a piece of evidence was found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    /// Subreddit the thread belongs to.
    pub subreddit: String,

    /// Title of the thread.
    pub thread_title: String,

    /// Canonical thread URL.
    pub url: String,
}

/// A discovered entity that met the acceptance threshold.
///
/// At most one candidate per identity key exists in a session; the store
/// enforces first-write-wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Identity key (username).
    pub identity: String,

    /// Intent score in 0.0-1.0.
    pub score: f32,

    /// Why the scorer assigned this score.
    pub rationale: String,

    /// Quoted evidence text, in discovery order.
    pub evidence: Vec<String>,

    /// Where the evidence came from.
    pub source: SourceRef,

    /// Iteration on which this candidate was first accepted.
    pub first_seen_iteration: u32,
}

/// A single scoreable evidence item extracted from a tool result.
///
/// Tools that produce evidence return a `mentions` array of these; any other
/// payload shape flows into iteration history untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mention {
    /// Author of the evidence text.
    pub author: String,

    /// The evidence text itself.
    pub text: String,

    /// Source context.
    pub source: SourceRef,
}

/// Extract the `mentions` array from a tool output, skipping entries that do
/// not parse. Tools without a `mentions` field yield an empty list.
pub fn extract_mentions(output: &serde_json::Value) -> Vec<Mention> {
    let Some(items) = output.get("mentions").and_then(|m| m.as_array()) else {
        return Vec::new();
    };

    let mut mentions = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Mention>(item.clone()) {
            Ok(mention) => mentions.push(mention),
            Err(e) => warn!(error = %e, "skipping malformed mention in tool output"),
        }
    }
    mentions
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candidate_serde_roundtrip() {
        let candidate = Candidate {
            identity: "user_42".to_string(),
            score: 0.95,
            rationale: "matched \"willing to pay\"".to_string(),
            evidence: vec!["I'm willing to pay for this".to_string()],
            source: SourceRef {
                subreddit: "languagelearning".to_string(),
                thread_title: "Best apps?".to_string(),
                url: "https://reddit.com/r/languagelearning/comments/abc/".to_string(),
            },
            first_seen_iteration: 2,
        };

        let json = serde_json::to_string(&candidate).expect("serialize");
        let back: Candidate = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(candidate, back);
    }

    #[test]
    fn test_extract_mentions() {
        let output = json!({
            "mentions": [
                {
                    "author": "alice",
                    "text": "I'd pay for this",
                    "source": {
                        "subreddit": "apps",
                        "thread_title": "t",
                        "url": "https://reddit.com/r/apps/comments/1/"
                    }
                }
            ]
        });

        let mentions = extract_mentions(&output);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].author, "alice");
    }

    #[test]
    fn test_extract_mentions_skips_malformed() {
        let output = json!({
            "mentions": [
                {"author": "bob"},
                {
                    "author": "carol",
                    "text": "subscription would be worth it",
                    "source": {"subreddit": "s", "thread_title": "t", "url": "u"}
                }
            ]
        });

        let mentions = extract_mentions(&output);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].author, "carol");
    }

    #[test]
    fn test_extract_mentions_absent_field() {
        let output = json!({"threads": []});
        assert!(extract_mentions(&output).is_empty());
    }
}
