//! Insertion-ordered candidate store with identity deduplication.

use std::collections::HashSet;

use crate::domain::candidate::Candidate;

/// Holds the candidates discovered by one session.
///
/// Owned exclusively by the engine driving that session. Insert is
/// idempotent and first-write-wins: later evidence for a known identity is
/// discarded. Enumeration follows insertion order.
#[derive(Debug, Default)]
pub struct CandidateStore {
    seen: HashSet<String>,
    candidates: Vec<Candidate>,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate. Returns `true` if it was new, `false` if the
    /// identity key already existed (the insert is a no-op, not an error).
    pub fn insert(&mut self, candidate: Candidate) -> bool {
        if !self.seen.insert(candidate.identity.clone()) {
            return false;
        }
        self.candidates.push(candidate);
        true
    }

    /// Number of distinct identities stored.
    pub fn size(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Whether an identity key is already present.
    pub fn contains(&self, identity: &str) -> bool {
        self.seen.contains(identity)
    }

    /// Candidates in insertion order.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::SourceRef;

    fn candidate(identity: &str, evidence: &str) -> Candidate {
        Candidate {
            identity: identity.to_string(),
            score: 0.95,
            rationale: "matched \"i'd pay\"".to_string(),
            evidence: vec![evidence.to_string()],
            source: SourceRef {
                subreddit: "apps".to_string(),
                thread_title: "thread".to_string(),
                url: "https://reddit.com/r/apps/comments/1/".to_string(),
            },
            first_seen_iteration: 1,
        }
    }

    #[test]
    fn test_insert_and_size() {
        let mut store = CandidateStore::new();
        assert!(store.insert(candidate("alice", "e1")));
        assert!(store.insert(candidate("bob", "e2")));
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut store = CandidateStore::new();
        assert!(store.insert(candidate("alice", "first evidence")));
        assert!(!store.insert(candidate("alice", "later evidence")));

        assert_eq!(store.size(), 1);
        // First write wins: later evidence discarded.
        assert_eq!(store.candidates()[0].evidence, vec!["first evidence"]);
    }

    #[test]
    fn test_size_counts_distinct_identities() {
        let mut store = CandidateStore::new();
        for identity in ["a", "b", "a", "c", "b", "a"] {
            store.insert(candidate(identity, "e"));
        }
        assert_eq!(store.size(), 3);
    }

    #[test]
    fn test_enumeration_follows_insertion_order() {
        let mut store = CandidateStore::new();
        for identity in ["zed", "alice", "mid"] {
            store.insert(candidate(identity, "e"));
        }
        let order: Vec<&str> = store
            .candidates()
            .iter()
            .map(|c| c.identity.as_str())
            .collect();
        assert_eq!(order, vec!["zed", "alice", "mid"]);
    }

    #[test]
    fn test_contains() {
        let mut store = CandidateStore::new();
        store.insert(candidate("alice", "e"));
        assert!(store.contains("alice"));
        assert!(!store.contains("bob"));
    }
}
