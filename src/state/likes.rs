//! Like relation shared by signals, posts, and comments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of usernames who liked an entity.
///
/// Liking is set membership, not a counter: `like` and `dislike` add and
/// remove the same relation, so repeated calls are no-ops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Likes(BTreeSet<String>);

impl Likes {
    /// Create an empty like set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a like. Returns false if the user had already liked.
    pub fn like(&mut self, username: impl Into<String>) -> bool {
        self.0.insert(username.into())
    }

    /// Remove a like. Returns false if the user had not liked.
    pub fn dislike(&mut self, username: &str) -> bool {
        self.0.remove(username)
    }

    /// Check whether a user liked.
    pub fn contains(&self, username: &str) -> bool {
        self.0.contains(username)
    }

    /// Number of likes.
    pub fn count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for Likes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_like_then_dislike_restores_set() {
        let original: Likes = ["alice", "bob"].into_iter().collect();
        let mut likes = original.clone();

        assert!(likes.like("carol"));
        assert_eq!(likes.count(), 3);
        assert!(likes.dislike("carol"));
        assert_eq!(likes, original);
    }

    #[test]
    fn test_like_is_idempotent() {
        let mut likes = Likes::new();
        assert!(likes.like("alice"));
        assert!(!likes.like("alice"));
        assert_eq!(likes.count(), 1);
    }

    #[test]
    fn test_dislike_without_like() {
        let mut likes: Likes = ["alice"].into_iter().collect();
        assert!(!likes.dislike("bob"));
        assert!(likes.contains("alice"));
    }

    #[test]
    fn test_serializes_as_list() {
        let likes: Likes = ["bob", "alice"].into_iter().collect();
        let json = serde_json::to_string(&likes).unwrap();
        assert_eq!(json, r#"["alice","bob"]"#);
    }
}
