//! Acting-user session.
//!
//! Every operation that acts on behalf of a user takes a `Session`
//! explicitly; nothing resolves the current user from ambient state.

use serde::{Deserialize, Serialize};

/// The account an operation acts as, plus its backend credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Username of the acting account.
    pub username: String,
    /// Bearer token for authenticated backend calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Whether this session acts as the given user.
    pub fn is(&self, username: &str) -> bool {
        self.username == username
    }
}
