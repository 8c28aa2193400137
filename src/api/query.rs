//! Query parameters for `GET /signals`.

use crate::state::SignalStatus;

/// Filters and pagination for listing signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalQuery {
    pub status: Option<SignalStatus>,
    pub publisher: Option<String>,
    pub market: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for SignalQuery {
    fn default() -> Self {
        Self {
            status: None,
            publisher: None,
            market: None,
            page: 1,
            limit: 50,
        }
    }
}

impl SignalQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: SignalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn publisher(mut self, username: impl Into<String>) -> Self {
        self.publisher = Some(username.into());
        self
    }

    pub fn market(mut self, pair_id: impl Into<String>) -> Self {
        self.market = Some(pair_id.into());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, 200);
        self
    }

    /// The same filters, one page further.
    pub fn next_page(&self) -> Self {
        Self {
            page: self.page + 1,
            ..self.clone()
        }
    }

    /// Query-string pairs in a stable order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(publisher) = &self.publisher {
            pairs.push(("publisher", publisher.clone()));
        }
        if let Some(market) = &self.market {
            pairs.push(("market", market.clone()));
        }
        pairs.push(("page", self.page.to_string()));
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }
}
