//! The backend contract the rest of the crate depends on.

use super::{Page, SignalQuery};
use crate::error::Result;
use crate::lifecycle::PricePoint;
use crate::session::Session;
use crate::state::Signal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Operations the REST backend exposes for signals and scores.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalBackend: Send + Sync {
    /// `GET /signals` with filters.
    async fn list_signals(&self, query: &SignalQuery) -> Result<Page<Signal>>;

    /// `POST /signals` as the session's account.
    async fn create_signal(&self, session: &Session, signal: &Signal) -> Result<Signal>;

    /// `PUT /signals/:id` with description, close time, and status.
    async fn update_signal(&self, session: &Session, signal: &Signal) -> Result<()>;

    /// `PUT /signals/:id/status` with the recomputed status and settled targets.
    async fn update_signal_status(&self, signal: &Signal) -> Result<()>;

    /// `POST /signals/:id/like` as the session's account.
    async fn like_signal(&self, session: &Session, signal_id: &str) -> Result<()>;

    /// `POST /signals/:id/dislike` as the session's account.
    async fn dislike_signal(&self, session: &Session, signal_id: &str) -> Result<()>;

    /// `PUT /users/:username/score` for the closure of `signal_id`.
    async fn apply_score(&self, username: &str, signal_id: &str, delta: Decimal) -> Result<()>;

    /// `GET /markets/:pair_id/highs` over `[from, to]`.
    async fn market_highs(
        &self,
        pair_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>>;
}
