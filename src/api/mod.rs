//! Backend REST integration.
//!
//! This module provides the [`SignalBackend`] contract and its HTTP
//! implementation, handling authentication, rate limiting, and data conversion.

mod backend;
mod client;
mod converter;
mod query;

pub use backend::SignalBackend;
#[cfg(test)]
pub use backend::MockSignalBackend;
pub use client::{ApiClient, ApiClientBuilder};
pub use converter::{
    DataConverter, MarketRecord, Page, PricePointRecord, ScoreUpdateBody, SignalRecord,
    SignalUpdateBody, StatusUpdateBody, TargetRecord,
};
pub use query::SignalQuery;
