//! # Signalroom - Signal lifecycle client
//!
//! Client-side core of a social trading platform where users publish trade
//! signals (entry, stop-loss, take-profit targets), like and follow each
//! other, and earn reputation when their targets are reached.
//!
//! ## Architecture
//!
//! - **Lifecycle**: status derivation, target settlement, score accrual, and
//!   the periodic scheduler
//! - **Validation**: signal creation and edit rules
//! - **State**: client-side store for signals, accounts, and posts
//! - **API**: REST backend contract and HTTP client
//! - **Session**: the explicit acting account
//! - **Storage**: local key-value persistence
//! - **Config**: configuration management

pub mod api;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod session;
pub mod state;
pub mod storage;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::{LifecycleEvaluator, LifecycleScheduler, TouchOracle, derive_status};
pub use session::Session;
pub use state::{Signal, SignalStatus, Store};
