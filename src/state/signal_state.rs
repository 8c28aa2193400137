//! Signal-related state.

use super::Likes;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Signal lifecycle status.
///
/// Transitions only move forward: `NotOpened -> Open -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    #[default]
    NotOpened,
    Open,
    Closed,
}

impl SignalStatus {
    /// Position in the lifecycle; a later status has a higher rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::NotOpened => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }

    /// Wire representation used by the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotOpened => "not_opened",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotOpened => write!(f, "Not opened"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// A traded pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Display name, e.g. "BTC/USDT".
    pub name: String,
    /// Identifier of the underlying asset/quote pair.
    pub pair_id: String,
}

impl Market {
    pub fn new(name: impl Into<String>, pair_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pair_id: pair_id.into(),
        }
    }
}

/// A take-profit level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Target ID.
    pub id: String,
    /// Price level.
    pub value: Decimal,
    /// Whether the market reached this level before the signal closed.
    pub touched: bool,
}

impl Target {
    pub fn new(id: impl Into<String>, value: Decimal) -> Self {
        Self {
            id: id.into(),
            value,
            touched: false,
        }
    }
}

/// A published trade call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal ID.
    pub id: String,
    /// Traded market.
    pub market: Market,
    /// Entry price.
    pub entry: Decimal,
    /// Stop-loss price, always below entry.
    pub stoploss: Decimal,
    /// Take-profit targets in ascending order.
    pub targets: Vec<Target>,
    /// When the signal becomes active.
    pub open_time: DateTime<Utc>,
    /// When the signal stops being active.
    pub close_time: DateTime<Utc>,
    /// Derived lifecycle status.
    pub status: SignalStatus,
    /// Username of the publishing account.
    pub publisher: String,
    /// Free-text analysis.
    pub description: String,
    /// Accounts who liked the signal.
    pub likes: Likes,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_closed(&self) -> bool {
        self.status == SignalStatus::Closed
    }

    /// Number of targets marked touched.
    pub fn touched_count(&self) -> usize {
        self.targets.iter().filter(|t| t.touched).count()
    }
}

/// Filter applied to the signal list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFilter {
    /// Only signals with this status.
    pub status: Option<SignalStatus>,
    /// Only signals by this publisher.
    pub publisher: Option<String>,
    /// Only signals on this market pair.
    pub pair_id: Option<String>,
    /// Only signals by any of these publishers (e.g. an account's followings).
    pub publishers: Option<Vec<String>>,
}

impl SignalFilter {
    pub fn status(mut self, status: SignalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn publisher(mut self, username: impl Into<String>) -> Self {
        self.publisher = Some(username.into());
        self
    }

    pub fn pair(mut self, pair_id: impl Into<String>) -> Self {
        self.pair_id = Some(pair_id.into());
        self
    }

    pub fn publishers(mut self, usernames: Vec<String>) -> Self {
        self.publishers = Some(usernames);
        self
    }

    /// Check whether a signal passes the filter.
    pub fn matches(&self, signal: &Signal) -> bool {
        if let Some(status) = self.status
            && signal.status != status
        {
            return false;
        }
        if let Some(publisher) = &self.publisher
            && &signal.publisher != publisher
        {
            return false;
        }
        if let Some(pair_id) = &self.pair_id
            && &signal.market.pair_id != pair_id
        {
            return false;
        }
        if let Some(publishers) = &self.publishers
            && !publishers.contains(&signal.publisher)
        {
            return false;
        }
        true
    }
}

/// State for signal data.
#[derive(Debug, Default)]
pub struct SignalState {
    /// All loaded signals.
    pub signals: Vec<Signal>,
    /// Whether signals are currently loading.
    pub loading: bool,
    /// Last time signals were loaded from the backend.
    pub last_updated: Option<DateTime<Utc>>,
    /// Last time the lifecycle evaluator ran.
    pub last_evaluated: Option<DateTime<Utc>>,
}

impl SignalState {
    pub fn get(&self, id: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Signal> {
        self.signals.iter_mut().find(|s| s.id == id)
    }

    /// Insert a signal or replace the one with the same ID.
    pub fn upsert(&mut self, signal: Signal) {
        match self.get_mut(&signal.id) {
            Some(existing) => *existing = signal,
            None => self.signals.push(signal),
        }
    }

    /// Signals passing the filter, in load order.
    pub fn filtered(&self, filter: &SignalFilter) -> Vec<&Signal> {
        self.signals.iter().filter(|s| filter.matches(s)).collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    /// BTC signal with entry 50000, stop 48000, targets 52000 and 55000.
    pub fn btc_signal(id: &str, publisher: &str, now: DateTime<Utc>) -> Signal {
        Signal {
            id: id.to_string(),
            market: Market::new("BTC/USDT", "btc-usdt"),
            entry: dec!(50000),
            stoploss: dec!(48000),
            targets: vec![Target::new("t1", dec!(52000)), Target::new("t2", dec!(55000))],
            open_time: now - Duration::hours(1),
            close_time: now + Duration::hours(1),
            status: SignalStatus::Open,
            publisher: publisher.to_string(),
            description: String::new(),
            likes: Likes::new(),
            created_at: now - Duration::hours(2),
        }
    }
}
