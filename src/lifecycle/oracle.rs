//! Target-touch oracles.
//!
//! Whether the market reached a target is external data. The evaluator
//! only consumes the answer through [`TouchOracle`]; it never fetches prices.
//! The scheduler feeds observations in through [`PriceObserver`].

use crate::state::{Signal, Target};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Decides whether a target was reached during a signal's active window.
///
/// `Some(true)` and `Some(false)` are final answers. `None` means the oracle
/// does not have enough data yet, and the signal must not be settled.
///
/// Implementations must not perform I/O: the evaluator runs synchronously
/// inside one scheduler tick.
pub trait TouchOracle {
    fn is_touched(&self, signal: &Signal, target: &Target) -> Option<bool>;
}

impl<F> TouchOracle for F
where
    F: Fn(&Signal, &Target) -> Option<bool>,
{
    fn is_touched(&self, signal: &Signal, target: &Target) -> Option<bool> {
        self(signal, target)
    }
}

/// Receives observed prices between evaluations.
pub trait PriceObserver {
    /// Record the highs a source reported for `pair_id` over `[from, to]`.
    /// The window counts as fully observed afterwards, even if `points` is empty.
    fn observe(
        &mut self,
        pair_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        points: Vec<PricePoint>,
    );

    /// Forget observations that ended before `cutoff`.
    fn prune_before(&mut self, cutoff: DateTime<Utc>);
}

/// An observed high price.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    /// Timestamp.
    pub timestamp: DateTime<Utc>,
    /// Highest traded price in the sampled interval.
    pub high: Decimal,
}

/// Oracle backed by observed high prices per market pair.
///
/// A target is touched if any high observed within `[open_time, close_time]`
/// reached or exceeded its value. It is untouched only once the whole window
/// has been observed.
#[derive(Debug, Clone, Default)]
pub struct PriceSeriesOracle {
    series: HashMap<String, Vec<PricePoint>>,
    observed: HashMap<String, Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl PriceSeriesOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single observed high for a pair.
    pub fn record(&mut self, pair_id: impl Into<String>, timestamp: DateTime<Utc>, high: Decimal) {
        self.series
            .entry(pair_id.into())
            .or_default()
            .push(PricePoint { timestamp, high });
    }

    /// Highest price observed for a pair within a window.
    pub fn window_high(
        &self,
        pair_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<Decimal> {
        self.series
            .get(pair_id)?
            .iter()
            .filter(|p| p.timestamp >= from && p.timestamp <= to)
            .map(|p| p.high)
            .max()
    }

    /// Whether `[from, to]` lies inside one fully observed window.
    pub fn is_observed(&self, pair_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.observed
            .get(pair_id)
            .is_some_and(|windows| windows.iter().any(|(start, end)| *start <= from && *end >= to))
    }
}

impl PriceObserver for PriceSeriesOracle {
    fn observe(
        &mut self,
        pair_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        points: Vec<PricePoint>,
    ) {
        self.series
            .entry(pair_id.to_string())
            .or_default()
            .extend(points);
        self.observed
            .entry(pair_id.to_string())
            .or_default()
            .push((from, to));
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) {
        for points in self.series.values_mut() {
            points.retain(|p| p.timestamp >= cutoff);
        }
        self.series.retain(|_, points| !points.is_empty());

        for windows in self.observed.values_mut() {
            windows.retain(|(_, end)| *end >= cutoff);
        }
        self.observed.retain(|_, windows| !windows.is_empty());
    }
}

impl TouchOracle for PriceSeriesOracle {
    fn is_touched(&self, signal: &Signal, target: &Target) -> Option<bool> {
        let pair_id = &signal.market.pair_id;
        let high = self.window_high(pair_id, signal.open_time, signal.close_time);
        if high.is_some_and(|high| high >= target.value) {
            return Some(true);
        }
        self.is_observed(pair_id, signal.open_time, signal.close_time)
            .then_some(false)
    }
}

/// Oracle answering from pre-decided per-signal outcomes.
///
/// Outcomes are listed in target order. Targets without an entry are untouched.
#[derive(Debug, Clone, Default)]
pub struct FixedOutcomes {
    outcomes: HashMap<String, Vec<bool>>,
}

impl FixedOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, signal_id: impl Into<String>, touched: Vec<bool>) -> Self {
        self.outcomes.insert(signal_id.into(), touched);
        self
    }
}

impl TouchOracle for FixedOutcomes {
    fn is_touched(&self, signal: &Signal, target: &Target) -> Option<bool> {
        let touched = self.outcomes.get(&signal.id).and_then(|outcomes| {
            signal
                .targets
                .iter()
                .position(|t| t.id == target.id)
                .and_then(|index| outcomes.get(index).copied())
        });
        Some(touched.unwrap_or(false))
    }
}

impl PriceObserver for FixedOutcomes {
    fn observe(&mut self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>, _: Vec<PricePoint>) {}

    fn prune_before(&mut self, _: DateTime<Utc>) {}
}
