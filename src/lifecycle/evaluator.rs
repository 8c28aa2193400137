//! Signal lifecycle evaluator.

use super::{TouchOracle, derive_status};
use crate::state::{Signal, SignalStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Outcome of a signal entering `Closed`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureOutcome {
    /// Publisher credited with the score.
    pub publisher: String,
    /// Touched flag per target, in target order.
    pub touched: Vec<bool>,
    /// Score awarded to the publisher.
    pub score_delta: Decimal,
}

impl ClosureOutcome {
    pub fn touched_count(&self) -> usize {
        self.touched.iter().filter(|t| **t).count()
    }
}

/// A forward status change produced by one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub signal_id: String,
    pub from: SignalStatus,
    pub to: SignalStatus,
    /// Present only when `to` is `Closed`.
    pub closure: Option<ClosureOutcome>,
}

/// Result of evaluating a batch of signals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub evaluated: usize,
    pub transitions: Vec<Transition>,
    /// Signals past their close time whose targets cannot be decided yet.
    pub deferred: Vec<String>,
}

impl EvaluationReport {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Transitions that closed a signal.
    pub fn closures(&self) -> impl Iterator<Item = (&str, &ClosureOutcome)> {
        self.transitions
            .iter()
            .filter_map(|t| t.closure.as_ref().map(|c| (t.signal_id.as_str(), c)))
    }

    /// Total score delta per publisher.
    pub fn score_deltas(&self) -> BTreeMap<String, Decimal> {
        let mut deltas = BTreeMap::new();
        for (_, closure) in self.closures() {
            *deltas
                .entry(closure.publisher.clone())
                .or_insert(Decimal::ZERO) += closure.score_delta;
        }
        deltas
    }
}

/// Derives signal status and settles targets when a signal closes.
///
/// Evaluation is idempotent: a closed signal is never touched again, and a
/// status never moves backwards, so redundant ticks cannot re-award score.
/// A signal only closes once the oracle can decide every one of its targets;
/// until then it keeps its current status and is reported as deferred.
#[derive(Debug, Clone)]
pub struct LifecycleEvaluator<O> {
    oracle: O,
    score_per_target: Decimal,
}

impl<O: TouchOracle> LifecycleEvaluator<O> {
    /// Create an evaluator awarding one point per touched target.
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            score_per_target: Decimal::ONE,
        }
    }

    pub fn with_score_per_target(mut self, score: Decimal) -> Self {
        self.score_per_target = score;
        self
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Touched flag per target, or `None` while any target is undecided.
    pub fn outcomes(&self, signal: &Signal) -> Option<Vec<bool>> {
        signal
            .targets
            .iter()
            .map(|target| self.oracle.is_touched(signal, target))
            .collect()
    }

    /// Whether `signal` is due to close at `now` but cannot be settled yet.
    pub fn awaiting_outcome(&self, signal: &Signal, now: DateTime<Utc>) -> bool {
        !signal.is_closed()
            && derive_status(now, signal.open_time, signal.close_time) == SignalStatus::Closed
            && self.outcomes(signal).is_none()
    }

    /// Evaluate one signal, mutating it in place on a forward transition.
    pub fn evaluate(&self, signal: &mut Signal, now: DateTime<Utc>) -> Option<Transition> {
        if signal.is_closed() {
            return None;
        }

        let next = derive_status(now, signal.open_time, signal.close_time);
        if next.rank() <= signal.status.rank() {
            return None;
        }

        let touched = if next == SignalStatus::Closed {
            let Some(touched) = self.outcomes(signal) else {
                debug!(signal_id = %signal.id, "Settlement waiting for price data");
                return None;
            };
            Some(touched)
        } else {
            None
        };

        let from = signal.status;
        signal.status = next;
        let closure = touched.map(|touched| self.settle(signal, touched));

        info!(
            signal_id = %signal.id,
            from = %from,
            to = %next,
            "Signal status changed"
        );

        Some(Transition {
            signal_id: signal.id.clone(),
            from,
            to: next,
            closure,
        })
    }

    /// Evaluate every signal in the slice.
    pub fn evaluate_all(&self, signals: &mut [Signal], now: DateTime<Utc>) -> EvaluationReport {
        let mut report = EvaluationReport {
            evaluated: signals.len(),
            ..EvaluationReport::default()
        };

        for signal in signals.iter_mut() {
            match self.evaluate(signal, now) {
                Some(transition) => report.transitions.push(transition),
                None if self.awaiting_outcome(signal, now) => report.deferred.push(signal.id.clone()),
                None => {}
            }
        }

        debug!(
            evaluated = report.evaluated,
            transitions = report.transitions.len(),
            deferred = report.deferred.len(),
            "Lifecycle evaluation complete"
        );

        report
    }

    fn settle(&self, signal: &mut Signal, touched: Vec<bool>) -> ClosureOutcome {
        for (target, hit) in signal.targets.iter_mut().zip(&touched) {
            target.touched = *hit;
        }

        let count = touched.iter().filter(|t| **t).count();
        let score_delta = self.score_per_target * Decimal::from(count);

        info!(
            signal_id = %signal.id,
            publisher = %signal.publisher,
            touched = count,
            %score_delta,
            "Signal closed"
        );

        ClosureOutcome {
            publisher: signal.publisher.clone(),
            touched,
            score_delta,
        }
    }
}
