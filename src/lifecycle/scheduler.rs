//! Periodic lifecycle evaluation with fire-and-forget persistence.

use super::{EvaluationReport, LifecycleEvaluator, PriceObserver, TouchOracle};
use crate::api::{SignalBackend, SignalQuery};
use crate::config::LifecycleConfig;
use crate::error::Result;
use crate::state::{Action, Signal, Store};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

/// A backend write produced by a lifecycle transition.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    /// Persist the signal's recomputed status and targets.
    Status(Signal),
    /// Credit a publisher for a closed signal.
    Score {
        username: String,
        signal_id: String,
        delta: Decimal,
    },
}

impl PendingWrite {
    fn signal_id(&self) -> &str {
        match self {
            Self::Status(signal) => &signal.id,
            Self::Score { signal_id, .. } => signal_id,
        }
    }

    async fn execute(&self, backend: &dyn SignalBackend) -> Result<()> {
        match self {
            Self::Status(signal) => backend.update_signal_status(signal).await,
            Self::Score {
                username,
                signal_id,
                delta,
            } => backend.apply_score(username, signal_id, *delta).await,
        }
    }
}

/// What one tick did.
#[derive(Debug)]
pub struct TickOutcome {
    pub report: EvaluationReport,
    /// Handles of the dispatched writes. The scheduler never waits on them.
    pub writes: Vec<JoinHandle<()>>,
}

/// Runs the evaluator on a timer and persists transitions in the background.
///
/// Each tick first fetches price highs for signals waiting to settle, then
/// evaluates synchronously under the store lock, releases it, and only then
/// spawns backend writes. Writes that fail with a recoverable error are
/// queued and sent again on the next tick; the transition itself is never
/// recomputed, so retries cannot double-award score.
pub struct LifecycleScheduler<O> {
    store: Arc<RwLock<Store>>,
    evaluator: Mutex<LifecycleEvaluator<O>>,
    backend: Arc<dyn SignalBackend>,
    config: LifecycleConfig,
    action_tx: mpsc::UnboundedSender<Action>,
    retry_queue: Arc<Mutex<Vec<PendingWrite>>>,
}

impl<O: TouchOracle + PriceObserver> LifecycleScheduler<O> {
    /// Create a new scheduler over a shared store.
    pub async fn new(
        store: Arc<RwLock<Store>>,
        evaluator: LifecycleEvaluator<O>,
        backend: Arc<dyn SignalBackend>,
        config: LifecycleConfig,
    ) -> Self {
        let action_tx = store.read().await.sender();
        Self {
            store,
            evaluator: Mutex::new(evaluator),
            backend,
            config,
            action_tx,
            retry_queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn evaluator_mut(&mut self) -> &mut LifecycleEvaluator<O> {
        self.evaluator.get_mut()
    }

    /// Number of writes waiting for the next tick.
    pub async fn pending_retries(&self) -> usize {
        self.retry_queue.lock().await.len()
    }

    /// Reload every signal from the backend into the store.
    ///
    /// Returns the number of signals fetched. Local lifecycle progress is
    /// never rolled back by the reload.
    pub async fn refresh(&self) -> Result<usize> {
        let signals = fetch_all_signals(self.backend.as_ref(), SignalQuery::new()).await?;
        let count = signals.len();
        self.store.write().await.reduce(Action::SignalsLoaded(signals));
        debug!("Refreshed {} signals", count);
        Ok(count)
    }

    /// Evaluate all signals at `now` and dispatch the resulting writes.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        self.collect_prices(now).await;

        let (report, fresh) = {
            let mut store = self.store.write().await;
            let mut evaluator = self.evaluator.lock().await;
            let report = store.evaluate(&*evaluator, now);
            let writes = Self::writes_for(&store, &report);

            // Windows of signals still open or waiting to settle are kept
            let cutoff = store
                .signals
                .signals
                .iter()
                .filter(|s| !s.is_closed())
                .map(|s| s.open_time)
                .min()
                .unwrap_or(now);
            evaluator.oracle_mut().prune_before(cutoff);

            (report, writes)
        };

        let mut writes = std::mem::take(&mut *self.retry_queue.lock().await);
        if !writes.is_empty() {
            debug!("Retrying {} pending writes", writes.len());
        }
        writes.extend(fresh);

        let handles = writes.into_iter().map(|write| self.dispatch(write)).collect();

        TickOutcome {
            report,
            writes: handles,
        }
    }

    /// Fetch highs for every signal that is due to close but cannot be
    /// settled yet. A failed fetch leaves the signal waiting for a later tick.
    async fn collect_prices(&self, now: DateTime<Utc>) {
        let mut windows: Vec<(String, DateTime<Utc>, DateTime<Utc>)> = {
            let store = self.store.read().await;
            let evaluator = self.evaluator.lock().await;
            store
                .signals
                .signals
                .iter()
                .filter(|s| evaluator.awaiting_outcome(s, now))
                .map(|s| (s.market.pair_id.clone(), s.open_time, s.close_time))
                .collect()
        };
        windows.sort();
        windows.dedup();

        for (pair_id, from, to) in windows {
            match self.backend.market_highs(&pair_id, from, to).await {
                Ok(points) => {
                    debug!("Observed {} highs for {}", points.len(), pair_id);
                    self.evaluator
                        .lock()
                        .await
                        .oracle_mut()
                        .observe(&pair_id, from, to, points);
                }
                Err(e) => warn!("Price fetch for {} failed: {}", pair_id, e),
            }
        }
    }

    /// Run ticks on the configured interval until `shutdown` resolves.
    ///
    /// Signals are loaded on the first tick and reloaded every
    /// `refresh_every` ticks after that.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.tick_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);
        tokio::pin!(shutdown);

        info!(
            "Lifecycle scheduler started ({}s interval)",
            self.config.tick_secs
        );

        let mut tick_count: u64 = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = ticks.next() => {
                    let refresh_every = u64::from(self.config.refresh_every);
                    let due = tick_count == 0
                        || (refresh_every > 0 && tick_count % refresh_every == 0);
                    if due && let Err(e) = self.refresh().await
                    {
                        warn!("Signal refresh failed: {}", e);
                    }
                    tick_count += 1;

                    let outcome = self.tick(Utc::now()).await;
                    if !outcome.report.is_empty() {
                        info!(
                            "{} signal(s) changed status",
                            outcome.report.transitions.len()
                        );
                    }
                }
            }
        }

        info!("Lifecycle scheduler stopped");
    }

    fn writes_for(store: &Store, report: &EvaluationReport) -> Vec<PendingWrite> {
        let mut writes = Vec::new();
        for transition in &report.transitions {
            if let Some(signal) = store.signals.get(&transition.signal_id) {
                writes.push(PendingWrite::Status(signal.clone()));
            }
            if let Some(closure) = &transition.closure
                && closure.score_delta > Decimal::ZERO
            {
                writes.push(PendingWrite::Score {
                    username: closure.publisher.clone(),
                    signal_id: transition.signal_id.clone(),
                    delta: closure.score_delta,
                });
            }
        }
        writes
    }

    fn dispatch(&self, write: PendingWrite) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let retry_queue = Arc::clone(&self.retry_queue);
        let action_tx = self.action_tx.clone();
        let notify = self.config.notify_on_failure;

        tokio::spawn(async move {
            let Err(e) = write.execute(backend.as_ref()).await else {
                return;
            };

            let signal_id = write.signal_id().to_string();
            if e.is_recoverable() {
                warn!("Write for signal {} failed, queued for retry: {}", signal_id, e);
                retry_queue.lock().await.push(write);
            } else {
                error!("Write for signal {} dropped: {}", signal_id, e);
            }

            if notify {
                let _ = action_tx.send(Action::PersistFailed {
                    signal_id,
                    error: e.to_string(),
                });
            }
        })
    }
}

/// Fetch every page of signals matching the query.
pub async fn fetch_all_signals(
    backend: &dyn SignalBackend,
    query: SignalQuery,
) -> Result<Vec<Signal>> {
    let mut signals = Vec::new();
    let mut query = query;
    loop {
        let page = backend.list_signals(&query).await?;
        let more = page.continues_after(query.page);
        signals.extend(page.items);
        if !more {
            break;
        }
        query = query.next_page();
    }
    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockSignalBackend, Page};
    use crate::error::Error;
    use crate::lifecycle::{FixedOutcomes, PricePoint, PriceSeriesOracle};
    use crate::state::fixtures::btc_signal;
    use crate::state::{Account, SignalStatus};
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    async fn create_test_store(
        signals: Vec<Signal>,
    ) -> (Arc<RwLock<Store>>, mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut store = Store::new(tx);
        store.reduce(Action::AccountsLoaded(vec![Account::new("alice")]));
        store.reduce(Action::SignalsLoaded(signals));
        (Arc::new(RwLock::new(store)), rx)
    }

    fn closing_signal(now: DateTime<Utc>) -> Signal {
        let mut signal = btc_signal("s1", "alice", now);
        signal.open_time = now - ChronoDuration::hours(1);
        signal.close_time = now - ChronoDuration::seconds(1);
        signal
    }

    async fn join_all(outcome: TickOutcome) -> EvaluationReport {
        for handle in outcome.writes {
            handle.await.unwrap();
        }
        outcome.report
    }

    #[tokio::test]
    async fn test_tick_persists_status_and_score_once() {
        let now = Utc::now();
        let (store, _rx) = create_test_store(vec![closing_signal(now)]).await;

        let mut backend = MockSignalBackend::new();
        backend
            .expect_update_signal_status()
            .withf(|signal: &Signal| signal.status == SignalStatus::Closed && signal.targets[0].touched)
            .times(1)
            .returning(|_| Ok(()));
        backend
            .expect_apply_score()
            .withf(|username: &str, signal_id: &str, delta: &Decimal| {
                username == "alice" && signal_id == "s1" && *delta == dec!(1)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let evaluator = LifecycleEvaluator::new(FixedOutcomes::new().with("s1", vec![true, false]));
        let scheduler = LifecycleScheduler::new(
            Arc::clone(&store),
            evaluator,
            Arc::new(backend),
            LifecycleConfig::default(),
        )
        .await;

        let report = join_all(scheduler.tick(now).await).await;
        assert_eq!(report.transitions.len(), 1);

        // Redundant ticks produce no further writes
        let report = join_all(scheduler.tick(now + ChronoDuration::seconds(60)).await).await;
        assert!(report.is_empty());
        assert_eq!(store.read().await.accounts.get("alice").unwrap().score, dec!(1));
    }

    #[tokio::test]
    async fn test_recoverable_failure_is_retried_next_tick() {
        let now = Utc::now();
        let (store, mut rx) = create_test_store(vec![closing_signal(now)]).await;

        let mut backend = MockSignalBackend::new();
        let mut status_calls = 0;
        backend
            .expect_update_signal_status()
            .times(2)
            .returning(move |_| {
                status_calls += 1;
                if status_calls == 1 {
                    Err(Error::network("connection reset"))
                } else {
                    Ok(())
                }
            });
        backend.expect_apply_score().times(1).returning(|_, _, _| Ok(()));

        let evaluator = LifecycleEvaluator::new(FixedOutcomes::new().with("s1", vec![true, false]));
        let scheduler = LifecycleScheduler::new(
            Arc::clone(&store),
            evaluator,
            Arc::new(backend),
            LifecycleConfig::default(),
        )
        .await;

        join_all(scheduler.tick(now).await).await;
        assert_eq!(scheduler.pending_retries().await, 1);
        assert!(matches!(rx.try_recv(), Ok(Action::PersistFailed { .. })));

        let report = join_all(scheduler.tick(now + ChronoDuration::seconds(60)).await).await;
        assert!(report.is_empty());
        assert_eq!(scheduler.pending_retries().await, 0);
        assert_eq!(store.read().await.accounts.get("alice").unwrap().score, dec!(1));
    }

    #[tokio::test]
    async fn test_unrecoverable_failure_is_dropped() {
        let now = Utc::now();
        let (store, _rx) = create_test_store(vec![closing_signal(now)]).await;

        let mut backend = MockSignalBackend::new();
        backend
            .expect_update_signal_status()
            .times(1)
            .returning(|_| Err(Error::not_found("signal deleted")));

        // Nothing touched, so no score write is issued
        let evaluator = LifecycleEvaluator::new(FixedOutcomes::new());
        let scheduler = LifecycleScheduler::new(
            store,
            evaluator,
            Arc::new(backend),
            LifecycleConfig::default(),
        )
        .await;

        join_all(scheduler.tick(now).await).await;
        assert_eq!(scheduler.pending_retries().await, 0);
    }

    #[tokio::test]
    async fn test_fetch_all_signals_follows_pages() {
        let now = Utc::now();
        let mut backend = MockSignalBackend::new();
        backend.expect_list_signals().times(2).returning(move |query: &SignalQuery| {
            Ok(Page {
                items: vec![btc_signal(&format!("s{}", query.page), "alice", now)],
                page: query.page,
                total_pages: 2,
            })
        });

        let signals = fetch_all_signals(&backend, SignalQuery::new()).await.unwrap();
        let ids: Vec<&str> = signals.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_fetch_ignores_echoed_page_number() {
        let now = Utc::now();
        let mut backend = MockSignalBackend::new();
        // The server omits `page`, so every response deserializes as page 1
        backend.expect_list_signals().times(2).returning(move |query: &SignalQuery| {
            Ok(Page {
                items: vec![btc_signal(&format!("s{}", query.page), "alice", now)],
                page: 1,
                total_pages: 2,
            })
        });

        let signals = tokio::time::timeout(
            Duration::from_millis(500),
            fetch_all_signals(&backend, SignalQuery::new()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(signals.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_stops_on_empty_page() {
        let mut backend = MockSignalBackend::new();
        backend.expect_list_signals().times(1).returning(|_| {
            Ok(Page {
                items: Vec::new(),
                page: 1,
                total_pages: 2,
            })
        });

        let signals = tokio::time::timeout(
            Duration::from_millis(500),
            fetch_all_signals(&backend, SignalQuery::new()),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_picks_up_signals_created_later() {
        let now = Utc::now();
        let (store, _rx) = create_test_store(Vec::new()).await;

        let mut backend = MockSignalBackend::new();
        let mut list_calls = 0;
        backend.expect_list_signals().times(2).returning(move |_| {
            list_calls += 1;
            let items = if list_calls == 1 {
                Vec::new()
            } else {
                vec![closing_signal(now)]
            };
            Ok(Page {
                items,
                page: 1,
                total_pages: 1,
            })
        });
        backend
            .expect_update_signal_status()
            .times(1)
            .returning(|_| Ok(()));
        backend
            .expect_apply_score()
            .withf(|username: &str, signal_id: &str, delta: &Decimal| {
                username == "alice" && signal_id == "s1" && *delta == dec!(1)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let evaluator = LifecycleEvaluator::new(FixedOutcomes::new().with("s1", vec![true, false]));
        let scheduler = LifecycleScheduler::new(
            Arc::clone(&store),
            evaluator,
            Arc::new(backend),
            LifecycleConfig::default(),
        )
        .await;

        assert_eq!(scheduler.refresh().await.unwrap(), 0);
        assert!(join_all(scheduler.tick(now).await).await.is_empty());

        assert_eq!(scheduler.refresh().await.unwrap(), 1);
        let report = join_all(scheduler.tick(now).await).await;
        assert_eq!(report.transitions.len(), 1);

        let store = store.read().await;
        assert_eq!(store.signals.get("s1").unwrap().status, SignalStatus::Closed);
        assert_eq!(store.accounts.get("alice").unwrap().score, dec!(1));
    }

    #[tokio::test]
    async fn test_settlement_waits_for_observed_highs() {
        let now = Utc::now();
        let (store, _rx) = create_test_store(vec![closing_signal(now)]).await;

        let mut backend = MockSignalBackend::new();
        let mut price_calls = 0;
        backend
            .expect_market_highs()
            .withf(|pair_id: &str, _: &DateTime<Utc>, _: &DateTime<Utc>| pair_id == "btc-usdt")
            .times(2)
            .returning(move |_, from, _| {
                price_calls += 1;
                if price_calls == 1 {
                    Err(Error::network("feed unavailable"))
                } else {
                    Ok(vec![PricePoint {
                        timestamp: from + ChronoDuration::minutes(5),
                        high: dec!(52100),
                    }])
                }
            });
        backend
            .expect_update_signal_status()
            .withf(|signal: &Signal| {
                signal.status == SignalStatus::Closed
                    && signal.targets[0].touched
                    && !signal.targets[1].touched
            })
            .times(1)
            .returning(|_| Ok(()));
        backend
            .expect_apply_score()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let scheduler = LifecycleScheduler::new(
            Arc::clone(&store),
            LifecycleEvaluator::new(PriceSeriesOracle::new()),
            Arc::new(backend),
            LifecycleConfig::default(),
        )
        .await;

        // Feed down: nothing is settled or persisted
        let report = join_all(scheduler.tick(now).await).await;
        assert!(report.is_empty());
        assert_eq!(report.deferred, vec!["s1".to_string()]);
        assert_eq!(
            store.read().await.signals.get("s1").unwrap().status,
            SignalStatus::Open
        );

        let report = join_all(scheduler.tick(now + ChronoDuration::seconds(60)).await).await;
        assert_eq!(report.transitions.len(), 1);
        assert_eq!(store.read().await.accounts.get("alice").unwrap().score, dec!(1));

        // Settled: no further price fetches
        let report = join_all(scheduler.tick(now + ChronoDuration::seconds(120)).await).await;
        assert!(report.is_empty());
        assert!(report.deferred.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (store, _rx) = create_test_store(Vec::new()).await;
        let mut backend = MockSignalBackend::new();
        backend.expect_list_signals().returning(|_| {
            Ok(Page {
                items: Vec::new(),
                page: 1,
                total_pages: 1,
            })
        });
        let scheduler = LifecycleScheduler::new(
            store,
            LifecycleEvaluator::new(FixedOutcomes::new()),
            Arc::new(backend),
            LifecycleConfig::default(),
        )
        .await;

        tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_secs(1), scheduler.run(async {})).await
        );
    }
}
