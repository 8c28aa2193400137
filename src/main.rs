//! Signalroom daemon.
//!
//! Loads signals from the backend and keeps their lifecycle status, target
//! outcomes, and publisher scores up to date until interrupted.

use signalroom::api::{ApiClient, SignalBackend};
use signalroom::lifecycle::{LifecycleEvaluator, LifecycleScheduler, PriceSeriesOracle};
use signalroom::state::Store;
use signalroom::storage::KvStore;
use signalroom::{Config, Result};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging: stdout plus a daily rolling file
    let log_dir = signalroom::config::log_dir()?;
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "signalroom.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signalroom=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    // Load configuration
    let config = Config::load_or_default()?;

    let storage = KvStore::open(config.storage.resolve_path())?;
    if let Some(session) = storage.current_user()? {
        tracing::info!("Last session: {}", session.username);
    }

    let backend: Arc<dyn SignalBackend> = Arc::new(ApiClient::new(config.api.clone())?);

    let (action_tx, mut action_rx) = mpsc::unbounded_channel();
    let store = Arc::new(RwLock::new(Store::new(action_tx)));

    // The scheduler loads signals on its first tick and fetches observed
    // highs for each signal before settling it.
    let evaluator = LifecycleEvaluator::new(PriceSeriesOracle::new())
        .with_score_per_target(config.lifecycle.score_per_target);
    let scheduler =
        LifecycleScheduler::new(Arc::clone(&store), evaluator, backend, config.lifecycle.clone())
            .await;

    let scheduler_task = tokio::spawn(scheduler.run(async {
        let _ = tokio::signal::ctrl_c().await;
    }));

    // Apply actions dispatched by background tasks until the scheduler stops
    tokio::pin!(scheduler_task);
    loop {
        tokio::select! {
            _ = &mut scheduler_task => break,
            Some(action) = action_rx.recv() => {
                let mut store = store.write().await;
                store.reduce(action);
                for notification in store.notifications.drain(..) {
                    tracing::info!("{:?}: {}", notification.level, notification.message);
                }
            }
        }
    }

    Ok(())
}
