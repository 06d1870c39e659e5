// 12.0 poller.rs: scheduled rate polling. each pass picks the assets that are due,
// fetches their prices concurrently and feeds every price through the engine.
// 12.1 one asset failing (feed down, bad price, store hiccup) never stops the pass.

use crate::config::{FeedConfig, PollerConfig};
use crate::engine::Engine;
use crate::price_feed::{fetch_with_retry, PriceFeed};
use crate::types::AssetId;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// What one polling pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub updated: Vec<AssetId>,
    pub failed: Vec<(AssetId, String)>,
}

pub struct RatePoller {
    engine: Arc<Engine>,
    feed: Arc<dyn PriceFeed>,
    feed_config: FeedConfig,
    config: PollerConfig,
}

impl RatePoller {
    pub fn new(engine: Arc<Engine>, feed: Arc<dyn PriceFeed>, feed_config: FeedConfig, config: PollerConfig) -> Self {
        Self {
            engine,
            feed,
            feed_config,
            config,
        }
    }

    // 12.1: one task per due asset, at most max_concurrency fetching at once
    pub async fn run_pass(&self) -> PassReport {
        let mut report = PassReport::default();
        let due = match self.engine.due_assets(&self.config) {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "cannot list due assets");
                return report;
            }
        };

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for asset in due {
            let engine = self.engine.clone();
            let feed = self.feed.clone();
            let feed_config = self.feed_config.clone();
            let permits = permits.clone();

            tasks.spawn(async move {
                let asset_id = asset.id;
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (asset_id, Err(e.to_string())),
                };

                let raw = match fetch_with_retry(feed.as_ref(), &asset, &feed_config).await {
                    Ok(raw) => raw,
                    Err(e) => return (asset_id, Err(e.to_string())),
                };

                // the engine blocks on the store, keep it off the async workers
                let applied = tokio::task::spawn_blocking(move || engine.update_rate(asset_id, &raw)).await;
                match applied {
                    Ok(Ok(_)) => (asset_id, Ok(())),
                    Ok(Err(e)) => (asset_id, Err(e.to_string())),
                    Err(e) => (asset_id, Err(format!("update task failed: {e}"))),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((asset_id, Ok(()))) => report.updated.push(asset_id),
                Ok((asset_id, Err(reason))) => {
                    warn!(asset_id = asset_id.0, %reason, "asset skipped this pass");
                    report.failed.push((asset_id, reason));
                }
                Err(e) => error!(error = %e, "poll task panicked"),
            }
        }
        report.updated.sort();
        report.failed.sort_by_key(|(asset_id, _)| *asset_id);

        let retention_ms = (self.config.sample_retention_secs as i64).saturating_mul(1000);
        if let Err(e) = self.engine.prune_rate_samples(retention_ms) {
            warn!(error = %e, "sample pruning failed");
        }

        report
    }

    /// Polls until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.config.poll_interval(),
            feed = self.feed.name(),
            "rate poller started"
        );
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_pass().await;
                    info!(updated = report.updated.len(), failed = report.failed.len(), "poll pass done");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("rate poller stopping");
                        break;
                    }
                }
            }
        }
    }
}
