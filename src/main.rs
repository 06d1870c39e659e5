//! Brokerage engine simulation.
//!
//! Seeds an in-memory brokerage, runs a few member scenarios against it and
//! then drives several polling passes over a random-walk price feed. Pass a
//! TOML config path as the first argument to override the defaults.

use async_trait::async_trait;
use brokerage_core::*;
use parking_lot::Mutex;
use rand::{thread_rng, Rng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Moves every ticker by up to 2% per fetch.
struct RandomWalkFeed {
    prices: Mutex<HashMap<String, Decimal>>,
}

impl RandomWalkFeed {
    fn new(seed: &[(&str, Decimal)]) -> Self {
        Self {
            prices: Mutex::new(seed.iter().map(|(t, p)| (t.to_string(), *p)).collect()),
        }
    }
}

#[async_trait]
impl PriceFeed for RandomWalkFeed {
    async fn fetch_price(&self, asset: &Asset) -> Result<String, FeedError> {
        let step_bp: i64 = thread_rng().gen_range(-200..=200);
        let mut prices = self.prices.lock();
        let price = prices
            .get_mut(&asset.ticker)
            .ok_or_else(|| FeedError::Unsupported(asset.ticker.clone()))?;
        *price *= Decimal::ONE + Decimal::new(step_bp, 4);
        Ok(price.to_string())
    }

    fn name(&self) -> &str {
        "random-walk"
    }
}

struct Sim {
    engine: Arc<Engine>,
    clock: Arc<ManualClock>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(Path::new(&path))?,
        None => AppConfig::default(),
    };
    info!("brokerage simulation starting");

    let notifier = Arc::new(BroadcastNotifier::new(1024));
    let mut events = notifier.subscribe();
    let clock = Arc::new(ManualClock::new(Timestamp::now()));
    let settings = Arc::new(SharedSettings::new(Settings::protected()));
    let engine = Arc::new(Engine::new(
        config.engine.clone(),
        Arc::new(MemoryStore::new()),
        settings,
        notifier.clone(),
        clock.clone(),
    ));
    let sim = Sim { engine, clock };

    let btc = sim.engine.register_asset(Asset::crypto("BTC").with_spread(dec!(0.5), dec!(0.5)).with_leverage(dec!(10)))?;
    let aapl = sim.engine.register_asset(Asset::stock("AAPL").with_spread(dec!(0.1), dec!(0.1)))?;
    let eurusd = sim
        .engine
        .register_asset(Asset::forex("EURUSD").with_spread(dec!(0.0002), dec!(0.0002)))?;
    sim.engine.update_rate(btc, "64000")?;
    sim.engine.update_rate(aapl, "190.25")?;
    sim.engine.update_rate(eurusd, "1.08500")?;

    scenario_market_round_trip(&sim, btc)?;
    scenario_limit_activation(&sim, aapl)?;
    scenario_stop_loss(&sim, btc)?;
    scenario_alerts_and_bulk_close(&sim, btc, eurusd)?;

    let feed = Arc::new(RandomWalkFeed::new(&[
        ("BTC", dec!(64000)),
        ("AAPL", dec!(190.25)),
        ("EURUSD", dec!(1.08500)),
    ]));
    let poller = RatePoller::new(sim.engine.clone(), feed, config.feed.clone(), config.poller.clone());
    for pass in 1..=5 {
        sim.clock.advance_time(config.poller.poll_interval().as_millis() as i64 * 3);
        let report = poller.run_pass().await;
        info!(pass, updated = report.updated.len(), failed = report.failed.len(), "polling pass");
    }

    let mut published = 0usize;
    while events.try_recv().is_ok() {
        published += 1;
    }
    info!(published, "simulation finished");
    Ok(())
}

fn funded_member(sim: &Sim, usd: Decimal) -> Result<MemberId, EngineError> {
    let member_id = sim.engine.create_member(Member::new(sim.clock.now()))?;
    sim.engine.deposit(member_id, Currency::Usd, usd)?;
    Ok(member_id)
}

/// Market buy, price moves up, member closes at a profit.
fn scenario_market_round_trip(sim: &Sim, btc: AssetId) -> Result<(), EngineError> {
    info!("scenario: market round trip");
    let member = funded_member(sim, dec!(50000))?;
    let order = sim
        .engine
        .place_order(&OrderRequest::market(member, btc, Side::Buy, dec!(0.5)).with_leverage(dec!(2)))?;
    info!(order_id = order.id.0, total = %order.total, rate = %order.rate_entry, "bought 0.5 BTC at 2x");

    sim.clock.advance_time(60_000);
    sim.engine.update_rate(btc, "65500")?;
    let outcome = sim.engine.close_order(member, order.id)?;
    info!(
        profit = %outcome.order().profit,
        balance = %sim.engine.member(member)?.balance(Currency::Usd),
        "position closed"
    );
    Ok(())
}

/// A buy limit below the market waits, then fills when the rate drops to it.
fn scenario_limit_activation(sim: &Sim, aapl: AssetId) -> Result<(), EngineError> {
    info!("scenario: limit order activation");
    let member = funded_member(sim, dec!(10000))?;
    let order = sim
        .engine
        .place_order(&OrderRequest::limit(member, aapl, Side::Buy, dec!(10), dec!(185)))?;
    info!(order_id = order.id.0, status = %order.status, "limit buy placed at 185");

    for rate in ["188.40", "186.10", "184.90"] {
        sim.clock.advance_time(60_000);
        let update = sim.engine.update_rate(aapl, rate)?;
        if !update.activated.is_empty() {
            info!(%rate, "limit order filled");
        }
    }
    info!(shares = %sim.engine.wallet_balance(member, aapl)?, "wallet after fill");
    Ok(())
}

/// The system closes a losing position once its stop-loss is reached.
fn scenario_stop_loss(sim: &Sim, btc: AssetId) -> Result<(), EngineError> {
    info!("scenario: stop loss");
    let member = funded_member(sim, dec!(20000))?;
    let order = sim.engine.place_order(
        &OrderRequest::market(member, btc, Side::Buy, dec!(0.2)).with_sltp(dec!(5), dec!(20)),
    )?;

    let mut rate = sim.engine.asset(btc)?.rate;
    while sim.engine.order(order.id)?.is_open() {
        rate *= dec!(0.98);
        sim.clock.advance_time(60_000);
        sim.engine.update_rate(btc, &rate.round_dp(2).to_string())?;
    }
    let closed = sim.engine.order(order.id)?;
    info!(
        by_system = closed.closed_by_system,
        gain = %closed.gain,
        profit = %closed.profit,
        "stop loss fired"
    );
    Ok(())
}

/// Alerts fire as the market moves; the member then exits everything at once.
fn scenario_alerts_and_bulk_close(sim: &Sim, btc: AssetId, eurusd: AssetId) -> Result<(), EngineError> {
    info!("scenario: alerts and bulk close");
    let member = funded_member(sim, dec!(500000))?;
    let rate = sim.engine.asset(btc)?.rate;
    sim.engine.create_alert(member, btc, (rate * dec!(1.01)).round_dp(2))?;
    sim.engine.create_alert(member, btc, (rate * dec!(0.99)).round_dp(2))?;

    sim.engine.place_order(&OrderRequest::market(member, btc, Side::Sell, dec!(1)))?;
    sim.engine.place_order(&OrderRequest::market(member, eurusd, Side::Buy, dec!(1)))?;
    sim.engine
        .place_order(&OrderRequest::limit(member, btc, Side::Buy, dec!(1), (rate * dec!(0.9)).round_dp(2)))?;

    sim.clock.advance_time(60_000);
    let update = sim.engine.update_rate(btc, &(rate * dec!(1.02)).round_dp(2).to_string())?;
    info!(fired = update.alerts_fired.len(), "btc up 2%");
    info!(seen = sim.engine.mark_alerts_seen(member)?, "alerts acknowledged");

    let report = sim.engine.close_bulk(member, BulkFilter::All)?;
    if !report.failed.is_empty() {
        warn!(failed = report.failed.len(), "some orders did not close");
    }
    info!(
        closed = report.closed.len(),
        cancelled = report.cancelled.len(),
        balance = %sim.engine.member(member)?.balance(Currency::Usd),
        "member flat"
    );
    Ok(())
}
