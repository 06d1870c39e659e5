//! The rate tick.
//!
//! `update_rate` is the single entry point for a new provider price. It
//! stores the quote on the asset, keeps a throttled sample history and then
//! walks everything that depends on the price, in this order:
//!
//! 1. pending limit orders whose entry condition is now met are activated
//! 2. active price alerts that were crossed fire
//! 3. open orders are re-priced and closed when their SL/TP is hit
//!
//! The asset write commits first; each dependent order then runs in its own
//! transaction so one bad order never blocks the rest of the tick.

use super::core::Engine;
use super::orders::order_event;
use super::results::{CloseOutcome, EngineError, RateUpdate};
use crate::asset::Asset;
use crate::config::PollerConfig;
use crate::events::{Notification, RateEvent};
use crate::history::HistoryEntry;
use crate::order::{entry_condition_met, Order};
use crate::rate::{compute_quote, parse_rate, sample_due, RateSample};
use crate::store::OrderFilter;
use crate::types::{AssetId, OrderStatus, Side, Timestamp};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

impl Engine {
    pub fn update_rate(&self, asset_id: AssetId, raw_rate: &str) -> Result<RateUpdate, EngineError> {
        let parsed = parse_rate(raw_rate)?;
        let settings = self.current_settings()?;
        let now = self.clock.now();

        let (asset, quote, sample_recorded) = {
            let mut tx = self.begin()?;
            let mut asset = tx.asset(asset_id)?.ok_or(EngineError::AssetNotFound(asset_id))?;
            // a fresh asset has no rate yet, that is what this tick is for
            if !asset.active || !asset.tradable {
                return Err(EngineError::AssetNotTradable(asset_id));
            }

            let since = now.minus_millis(self.config.change_lookback_ms);
            let day_ago = tx.rate_samples(asset_id, since)?.first().map(|s| s.rate);
            let quote = compute_quote(&asset, parsed, day_ago)?;

            let last_sample = tx.last_rate_sample(asset_id)?.map(|s| s.recorded_at);
            let sample_recorded = sample_due(last_sample, now, self.config.sample_throttle_ms);
            if sample_recorded {
                tx.insert_rate_sample(RateSample {
                    asset_id,
                    rate: quote.rate,
                    recorded_at: now,
                })?;
            }

            quote.apply(&mut asset, now);
            tx.update_asset(&asset)?;
            tx.commit()?;
            (asset, quote, sample_recorded)
        };

        debug!(
            asset_id = asset_id.0,
            ticker = %asset.ticker,
            rate = %quote.rate,
            change = %quote.change,
            sample_recorded,
            "rate updated"
        );
        self.publish(Notification::Rate(rate_event(&asset)));

        let mut update = RateUpdate::new(asset_id, quote, sample_recorded);
        // the asset is committed; a failed pass leaves its orders for the next tick
        if let Err(e) = self.activate_pending(&asset, now, &mut update) {
            warn!(asset_id = asset_id.0, error = %e, "pending activation failed");
        }
        match self.fire_alerts(&asset, now) {
            Ok(fired) => update.alerts_fired = fired,
            Err(e) => warn!(asset_id = asset_id.0, error = %e, "alert check failed"),
        }

        let open = {
            let tx = self.begin()?;
            tx.orders(&OrderFilter::asset(asset_id).with_status(&[OrderStatus::Open]))?
        };
        for order in open {
            let order_id = order.id;
            match self.evaluate_order(order, &settings) {
                Ok(CloseOutcome::Closed(_)) => update.closed_by_system.push(order_id),
                Ok(_) => update.profits_updated += 1,
                Err(e) => {
                    warn!(order_id = order_id.0, error = %e, "profit update failed");
                    update.failures.push((order_id, e));
                }
            }
        }

        if !update.activated.is_empty() || !update.closed_by_system.is_empty() || !update.failures.is_empty() {
            info!(
                asset_id = asset_id.0,
                activated = update.activated.len(),
                alerts = update.alerts_fired.len(),
                closed = update.closed_by_system.len(),
                failed = update.failures.len(),
                "rate tick settled orders"
            );
        }
        Ok(update)
    }

    fn activate_pending(&self, asset: &Asset, now: Timestamp, update: &mut RateUpdate) -> Result<(), EngineError> {
        let pending = {
            let tx = self.begin()?;
            tx.orders(&OrderFilter::asset(asset.id).with_status(&[OrderStatus::Pending]))?
        };

        for order in pending
            .into_iter()
            .filter(|o| entry_condition_met(o.side, o.rate_entry, asset.rate))
        {
            let order_id = order.id;
            match self.activate(order, now) {
                Ok(Some(activated)) => {
                    info!(order_id = order_id.0, rate = %asset.rate, "limit order activated");
                    self.publish(Notification::OrderActivated(order_event(&activated)));
                    update.activated.push(order_id);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(order_id = order_id.0, error = %e, "activation failed");
                    update.failures.push((order_id, e));
                }
            }
        }
        Ok(())
    }

    // None when the order left pending before we got to it
    fn activate(&self, mut order: Order, now: Timestamp) -> Result<Option<Order>, EngineError> {
        let mut tx = self.begin()?;
        let expected = order.status;
        order.transition(OrderStatus::Open)?;
        if !tx.update_order(&order, expected)? {
            return Ok(None);
        }
        if order.side == Side::Buy {
            tx.adjust_wallet(order.member_id, order.asset_id, order.qty)?;
        }
        let balance = tx
            .member(order.member_id)?
            .ok_or(EngineError::MemberNotFound(order.member_id))?
            .balance(order.currency);
        tx.insert_history(HistoryEntry::order_activated(&order, balance, now))?;
        tx.commit()?;
        Ok(Some(order))
    }

    /// Assets whose last update is older than their market's poll interval.
    /// Assets without a rate yet are always due.
    pub fn due_assets(&self, poller: &PollerConfig) -> Result<Vec<Asset>, EngineError> {
        let now = self.clock.now();
        let tx = self.begin()?;
        Ok(tx
            .assets()?
            .into_iter()
            .filter(|a| a.active && a.tradable)
            .filter(|a| {
                let interval = poller.update_interval(a.market).as_millis() as i64;
                a.rate.is_zero() || a.updated.as_millis() <= now.as_millis() - interval
            })
            .collect())
    }
}

fn rate_event(asset: &Asset) -> RateEvent {
    RateEvent {
        asset_id: asset.id,
        ticker: asset.ticker.clone(),
        rate: asset.rate,
        rate_buy: asset.rate_buy,
        rate_sell: asset.rate_sell,
        change: asset.change,
        sentiment: asset.sentiment,
        sentiment_type: asset.sentiment_type.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{engine_with_member, TestEngine, START};
    use super::*;
    use crate::history::HistoryKind;
    use crate::order::OrderRequest;
    use crate::types::Currency;
    use rust_decimal_macros::dec;

    fn with_btc() -> (TestEngine, AssetId) {
        let t = engine_with_member(dec!(1000));
        let asset_id = t
            .engine
            .register_asset(Asset::crypto("BTC").with_spread(dec!(1), dec!(1)).with_scale(2))
            .unwrap();
        (t, asset_id)
    }

    #[test]
    fn quote_lands_on_the_asset() {
        let (t, asset_id) = with_btc();
        let update = t.engine.update_rate(asset_id, "100.005").unwrap();
        assert_eq!(update.quote.rate, dec!(100.01));
        assert!(update.sample_recorded);

        let asset = t.engine.asset(asset_id).unwrap();
        assert_eq!(asset.rate, dec!(100.01));
        assert_eq!(asset.rate_buy, dec!(101.01));
        assert_eq!(asset.rate_sell, dec!(99.01));
        assert_eq!(asset.change, dec!(0));
        assert_eq!(asset.updated, START);
        assert_eq!(t.notifier.count(|n| matches!(n, Notification::Rate(_))), 1);
    }

    #[test]
    fn bad_rates_change_nothing() {
        let (t, asset_id) = with_btc();
        t.engine.update_rate(asset_id, "100").unwrap();
        assert_eq!(t.engine.update_rate(asset_id, "n/a").unwrap_err().code(), "INVALID_RATE");
        assert_eq!(t.engine.update_rate(asset_id, "0").unwrap_err().code(), "RATE_IS_ZERO");
        // rounds to zero at scale 2
        assert_eq!(t.engine.update_rate(asset_id, "0.001").unwrap_err().code(), "RATE_IS_ZERO");
        assert_eq!(t.engine.asset(asset_id).unwrap().rate, dec!(100));
    }

    #[test]
    fn samples_are_throttled() {
        let (t, asset_id) = with_btc();
        assert!(t.engine.update_rate(asset_id, "100").unwrap().sample_recorded);
        t.clock.advance_time(2 * Timestamp::HOUR_MS);
        assert!(!t.engine.update_rate(asset_id, "101").unwrap().sample_recorded);
        t.clock.advance_time(Timestamp::HOUR_MS);
        assert!(t.engine.update_rate(asset_id, "102").unwrap().sample_recorded);

        let samples = t.engine.rate_history(asset_id, START).unwrap();
        let rates: Vec<_> = samples.iter().map(|s| s.rate).collect();
        assert_eq!(rates, vec![dec!(100), dec!(102)]);
    }

    #[test]
    fn change_is_against_oldest_sample_in_window() {
        let (t, asset_id) = with_btc();
        t.engine.update_rate(asset_id, "80").unwrap();
        t.clock.advance_time(20 * Timestamp::HOUR_MS);
        t.engine.update_rate(asset_id, "100").unwrap();
        t.clock.advance_time(2 * Timestamp::HOUR_MS);
        assert_eq!(t.engine.update_rate(asset_id, "110").unwrap().quote.change, dec!(37.5));

        // the 80 sample falls out of the window, 100 is now the oldest
        t.clock.advance_time(4 * Timestamp::HOUR_MS);
        assert_eq!(t.engine.update_rate(asset_id, "110").unwrap().quote.change, dec!(10));
    }

    #[test]
    fn sample_exactly_at_lookback_edge_is_ignored() {
        let (t, asset_id) = with_btc();
        t.engine.update_rate(asset_id, "80").unwrap();
        t.clock.advance_time(24 * Timestamp::HOUR_MS);
        assert_eq!(t.engine.update_rate(asset_id, "100").unwrap().quote.change, dec!(0));
    }

    #[test]
    fn rate_too_large_to_spread_is_rejected() {
        let t = engine_with_member(dec!(1000));
        let asset_id = t
            .engine
            .register_asset(Asset::crypto("BTC").with_spread(dec!(1), dec!(1)))
            .unwrap();
        t.engine.update_rate(asset_id, "100").unwrap();

        let err = t
            .engine
            .update_rate(asset_id, "79228162514264337593543950335")
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_RATE");
        let asset = t.engine.asset(asset_id).unwrap();
        assert_eq!(asset.rate, dec!(100));
        assert_eq!(asset.rate_buy, dec!(101));
    }

    #[test]
    fn failed_pending_scan_still_reprices_open_orders() {
        let (t, asset_id) = with_btc();
        t.engine.update_rate(asset_id, "100").unwrap();
        let pending = t
            .engine
            .place_order(&OrderRequest::limit(t.member_id, asset_id, Side::Buy, dec!(1), dec!(95)))
            .unwrap();
        t.engine
            .place_order(&OrderRequest::market(t.member_id, asset_id, Side::Buy, dec!(1)))
            .unwrap();

        t.store.fail_next_order_scan();
        let update = t.engine.update_rate(asset_id, "94").unwrap();
        assert!(update.activated.is_empty());
        assert_eq!(update.profits_updated, 1);
        assert_eq!(t.engine.asset(asset_id).unwrap().rate, dec!(94));
        assert_eq!(t.engine.order(pending.id).unwrap().status, OrderStatus::Pending);

        // picked up on the next tick
        assert_eq!(t.engine.update_rate(asset_id, "94").unwrap().activated, vec![pending.id]);
    }

    #[test]
    fn halted_asset_rejects_rates() {
        let (t, asset_id) = with_btc();
        let mut asset = t.engine.asset(asset_id).unwrap();
        asset.active = false;
        t.engine.update_asset_settings(&asset).unwrap();
        assert_eq!(t.engine.update_rate(asset_id, "100").unwrap_err().code(), "TRADE_ASSET_NOT_TRADABLE");
    }

    #[test]
    fn limit_order_activates_when_mid_rate_crosses() {
        let (t, asset_id) = with_btc();
        t.engine.update_rate(asset_id, "100").unwrap();
        let order = t
            .engine
            .place_order(&OrderRequest::limit(t.member_id, asset_id, Side::Buy, dec!(2), dec!(95)))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(t.engine.member(t.member_id).unwrap().balance(Currency::Usd), dec!(810));
        assert_eq!(t.engine.wallet_balance(t.member_id, asset_id).unwrap(), dec!(0));

        let update = t.engine.update_rate(asset_id, "96").unwrap();
        assert!(update.activated.is_empty());

        let update = t.engine.update_rate(asset_id, "94").unwrap();
        assert_eq!(update.activated, vec![order.id]);
        assert_eq!(t.engine.order(order.id).unwrap().status, OrderStatus::Open);
        assert_eq!(t.engine.wallet_balance(t.member_id, asset_id).unwrap(), dec!(2));
        assert_eq!(t.engine.member(t.member_id).unwrap().balance(Currency::Usd), dec!(810));

        let kinds: Vec<_> = t
            .engine
            .history_for_member(t.member_id)
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![HistoryKind::Deposit, HistoryKind::OrderOpen, HistoryKind::OrderActivate]);
        assert_eq!(t.notifier.count(|n| matches!(n, Notification::OrderActivated(_))), 1);

        // later ticks do not activate it twice
        assert!(t.engine.update_rate(asset_id, "93").unwrap().activated.is_empty());
    }

    #[test]
    fn sell_limit_activates_on_the_way_up() {
        let (t, asset_id) = with_btc();
        t.engine.update_rate(asset_id, "100").unwrap();
        let order = t
            .engine
            .place_order(&OrderRequest::limit(t.member_id, asset_id, Side::Sell, dec!(1), dec!(105)))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        let update = t.engine.update_rate(asset_id, "105").unwrap();
        assert_eq!(update.activated, vec![order.id]);
        // sells never touch the wallet
        assert_eq!(t.engine.wallet_balance(t.member_id, asset_id).unwrap(), dec!(0));
    }

    #[test]
    fn open_orders_are_repriced_each_tick() {
        let (t, asset_id) = with_btc();
        t.engine.update_rate(asset_id, "100").unwrap();
        let order = t
            .engine
            .place_order(&OrderRequest::market(t.member_id, asset_id, Side::Buy, dec!(1)))
            .unwrap();
        assert_eq!(order.rate_entry, dec!(101));

        let update = t.engine.update_rate(asset_id, "110").unwrap();
        assert_eq!(update.profits_updated, 1);
        // closes at the sell rate 108.9
        assert_eq!(t.engine.order(order.id).unwrap().profit, dec!(7.9));
    }

    #[test]
    fn due_assets_respects_market_interval() {
        let (t, asset_id) = with_btc();
        let poller = PollerConfig::default();
        // no rate yet
        assert_eq!(t.engine.due_assets(&poller).unwrap().len(), 1);

        t.engine.update_rate(asset_id, "100").unwrap();
        assert!(t.engine.due_assets(&poller).unwrap().is_empty());

        t.clock.advance_time(poller.crypto_interval_secs as i64 * 1000);
        let due = t.engine.due_assets(&poller).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, asset_id);
    }
}
