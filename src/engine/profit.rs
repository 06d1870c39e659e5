//! Live profit and the automatic SL/TP close.

use super::core::Engine;
use super::results::{CloseOutcome, EngineError};
use crate::config::Settings;
use crate::order::Order;
use crate::pnl::calculate_profit;
use crate::risk::{effective_sltp, sltp_triggered};
use crate::types::{OrderId, OrderStatus};
use tracing::info;

impl Engine {
    /// Re-prices one open order against its asset's current rates. Closes it
    /// when its stop-loss or take-profit is hit. Anything not open comes back
    /// unchanged.
    pub fn recalculate_profit(&self, order_id: OrderId) -> Result<CloseOutcome, EngineError> {
        let settings = self.current_settings()?;
        let order = self.order(order_id)?;
        self.evaluate_order(order, &settings)
    }

    // one transaction per order so a failure never spills into its neighbours
    pub(super) fn evaluate_order(&self, order: Order, settings: &Settings) -> Result<CloseOutcome, EngineError> {
        let now = self.clock.now();
        let mut tx = self.begin()?;

        // re-read: the copy we were handed may already be stale
        let Some(mut order) = tx.order(order.id)?.filter(Order::is_open) else {
            return Ok(CloseOutcome::Unchanged(order));
        };
        let asset = tx
            .asset(order.asset_id)?
            .ok_or(EngineError::AssetNotFound(order.asset_id))?;
        let snapshot = calculate_profit(&order, &asset).map_err(|_| EngineError::InvalidQty(order.qty))?;
        let Some(snapshot) = snapshot else {
            return Ok(CloseOutcome::Unchanged(order));
        };
        snapshot.apply(&mut order);

        let (stop_loss, take_profit) = effective_sltp(order.stop_loss, order.take_profit, settings);
        let hit = !order.profit_abs.is_zero()
            && sltp_triggered(order.gain, order.profit_negative, stop_loss, take_profit);

        if hit {
            info!(
                order_id = order.id.0,
                gain = %order.gain,
                %stop_loss,
                %take_profit,
                "sl/tp reached"
            );
            let outcome = self.close_open(&mut *tx, order, true, now)?;
            tx.commit()?;
            self.announce(&outcome);
            return Ok(outcome);
        }

        if !tx.update_order(&order, OrderStatus::Open)? {
            // settled by someone else since the re-read
            let current = tx.order(order.id)?.ok_or(EngineError::OrderNotFound(order.id))?;
            return Ok(CloseOutcome::Unchanged(current));
        }
        tx.commit()?;
        Ok(CloseOutcome::Unchanged(order))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::engine_with_member;
    use super::*;
    use crate::asset::Asset;
    use crate::order::OrderRequest;
    use crate::store::Store;
    use crate::types::{Currency, Side};
    use rust_decimal_macros::dec;

    #[test]
    fn profit_follows_the_rate() {
        let t = engine_with_member(dec!(1000));
        let asset_id = t.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();
        let order = t
            .engine
            .place_order(&OrderRequest::market(t.member_id, asset_id, Side::Sell, dec!(3)))
            .unwrap();

        let asset = t.engine.asset(asset_id).unwrap().with_rate(dec!(90));
        {
            let mut tx = t.store.begin().unwrap();
            tx.update_asset(&asset).unwrap();
            tx.commit().unwrap();
        }

        let outcome = t.engine.recalculate_profit(order.id).unwrap();
        assert!(!outcome.settled());
        let stored = t.engine.order(order.id).unwrap();
        assert_eq!(stored.profit, dec!(30));
        assert_eq!(stored.gain, dec!(10));
        assert_eq!(stored.rate_closed, Some(dec!(90)));
    }

    #[test]
    fn stop_loss_closes_by_system() {
        let t = engine_with_member(dec!(1000));
        let asset_id = t.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();
        let order = t
            .engine
            .place_order(
                &OrderRequest::market(t.member_id, asset_id, Side::Buy, dec!(1)).with_sltp(dec!(5), dec!(0)),
            )
            .unwrap();

        t.engine.update_rate(asset_id, "94").unwrap();

        let stored = t.engine.order(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Closed);
        assert!(stored.closed_by_system);
        assert_eq!(stored.profit, dec!(-6));
        assert_eq!(t.engine.member(t.member_id).unwrap().balance(Currency::Usd), dec!(994));
    }

    #[test]
    fn protection_default_applies_when_order_has_none() {
        let t = engine_with_member(dec!(1000));
        t.settings.update(|s| s.take_profit_protection = dec!(8)).unwrap();
        let asset_id = t.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();
        let order = t
            .engine
            .place_order(&OrderRequest::market(t.member_id, asset_id, Side::Buy, dec!(1)))
            .unwrap();

        t.engine.update_rate(asset_id, "107").unwrap();
        assert_eq!(t.engine.order(order.id).unwrap().status, OrderStatus::Open);

        t.engine.update_rate(asset_id, "108").unwrap();
        let stored = t.engine.order(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Closed);
        assert!(stored.closed_by_system);
    }

    #[test]
    fn pending_orders_are_not_priced() {
        let t = engine_with_member(dec!(1000));
        let asset_id = t.engine.register_asset(Asset::crypto("BTC").with_rate(dec!(100))).unwrap();
        let order = t
            .engine
            .place_order(&OrderRequest::limit(t.member_id, asset_id, Side::Buy, dec!(1), dec!(80)))
            .unwrap();
        let outcome = t.engine.recalculate_profit(order.id).unwrap();
        assert_eq!(outcome.order().status, OrderStatus::Pending);
        assert_eq!(outcome.order().profit, dec!(0));
    }
}
