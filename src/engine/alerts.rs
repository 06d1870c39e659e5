//! Member price alerts.

use super::core::Engine;
use super::results::EngineError;
use crate::alert::{Alert, AlertDirection};
use crate::asset::Asset;
use crate::events::{AlertFiredEvent, Notification};
use crate::store::AlertFilter;
use crate::types::{AlertId, AssetId, MemberId, Timestamp};
use rust_decimal::Decimal;
use tracing::info;

impl Engine {
    /// Watches `price` on the asset. The direction comes from where the price
    /// sits against the current rate.
    pub fn create_alert(&self, member_id: MemberId, asset_id: AssetId, price: Decimal) -> Result<Alert, EngineError> {
        if price <= Decimal::ZERO {
            return Err(EngineError::AlertInvalidPrice(price));
        }
        let now = self.clock.now();
        let mut tx = self.begin()?;
        if tx.member(member_id)?.is_none() {
            return Err(EngineError::MemberNotFound(member_id));
        }
        let asset = tx.asset(asset_id)?.ok_or(EngineError::AssetNotFound(asset_id))?;
        if asset.rate.is_zero() {
            return Err(EngineError::AssetNotTradable(asset_id));
        }
        let direction = AlertDirection::classify(price, asset.rate).ok_or(EngineError::AlertRateTheSame(price))?;

        let mut alert = Alert::new(member_id, asset_id, price, direction, now);
        alert.id = tx.insert_alert(alert.clone())?;
        tx.commit()?;

        info!(alert_id = alert.id.0, member_id = member_id.0, %price, ?direction, "alert created");
        Ok(alert)
    }

    /// Stamps every fired, unseen alert of the member. Returns how many.
    pub fn mark_alerts_seen(&self, member_id: MemberId) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let mut tx = self.begin()?;
        let mut seen = 0;
        for mut alert in tx.alerts(&AlertFilter::member(member_id))? {
            if alert.mark_seen(now) {
                tx.update_alert(&alert)?;
                seen += 1;
            }
        }
        tx.commit()?;
        Ok(seen)
    }

    // alerts move no money, so one transaction covers the whole asset
    pub(super) fn fire_alerts(&self, asset: &Asset, now: Timestamp) -> Result<Vec<AlertId>, EngineError> {
        let mut tx = self.begin()?;
        let mut fired = Vec::new();
        for mut alert in tx.alerts(&AlertFilter::active_on(asset.id))? {
            if alert.should_fire(asset.rate) && alert.fire(asset.rate, now) {
                tx.update_alert(&alert)?;
                fired.push(alert);
            }
        }
        if fired.is_empty() {
            return Ok(Vec::new());
        }
        tx.commit()?;

        for alert in &fired {
            info!(alert_id = alert.id.0, member_id = alert.member_id.0, rate = %asset.rate, "alert fired");
            self.publish(Notification::AlertFired(AlertFiredEvent {
                alert_id: alert.id,
                member_id: alert.member_id,
                asset_id: alert.asset_id,
                price: alert.price,
                rate: asset.rate,
            }));
        }
        Ok(fired.into_iter().map(|a| a.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{engine_with_member, TestEngine};
    use super::*;
    use crate::alert::AlertStatus;
    use rust_decimal_macros::dec;

    fn with_btc_at(rate: &str) -> (TestEngine, AssetId) {
        let t = engine_with_member(dec!(0));
        let asset_id = t.engine.register_asset(Asset::crypto("BTC")).unwrap();
        t.engine.update_rate(asset_id, rate).unwrap();
        (t, asset_id)
    }

    #[test]
    fn direction_follows_current_rate() {
        let (t, asset_id) = with_btc_at("100");
        let up = t.engine.create_alert(t.member_id, asset_id, dec!(120)).unwrap();
        let down = t.engine.create_alert(t.member_id, asset_id, dec!(80)).unwrap();
        assert_eq!(up.direction, AlertDirection::Higher);
        assert_eq!(down.direction, AlertDirection::Lower);
        assert_eq!(t.engine.alerts_for_member(t.member_id).unwrap().len(), 2);
    }

    #[test]
    fn invalid_alerts_rejected() {
        let (t, asset_id) = with_btc_at("100");
        assert_eq!(
            t.engine.create_alert(t.member_id, asset_id, dec!(0)).unwrap_err().code(),
            "ALERT_INVALID_PRICE"
        );
        assert_eq!(
            t.engine.create_alert(t.member_id, asset_id, dec!(100)).unwrap_err().code(),
            "ALERT_RATE_THE_SAME"
        );
        assert_eq!(
            t.engine.create_alert(t.member_id, AssetId(777), dec!(5)).unwrap_err().code(),
            "INVALID_ASSET"
        );
        assert!(t.engine.alerts_for_member(t.member_id).unwrap().is_empty());
    }

    #[test]
    fn alerts_fire_once_from_their_side() {
        let (t, asset_id) = with_btc_at("100");
        let up = t.engine.create_alert(t.member_id, asset_id, dec!(110)).unwrap();
        let down = t.engine.create_alert(t.member_id, asset_id, dec!(90)).unwrap();

        // nothing crossed
        assert!(t.engine.update_rate(asset_id, "105").unwrap().alerts_fired.is_empty());

        assert_eq!(t.engine.update_rate(asset_id, "111").unwrap().alerts_fired, vec![up.id]);
        assert!(t.engine.update_rate(asset_id, "112").unwrap().alerts_fired.is_empty());

        assert_eq!(t.engine.update_rate(asset_id, "90").unwrap().alerts_fired, vec![down.id]);

        let alerts = t.engine.alerts_for_member(t.member_id).unwrap();
        assert!(alerts.iter().all(|a| a.status == AlertStatus::Fired));
        assert_eq!(alerts[0].fired_rate, Some(dec!(111)));
        assert_eq!(t.notifier.count(|n| matches!(n, Notification::AlertFired(_))), 2);
    }

    #[test]
    fn seen_marks_only_fired_alerts() {
        let (t, asset_id) = with_btc_at("100");
        t.engine.create_alert(t.member_id, asset_id, dec!(101)).unwrap();
        t.engine.create_alert(t.member_id, asset_id, dec!(150)).unwrap();
        t.engine.update_rate(asset_id, "102").unwrap();

        assert_eq!(t.engine.mark_alerts_seen(t.member_id).unwrap(), 1);
        assert_eq!(t.engine.mark_alerts_seen(t.member_id).unwrap(), 0);
    }
}
