// 8.0 engine/core.rs: main engine. holds the ports, owns no state of its own.
// every operation reads and writes through one store transaction and publishes after commit.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::alert::Alert;
use crate::asset::Asset;
use crate::clock::Clock;
use crate::config::{Settings, SettingsProvider};
use crate::events::Notifier;
use crate::events::Notification;
use crate::history::HistoryEntry;
use crate::member::Member;
use crate::order::Order;
use crate::rate::RateSample;
use crate::store::{AlertFilter, OrderFilter, Store, Transaction};
use crate::types::{AssetId, MemberId, OrderId, Timestamp};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/** 8.1: main engine struct. cheap to share behind an Arc */
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) store: Arc<dyn Store>,
    pub(super) settings: Arc<dyn SettingsProvider>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Store>,
        settings: Arc<dyn SettingsProvider>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            settings,
            notifier,
            clock,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn time(&self) -> Timestamp {
        self.clock.now()
    }

    // settings are re-read per operation, never cached
    pub(super) fn current_settings(&self) -> Result<Settings, EngineError> {
        Ok(self.settings.settings()?)
    }

    pub(super) fn begin(&self) -> Result<Box<dyn Transaction + '_>, EngineError> {
        Ok(self.store.begin()?)
    }

    pub(super) fn publish(&self, notification: Notification) {
        self.notifier
            .publish(&self.config.channel, self.clock.now(), notification);
    }

    pub fn register_asset(&self, mut asset: Asset) -> Result<AssetId, EngineError> {
        asset.updated = self.clock.now();
        let mut tx = self.begin()?;
        let id = tx.insert_asset(asset)?;
        tx.commit()?;
        info!(asset_id = id.0, "asset registered");
        Ok(id)
    }

    /// Replaces the asset's static fields (spreads, flags, leverage). Live rate
    /// fields are kept; only the rate engine writes those.
    pub fn update_asset_settings(&self, asset: &Asset) -> Result<Asset, EngineError> {
        let mut tx = self.begin()?;
        let stored = tx.asset(asset.id)?.ok_or(EngineError::AssetNotFound(asset.id))?;
        let updated = Asset {
            rate: stored.rate,
            rate_buy: stored.rate_buy,
            rate_sell: stored.rate_sell,
            change: stored.change,
            updated: stored.updated,
            ..asset.clone()
        };
        tx.update_asset(&updated)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Creates a member with no balance. Funds go in through `deposit`.
    pub fn create_member(&self, mut member: Member) -> Result<MemberId, EngineError> {
        member.balances.clear();
        member.created_at = self.clock.now();
        let mut tx = self.begin()?;
        let id = tx.insert_member(member)?;
        tx.commit()?;
        info!(member_id = id.0, "member created");
        Ok(id)
    }

    pub fn member(&self, member_id: MemberId) -> Result<Member, EngineError> {
        let tx = self.begin()?;
        tx.member(member_id)?.ok_or(EngineError::MemberNotFound(member_id))
    }

    pub fn asset(&self, asset_id: AssetId) -> Result<Asset, EngineError> {
        let tx = self.begin()?;
        tx.asset(asset_id)?.ok_or(EngineError::AssetNotFound(asset_id))
    }

    pub fn assets(&self) -> Result<Vec<Asset>, EngineError> {
        let tx = self.begin()?;
        Ok(tx.assets()?)
    }

    pub fn order(&self, order_id: OrderId) -> Result<Order, EngineError> {
        let tx = self.begin()?;
        tx.order(order_id)?.ok_or(EngineError::OrderNotFound(order_id))
    }

    pub fn orders_for_member(&self, member_id: MemberId) -> Result<Vec<Order>, EngineError> {
        let tx = self.begin()?;
        Ok(tx.orders(&OrderFilter::member(member_id))?)
    }

    pub fn history_for_member(&self, member_id: MemberId) -> Result<Vec<HistoryEntry>, EngineError> {
        let tx = self.begin()?;
        Ok(tx.history(member_id)?)
    }

    pub fn alerts_for_member(&self, member_id: MemberId) -> Result<Vec<Alert>, EngineError> {
        let tx = self.begin()?;
        Ok(tx.alerts(&AlertFilter::member(member_id))?)
    }

    pub fn wallet_balance(&self, member_id: MemberId, asset_id: AssetId) -> Result<Decimal, EngineError> {
        let tx = self.begin()?;
        Ok(tx.wallet_balance(member_id, asset_id)?)
    }

    /// Samples recorded after `since`, oldest first. Feeds performance charts.
    pub fn rate_history(&self, asset_id: AssetId, since: Timestamp) -> Result<Vec<RateSample>, EngineError> {
        let tx = self.begin()?;
        Ok(tx.rate_samples(asset_id, since)?)
    }

    /// Drops samples older than `retention_ms`.
    pub fn prune_rate_samples(&self, retention_ms: i64) -> Result<usize, EngineError> {
        let cutoff = self.clock.now().minus_millis(retention_ms);
        let mut tx = self.begin()?;
        let pruned = tx.prune_rate_samples(cutoff)?;
        tx.commit()?;
        if pruned > 0 {
            info!(pruned, "old rate samples pruned");
        }
        Ok(pruned)
    }
}
