// 10.0: persistence port. the engine only ever talks to storage through a transaction.
// every logical step (debit + insert, status change + credit) is one begin..commit.
// dropping a transaction without commit discards everything it wrote.

mod memory;

pub use memory::MemoryStore;

use crate::alert::{Alert, AlertStatus};
use crate::asset::Asset;
use crate::history::HistoryEntry;
use crate::member::Member;
use crate::order::Order;
use crate::rate::RateSample;
use crate::types::{AlertId, AssetId, HistoryId, MemberId, OrderId, OrderStatus, Timestamp};
use rust_decimal::Decimal;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),
}

/// Equality filter over orders. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub member_id: Option<MemberId>,
    pub asset_id: Option<AssetId>,
    pub statuses: Vec<OrderStatus>,
}

impl OrderFilter {
    pub fn member(member_id: MemberId) -> Self {
        Self {
            member_id: Some(member_id),
            ..Self::default()
        }
    }

    pub fn asset(asset_id: AssetId) -> Self {
        Self {
            asset_id: Some(asset_id),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, statuses: &[OrderStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.member_id.map_or(true, |id| order.member_id == id)
            && self.asset_id.map_or(true, |id| order.asset_id == id)
            && (self.statuses.is_empty() || self.statuses.contains(&order.status))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    pub member_id: Option<MemberId>,
    pub asset_id: Option<AssetId>,
    pub status: Option<AlertStatus>,
}

impl AlertFilter {
    pub fn member(member_id: MemberId) -> Self {
        Self {
            member_id: Some(member_id),
            ..Self::default()
        }
    }

    /// Active alerts on one asset, the set a rate tick evaluates.
    pub fn active_on(asset_id: AssetId) -> Self {
        Self {
            asset_id: Some(asset_id),
            status: Some(AlertStatus::Active),
            ..Self::default()
        }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.member_id.map_or(true, |id| alert.member_id == id)
            && self.asset_id.map_or(true, |id| alert.asset_id == id)
            && self.status.map_or(true, |status| alert.status == status)
    }
}

pub trait Store: Send + Sync {
    fn begin(&self) -> StoreResult<Box<dyn Transaction + '_>>;
}

/// One atomic unit of work. Reads see this transaction's own writes.
pub trait Transaction {
    // Assets
    fn asset(&self, id: AssetId) -> StoreResult<Option<Asset>>;
    fn assets(&self) -> StoreResult<Vec<Asset>>;
    fn insert_asset(&mut self, asset: Asset) -> StoreResult<AssetId>;
    fn update_asset(&mut self, asset: &Asset) -> StoreResult<()>;

    // Members and wallets
    fn member(&self, id: MemberId) -> StoreResult<Option<Member>>;
    fn insert_member(&mut self, member: Member) -> StoreResult<MemberId>;
    fn update_member(&mut self, member: &Member) -> StoreResult<()>;
    fn wallet_balance(&self, member_id: MemberId, asset_id: AssetId) -> StoreResult<Decimal>;
    /// Adds `delta` to the wallet and returns the new quantity.
    fn adjust_wallet(
        &mut self,
        member_id: MemberId,
        asset_id: AssetId,
        delta: Decimal,
    ) -> StoreResult<Decimal>;

    // Orders
    fn order(&self, id: OrderId) -> StoreResult<Option<Order>>;
    fn orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;
    fn insert_order(&mut self, order: Order) -> StoreResult<OrderId>;
    /// Writes the order only if the stored status still equals `expected`.
    /// Returns false, writing nothing, when another writer got there first.
    fn update_order(&mut self, order: &Order, expected: OrderStatus) -> StoreResult<bool>;

    // History (append-only)
    fn insert_history(&mut self, entry: HistoryEntry) -> StoreResult<HistoryId>;
    fn history(&self, member_id: MemberId) -> StoreResult<Vec<HistoryEntry>>;

    // Alerts
    fn alert(&self, id: AlertId) -> StoreResult<Option<Alert>>;
    fn alerts(&self, filter: &AlertFilter) -> StoreResult<Vec<Alert>>;
    fn insert_alert(&mut self, alert: Alert) -> StoreResult<AlertId>;
    fn update_alert(&mut self, alert: &Alert) -> StoreResult<()>;

    // Rate samples, oldest first. `since` is exclusive.
    fn rate_samples(&self, asset_id: AssetId, since: Timestamp) -> StoreResult<Vec<RateSample>>;
    fn last_rate_sample(&self, asset_id: AssetId) -> StoreResult<Option<RateSample>>;
    fn insert_rate_sample(&mut self, sample: RateSample) -> StoreResult<()>;
    /// Drops samples recorded before `before`. Returns how many went.
    fn prune_rate_samples(&mut self, before: Timestamp) -> StoreResult<usize>;

    fn commit(self: Box<Self>) -> StoreResult<()>;
}
