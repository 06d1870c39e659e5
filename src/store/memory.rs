// 10.1 store/memory.rs: in-memory store. transactions run one at a time on a private copy
// of the state, commit swaps the copy in. good enough for tests and the simulation.

use super::{AlertFilter, OrderFilter, Store, StoreError, StoreResult, Transaction};
use crate::alert::Alert;
use crate::asset::Asset;
use crate::history::HistoryEntry;
use crate::member::Member;
use crate::order::Order;
use crate::rate::RateSample;
use crate::types::{AlertId, AssetId, HistoryId, MemberId, OrderId, OrderStatus, Timestamp};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
struct State {
    assets: BTreeMap<AssetId, Asset>,
    members: BTreeMap<MemberId, Member>,
    wallets: HashMap<(MemberId, AssetId), Decimal>,
    orders: BTreeMap<OrderId, Order>,
    history: Vec<HistoryEntry>,
    alerts: BTreeMap<AlertId, Alert>,
    samples: BTreeMap<AssetId, Vec<RateSample>>,
    last_id: u64,
}

impl State {
    // one sequence for every table, ids start at 1
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    fail_history: AtomicBool,
    fail_order_scan: AtomicBool,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next history insert fails, rolling back whatever transaction it is in.
    pub fn fail_next_history_insert(&self) {
        self.fail_history.store(true, Ordering::SeqCst);
    }

    /// The next order listing fails.
    pub fn fail_next_order_scan(&self) {
        self.fail_order_scan.store(true, Ordering::SeqCst);
    }

    /// While set, `begin` fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn begin(&self) -> StoreResult<Box<dyn Transaction + '_>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        let guard = self.state.lock();
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            work,
            store: self,
        }))
    }
}

struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, State>,
    work: State,
    store: &'a MemoryStore,
}

impl Transaction for MemoryTransaction<'_> {
    fn asset(&self, id: AssetId) -> StoreResult<Option<Asset>> {
        Ok(self.work.assets.get(&id).cloned())
    }

    fn assets(&self) -> StoreResult<Vec<Asset>> {
        Ok(self.work.assets.values().cloned().collect())
    }

    fn insert_asset(&mut self, mut asset: Asset) -> StoreResult<AssetId> {
        let id = AssetId(self.work.next_id());
        asset.id = id;
        self.work.assets.insert(id, asset);
        Ok(id)
    }

    fn update_asset(&mut self, asset: &Asset) -> StoreResult<()> {
        match self.work.assets.get_mut(&asset.id) {
            Some(stored) => {
                *stored = asset.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("asset {}", asset.id.0))),
        }
    }

    fn member(&self, id: MemberId) -> StoreResult<Option<Member>> {
        Ok(self.work.members.get(&id).cloned())
    }

    fn insert_member(&mut self, mut member: Member) -> StoreResult<MemberId> {
        let id = MemberId(self.work.next_id());
        member.id = id;
        self.work.members.insert(id, member);
        Ok(id)
    }

    fn update_member(&mut self, member: &Member) -> StoreResult<()> {
        match self.work.members.get_mut(&member.id) {
            Some(stored) => {
                *stored = member.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("member {}", member.id.0))),
        }
    }

    fn wallet_balance(&self, member_id: MemberId, asset_id: AssetId) -> StoreResult<Decimal> {
        Ok(self
            .work
            .wallets
            .get(&(member_id, asset_id))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    fn adjust_wallet(
        &mut self,
        member_id: MemberId,
        asset_id: AssetId,
        delta: Decimal,
    ) -> StoreResult<Decimal> {
        let qty = self
            .work
            .wallets
            .entry((member_id, asset_id))
            .or_insert(Decimal::ZERO);
        *qty = qty
            .checked_add(delta)
            .ok_or_else(|| StoreError::Conflict(format!("wallet {}/{} out of range", member_id.0, asset_id.0)))?;
        Ok(*qty)
    }

    fn order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.work.orders.get(&id).cloned())
    }

    fn orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        if self.store.fail_order_scan.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order scan failed".to_string()));
        }
        Ok(self
            .work
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect())
    }

    fn insert_order(&mut self, mut order: Order) -> StoreResult<OrderId> {
        let id = OrderId(self.work.next_id());
        order.id = id;
        self.work.orders.insert(id, order);
        Ok(id)
    }

    fn update_order(&mut self, order: &Order, expected: OrderStatus) -> StoreResult<bool> {
        let stored = self
            .work
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order.id.0)))?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = order.clone();
        Ok(true)
    }

    fn insert_history(&mut self, mut entry: HistoryEntry) -> StoreResult<HistoryId> {
        if self.store.fail_history.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("history insert failed".to_string()));
        }
        let id = HistoryId(self.work.next_id());
        entry.id = id;
        self.work.history.push(entry);
        Ok(id)
    }

    fn history(&self, member_id: MemberId) -> StoreResult<Vec<HistoryEntry>> {
        Ok(self
            .work
            .history
            .iter()
            .filter(|e| e.member_id == member_id)
            .cloned()
            .collect())
    }

    fn alert(&self, id: AlertId) -> StoreResult<Option<Alert>> {
        Ok(self.work.alerts.get(&id).cloned())
    }

    fn alerts(&self, filter: &AlertFilter) -> StoreResult<Vec<Alert>> {
        Ok(self
            .work
            .alerts
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    fn insert_alert(&mut self, mut alert: Alert) -> StoreResult<AlertId> {
        let id = AlertId(self.work.next_id());
        alert.id = id;
        self.work.alerts.insert(id, alert);
        Ok(id)
    }

    fn update_alert(&mut self, alert: &Alert) -> StoreResult<()> {
        match self.work.alerts.get_mut(&alert.id) {
            Some(stored) => {
                *stored = alert.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("alert {}", alert.id.0))),
        }
    }

    fn rate_samples(&self, asset_id: AssetId, since: Timestamp) -> StoreResult<Vec<RateSample>> {
        Ok(self
            .work
            .samples
            .get(&asset_id)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.recorded_at > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn last_rate_sample(&self, asset_id: AssetId) -> StoreResult<Option<RateSample>> {
        Ok(self
            .work
            .samples
            .get(&asset_id)
            .and_then(|samples| samples.last().cloned()))
    }

    fn insert_rate_sample(&mut self, sample: RateSample) -> StoreResult<()> {
        let samples = self.work.samples.entry(sample.asset_id).or_default();
        // keep oldest-first even if a sample arrives out of order
        let at = samples.partition_point(|s| s.recorded_at <= sample.recorded_at);
        samples.insert(at, sample);
        Ok(())
    }

    fn prune_rate_samples(&mut self, before: Timestamp) -> StoreResult<usize> {
        let mut pruned = 0;
        for samples in self.work.samples.values_mut() {
            let len = samples.len();
            samples.retain(|s| s.recorded_at >= before);
            pruned += len - samples.len();
        }
        Ok(pruned)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, work, store } = *self;
        *guard = work;
        store.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
