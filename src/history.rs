// 9.0 history.rs: the audit ledger. one row per balance or wallet movement.
// rows are built here and appended by the store; nothing ever edits or deletes one.

use crate::order::Order;
use crate::types::{AssetId, Currency, HistoryId, MemberId, OrderId, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// What moved the money
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    OrderOpen,
    OrderActivate,
    OrderClose,
    OrderCancel,
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub member_id: MemberId,
    pub kind: HistoryKind,
    pub order_id: Option<OrderId>,
    pub asset_id: Option<AssetId>,
    pub currency: Currency,
    // signed balance change: negative is a debit
    pub amount: Decimal,
    pub amount_abs: Decimal,
    // signed asset wallet change
    pub qty: Decimal,
    pub profit: Decimal,
    pub balance_after: Decimal,
    pub created_at: Timestamp,
}

impl HistoryEntry {
    fn base(
        member_id: MemberId,
        kind: HistoryKind,
        currency: Currency,
        amount: Decimal,
        balance_after: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: HistoryId(0),
            member_id,
            kind,
            order_id: None,
            asset_id: None,
            currency,
            amount,
            amount_abs: amount.abs(),
            qty: Decimal::ZERO,
            profit: Decimal::ZERO,
            balance_after,
            created_at: timestamp,
        }
    }

    fn for_order(
        order: &Order,
        kind: HistoryKind,
        amount: Decimal,
        qty: Decimal,
        balance_after: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            order_id: Some(order.id),
            asset_id: Some(order.asset_id),
            qty,
            ..Self::base(order.member_id, kind, order.currency, amount, balance_after, timestamp)
        }
    }

    // 9.1: opening debits the balance cost. buys that open immediately also get the asset.
    pub fn order_opened(order: &Order, balance_after: Decimal, timestamp: Timestamp) -> Self {
        let qty = if order.is_open() && order.side == Side::Buy {
            order.qty
        } else {
            Decimal::ZERO
        };
        Self::for_order(order, HistoryKind::OrderOpen, -order.total, qty, balance_after, timestamp)
    }

    /// Pending limit order filled. No money moves, a buy receives its quantity.
    pub fn order_activated(order: &Order, balance_after: Decimal, timestamp: Timestamp) -> Self {
        let qty = match order.side {
            Side::Buy => order.qty,
            Side::Sell => Decimal::ZERO,
        };
        Self::for_order(order, HistoryKind::OrderActivate, Decimal::ZERO, qty, balance_after, timestamp)
    }

    pub fn order_cancelled(order: &Order, balance_after: Decimal, timestamp: Timestamp) -> Self {
        Self::for_order(order, HistoryKind::OrderCancel, order.total, Decimal::ZERO, balance_after, timestamp)
    }

    // 9.2: closing returns total plus realized profit; buys hand the asset back.
    pub fn order_closed(order: &Order, balance_after: Decimal, timestamp: Timestamp) -> Self {
        let qty = match order.side {
            Side::Buy => -order.qty,
            Side::Sell => Decimal::ZERO,
        };
        let mut entry = Self::for_order(
            order,
            HistoryKind::OrderClose,
            order.total + order.profit,
            qty,
            balance_after,
            timestamp,
        );
        entry.profit = order.profit;
        entry
    }

    pub fn deposit(
        member_id: MemberId,
        currency: Currency,
        amount: Decimal,
        balance_after: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self::base(member_id, HistoryKind::Deposit, currency, amount, balance_after, timestamp)
    }

    pub fn withdrawal(
        member_id: MemberId,
        currency: Currency,
        amount: Decimal,
        balance_after: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self::base(member_id, HistoryKind::Withdrawal, currency, -amount, balance_after, timestamp)
    }
}

/// Net balance change per currency over a set of rows.
pub fn net_flows(entries: &[HistoryEntry]) -> BTreeMap<Currency, Decimal> {
    let mut flows = BTreeMap::new();
    for entry in entries {
        *flows.entry(entry.currency).or_insert(Decimal::ZERO) += entry.amount;
    }
    flows
}

/// Net asset wallet change over a set of rows.
pub fn net_qty(entries: &[HistoryEntry], asset_id: AssetId) -> Decimal {
    entries
        .iter()
        .filter(|e| e.asset_id == Some(asset_id))
        .map(|e| e.qty)
        .sum()
}
