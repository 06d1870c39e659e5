// 2.0: the order aggregate. one row per member trade, carrying everything needed to
// price, settle and display it. forex-only fields live in their own sub-struct.
// 2.1: state transitions are guarded here and again by the store's conditional write.

use crate::types::{
    AssetId, Currency, Leverage, MemberId, OrderId, OrderKind, OrderStatus, Side, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a member submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub member_id: MemberId,
    pub asset_id: AssetId,
    pub side: Side,
    pub kind: OrderKind,
    /// Member's limit rate. Ignored for market orders.
    pub rate: Option<Decimal>,
    pub qty: Decimal,
    /// Percent. Zero means not set.
    pub stop_loss: Decimal,
    /// Percent. Zero means not set.
    pub take_profit: Decimal,
    /// None or zero means 1x. Ignored for forex.
    pub leverage: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(member_id: MemberId, asset_id: AssetId, side: Side, qty: Decimal) -> Self {
        Self {
            member_id,
            asset_id,
            side,
            kind: OrderKind::Market,
            rate: None,
            qty,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            leverage: None,
        }
    }

    pub fn limit(
        member_id: MemberId,
        asset_id: AssetId,
        side: Side,
        qty: Decimal,
        rate: Decimal,
    ) -> Self {
        Self {
            kind: OrderKind::Limit,
            rate: Some(rate),
            ..Self::market(member_id, asset_id, side, qty)
        }
    }

    pub fn with_leverage(mut self, leverage: Decimal) -> Self {
        self.leverage = Some(leverage);
        self
    }

    pub fn with_sltp(mut self, stop_loss: Decimal, take_profit: Decimal) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }
}

/// Pip bookkeeping for forex orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForexFields {
    pub one_pip: Decimal,
    pub pips_entry: Decimal,
    pub pips_closed: Option<Decimal>,
    pub pip_value: Decimal,
    /// Display only: units of the pair bought or sold.
    pub forex_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub member_id: MemberId,
    pub asset_id: AssetId,
    pub kind: OrderKind,
    pub side: Side,
    pub currency: Currency,
    pub member_rate: Option<Decimal>,
    /// Side rate of the asset when the order was created.
    pub market_rate: Decimal,
    pub rate_entry: Decimal,
    pub rate_closed: Option<Decimal>,
    pub qty: Decimal,
    pub leverage: Leverage,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Unleveraged market value.
    pub total_real: Decimal,
    /// What the member's balance paid.
    pub total: Decimal,
    pub balance_entry: Decimal,
    pub balance_closed: Option<Decimal>,
    pub profit: Decimal,
    pub profit_abs: Decimal,
    pub profit_negative: bool,
    /// Unleveraged % move of the asset since entry (leveraged for forex).
    pub gain: Decimal,
    pub forex: Option<ForexFields>,
    pub status: OrderStatus,
    pub closed_by_system: bool,
    pub created_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// Moves along the state machine or refuses.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                order_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// A buy fills once the market is at or below the member's rate, a sell once
/// it is at or above.
pub fn entry_condition_met(side: Side, rate_entry: Decimal, market_rate: Decimal) -> bool {
    match side {
        Side::Buy => rate_entry >= market_rate,
        Side::Sell => rate_entry <= market_rate,
    }
}

/// Initial status of a new order.
pub fn initial_status(kind: OrderKind, side: Side, rate_entry: Decimal, market_rate: Decimal) -> OrderStatus {
    match kind {
        OrderKind::Market => OrderStatus::Open,
        OrderKind::Limit if entry_condition_met(side, rate_entry, market_rate) => OrderStatus::Open,
        OrderKind::Limit => OrderStatus::Pending,
    }
}

/// Which of a member's orders a bulk close touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkFilter {
    /// Open orders with negative profit.
    Losing,
    /// Open orders with positive profit.
    Winning,
    /// Every open and pending order.
    All,
}

impl BulkFilter {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            BulkFilter::Losing => order.is_open() && order.profit < Decimal::ZERO,
            BulkFilter::Winning => order.is_open() && order.profit > Decimal::ZERO,
            BulkFilter::All => order.is_open() || order.is_pending(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Order {order_id:?} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
}
