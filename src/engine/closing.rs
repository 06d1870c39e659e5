//! Closing and cancelling orders.
//!
//! Every settlement goes through a conditional write on the order's status,
//! so a member close racing an SL/TP close settles the order exactly once.
//! The loser sees `CloseOutcome::Unchanged` and moves no money.

use super::core::Engine;
use super::orders::order_event;
use super::results::{BulkCloseReport, CloseOutcome, EngineError};
use crate::events::{BalanceEvent, Notification};
use crate::history::HistoryEntry;
use crate::member::MemberError;
use crate::order::{BulkFilter, Order};
use crate::pnl::calculate_profit;
use crate::store::{OrderFilter, Transaction};
use crate::types::{MemberId, OrderId, OrderStatus, Side, Timestamp};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

impl Engine {
    /// Cancel a pending order or close an open one. Terminal orders are left alone.
    pub fn close_order(&self, member_id: MemberId, order_id: OrderId) -> Result<CloseOutcome, EngineError> {
        let now = self.clock.now();
        let mut tx = self.begin()?;
        let order = tx
            .order(order_id)?
            .filter(|o| o.member_id == member_id)
            .ok_or(EngineError::OrderNotFound(order_id))?;

        let outcome = self.settle(&mut *tx, order, false, now)?;
        tx.commit()?;

        self.announce(&outcome);
        Ok(outcome)
    }

    /// Close every matching order of the member, one transaction each.
    /// A failure on one order is recorded and the rest still close.
    pub fn close_bulk(&self, member_id: MemberId, filter: BulkFilter) -> Result<BulkCloseReport, EngineError> {
        let candidates: Vec<OrderId> = {
            let tx = self.begin()?;
            if tx.member(member_id)?.is_none() {
                return Err(EngineError::MemberNotFound(member_id));
            }
            tx.orders(&OrderFilter::member(member_id))?
                .into_iter()
                .filter(|o| filter.matches(o))
                .map(|o| o.id)
                .collect()
        };

        let mut report = BulkCloseReport::default();
        for order_id in candidates {
            match self.close_order(member_id, order_id) {
                Ok(CloseOutcome::Closed(_)) => report.closed.push(order_id),
                Ok(CloseOutcome::Cancelled(_)) => report.cancelled.push(order_id),
                Ok(CloseOutcome::Unchanged(_)) => {}
                Err(e) => {
                    warn!(order_id = order_id.0, error = %e, "bulk close skipped order");
                    report.failed.push((order_id, e));
                }
            }
        }

        info!(
            member_id = member_id.0,
            ?filter,
            closed = report.closed.len(),
            cancelled = report.cancelled.len(),
            failed = report.failed.len(),
            "bulk close"
        );
        Ok(report)
    }

    // dispatch on the status read inside this transaction
    pub(super) fn settle(
        &self,
        tx: &mut dyn Transaction,
        mut order: Order,
        by_system: bool,
        now: Timestamp,
    ) -> Result<CloseOutcome, EngineError> {
        match order.status {
            OrderStatus::Pending => self.cancel_pending(tx, order, now),
            OrderStatus::Open => {
                let asset = tx
                    .asset(order.asset_id)?
                    .filter(|a| a.rate > Decimal::ZERO)
                    .ok_or(EngineError::AssetNotFound(order.asset_id))?;
                let snapshot = calculate_profit(&order, &asset).map_err(|_| EngineError::InvalidQty(order.qty))?;
                if let Some(snapshot) = snapshot {
                    snapshot.apply(&mut order);
                }
                self.close_open(tx, order, by_system, now)
            }
            OrderStatus::Cancelled | OrderStatus::Closed => {
                debug!(order_id = order.id.0, status = %order.status, "close on terminal order ignored");
                Ok(CloseOutcome::Unchanged(order))
            }
        }
    }

    fn cancel_pending(
        &self,
        tx: &mut dyn Transaction,
        mut order: Order,
        now: Timestamp,
    ) -> Result<CloseOutcome, EngineError> {
        let expected = order.status;
        order.transition(OrderStatus::Cancelled)?;

        let mut member = tx
            .member(order.member_id)?
            .ok_or(EngineError::MemberNotFound(order.member_id))?;
        member.credit(order.currency, order.total)?;
        let balance = member.balance(order.currency);

        order.profit = Decimal::ZERO;
        order.profit_abs = Decimal::ZERO;
        order.profit_negative = false;
        order.balance_closed = Some(balance);
        order.closed_at = Some(now);

        if !tx.update_order(&order, expected)? {
            return self.lost_race(tx, order.id);
        }
        tx.update_member(&member)?;
        tx.insert_history(HistoryEntry::order_cancelled(&order, balance, now))?;
        Ok(CloseOutcome::Cancelled(order))
    }

    pub(super) fn close_open(
        &self,
        tx: &mut dyn Transaction,
        mut order: Order,
        by_system: bool,
        now: Timestamp,
    ) -> Result<CloseOutcome, EngineError> {
        let expected = order.status;
        order.transition(OrderStatus::Closed)?;

        let mut member = tx
            .member(order.member_id)?
            .ok_or(EngineError::MemberNotFound(order.member_id))?;
        let payout = order
            .total
            .checked_add(order.profit)
            .ok_or(MemberError::BalanceOverflow { currency: order.currency })?;
        member.credit(order.currency, payout)?;
        let balance = member.balance(order.currency);

        order.closed_by_system = by_system;
        order.balance_closed = Some(balance);
        order.closed_at = Some(now);

        if !tx.update_order(&order, expected)? {
            return self.lost_race(tx, order.id);
        }
        tx.update_member(&member)?;
        if order.side == Side::Buy {
            tx.adjust_wallet(order.member_id, order.asset_id, -order.qty)?;
        }
        tx.insert_history(HistoryEntry::order_closed(&order, balance, now))?;
        Ok(CloseOutcome::Closed(order))
    }

    fn lost_race(&self, tx: &mut dyn Transaction, order_id: OrderId) -> Result<CloseOutcome, EngineError> {
        let current = tx.order(order_id)?.ok_or(EngineError::OrderNotFound(order_id))?;
        debug!(order_id = order_id.0, status = %current.status, "order settled elsewhere first");
        Ok(CloseOutcome::Unchanged(current))
    }

    // after commit only
    pub(super) fn announce(&self, outcome: &CloseOutcome) {
        let (order, notification) = match outcome {
            CloseOutcome::Cancelled(order) => (order, Notification::OrderCancelled(order_event(order))),
            CloseOutcome::Closed(order) => (order, Notification::OrderClosed(order_event(order))),
            CloseOutcome::Unchanged(_) => return,
        };
        info!(
            order_id = order.id.0,
            member_id = order.member_id.0,
            status = %order.status,
            profit = %order.profit,
            by_system = order.closed_by_system,
            "order settled"
        );
        self.publish(notification);
        if let Some(balance) = order.balance_closed {
            self.publish(Notification::BalanceChanged(BalanceEvent {
                member_id: order.member_id,
                currency: order.currency,
                balance,
            }));
        }
    }
}
