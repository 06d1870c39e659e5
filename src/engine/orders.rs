//! Order placement.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{BalanceEvent, Notification, OrderEvent};
use crate::history::HistoryEntry;
use crate::order::{initial_status, Order, OrderRequest};
use crate::pnl::{balance_cost, calculate_profit, forex_entry, total_real, PnlOverflow};
use crate::risk::{check_limit_protection, max_allowed_sltp, resolve_leverage, validate_sltp};
use crate::types::{OrderId, OrderKind, OrderStatus, Side};
use rust_decimal::Decimal;
use tracing::info;

impl Engine {
    /// Price, validate and open an order. Every check runs before anything is
    /// written; the debit, the order row, the wallet credit and the history row
    /// commit together.
    pub fn place_order(&self, request: &OrderRequest) -> Result<Order, EngineError> {
        if request.qty <= Decimal::ZERO {
            return Err(EngineError::InvalidQty(request.qty));
        }
        let member_rate = match request.kind {
            OrderKind::Market => None,
            OrderKind::Limit => match request.rate {
                Some(rate) if rate > Decimal::ZERO => Some(rate),
                other => return Err(EngineError::InvalidPrice(other)),
            },
        };

        let settings = self.current_settings()?;
        let now = self.clock.now();
        let mut tx = self.begin()?;

        let asset = tx
            .asset(request.asset_id)?
            .ok_or(EngineError::AssetNotFound(request.asset_id))?;
        if !asset.is_tradable() {
            return Err(EngineError::AssetNotTradable(asset.id));
        }
        let mut member = tx
            .member(request.member_id)?
            .ok_or(EngineError::MemberNotFound(request.member_id))?;

        let market_rate = asset.market_rate(request.side);
        let rate_entry = member_rate.unwrap_or(market_rate);

        let leverage = resolve_leverage(request.leverage, &asset, &member, &settings)?;
        validate_sltp(
            request.stop_loss,
            request.take_profit,
            max_allowed_sltp(&member, &settings),
        )?;

        // a quantity too large to price is as invalid as a negative one
        let overflow = |_: PnlOverflow| EngineError::InvalidQty(request.qty);
        let total_real = total_real(asset.market, request.qty, rate_entry).map_err(overflow)?;
        let total = balance_cost(asset.market, total_real, leverage).map_err(overflow)?;
        let forex = asset
            .market
            .is_forex()
            .then(|| forex_entry(&asset, total_real, rate_entry))
            .transpose()
            .map_err(overflow)?;

        let balance_entry = member.balance(asset.currency);
        if total > balance_entry {
            return Err(EngineError::InsufficientWallet {
                required: total,
                available: balance_entry,
            });
        }

        let status = initial_status(request.kind, request.side, rate_entry, market_rate);
        if request.kind == OrderKind::Limit {
            check_limit_protection(request.side, rate_entry, market_rate, &settings)?;
        }

        member.debit(asset.currency, total)?;

        let mut order = Order {
            id: OrderId(0),
            member_id: member.id,
            asset_id: asset.id,
            kind: request.kind,
            side: request.side,
            currency: asset.currency,
            member_rate,
            market_rate,
            rate_entry,
            rate_closed: None,
            qty: request.qty,
            leverage,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            total_real,
            total,
            balance_entry,
            balance_closed: None,
            profit: Decimal::ZERO,
            profit_abs: Decimal::ZERO,
            profit_negative: false,
            gain: Decimal::ZERO,
            forex,
            status,
            closed_by_system: false,
            created_at: now,
            closed_at: None,
        };

        tx.update_member(&member)?;
        order.id = tx.insert_order(order.clone())?;
        if status == OrderStatus::Open && request.side == Side::Buy {
            tx.adjust_wallet(member.id, asset.id, request.qty)?;
        }
        let balance_after = member.balance(asset.currency);
        tx.insert_history(HistoryEntry::order_opened(&order, balance_after, now))?;

        // live P&L right away so a fresh order already shows its spread loss
        if let Some(snapshot) = calculate_profit(&order, &asset).map_err(overflow)? {
            snapshot.apply(&mut order);
            tx.update_order(&order, OrderStatus::Open)?;
        }

        tx.commit()?;

        info!(
            order_id = order.id.0,
            member_id = member.id.0,
            asset_id = asset.id.0,
            side = ?order.side,
            kind = ?order.kind,
            status = %order.status,
            total = %order.total,
            leverage = %order.leverage,
            "order placed"
        );

        self.publish(Notification::OrderOpened(order_event(&order)));
        self.publish(Notification::BalanceChanged(BalanceEvent {
            member_id: member.id,
            currency: asset.currency,
            balance: balance_after,
        }));

        Ok(order)
    }
}

pub(super) fn order_event(order: &Order) -> OrderEvent {
    OrderEvent {
        order_id: order.id,
        member_id: order.member_id,
        asset_id: order.asset_id,
        side: order.side,
        status: order.status,
        total: order.total,
        profit: order.profit,
        closed_by_system: order.closed_by_system,
    }
}
