//! Member accounts.
//!
//! A member holds one balance per settlement currency plus the admin-set
//! allowances that cap leverage and stop-loss/take-profit. Asset quantities
//! live in per-asset wallets kept by the store.

use crate::types::{Currency, MemberId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub balances: BTreeMap<Currency, Decimal>,
    /// Max leverage this member may request. Zero means no member cap.
    pub leverage_allowed: Decimal,
    /// Max stop-loss % for this member. Zero means use the system allowance.
    pub stop_loss_allowed: Decimal,
    /// Max take-profit % for this member. Zero means use the system allowance.
    pub take_profit_allowed: Decimal,
    pub created_at: Timestamp,
}

impl Member {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            id: MemberId(0),
            balances: BTreeMap::new(),
            leverage_allowed: Decimal::ZERO,
            stop_loss_allowed: Decimal::ZERO,
            take_profit_allowed: Decimal::ZERO,
            created_at: timestamp,
        }
    }

    pub fn with_leverage_allowed(mut self, leverage: Decimal) -> Self {
        self.leverage_allowed = leverage;
        self
    }

    pub fn with_sltp_allowed(mut self, stop_loss: Decimal, take_profit: Decimal) -> Self {
        self.stop_loss_allowed = stop_loss;
        self.take_profit_allowed = take_profit;
        self
    }

    pub fn balance(&self, currency: Currency) -> Decimal {
        self.balances.get(&currency).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn credit(&mut self, currency: Currency, amount: Decimal) -> Result<(), MemberError> {
        let balance = self
            .balance(currency)
            .checked_add(amount)
            .ok_or(MemberError::BalanceOverflow { currency })?;
        self.balances.insert(currency, balance);
        Ok(())
    }

    /// Debits without letting the balance go negative.
    pub fn debit(&mut self, currency: Currency, amount: Decimal) -> Result<(), MemberError> {
        let available = self.balance(currency);
        if amount > available {
            return Err(MemberError::InsufficientBalance {
                currency,
                requested: amount,
                available,
            });
        }
        self.balances.insert(currency, available - amount);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemberError {
    #[error("Insufficient {currency} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        currency: Currency,
        requested: Decimal,
        available: Decimal,
    },

    #[error("{currency} balance out of range")]
    BalanceOverflow { currency: Currency },
}
