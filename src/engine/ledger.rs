//! Member funding. Every balance change here pairs with a history row.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{BalanceEvent, Notification};
use crate::history::HistoryEntry;
use crate::types::{Currency, MemberId};
use rust_decimal::Decimal;
use tracing::info;

impl Engine {
    pub fn deposit(
        &self,
        member_id: MemberId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(amount));
        }
        let now = self.clock.now();
        let mut tx = self.begin()?;
        let mut member = tx
            .member(member_id)?
            .ok_or(EngineError::MemberNotFound(member_id))?;

        member.credit(currency, amount)?;
        let balance = member.balance(currency);
        tx.update_member(&member)?;
        tx.insert_history(HistoryEntry::deposit(member_id, currency, amount, balance, now))?;
        tx.commit()?;

        info!(member_id = member_id.0, %currency, %amount, %balance, "deposit");
        self.publish(Notification::BalanceChanged(BalanceEvent {
            member_id,
            currency,
            balance,
        }));
        Ok(balance)
    }

    // never lets the balance go negative
    pub fn withdraw(
        &self,
        member_id: MemberId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(amount));
        }
        let now = self.clock.now();
        let mut tx = self.begin()?;
        let mut member = tx
            .member(member_id)?
            .ok_or(EngineError::MemberNotFound(member_id))?;

        member.debit(currency, amount)?;
        let balance = member.balance(currency);
        tx.update_member(&member)?;
        tx.insert_history(HistoryEntry::withdrawal(member_id, currency, amount, balance, now))?;
        tx.commit()?;

        info!(member_id = member_id.0, %currency, %amount, %balance, "withdrawal");
        self.publish(Notification::BalanceChanged(BalanceEvent {
            member_id,
            currency,
            balance,
        }));
        Ok(balance)
    }
}
