// 4.0: order money math. pure functions, no I/O.
// 4.1 totals at entry, 4.2 forex pip fields, 4.3 live profit and gain%.
// every step is checked; a value past the decimal range is an error, never a panic.
//
// non-forex profit is leverage-amplified by multiplying twice after the
// balance cost was divided once. this matches how historic orders were
// settled and is pinned by tests; do not "fix" it without a migration.

use crate::asset::Asset;
use crate::order::{ForexFields, Order};
use crate::types::{Leverage, MarketClass, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Units in one standard forex lot.
pub const FOREX_LOT_UNITS: Decimal = dec!(100000);

/// Pip value per lot when the pair is quoted in USD.
pub const USD_PIP_VALUE_PER_LOT: Decimal = dec!(10);

/// An order value left the representable decimal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Order value out of range")]
pub struct PnlOverflow;

pub type PnlResult<T> = Result<T, PnlOverflow>;

// 4.1: real market value. forex qty is in lots.
pub fn total_real(market: MarketClass, qty: Decimal, rate_entry: Decimal) -> PnlResult<Decimal> {
    let real = if market.is_forex() {
        qty.checked_mul(FOREX_LOT_UNITS)
    } else {
        qty.checked_mul(rate_entry)
    };
    real.ok_or(PnlOverflow)
}

/// What the member's balance pays. Forex margin is carried by lot sizing so
/// nothing is divided out.
pub fn balance_cost(market: MarketClass, total_real: Decimal, leverage: Leverage) -> PnlResult<Decimal> {
    if market.is_forex() {
        Ok(total_real)
    } else {
        total_real.checked_div(leverage.value()).ok_or(PnlOverflow)
    }
}

// 4.2: pip fields known at entry. pip value depends on the closing rate so it starts at zero.
pub fn forex_entry(asset: &Asset, total_real: Decimal, rate_entry: Decimal) -> PnlResult<ForexFields> {
    let one_pip = asset.one_pip();
    Ok(ForexFields {
        one_pip,
        pips_entry: rate_entry.checked_div(one_pip).ok_or(PnlOverflow)?,
        pips_closed: None,
        pip_value: Decimal::ZERO,
        // display only
        forex_amount: total_real.checked_div(rate_entry).unwrap_or(Decimal::ZERO),
    })
}

/// Live valuation of an open order at the asset's current rates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitSnapshot {
    pub rate_closed: Decimal,
    pub profit: Decimal,
    pub profit_abs: Decimal,
    pub profit_negative: bool,
    pub gain: Decimal,
    pub pips_closed: Option<Decimal>,
    pub pip_value: Option<Decimal>,
}

impl ProfitSnapshot {
    pub fn apply(&self, order: &mut Order) {
        order.rate_closed = Some(self.rate_closed);
        order.profit = self.profit;
        order.profit_abs = self.profit_abs;
        order.profit_negative = self.profit_negative;
        order.gain = self.gain;
        if let Some(forex) = order.forex.as_mut() {
            forex.pips_closed = self.pips_closed;
            if let Some(pip_value) = self.pip_value {
                forex.pip_value = pip_value;
            }
        }
    }
}

// 4.3: profit if the order closed right now. Ok(None) for anything not open.
pub fn calculate_profit(order: &Order, asset: &Asset) -> PnlResult<Option<ProfitSnapshot>> {
    if !order.is_open() {
        return Ok(None);
    }

    let rate_closed = asset.closing_rate(order.side);
    let leverage = order.leverage.value();

    let (profit, pips_closed, pip_value) = match (&order.forex, asset.market.is_forex()) {
        (Some(forex), true) => {
            let (profit, pips_closed, pip_value) =
                forex_profit(order, forex, &asset.base_currency, rate_closed)?;
            (profit, Some(pips_closed), Some(pip_value))
        }
        _ => {
            let new_total = rate_closed
                .checked_mul(order.qty)
                .and_then(|value| value.checked_div(leverage))
                .ok_or(PnlOverflow)?;
            let delta = match order.side {
                Side::Buy => new_total.checked_sub(order.total),
                Side::Sell => order.total.checked_sub(new_total),
            }
            .ok_or(PnlOverflow)?;
            // once to restore the divided leverage, once to amplify
            let profit = delta
                .checked_mul(leverage)
                .and_then(|value| value.checked_mul(leverage))
                .ok_or(PnlOverflow)?;
            (profit, None, None)
        }
    };

    let mut gain = gain_percent(order.side, asset.rate, order.market_rate)?;
    if asset.market.is_forex() {
        gain = gain.checked_mul(leverage).ok_or(PnlOverflow)?;
    }

    Ok(Some(ProfitSnapshot {
        rate_closed,
        profit,
        profit_abs: profit.abs(),
        profit_negative: profit < Decimal::ZERO,
        gain,
        pips_closed,
        pip_value,
    }))
}

/// Returns (profit, pips at close, pip value).
pub fn forex_profit(
    order: &Order,
    forex: &ForexFields,
    base_currency: &str,
    rate_closed: Decimal,
) -> PnlResult<(Decimal, Decimal, Decimal)> {
    let pip_value = if base_currency.eq_ignore_ascii_case("USD") {
        USD_PIP_VALUE_PER_LOT.checked_mul(order.qty).ok_or(PnlOverflow)?
    } else if rate_closed.is_zero() {
        Decimal::ZERO
    } else {
        forex
            .one_pip
            .checked_div(rate_closed)
            .and_then(|per_unit| per_unit.checked_mul(order.total_real))
            .ok_or(PnlOverflow)?
    };

    let pips_closed = rate_closed.checked_div(forex.one_pip).ok_or(PnlOverflow)?;
    let earnings = pips_closed
        .checked_sub(forex.pips_entry)
        .and_then(|pips| pips.checked_mul(pip_value))
        .ok_or(PnlOverflow)?;
    let profit = match order.side {
        Side::Buy => earnings,
        Side::Sell => -earnings,
    };
    Ok((profit, pips_closed, pip_value))
}

/// Percent the asset moved since entry, from the member's side.
pub fn gain_percent(side: Side, current_rate: Decimal, market_rate_at_entry: Decimal) -> PnlResult<Decimal> {
    if market_rate_at_entry.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let raw = current_rate
        .checked_div(market_rate_at_entry)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|percent| percent.checked_sub(Decimal::ONE_HUNDRED))
        .ok_or(PnlOverflow)?;
    Ok(match side {
        Side::Buy => raw,
        Side::Sell => -raw,
    })
}
