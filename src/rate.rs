// 3.0: rate derivation. turns a raw provider string into the asset's live quote.
// parse, round to the asset's scale, spread into buy/sell, 24h change against the day-ago sample.
// pure math only; the engine decides when to persist samples.

use crate::asset::Asset;
use crate::types::{AssetId, Timestamp};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("Cannot parse rate {0:?}")]
    Invalid(String),

    #[error("Rate {0} is negative")]
    Negative(Decimal),

    #[error("Rate is zero")]
    Zero,
}

/// One historical price point. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    pub asset_id: AssetId,
    pub rate: Decimal,
    pub recorded_at: Timestamp,
}

/** 3.1: everything the rate engine writes back onto the asset */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub rate: Decimal,
    pub rate_buy: Decimal,
    pub rate_sell: Decimal,
    pub change: Decimal,
}

impl RateQuote {
    pub fn apply(&self, asset: &mut Asset, timestamp: Timestamp) {
        asset.rate = self.rate;
        asset.rate_buy = self.rate_buy;
        asset.rate_sell = self.rate_sell;
        asset.change = self.change;
        asset.updated = timestamp;
    }
}

pub fn parse_rate(raw: &str) -> Result<Decimal, RateError> {
    let trimmed = raw.trim();
    let rate = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| RateError::Invalid(raw.to_string()))?;
    if rate.is_sign_negative() && !rate.is_zero() {
        return Err(RateError::Negative(rate));
    }
    if rate.is_zero() {
        return Err(RateError::Zero);
    }
    Ok(rate)
}

// 3.2: (rate / day_ago - 1) * 100, two decimals. no day-ago means no change.
// None only when the move is too large to represent.
pub fn change_percent(rate: Decimal, rate_day_ago: Option<Decimal>) -> Option<Decimal> {
    let Some(day_ago) = rate_day_ago.filter(|r| !r.is_zero()) else {
        return Some(Decimal::ZERO);
    };
    let change = rate
        .checked_div(day_ago)?
        .checked_sub(Decimal::ONE)?
        .checked_mul(Decimal::ONE_HUNDRED)?;
    Some(change.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Prices a parsed rate for the asset. Zero after rounding is rejected, and so is
/// a rate whose spread or change would leave the decimal range.
pub fn compute_quote(
    asset: &Asset,
    raw_rate: Decimal,
    rate_day_ago: Option<Decimal>,
) -> Result<RateQuote, RateError> {
    let rate = asset.round_rate(raw_rate);
    if rate.is_zero() {
        return Err(RateError::Zero);
    }
    let out_of_range = || RateError::Invalid(raw_rate.to_string());
    let (rate_buy, rate_sell) = asset.spread_rates(rate).ok_or_else(out_of_range)?;
    let change = change_percent(rate, rate_day_ago.or(Some(rate))).ok_or_else(out_of_range)?;
    Ok(RateQuote {
        rate,
        rate_buy,
        rate_sell,
        change,
    })
}

/// A new sample is kept only when the last one is older than the throttle window.
pub fn sample_due(last_sample_at: Option<Timestamp>, now: Timestamp, throttle_ms: i64) -> bool {
    match last_sample_at {
        Some(last) => now.as_millis() - last.as_millis() >= throttle_ms,
        None => true,
    }
}
