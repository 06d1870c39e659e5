// 6.0 risk.rs: pre-trade guards. leverage caps, SL/TP ceilings, limit price protection.
// every check here runs before any state is touched.
// zero in any cap or allowance means "not configured".

use crate::asset::Asset;
use crate::config::Settings;
use crate::member::Member;
use crate::types::{Leverage, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskError {
    #[error("Leverage {requested} exceeds allowed {allowed}")]
    LeverageTooHigh { requested: Decimal, allowed: Decimal },

    #[error("Leverage {0} is below 1x")]
    LeverageTooLow(Decimal),

    #[error("Stop loss {requested}% outside allowed range (max {allowed:?})")]
    InvalidStopLoss { requested: Decimal, allowed: Option<Decimal> },

    #[error("Take profit {requested}% outside allowed range (max {allowed:?})")]
    InvalidTakeProfit { requested: Decimal, allowed: Option<Decimal> },

    #[error("Limit rate deviates {deviation}% against the member, protection is {limit}%")]
    MaxStopLoss { deviation: Decimal, limit: Decimal },

    #[error("Limit rate deviates {deviation}% in the member's favour, protection is {limit}%")]
    MaxTakeProfit { deviation: Decimal, limit: Decimal },
}

fn configured(value: Decimal) -> Option<Decimal> {
    (!value.is_zero()).then_some(value)
}

fn smallest(a: Option<Decimal>, b: Option<Decimal>) -> Option<Decimal> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Market-class default, with 1x when nothing is configured.
pub fn default_leverage(asset: &Asset, settings: &Settings) -> Leverage {
    Leverage::new(settings.leverage.for_class(asset.market)).unwrap_or(Leverage::ONE)
}

// 6.1: highest leverage this member may use on this asset
pub fn leverage_cap(asset: &Asset, member: &Member, settings: &Settings) -> Decimal {
    let asset_cap = configured(asset.leverage_allowed)
        .unwrap_or_else(|| default_leverage(asset, settings).value());
    match configured(member.leverage_allowed) {
        Some(member_cap) => asset_cap.min(member_cap),
        None => asset_cap,
    }
}

/// Forex always runs at the class default. Everything else uses what the
/// member asked for, 1x when nothing was asked, rejected above the cap.
pub fn resolve_leverage(
    requested: Option<Decimal>,
    asset: &Asset,
    member: &Member,
    settings: &Settings,
) -> Result<Leverage, RiskError> {
    if asset.market.is_forex() {
        return Ok(default_leverage(asset, settings));
    }

    let requested = match requested {
        Some(value) if !value.is_zero() => value,
        _ => return Ok(Leverage::ONE),
    };

    let leverage = Leverage::new(requested).ok_or(RiskError::LeverageTooLow(requested))?;
    let allowed = leverage_cap(asset, member, settings);
    if requested > allowed {
        return Err(RiskError::LeverageTooHigh { requested, allowed });
    }
    Ok(leverage)
}

/// Ceilings for member-set SL/TP: the smaller of member and system allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SltpCeiling {
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

pub fn max_allowed_sltp(member: &Member, settings: &Settings) -> SltpCeiling {
    SltpCeiling {
        stop_loss: smallest(
            configured(member.stop_loss_allowed),
            configured(settings.stop_loss_allowed),
        ),
        take_profit: smallest(
            configured(member.take_profit_allowed),
            configured(settings.take_profit_allowed),
        ),
    }
}

// 6.2: zero means unset and always passes
pub fn validate_sltp(
    stop_loss: Decimal,
    take_profit: Decimal,
    ceiling: SltpCeiling,
) -> Result<(), RiskError> {
    let out_of_range =
        |value: Decimal, max: Option<Decimal>| value < Decimal::ZERO || max.is_some_and(|m| value > m);

    if !stop_loss.is_zero() && out_of_range(stop_loss, ceiling.stop_loss) {
        return Err(RiskError::InvalidStopLoss {
            requested: stop_loss,
            allowed: ceiling.stop_loss,
        });
    }
    if !take_profit.is_zero() && out_of_range(take_profit, ceiling.take_profit) {
        return Err(RiskError::InvalidTakeProfit {
            requested: take_profit,
            allowed: ceiling.take_profit,
        });
    }
    Ok(())
}

/// SL/TP the auto-close check uses: the order's own value, else the system
/// protection default. Zero disables that side.
pub fn effective_sltp(order_stop_loss: Decimal, order_take_profit: Decimal, settings: &Settings) -> (Decimal, Decimal) {
    let stop_loss = configured(order_stop_loss).unwrap_or(settings.stop_loss_protection);
    let take_profit = configured(order_take_profit).unwrap_or(settings.take_profit_protection);
    (stop_loss, take_profit)
}

/// Whether an open order has moved far enough to be closed by the system.
pub fn sltp_triggered(
    gain: Decimal,
    profit_negative: bool,
    stop_loss: Decimal,
    take_profit: Decimal,
) -> bool {
    let moved = gain.abs();
    let stop_hit = !stop_loss.is_zero() && profit_negative && moved >= stop_loss;
    let take_hit = !take_profit.is_zero() && !profit_negative && moved >= take_profit;
    stop_hit || take_hit
}

/// Percent the limit rate sits away from the market rate. A ratio past the
/// decimal range saturates, so an absurd limit rate still reads as a huge deviation.
pub fn limit_deviation(rate_entry: Decimal, market_rate: Decimal) -> Decimal {
    if market_rate.is_zero() {
        return Decimal::ZERO;
    }
    rate_entry
        .checked_div(market_rate)
        .unwrap_or(Decimal::MAX)
        .saturating_mul(Decimal::ONE_HUNDRED)
        - Decimal::ONE_HUNDRED
}

// 6.3: a limit order far from the market would lock in a large swing the moment it fills.
// buying above market or selling below it is an instant loss (stop-loss protection),
// buying below or selling above an instant gain (take-profit protection).
pub fn check_limit_protection(
    side: Side,
    rate_entry: Decimal,
    market_rate: Decimal,
    settings: &Settings,
) -> Result<(), RiskError> {
    let deviation = limit_deviation(rate_entry, market_rate);
    let against_member = match side {
        Side::Buy => deviation > Decimal::ZERO,
        Side::Sell => deviation < Decimal::ZERO,
    };
    let in_favour = match side {
        Side::Buy => deviation < Decimal::ZERO,
        Side::Sell => deviation > Decimal::ZERO,
    };

    if let Some(limit) = configured(settings.stop_loss_protection) {
        if against_member && deviation.abs() > limit {
            return Err(RiskError::MaxStopLoss { deviation, limit });
        }
    }
    if let Some(limit) = configured(settings.take_profit_protection) {
        if in_favour && deviation.abs() > limit {
            return Err(RiskError::MaxTakeProfit { deviation, limit });
        }
    }
    Ok(())
}
