//! Tradable instruments.
//!
//! An asset carries its live mid rate plus the derived buy/sell rates members
//! trade at. The rate engine is the only writer of the rate fields; the order
//! engine reads them.

use crate::types::{AssetId, Currency, MarketClass, Side, Timestamp};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub market: MarketClass,
    pub ticker: String,
    pub title: String,
    /// Number of decimal places rates are rounded to.
    pub decimal_scale: u32,
    /// Percent of rate for most markets, flat pip amount for forex.
    pub buy_spread: Decimal,
    pub sell_spread: Decimal,
    pub rate: Decimal,
    pub rate_buy: Decimal,
    pub rate_sell: Decimal,
    /// 24h change in percent, two decimals.
    pub change: Decimal,
    /// Per-asset leverage cap. Zero falls back to the market class default.
    pub leverage_allowed: Decimal,
    pub tradable: bool,
    pub active: bool,
    /// Currency member balances are debited in.
    pub currency: Currency,
    /// Quote currency of a forex pair, drives pip value math.
    pub base_currency: String,
    pub pip_decimals: u32,
    /// Identifier at the upstream price provider, when it keys by id.
    pub provider_id: Option<String>,
    pub sentiment: i32,
    pub sentiment_type: String,
    pub updated: Timestamp,
}

impl Asset {
    pub fn new(market: MarketClass, ticker: &str, currency: Currency) -> Self {
        Self {
            id: AssetId(0),
            market,
            ticker: ticker.to_string(),
            title: ticker.to_string(),
            decimal_scale: if market.is_forex() { 5 } else { 2 },
            buy_spread: Decimal::ZERO,
            sell_spread: Decimal::ZERO,
            rate: Decimal::ZERO,
            rate_buy: Decimal::ZERO,
            rate_sell: Decimal::ZERO,
            change: Decimal::ZERO,
            leverage_allowed: Decimal::ZERO,
            tradable: true,
            active: true,
            currency,
            base_currency: currency.to_string(),
            pip_decimals: default_pip_decimals(ticker),
            provider_id: None,
            sentiment: 0,
            sentiment_type: String::new(),
            updated: Timestamp::from_millis(0),
        }
    }

    pub fn crypto(ticker: &str) -> Self {
        Self::new(MarketClass::Crypto, ticker, Currency::Usd)
    }

    pub fn stock(ticker: &str) -> Self {
        Self::new(MarketClass::Stock, ticker, Currency::Usd)
    }

    /// Forex pair such as "EURUSD". The last three letters are the quote
    /// currency used for pip value.
    pub fn forex(pair: &str) -> Self {
        let mut asset = Self::new(MarketClass::Forex, pair, Currency::Usd);
        // last three characters, cut on a char boundary
        if let Some((start, _)) = pair.char_indices().rev().nth(2).filter(|_| pair.chars().count() >= 6) {
            asset.base_currency = pair[start..].to_uppercase();
        }
        asset
    }

    pub fn with_spread(mut self, buy: Decimal, sell: Decimal) -> Self {
        self.buy_spread = buy;
        self.sell_spread = sell;
        self
    }

    pub fn with_scale(mut self, decimal_scale: u32) -> Self {
        self.decimal_scale = decimal_scale;
        self
    }

    pub fn with_leverage(mut self, leverage: Decimal) -> Self {
        self.leverage_allowed = leverage;
        self
    }

    /// Sets the mid rate and derives buy/sell from the configured spread.
    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.rate = self.round_rate(rate);
        // a spread past the decimal range leaves no spread
        let (buy, sell) = self.spread_rates(self.rate).unwrap_or((self.rate, self.rate));
        self.rate_buy = buy;
        self.rate_sell = sell;
        self
    }

    pub fn is_tradable(&self) -> bool {
        self.tradable && self.active && self.rate > Decimal::ZERO
    }

    pub fn round_rate(&self, rate: Decimal) -> Decimal {
        rate.round_dp_with_strategy(self.decimal_scale, RoundingStrategy::MidpointAwayFromZero)
    }

    // 5.1: forex spreads are flat pip amounts, everything else is percent of rate.
    // None when the spread rate does not fit in a decimal.
    pub fn spread_rates(&self, rate: Decimal) -> Option<(Decimal, Decimal)> {
        let (buy_markup, sell_markup) = if self.market.is_forex() {
            (self.buy_spread, self.sell_spread)
        } else {
            (
                rate.checked_mul(self.buy_spread)? / HUNDRED,
                rate.checked_mul(self.sell_spread)? / HUNDRED,
            )
        };
        let buy = rate.checked_add(buy_markup)?;
        let sell = rate.checked_sub(sell_markup)?;
        Some((self.round_rate(buy), self.round_rate(sell)))
    }

    /// Rate a new order on this side is priced at.
    pub fn market_rate(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.rate_buy,
            Side::Sell => self.rate_sell,
        }
    }

    /// Rate a position on this side is closed at: buys sell back, sells buy back.
    pub fn closing_rate(&self, side: Side) -> Decimal {
        self.market_rate(side.opposite())
    }

    pub fn one_pip(&self) -> Decimal {
        Decimal::new(1, self.pip_decimals)
    }
}

/// JPY-quoted pairs move in 0.01 steps, everything else in 0.0001.
pub fn default_pip_decimals(ticker: &str) -> u32 {
    if ticker.to_uppercase().ends_with("JPY") {
        2
    } else {
        4
    }
}
