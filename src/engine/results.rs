// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::member::MemberError;
use crate::order::{Order, TransitionError};
use crate::rate::{RateError, RateQuote};
use crate::risk::RiskError;
use crate::store::StoreError;
use crate::types::{AlertId, AssetId, MemberId, OrderId};
use rust_decimal::Decimal;

/// What a close request did to the order.
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    /// Pending order cancelled, total refunded.
    Cancelled(Order),
    /// Open order closed, total plus profit credited.
    Closed(Order),
    /// Already terminal, or another writer settled it first. Nothing moved.
    Unchanged(Order),
}

impl CloseOutcome {
    pub fn order(&self) -> &Order {
        match self {
            CloseOutcome::Cancelled(order) | CloseOutcome::Closed(order) | CloseOutcome::Unchanged(order) => order,
        }
    }

    pub fn settled(&self) -> bool {
        !matches!(self, CloseOutcome::Unchanged(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BulkCloseReport {
    pub closed: Vec<OrderId>,
    pub cancelled: Vec<OrderId>,
    pub failed: Vec<(OrderId, EngineError)>,
}

/// Everything one rate tick did.
#[derive(Debug, Clone)]
pub struct RateUpdate {
    pub asset_id: AssetId,
    pub quote: RateQuote,
    pub sample_recorded: bool,
    pub activated: Vec<OrderId>,
    pub alerts_fired: Vec<AlertId>,
    pub profits_updated: usize,
    pub closed_by_system: Vec<OrderId>,
    // per-order failures; the tick itself still succeeded
    pub failures: Vec<(OrderId, EngineError)>,
}

impl RateUpdate {
    pub(super) fn new(asset_id: AssetId, quote: RateQuote, sample_recorded: bool) -> Self {
        Self {
            asset_id,
            quote,
            sample_recorded,
            activated: Vec::new(),
            alerts_fired: Vec::new(),
            profits_updated: 0,
            closed_by_system: Vec::new(),
            failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid quantity {0}")]
    InvalidQty(Decimal),

    #[error("Limit rate {0:?} must be positive")]
    InvalidPrice(Option<Decimal>),

    #[error("{0}")]
    Risk(#[from] RiskError),

    #[error("Balance {available} does not cover {required}")]
    InsufficientWallet { required: Decimal, available: Decimal },

    #[error("Asset {0:?} not found")]
    AssetNotFound(AssetId),

    #[error("Asset {0:?} is not tradable")]
    AssetNotTradable(AssetId),

    #[error("Member {0:?} not found")]
    MemberNotFound(MemberId),

    #[error("Order {0:?} not found")]
    OrderNotFound(OrderId),

    #[error("Rate error: {0}")]
    Rate(#[from] RateError),

    #[error("Alert price {0} must be positive")]
    AlertInvalidPrice(Decimal),

    #[error("Alert price {0} equals the current rate")]
    AlertRateTheSame(Decimal),

    #[error("{0}")]
    Balance(#[from] MemberError),

    #[error("Amount {0} must be positive")]
    InvalidAmount(Decimal),

    #[error("{0}")]
    Transition(#[from] TransitionError),

    // detail stays in the source and the logs, not the message
    #[error("Temporary failure, try again")]
    Store(#[source] StoreError),

    #[error("Temporary failure, try again")]
    Settings(#[source] ConfigError),
}

impl EngineError {
    /// Stable code shown to members.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidQty(_) => "INVALID_QTY",
            EngineError::InvalidPrice(_) => "TRADE_INVALID_PRICE",
            EngineError::Risk(risk) => match risk {
                RiskError::LeverageTooHigh { .. } | RiskError::LeverageTooLow(_) => "INVALID_LEVERAGE",
                RiskError::InvalidStopLoss { .. } => "INVALID_STOP_LOSS",
                RiskError::InvalidTakeProfit { .. } => "INVALID_TAKE_PROFIT",
                RiskError::MaxStopLoss { .. } => "MAX_STOP_LOSS",
                RiskError::MaxTakeProfit { .. } => "MAX_TAKE_PROFIT",
            },
            EngineError::InsufficientWallet { .. } => "TRADE_INSUFFICIENT_WALLET",
            EngineError::AssetNotFound(_) => "INVALID_ASSET",
            EngineError::AssetNotTradable(_) => "TRADE_ASSET_NOT_TRADABLE",
            EngineError::MemberNotFound(_) => "INVALID_MEMBER",
            EngineError::OrderNotFound(_) | EngineError::Transition(_) => "INVALID_TRADE",
            EngineError::Rate(RateError::Zero) => "RATE_IS_ZERO",
            EngineError::Rate(_) => "INVALID_RATE",
            EngineError::AlertInvalidPrice(_) => "ALERT_INVALID_PRICE",
            EngineError::AlertRateTheSame(_) => "ALERT_RATE_THE_SAME",
            EngineError::Balance(MemberError::InsufficientBalance { .. }) => "INSUFFICIENT_BALANCE",
            EngineError::Balance(MemberError::BalanceOverflow { .. }) => "INVALID_AMOUNT",
            EngineError::InvalidAmount(_) => "INVALID_AMOUNT",
            EngineError::Store(_) | EngineError::Settings(_) => "TRY_AGAIN",
        }
    }

    /// Transient failures. Everything else is a rejection that will not change on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Store(_) | EngineError::Settings(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        tracing::warn!(error = %e, "store failure");
        EngineError::Store(e)
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        tracing::warn!(error = %e, "settings unavailable");
        EngineError::Settings(e)
    }
}
