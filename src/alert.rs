//! Price alerts.
//!
//! A member watches a price on an asset. The alert remembers which side of
//! the market it was created on and fires once the rate reaches the price
//! from that side. Fired alerts are kept, never deleted.

use crate::types::{AlertId, AssetId, MemberId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which side of the current rate the alert price sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertDirection {
    /// Price is above the rate at creation. Fires on the way up.
    Higher,
    /// Price is below the rate at creation. Fires on the way down.
    Lower,
}

impl AlertDirection {
    /// None when the price equals the current rate.
    pub fn classify(price: Decimal, current_rate: Decimal) -> Option<Self> {
        if price > current_rate {
            Some(AlertDirection::Higher)
        } else if price < current_rate {
            Some(AlertDirection::Lower)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Fired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub member_id: MemberId,
    pub asset_id: AssetId,
    pub price: Decimal,
    pub direction: AlertDirection,
    pub status: AlertStatus,
    /// Rate that fired the alert.
    pub fired_rate: Option<Decimal>,
    pub fired_at: Option<Timestamp>,
    /// When the member saw the fired alert.
    pub seen_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Alert {
    pub fn new(
        member_id: MemberId,
        asset_id: AssetId,
        price: Decimal,
        direction: AlertDirection,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: AlertId(0),
            member_id,
            asset_id,
            price,
            direction,
            status: AlertStatus::Active,
            fired_rate: None,
            fired_at: None,
            seen_at: None,
            created_at: timestamp,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Whether the new rate reached the alert price from the side it was set on.
    pub fn should_fire(&self, new_rate: Decimal) -> bool {
        if !self.is_active() {
            return false;
        }
        match self.direction {
            AlertDirection::Higher => new_rate >= self.price,
            AlertDirection::Lower => new_rate <= self.price,
        }
    }

    /// Marks the alert fired. Returns false if it already was.
    pub fn fire(&mut self, new_rate: Decimal, timestamp: Timestamp) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = AlertStatus::Fired;
        self.fired_rate = Some(new_rate);
        self.fired_at = Some(timestamp);
        true
    }

    pub fn mark_seen(&mut self, timestamp: Timestamp) -> bool {
        if self.status != AlertStatus::Fired || self.seen_at.is_some() {
            return false;
        }
        self.seen_at = Some(timestamp);
        true
    }
}
