// 11.0: every committed state change worth showing on a dashboard produces a notification.
// published after commit, fire-and-forget. a lost notification never affects balances.

use crate::types::{AlertId, AssetId, Currency, MemberId, OrderId, OrderStatus, Side, Timestamp};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    // Price events
    Rate(RateEvent),

    // Trade events
    OrderOpened(OrderEvent),
    OrderActivated(OrderEvent),
    OrderClosed(OrderEvent),
    OrderCancelled(OrderEvent),

    // Member events
    AlertFired(AlertFiredEvent),
    BalanceChanged(BalanceEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEvent {
    pub asset_id: AssetId,
    pub ticker: String,
    pub rate: Decimal,
    pub rate_buy: Decimal,
    pub rate_sell: Decimal,
    pub change: Decimal,
    pub sentiment: i32,
    pub sentiment_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub member_id: MemberId,
    pub asset_id: AssetId,
    pub side: Side,
    pub status: OrderStatus,
    pub total: Decimal,
    pub profit: Decimal,
    pub closed_by_system: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertFiredEvent {
    pub alert_id: AlertId,
    pub member_id: MemberId,
    pub asset_id: AssetId,
    pub price: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub member_id: MemberId,
    pub currency: Currency,
    pub balance: Decimal,
}

/// A notification as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub timestamp: Timestamp,
    pub notification: Notification,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Pub/sub sink. Must not block and must not fail the caller.
pub trait Notifier: Send + Sync {
    fn publish(&self, channel: &str, timestamp: Timestamp, notification: Notification);
}

// 11.1: in-process fan-out. slow subscribers lag and drop, they never stall the engine.
#[derive(Debug)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Envelope>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, channel: &str, timestamp: Timestamp, notification: Notification) {
        let envelope = Envelope {
            channel: channel.to_string(),
            timestamp,
            notification,
        };
        // no subscribers is fine
        if self.sender.send(envelope).is_err() {
            tracing::trace!(channel, "notification dropped, no subscribers");
        }
    }
}

/// Keeps everything published. For tests and the simulation.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    envelopes: Mutex<Vec<Envelope>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.lock().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.envelopes
            .lock()
            .iter()
            .map(|e| e.notification.clone())
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        self.envelopes
            .lock()
            .iter()
            .filter(|e| predicate(&e.notification))
            .count()
    }

    pub fn clear(&self) {
        self.envelopes.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, channel: &str, timestamp: Timestamp, notification: Notification) {
        self.envelopes.lock().push(Envelope {
            channel: channel.to_string(),
            timestamp,
            notification,
        });
    }
}
