// brokerage-core: order execution and rate propagation for a retail brokerage.
// settlement-first architecture: every balance change is paired with a history row
// in the same transaction, and every settlement is guarded by a conditional write.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Side, OrderStatus, MarketClass, Leverage, Timestamp
//   2.x  order.rs: order aggregate, requests, entry condition, bulk filters
//   3.x  rate.rs: raw rate parsing, quote derivation, 24h change
//   4.x  pnl.rs: totals, forex pips, live profit and gain%
//   5.x  asset.rs: instruments and spread math
//   6.x  risk.rs: leverage caps, SL/TP ceilings, limit protection
//   7.x  config.rs: trading settings, feed, poller, TOML loading
//   8.x  engine/: core.rs 8.0-8.1, results.rs 8.0.2; orders, closing, profit, rates, alerts, ledger
//   9.x  history.rs: append-only audit ledger
//   10.0 store/mod.rs: persistence port
//   10.1 store/memory.rs: in-memory store
//   11.x events.rs: notifications for dashboards
//   12.x poller.rs: scheduled rate polling
//   13.x price_feed.rs: provider adapters, retry/timeout
//   member.rs, alert.rs, clock.rs: supporting records

// core trading modules
pub mod asset;
pub mod engine;
pub mod history;
pub mod member;
pub mod order;
pub mod pnl;
pub mod rate;
pub mod types;

// risk and alerting
pub mod alert;
pub mod risk;

// integration modules
pub mod clock;
pub mod config;
pub mod events;
pub mod poller;
pub mod price_feed;
pub mod store;

// re exports for convenience
pub use alert::{Alert, AlertDirection, AlertStatus};
pub use asset::Asset;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError, FeedConfig, LeverageCaps, PollerConfig, Settings, SettingsProvider, SharedSettings};
pub use engine::*;
pub use events::{BroadcastNotifier, Envelope, Notification, Notifier, RecordingNotifier};
pub use history::{HistoryEntry, HistoryKind};
pub use member::{Member, MemberError};
pub use order::{BulkFilter, ForexFields, Order, OrderRequest, TransitionError};
pub use poller::{PassReport, RatePoller};
pub use price_feed::{FeedError, HttpPriceFeed, PriceFeed, StaticFeed};
pub use rate::{RateError, RateQuote, RateSample};
pub use risk::RiskError;
pub use store::{MemoryStore, Store, StoreError, Transaction};
pub use types::*;
