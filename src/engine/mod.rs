// 8.0: brokerage engine. prices and settles member orders against the live asset rates,
// applies provider rate ticks and everything that hangs off them (limit activation,
// alerts, SL/TP), and keeps every balance change paired with a history row.
// synchronous; all I/O goes through the store, settings and notifier ports.

mod alerts;
mod closing;
mod config;
mod core;
mod ledger;
mod orders;
mod profit;
mod rates;
mod results;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{BulkCloseReport, CloseOutcome, EngineError, RateUpdate};
