//! Cadenced job runner over the shared position store.
//!
//! Five periodic jobs (signal scan, risk sweep, conviction check, health
//! audit, report) run on independent cadences and coordinate only through
//! the store's non-blocking per-position lease and the atomic slot ledger.
//! A job that finds a lease held skips that position for the cycle; nothing
//! ever blocks waiting on another job.

pub mod daemon;
pub mod jobs;
pub mod trade_log;

pub use daemon::{Daemon, DaemonCommand};
pub use jobs::Jobs;
pub use trade_log::TradeLog;
