//! Entry-signal classification from leaderboard snapshot history, plus the
//! conviction-based exit monitor.
//!
//! The classifier is a pure function of per-asset snapshot windows, so a
//! scan pass can be re-run after a transient failure without producing a
//! different answer for the same input.

pub mod classifier;
pub mod conviction;
pub mod history;

pub use classifier::{classify, ClassifierConfig, Signal, SignalCategory};
pub use conviction::{
    conviction_score, ConvictionConfig, ConvictionFeed, ConvictionMonitor, ConvictionSnapshot, ExitTrigger,
};
pub use history::SnapshotHistory;
