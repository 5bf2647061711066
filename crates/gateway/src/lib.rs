//! Execution gateway and market-data feed implementations.
//!
//! `live` talks to the Hyperliquid HTTP API through a rate-limited client;
//! `paper` is a deterministic in-memory gateway used by tests and dry runs.

pub mod client;
pub mod feed;
pub mod live;
pub mod paper;

pub use client::InfoClient;
pub use feed::LeaderboardFeed;
pub use live::HyperliquidGateway;
pub use paper::{PaperGateway, StaticConviction, StaticFeed};
