use crate::error::GatewayError;
use crate::types::{Direction, MarketSnapshot, Position};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Isolated,
    Cross,
}

/// A position as the venue reports it: the orchestrator's ground truth
/// during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivePosition {
    pub asset: String,
    pub direction: Direction,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Execution venue collaborator. Open/close are idempotent at the call site:
/// `AlreadyClosed` responses are success, not retryable errors.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn open(
        &self,
        asset: &str,
        direction: Direction,
        margin: Decimal,
        leverage: u8,
        margin_mode: MarginMode,
    ) -> Result<Position, GatewayError>;

    async fn close(&self, asset: &str, reason: &str) -> Result<(), GatewayError>;

    async fn price(&self, asset: &str) -> Result<Decimal, GatewayError>;

    async fn positions(&self, wallet: &str) -> Result<Vec<LivePosition>, GatewayError>;
}

/// Periodic leaderboard snapshot source.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Current per-asset leaderboard, hottest first.
    async fn leaderboard(&self) -> Result<Vec<MarketSnapshot>, GatewayError>;
}

/// Best-effort outbound notifications. Failures are logged by callers and are
/// never fatal to the core.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Default notifier that writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        tracing::warn!("notify: {message}");
        Ok(())
    }
}
