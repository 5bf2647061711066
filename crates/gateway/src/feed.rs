use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use trailguard_core::{Direction, GatewayError, MarketDataFeed, MarketSnapshot};
use trailguard_signals::{ConvictionFeed, ConvictionSnapshot};

use crate::client::InfoClient;

/// Smart-money leaderboard feed.
///
/// Rows arrive hottest-first; the rank field is 1-based board position.
pub struct LeaderboardFeed {
    client: InfoClient,
    /// How many rows of the board to ingest per scan.
    depth: usize,
}

impl LeaderboardFeed {
    pub fn new(client: InfoClient) -> Self {
        Self { client, depth: 50 }
    }
}

#[async_trait]
impl MarketDataFeed for LeaderboardFeed {
    async fn leaderboard(&self) -> Result<Vec<MarketSnapshot>, GatewayError> {
        let response = self
            .client
            .info(json!({ "type": "smartMoneyLeaderboard" }))
            .await?;
        let rows = response
            .get("rows")
            .and_then(|r| r.as_array())
            .ok_or_else(|| GatewayError::Rejected("malformed leaderboard response".into()))?;

        let now = Utc::now();
        let mut snapshots = Vec::with_capacity(self.depth.min(rows.len()));
        for (i, row) in rows.iter().take(self.depth).enumerate() {
            match parse_row(row, i as u32 + 1, now) {
                Some(snapshot) => snapshots.push(snapshot),
                None => {
                    tracing::debug!(row = %row, "skipping malformed leaderboard row");
                }
            }
        }
        Ok(snapshots)
    }
}

fn parse_row(row: &serde_json::Value, fallback_rank: u32, now: DateTime<Utc>) -> Option<MarketSnapshot> {
    let asset = row.get("coin")?.as_str()?.to_string();
    let direction = match row.get("side").and_then(|s| s.as_str()) {
        Some("short") => Direction::Short,
        _ => Direction::Long,
    };
    Some(MarketSnapshot {
        asset,
        rank: row
            .get("rank")
            .and_then(serde_json::Value::as_u64)
            .map_or(fallback_rank, |r| r as u32),
        contribution: row
            .get("contribution")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0),
        traders: row
            .get("traders")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32,
        direction,
        price_chg_4h: row
            .get("priceChg4h")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0),
        timestamp: now,
    })
}

#[async_trait]
impl ConvictionFeed for LeaderboardFeed {
    async fn conviction(&self, asset: &str) -> Result<Option<ConvictionSnapshot>, GatewayError> {
        let response = self
            .client
            .info(json!({ "type": "smartMoneyPositions", "coin": asset }))
            .await?;
        let Some(flow) = response.get("flow") else {
            return Ok(None);
        };
        let direction = match flow.get("side").and_then(|s| s.as_str()) {
            Some("short") => Direction::Short,
            Some(_) => Direction::Long,
            None => return Ok(None),
        };
        Ok(Some(ConvictionSnapshot {
            asset: asset.to_string(),
            direction,
            pnl_pct: flow
                .get("pnlPct")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0),
            traders: flow
                .get("traders")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as u32,
            near_peak_pct: flow
                .get("nearPeakPct")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0),
            avg_at_peak: flow
                .get("avgAtPeak")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0),
            timestamp: Utc::now(),
        }))
    }
}
