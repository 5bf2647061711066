use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trailguard_core::{CloseReason, Direction, GatewayError};

pub use trailguard_core::ConvictionConfig;

/// Smart-money conviction reading for one asset, sampled independently of
/// the price-tick cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvictionSnapshot {
    pub asset: String,
    /// Direction the tracked cohort is leaning.
    pub direction: Direction,
    /// Cohort aggregate PnL on the asset, in percent.
    pub pnl_pct: f64,
    pub traders: u32,
    /// Share of the cohort near their peak position size, in percent.
    pub near_peak_pct: f64,
    /// Average fraction of peak size currently deployed, in percent.
    pub avg_at_peak: f64,
    pub timestamp: DateTime<Utc>,
}

/// Conviction score on a 0..=8 scale.
///
/// Profitability, breadth, and peak-positioning each contribute up to two
/// points; sustained deployment adds one.
pub fn conviction_score(snapshot: &ConvictionSnapshot) -> u8 {
    let mut score = 0u8;
    if snapshot.pnl_pct > 5.0 {
        score += 2;
    } else if snapshot.pnl_pct > 1.0 {
        score += 1;
    }
    if snapshot.traders > 100 {
        score += 2;
    } else if snapshot.traders > 30 {
        score += 1;
    }
    if snapshot.near_peak_pct > 50.0 {
        score += 2;
    } else if snapshot.near_peak_pct > 20.0 {
        score += 1;
    }
    if snapshot.avg_at_peak > 80.0 {
        score += 1;
    }
    score
}

/// Source of conviction readings, sampled on its own cadence.
#[async_trait]
pub trait ConvictionFeed: Send + Sync {
    /// Latest reading for one asset; `None` when the cohort is not tracking it.
    async fn conviction(&self, asset: &str) -> Result<Option<ConvictionSnapshot>, GatewayError>;
}

/// Why the monitor wants a position closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    /// The cohort flipped against the held direction with real weight.
    Flip { score: u8, traders: u32 },
    /// Conviction collapsed to zero while the position bleeds.
    DeadWeight { losing_minutes: i64 },
}

impl ExitTrigger {
    pub fn close_reason(&self) -> CloseReason {
        match self {
            ExitTrigger::Flip { .. } => CloseReason::ConvictionFlip,
            ExitTrigger::DeadWeight { .. } => CloseReason::DeadWeight,
        }
    }
}

/// Independent exit trigger from conviction data. The orchestrator feeds it
/// the held direction, current ROE, and how long ROE has been negative; the
/// monitor never touches position state itself.
pub struct ConvictionMonitor {
    config: ConvictionConfig,
}

impl ConvictionMonitor {
    pub fn new(config: ConvictionConfig) -> Self {
        Self { config }
    }

    pub fn assess(
        &self,
        held: Direction,
        snapshot: &ConvictionSnapshot,
        roe: Decimal,
        losing_since: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<ExitTrigger> {
        let score = conviction_score(snapshot);

        if snapshot.direction == held.opposite()
            && score >= self.config.flip_min_score
            && snapshot.traders >= self.config.flip_min_traders
        {
            return Some(ExitTrigger::Flip {
                score,
                traders: snapshot.traders,
            });
        }

        if score == 0 && roe < Decimal::ZERO {
            if let Some(since) = losing_since {
                let losing = now - since;
                if losing >= Duration::minutes(self.config.dead_weight_minutes) {
                    return Some(ExitTrigger::DeadWeight {
                        losing_minutes: losing.num_minutes(),
                    });
                }
            }
        }
        None
    }
}
