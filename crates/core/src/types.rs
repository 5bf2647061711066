use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction for a leveraged perp position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short. Multiplies price-move percentages into ROE.
    #[must_use]
    pub fn sign(self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => -Decimal::ONE,
        }
    }

    #[must_use]
    pub const fn is_long(self) -> bool {
        matches!(self, Self::Long)
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// An open leveraged position as the orchestrator tracks it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub asset: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub leverage: u8,
    pub margin: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// Protective state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Entry protection: fixed floor derived from the entry price.
    Phase1,
    /// Profit locking: floor trails the high water through the tier ladder.
    Phase2,
    /// Retired. Records are kept for audit, never deleted.
    Closed,
}

/// Why a position was (or should be) closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    Phase1Breach,
    TierBreach,
    Stagnation,
    Phase1Timeout,
    WeakPeak,
    ConvictionFlip,
    DeadWeight,
    Rotation,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Phase1Breach => "PHASE1_BREACH",
            Self::TierBreach => "TIER_BREACH",
            Self::Stagnation => "STAGNATION",
            Self::Phase1Timeout => "PHASE1_TIMEOUT",
            Self::WeakPeak => "WEAK_PEAK",
            Self::ConvictionFlip => "CONVICTION_FLIP",
            Self::DeadWeight => "DEAD_WEIGHT",
            Self::Rotation => "ROTATION",
        };
        write!(f, "{s}")
    }
}

/// Mutable trailing-stop state, one per open position.
///
/// Mutated only by the trailing-stop engine while the orchestrator holds the
/// position's lease. `tier_index` and the floor move in one direction only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub phase: Phase,
    /// Index into the tier ladder; `None` until the first tier triggers.
    pub tier_index: Option<usize>,
    pub high_water: Decimal,
    pub hw_timestamp: DateTime<Utc>,
    pub floor_price: Decimal,
    pub breach_count: u32,
    /// Best ROE seen since entry, in percent of margin.
    pub peak_roe: Decimal,
    pub pending_close: bool,
    pub pending_reason: Option<CloseReason>,
    pub close_attempts: u32,
    pub consecutive_fetch_failures: u32,
    pub active: bool,
    /// Last applied tick, for idempotent replay of the same (price, timestamp).
    pub last_tick: Option<(Decimal, DateTime<Utc>)>,
}

impl RiskState {
    /// Seeds fresh state for a newly opened position.
    #[must_use]
    pub fn seed(entry_price: Decimal, floor_price: Decimal, opened_at: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Phase1,
            tier_index: None,
            high_water: entry_price,
            hw_timestamp: opened_at,
            floor_price,
            breach_count: 0,
            peak_roe: Decimal::ZERO,
            pending_close: false,
            pending_reason: None,
            close_attempts: 0,
            consecutive_fetch_failures: 0,
            active: true,
            last_tick: None,
        }
    }
}

/// One leaderboard observation for one asset. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub asset: String,
    /// 1-based concentration rank; lower is hotter.
    pub rank: u32,
    /// Share of top-trader gains attributed to this asset, in percent.
    pub contribution: f64,
    pub traders: u32,
    pub direction: Direction,
    pub price_chg_4h: f64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit record written when a position closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLogRecord {
    pub asset: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub reason: CloseReason,
    pub tier_reached: Option<usize>,
    pub duration_secs: i64,
    pub realized_pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}
