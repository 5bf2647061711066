use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TrailguardError;

/// One profit-lock checkpoint in the tier ladder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierConfig {
    /// ROE (percent of margin) that enters this tier.
    pub trigger_pct: Decimal,
    /// Fraction of the entry-to-high-water gain locked by the floor, in percent.
    pub lock_pct: Decimal,
    /// Consecutive floor breaches that close the position from this tier.
    pub breaches_to_close: u32,
}

/// Entry-protection rule applied before any tier triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase1Config {
    /// Allowed adverse ROE retrace in percent; divided by leverage for price terms.
    pub retrace_threshold: Decimal,
    pub consecutive_breaches: u32,
    /// Hard cap: close if tier 1 was never reached within this many minutes.
    pub max_minutes: i64,
    /// Early cut: close after this many minutes if the peak was weak and fading.
    pub weak_peak_minutes: i64,
    /// Peak ROE below this counts as weak, in percent.
    pub weak_peak_roe: Decimal,
}

impl Default for Phase1Config {
    fn default() -> Self {
        Self {
            retrace_threshold: Decimal::from(5),
            consecutive_breaches: 3,
            max_minutes: 90,
            weak_peak_minutes: 45,
            weak_peak_roe: Decimal::from(3),
        }
    }
}

/// Closes winners whose high water stopped advancing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagnationConfig {
    pub enabled: bool,
    /// Only take profit via stagnation above this ROE, in percent.
    pub min_roe: Decimal,
    /// Minutes the high-water timestamp may sit still before closing.
    pub max_stale_minutes: i64,
}

impl Default for StagnationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_roe: Decimal::from(8),
            max_stale_minutes: 60,
        }
    }
}

/// How the breach counter recovers on a favorable tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreachDecay {
    /// Reset to zero.
    Hard,
    /// Decrement by one.
    Soft,
}

/// Immutable strategy parameters. Reloaded only on explicit reconfiguration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub strategy_id: String,
    pub wallet: String,
    pub budget: Decimal,
    pub slots: u32,
    pub margin_per_slot: Decimal,
    pub default_leverage: u8,
    pub max_leverage: u8,
    /// Daily-loss limit, negative, in account currency.
    pub daily_loss_limit: Decimal,
    /// Drawdown cap, negative, in account currency.
    pub drawdown_cap: Decimal,
    /// Ordered ladder, ascending trigger ROE.
    pub tiers: Vec<TierConfig>,
    pub phase1: Phase1Config,
    pub stagnation: StagnationConfig,
    pub breach_decay: BreachDecay,
    pub max_fetch_failures: u32,
    pub max_close_attempts: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            strategy_id: "wolf-dsl".to_string(),
            wallet: String::new(),
            budget: Decimal::from(6500),
            slots: 3,
            margin_per_slot: Decimal::from(1950),
            default_leverage: 10,
            max_leverage: 20,
            daily_loss_limit: Decimal::from(-975),
            drawdown_cap: Decimal::from(-1950),
            tiers: Self::default_tiers(),
            phase1: Phase1Config::default(),
            stagnation: StagnationConfig::default(),
            breach_decay: BreachDecay::Hard,
            max_fetch_failures: 10,
            max_close_attempts: 5,
        }
    }
}

impl StrategyConfig {
    /// The default ladder: 5%→lock 50%, 10%→65%, 15%→75%, 20%→85%.
    #[must_use]
    pub fn default_tiers() -> Vec<TierConfig> {
        [
            (5, 50, 3u32),
            (10, 65, 2),
            (15, 75, 2),
            (20, 85, 1),
        ]
        .into_iter()
        .map(|(trigger, lock, breaches)| TierConfig {
            trigger_pct: Decimal::from(trigger),
            lock_pct: Decimal::from(lock),
            breaches_to_close: breaches,
        })
        .collect()
    }

    /// Validates bounds that would otherwise corrupt risk math at runtime.
    ///
    /// # Errors
    ///
    /// Returns `TrailguardError::Configuration`; callers treat this as fatal.
    pub fn validate(&self) -> Result<(), TrailguardError> {
        if self.budget < Decimal::from(500) {
            return Err(TrailguardError::Configuration(format!(
                "budget {} below minimum 500",
                self.budget
            )));
        }
        if self.slots == 0 {
            return Err(TrailguardError::Configuration("slots must be >= 1".into()));
        }
        if self.default_leverage == 0 || self.default_leverage > self.max_leverage {
            return Err(TrailguardError::Configuration(format!(
                "default leverage {}x outside 1..={}x",
                self.default_leverage, self.max_leverage
            )));
        }
        if self.max_leverage > 50 {
            return Err(TrailguardError::Configuration(format!(
                "max leverage {}x above venue cap 50x",
                self.max_leverage
            )));
        }
        if self.margin_per_slot <= Decimal::ZERO {
            return Err(TrailguardError::Configuration(
                "margin per slot must be positive".into(),
            ));
        }
        if self.tiers.is_empty() {
            return Err(TrailguardError::Configuration("tier ladder is empty".into()));
        }
        let mut prev = Decimal::MIN;
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.trigger_pct <= prev {
                return Err(TrailguardError::Configuration(format!(
                    "tier {i} trigger {} not strictly ascending",
                    tier.trigger_pct
                )));
            }
            if tier.lock_pct <= Decimal::ZERO || tier.lock_pct > Decimal::from(100) {
                return Err(TrailguardError::Configuration(format!(
                    "tier {i} lock_pct {} outside (0, 100]",
                    tier.lock_pct
                )));
            }
            if tier.breaches_to_close == 0 {
                return Err(TrailguardError::Configuration(format!(
                    "tier {i} breaches_to_close must be >= 1"
                )));
            }
            prev = tier.trigger_pct;
        }
        if self.phase1.consecutive_breaches == 0 {
            return Err(TrailguardError::Configuration(
                "phase1 consecutive_breaches must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Job cadences in seconds. Jobs overlap in wall-clock time by design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    pub signal_scan_secs: u64,
    pub risk_sweep_secs: u64,
    pub conviction_check_secs: u64,
    pub health_audit_secs: u64,
    pub report_secs: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            signal_scan_secs: 60,
            risk_sweep_secs: 180,
            conviction_check_secs: 300,
            health_audit_secs: 600,
            report_secs: 900,
        }
    }
}

/// Classifier thresholds. Defaults follow the scan the system was tuned on:
/// a top-50 leaderboard sampled once a minute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Snapshots considered for erratic-history and velocity checks.
    pub lookback: usize,
    /// Minimum one-interval rank improvement that counts as a jump.
    pub jump_ranks: i64,
    /// A jump must start at or below this rank to count as deep.
    pub deep_rank: u32,
    /// Prior rank at or below which an asset counts as freshly surfaced.
    pub fresh_rank: u32,
    /// Top band that NEW_ENTRY_DEEP and DEEP_CLIMBER cross into.
    pub top_band: u32,
    /// Contribution multiple that fires CONTRIB_EXPLOSION.
    pub explosion_ratio: f64,
    /// Sign changes between consecutive rank deltas above this mark the
    /// history erratic.
    pub erratic_reversals: usize,
    /// Mean contribution gain per scan below this sets lowVelocity.
    pub velocity_floor: f64,
    /// Corroborating reasons DEEP_CLIMBER needs.
    pub min_reasons: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            lookback: 12,
            jump_ranks: 10,
            deep_rank: 25,
            fresh_rank: 30,
            top_band: 20,
            explosion_ratio: 3.0,
            erratic_reversals: 5,
            velocity_floor: 0.03,
            min_reasons: 3,
        }
    }
}

/// Conviction-monitor thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvictionConfig {
    /// Minimum opposing score that triggers a flip exit.
    pub flip_min_score: u8,
    /// Minimum opposing cohort size for a flip exit.
    pub flip_min_traders: u32,
    /// Minutes of zero conviction plus negative ROE before a dead-weight exit.
    pub dead_weight_minutes: i64,
}

impl Default for ConvictionConfig {
    fn default() -> Self {
        Self {
            flip_min_score: 4,
            flip_min_traders: 100,
            dead_weight_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub api_url: String,
    pub fetch_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.hyperliquid.xyz".to_string(),
            fetch_timeout_secs: 15,
        }
    }
}

/// Top-level application configuration. Every section falls back to its
/// defaults when the file omits it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailguardConfig {
    pub strategy: StrategyConfig,
    pub classifier: ClassifierConfig,
    pub conviction: ConvictionConfig,
    pub gateway: GatewayConfig,
    pub cadence: CadenceConfig,
}
