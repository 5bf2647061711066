use serde::{Deserialize, Serialize};
use trailguard_core::{Direction, MarketSnapshot};

pub use trailguard_core::ClassifierConfig;

/// Entry-signal category, listed in priority order. Classification stops at
/// the first category whose conditions hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalCategory {
    /// Large one-interval rank jump from deep on the board by an asset that
    /// was absent or buried just before the jump.
    FirstJump,
    /// Contribution score multiplied while the asset is still ranked deep.
    ContribExplosion,
    /// Large one-interval rank jump by an asset that was already near the
    /// top recently.
    ImmediateMover,
    /// Steady climb crossing into the top band with corroborating evidence.
    DeepClimber,
    /// First-ever appearance, directly inside the top band.
    NewEntryDeep,
    None,
}

impl SignalCategory {
    pub fn is_entry(self) -> bool {
        self != SignalCategory::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalCategory::FirstJump => "FIRST_JUMP",
            SignalCategory::ContribExplosion => "CONTRIB_EXPLOSION",
            SignalCategory::ImmediateMover => "IMMEDIATE_MOVER",
            SignalCategory::DeepClimber => "DEEP_CLIMBER",
            SignalCategory::NewEntryDeep => "NEW_ENTRY_DEEP",
            SignalCategory::None => "NONE",
        }
    }
}

/// One classified asset from a scan pass. Ephemeral: produced per pass,
/// consumed once.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub asset: String,
    pub category: SignalCategory,
    pub direction: Direction,
    pub rank: u32,
    pub rank_delta: i64,
    pub velocity: f64,
    pub erratic: bool,
    pub low_velocity: bool,
    pub reasons: Vec<&'static str>,
}

/// Classify one asset from its snapshot window (oldest first, current last).
///
/// Pure function: identical windows always produce identical signals.
pub fn classify(config: &ClassifierConfig, window: &[MarketSnapshot]) -> Signal {
    let current = match window.last() {
        Some(snapshot) => snapshot,
        None => {
            return Signal {
                asset: String::new(),
                category: SignalCategory::None,
                direction: Direction::Long,
                rank: 0,
                rank_delta: 0,
                velocity: 0.0,
                erratic: false,
                low_velocity: true,
                reasons: Vec::new(),
            }
        }
    };
    let window = tail(window, config.lookback);
    let previous = (window.len() >= 2).then(|| &window[window.len() - 2]);

    let rank_delta = previous.map_or(0, |p| i64::from(p.rank) - i64::from(current.rank));
    let velocity = contribution_velocity(window);
    let low_velocity = velocity < config.velocity_floor;
    let erratic_full = reversal_count(window) > config.erratic_reversals;
    // The classified interval is excluded for jump and explosion categories.
    let erratic_excl =
        reversal_count(&window[..window.len() - 1]) > config.erratic_reversals;

    let reasons = corroborating_reasons(config, window, rank_delta, velocity);

    let jump = rank_delta >= config.jump_ranks
        && previous.is_some_and(|p| p.rank >= config.deep_rank);
    // Freshly surfaced: no history before the jump, or buried deep before it.
    let fresh = previous.is_some_and(|p| p.rank >= config.fresh_rank) || window.len() <= 2;

    let explosion = previous.is_some_and(|p| {
        p.contribution > f64::EPSILON
            && current.contribution >= p.contribution * config.explosion_ratio
    }) && current.rank >= config.top_band;

    let crossing_top = previous.is_some_and(|p| p.rank > config.top_band)
        && current.rank <= config.top_band;
    let climber = !low_velocity
        && !erratic_full
        && crossing_top
        && reasons.len() >= config.min_reasons;
    let brand_new_in_band = window.len() == 1 && current.rank <= config.top_band;

    let (category, erratic) = if jump && fresh {
        (SignalCategory::FirstJump, erratic_excl)
    } else if explosion {
        (SignalCategory::ContribExplosion, erratic_excl)
    } else if jump {
        if erratic_full || low_velocity {
            (SignalCategory::DeepClimber, erratic_full)
        } else {
            (SignalCategory::ImmediateMover, erratic_full)
        }
    } else if climber {
        (SignalCategory::DeepClimber, erratic_full)
    } else if brand_new_in_band {
        (SignalCategory::NewEntryDeep, false)
    } else {
        (SignalCategory::None, erratic_full)
    };

    Signal {
        asset: current.asset.clone(),
        category,
        direction: current.direction,
        rank: current.rank,
        rank_delta,
        velocity,
        erratic,
        low_velocity,
        reasons,
    }
}

fn tail(window: &[MarketSnapshot], len: usize) -> &[MarketSnapshot] {
    &window[window.len().saturating_sub(len.max(1))..]
}

/// Sign changes between consecutive rank deltas. A clean climb has zero;
/// an asset bouncing around the board racks these up quickly.
fn reversal_count(window: &[MarketSnapshot]) -> usize {
    let deltas: Vec<i64> = window
        .windows(2)
        .map(|pair| i64::from(pair[0].rank) - i64::from(pair[1].rank))
        .filter(|d| *d != 0)
        .collect();
    deltas
        .windows(2)
        .filter(|pair| (pair[0] > 0) != (pair[1] > 0))
        .count()
}

/// Mean contribution gain per scan across the window, in score points.
fn contribution_velocity(window: &[MarketSnapshot]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let first = window[0].contribution;
    let last = window[window.len() - 1].contribution;
    (last - first) / (window.len() - 1) as f64
}

fn corroborating_reasons(
    config: &ClassifierConfig,
    window: &[MarketSnapshot],
    rank_delta: i64,
    velocity: f64,
) -> Vec<&'static str> {
    let mut reasons = Vec::new();
    if rank_delta > 0 {
        reasons.push("RANK_UP");
    }
    if velocity >= config.velocity_floor {
        reasons.push("CONTRIB_RISING");
    }
    if let Some(current) = window.last() {
        if current.rank <= config.top_band {
            reasons.push("TOP_BAND");
        }
        if window.len() >= 2 && current.traders > window[window.len() - 2].traders {
            reasons.push("TRADERS_UP");
        }
    }
    // Three straight improving scans count as a streak.
    if window.len() >= 4
        && window
            .windows(2)
            .rev()
            .take(3)
            .all(|pair| pair[1].rank < pair[0].rank)
    {
        reasons.push("STREAK");
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn snap(rank: u32, contribution: f64, scan: i64) -> MarketSnapshot {
        MarketSnapshot {
            asset: "WIF".to_string(),
            rank,
            contribution,
            traders: 40 + scan as u32,
            direction: Direction::Long,
            price_chg_4h: 3.0,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
                + Duration::minutes(scan),
        }
    }

    fn cfg() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    #[test]
    fn fresh_deep_jump_is_first_jump() {
        // Appeared at rank 31, next scan at 16: a 15-rank jump with no
        // earlier history.
        let window = vec![snap(31, 1.0, 0), snap(16, 1.2, 1)];
        let signal = classify(&cfg(), &window);
        assert_eq!(signal.category, SignalCategory::FirstJump);
        assert_eq!(signal.rank_delta, 15);
        assert!(!signal.erratic);
    }

    #[test]
    fn near_top_history_makes_the_same_jump_an_immediate_mover() {
        // Was near the top a few scans ago, so the jump is a return, not a
        // surfacing.
        let window = vec![
            snap(18, 1.0, 0),
            snap(22, 1.1, 1),
            snap(26, 1.3, 2),
            snap(27, 1.5, 3),
            snap(16, 1.7, 4),
        ];
        let signal = classify(&cfg(), &window);
        assert_eq!(signal.category, SignalCategory::ImmediateMover);
    }

    #[test]
    fn erratic_history_downgrades_immediate_mover() {
        // Six sign reversals in the rank history, then a 10-rank jump
        // from 27.
        let ranks = [20, 24, 19, 25, 18, 26, 21, 27];
        let mut window: Vec<MarketSnapshot> = ranks
            .iter()
            .enumerate()
            .map(|(i, r)| snap(*r, 1.0 + i as f64 * 0.1, i as i64))
            .collect();
        window.push(snap(17, 1.9, ranks.len() as i64));
        let signal = classify(&cfg(), &window);
        assert!(signal.erratic);
        assert_eq!(signal.category, SignalCategory::DeepClimber);
    }

    #[test]
    fn contribution_explosion_ignores_erratic_history() {
        let ranks = [30, 35, 28, 36, 27, 37, 29, 38, 30];
        let mut window: Vec<MarketSnapshot> = ranks
            .iter()
            .enumerate()
            .map(|(i, r)| snap(*r, 1.0, i as i64))
            .collect();
        window.push(snap(28, 3.5, ranks.len() as i64));
        let signal = classify(&cfg(), &window);
        assert_eq!(signal.category, SignalCategory::ContribExplosion);
    }

    #[test]
    fn steady_climb_into_top_band_is_deep_climber() {
        let window = vec![
            snap(29, 1.0, 0),
            snap(26, 1.1, 1),
            snap(23, 1.25, 2),
            snap(21, 1.4, 3),
            snap(19, 1.6, 4),
        ];
        let signal = classify(&cfg(), &window);
        assert_eq!(signal.category, SignalCategory::DeepClimber);
        assert!(signal.reasons.len() >= 3);
        assert!(!signal.erratic);
    }

    #[test]
    fn first_appearance_inside_top_band_is_new_entry_deep() {
        let window = vec![snap(14, 2.0, 0)];
        let signal = classify(&cfg(), &window);
        assert_eq!(signal.category, SignalCategory::NewEntryDeep);
    }

    #[test]
    fn small_moves_classify_as_none() {
        let window = vec![snap(40, 1.0, 0), snap(38, 1.01, 1)];
        let signal = classify(&cfg(), &window);
        assert_eq!(signal.category, SignalCategory::None);
        assert!(!signal.category.is_entry());
    }

    #[test]
    fn low_velocity_jump_downgrades_to_deep_climber() {
        // Long flat history then a jump from 27: rank moves but the
        // contribution score has gone nowhere.
        let window = vec![
            snap(25, 1.0, 0),
            snap(26, 1.0, 1),
            snap(27, 1.0, 2),
            snap(27, 1.0, 3),
            snap(16, 1.0, 4),
        ];
        let signal = classify(&cfg(), &window);
        assert!(signal.low_velocity);
        assert_eq!(signal.category, SignalCategory::DeepClimber);
    }

    #[test]
    fn classification_is_deterministic() {
        let window = vec![snap(31, 1.0, 0), snap(16, 1.2, 1)];
        let a = classify(&cfg(), &window);
        let b = classify(&cfg(), &window);
        assert_eq!(a.category, b.category);
        assert_eq!(a.reasons, b.reasons);
    }
}
