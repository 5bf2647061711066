use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use trailguard_core::{
    BreachDecay, CloseReason, Direction, Phase, Phase1Config, Position, RiskState,
    StagnationConfig, StrategyConfig, TierConfig,
};

/// What the caller should do with the position after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// Keep the position open.
    Hold,
    /// Same (price, timestamp) as the previous tick; state was not touched.
    Duplicate,
    /// Close the position for the given reason.
    Close(CloseReason),
}

/// Per-tick evaluation result.
#[derive(Debug, Clone, Copy)]
pub struct TickOutcome {
    pub decision: TickDecision,
    /// Leveraged return on equity in percent, signed by direction.
    pub roe: Decimal,
    /// Floor price in effect after this tick.
    pub floor: Decimal,
    /// Whether this tick counted as an adverse breach of the floor.
    pub breached: bool,
    /// Whether the position advanced one or more tiers on this tick.
    pub tier_advanced: bool,
}

/// Leveraged ROE in percent for a position at `price`.
///
/// `(price - entry) / entry * 100 * leverage`, sign-adjusted so a
/// favorable move is always positive for both directions.
pub fn roe_pct(direction: Direction, entry: Decimal, price: Decimal, leverage: u8) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    (price - entry) / entry * Decimal::ONE_HUNDRED * Decimal::from(leverage) * direction.sign()
}

/// Tiered trailing-stop state machine.
///
/// Phase 1 holds a fixed entry-derived floor until the first tier trigger
/// fires; phase 2 trails a floor off the high-water price, locking in a
/// growing share of the peak move as higher tiers are reached. The floor
/// never loosens once set.
pub struct TrailingStopEngine {
    tiers: Vec<TierConfig>,
    phase1: Phase1Config,
    stagnation: StagnationConfig,
    breach_decay: BreachDecay,
    max_fetch_failures: u32,
}

impl TrailingStopEngine {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            tiers: config.tiers.clone(),
            phase1: config.phase1.clone(),
            stagnation: config.stagnation.clone(),
            breach_decay: config.breach_decay,
            max_fetch_failures: config.max_fetch_failures,
        }
    }

    /// Initial risk state for a freshly opened (or reconciled) position.
    ///
    /// The phase-1 floor is an absolute price level: the entry price moved
    /// adversely by `retrace_threshold` percent of ROE, i.e.
    /// `entry * (1 -/+ retrace / 100 / leverage)`.
    pub fn seed(&self, position: &Position) -> RiskState {
        let floor = self.phase1_floor(position);
        RiskState::seed(position.entry_price, floor, position.opened_at)
    }

    fn phase1_floor(&self, position: &Position) -> Decimal {
        let retrace_frac =
            self.phase1.retrace_threshold / Decimal::ONE_HUNDRED / Decimal::from(position.leverage);
        match position.direction {
            Direction::Long => position.entry_price * (Decimal::ONE - retrace_frac),
            Direction::Short => position.entry_price * (Decimal::ONE + retrace_frac),
        }
    }

    /// Trailing floor for a tier: entry plus `lock_pct` of the move from
    /// entry to the high-water price.
    fn tier_floor(&self, position: &Position, state: &RiskState, tier: &TierConfig) -> Decimal {
        let lock = tier.lock_pct / Decimal::ONE_HUNDRED;
        position.entry_price + (state.high_water - position.entry_price) * lock
    }

    fn is_adverse(&self, direction: Direction, price: Decimal, floor: Decimal) -> bool {
        match direction {
            Direction::Long => price <= floor,
            Direction::Short => price >= floor,
        }
    }

    fn is_better(direction: Direction, candidate: Decimal, current: Decimal) -> bool {
        match direction {
            Direction::Long => candidate > current,
            Direction::Short => candidate < current,
        }
    }

    /// Evaluate one price observation.
    ///
    /// Mutates `state` in place and returns the resulting decision. Replaying
    /// the exact same `(price, now)` pair is a no-op and returns
    /// [`TickDecision::Duplicate`].
    pub fn on_tick(
        &self,
        position: &Position,
        state: &mut RiskState,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        if state.last_tick == Some((price, now)) {
            return TickOutcome {
                decision: TickDecision::Duplicate,
                roe: roe_pct(position.direction, position.entry_price, price, position.leverage),
                floor: state.floor_price,
                breached: false,
                tier_advanced: false,
            };
        }
        state.last_tick = Some((price, now));
        state.consecutive_fetch_failures = 0;

        let roe = roe_pct(position.direction, position.entry_price, price, position.leverage);
        if roe > state.peak_roe {
            state.peak_roe = roe;
        }
        if Self::is_better(position.direction, price, state.high_water) {
            state.high_water = price;
            state.hw_timestamp = now;
        }

        // Tiers only ratchet upward; a fading ROE never demotes.
        let mut tier_advanced = false;
        let mut next = state.tier_index.map_or(0, |i| i + 1);
        while next < self.tiers.len() && roe >= self.tiers[next].trigger_pct {
            state.tier_index = Some(next);
            state.breach_count = 0;
            tier_advanced = true;
            next += 1;
        }
        if tier_advanced {
            state.phase = Phase::Phase2;
        }

        if let Some(idx) = state.tier_index {
            let candidate = self.tier_floor(position, state, &self.tiers[idx]);
            // Floor ratchet: never loosen what a previous tick locked in.
            if Self::is_better(position.direction, candidate, state.floor_price) {
                state.floor_price = candidate;
            }
        }
        let floor = state.floor_price;

        // A close already requested but not yet filled takes priority over
        // any fresh evaluation.
        if state.pending_close {
            let reason = state.pending_reason.unwrap_or(CloseReason::Phase1Breach);
            return TickOutcome {
                decision: TickDecision::Close(reason),
                roe,
                floor,
                breached: false,
                tier_advanced,
            };
        }

        if let Some(reason) = self.time_decision(position, state, roe, now) {
            return TickOutcome {
                decision: TickDecision::Close(reason),
                roe,
                floor,
                breached: false,
                tier_advanced,
            };
        }

        let breached = self.is_adverse(position.direction, price, floor);
        if breached {
            state.breach_count += 1;
        } else {
            match self.breach_decay {
                BreachDecay::Hard => state.breach_count = 0,
                BreachDecay::Soft => state.breach_count = state.breach_count.saturating_sub(1),
            }
        }

        let (needed, reason) = match state.tier_index {
            Some(idx) => (self.tiers[idx].breaches_to_close, CloseReason::TierBreach),
            None => (self.phase1.consecutive_breaches, CloseReason::Phase1Breach),
        };
        let decision = if breached && state.breach_count >= needed {
            TickDecision::Close(reason)
        } else {
            TickDecision::Hold
        };

        TickOutcome { decision, roe, floor, breached, tier_advanced }
    }

    /// Stagnation and phase-1 age rules. Returns a close reason if any fires.
    fn time_decision(
        &self,
        position: &Position,
        state: &RiskState,
        roe: Decimal,
        now: DateTime<Utc>,
    ) -> Option<CloseReason> {
        if self.stagnation.enabled
            && roe >= self.stagnation.min_roe
            && now - state.hw_timestamp >= Duration::minutes(self.stagnation.max_stale_minutes)
        {
            return Some(CloseReason::Stagnation);
        }
        if state.phase == Phase::Phase1 {
            let age = now - position.opened_at;
            if age >= Duration::minutes(self.phase1.max_minutes) {
                return Some(CloseReason::Phase1Timeout);
            }
            if age >= Duration::minutes(self.phase1.weak_peak_minutes)
                && state.peak_roe < self.phase1.weak_peak_roe
                && roe < state.peak_roe
            {
                return Some(CloseReason::WeakPeak);
            }
        }
        None
    }

    /// Record a failed price fetch for this position. Returns `true` if the
    /// failure budget is exhausted and the state was deactivated.
    pub fn record_fetch_failure(&self, state: &mut RiskState) -> bool {
        state.consecutive_fetch_failures += 1;
        if state.consecutive_fetch_failures >= self.max_fetch_failures {
            state.active = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn position(direction: Direction, entry: Decimal, leverage: u8) -> Position {
        Position {
            asset: "WIF".to_string(),
            direction,
            entry_price: entry,
            size: dec!(1000),
            leverage,
            margin: dec!(650),
            opened_at: t0(),
        }
    }

    fn engine() -> TrailingStopEngine {
        TrailingStopEngine::new(&StrategyConfig::default())
    }

    fn mins(n: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(n)
    }

    #[test]
    fn short_phase1_floor_and_breach_sequence() {
        let eng = engine();
        let pos = position(Direction::Short, dec!(100), 10);
        let mut state = eng.seed(&pos);
        assert_eq!(state.floor_price, dec!(100.5));

        // Three consecutive ticks at or beyond the floor close the position.
        let o1 = eng.on_tick(&pos, &mut state, dec!(100.5), mins(1));
        assert!(o1.breached);
        assert_eq!(o1.decision, TickDecision::Hold);
        let o2 = eng.on_tick(&pos, &mut state, dec!(100.6), mins(2));
        assert_eq!(o2.decision, TickDecision::Hold);
        let o3 = eng.on_tick(&pos, &mut state, dec!(100.7), mins(3));
        assert_eq!(o3.decision, TickDecision::Close(CloseReason::Phase1Breach));
    }

    #[test]
    fn hard_decay_resets_breach_count() {
        let eng = engine();
        let pos = position(Direction::Short, dec!(100), 10);
        let mut state = eng.seed(&pos);

        eng.on_tick(&pos, &mut state, dec!(100.6), mins(1));
        eng.on_tick(&pos, &mut state, dec!(100.5), mins(2));
        assert_eq!(state.breach_count, 2);
        // Favorable tick wipes the streak.
        eng.on_tick(&pos, &mut state, dec!(100.2), mins(3));
        assert_eq!(state.breach_count, 0);
        let out = eng.on_tick(&pos, &mut state, dec!(100.6), mins(4));
        assert_eq!(out.decision, TickDecision::Hold);
        assert_eq!(state.breach_count, 1);
    }

    #[test]
    fn soft_decay_decrements_instead_of_resetting() {
        let mut cfg = StrategyConfig::default();
        cfg.breach_decay = BreachDecay::Soft;
        let eng = TrailingStopEngine::new(&cfg);
        let pos = position(Direction::Short, dec!(100), 10);
        let mut state = eng.seed(&pos);

        eng.on_tick(&pos, &mut state, dec!(100.6), mins(1));
        eng.on_tick(&pos, &mut state, dec!(100.5), mins(2));
        eng.on_tick(&pos, &mut state, dec!(100.2), mins(3));
        assert_eq!(state.breach_count, 1);
    }

    #[test]
    fn tier_advance_skips_to_highest_satisfied_trigger() {
        let eng = engine();
        let pos = position(Direction::Long, dec!(100), 10);
        let mut state = eng.seed(&pos);

        // ROE 16% with the default ladder lands on tier index 2 directly.
        let out = eng.on_tick(&pos, &mut state, dec!(101.6), mins(1));
        assert!(out.tier_advanced);
        assert_eq!(state.tier_index, Some(2));
        assert_eq!(state.phase, Phase::Phase2);
        // lock 75% of the 1.6 move: floor 101.2
        assert_eq!(out.floor, dec!(101.2));

        // Two breaches past the tier-2 floor close with TIER_BREACH.
        let b1 = eng.on_tick(&pos, &mut state, dec!(101.1), mins(2));
        assert!(b1.breached);
        assert_eq!(b1.decision, TickDecision::Hold);
        let b2 = eng.on_tick(&pos, &mut state, dec!(101.0), mins(3));
        assert_eq!(b2.decision, TickDecision::Close(CloseReason::TierBreach));
    }

    #[test]
    fn floor_never_loosens_when_price_fades() {
        let eng = engine();
        let pos = position(Direction::Long, dec!(100), 10);
        let mut state = eng.seed(&pos);

        eng.on_tick(&pos, &mut state, dec!(102.0), mins(1));
        let locked = state.floor_price;
        // Price fades but stays above the floor; the floor must not move down.
        eng.on_tick(&pos, &mut state, dec!(101.8), mins(2));
        assert_eq!(state.floor_price, locked);
        // A new high pushes it up.
        eng.on_tick(&pos, &mut state, dec!(103.0), mins(3));
        assert!(state.floor_price > locked);
    }

    #[test]
    fn stagnation_closes_after_stale_window() {
        let eng = engine();
        let pos = position(Direction::Long, dec!(100), 10);
        let mut state = eng.seed(&pos);

        // ROE 9%: above the stagnation minimum, into tier 0.
        eng.on_tick(&pos, &mut state, dec!(100.9), mins(1));
        let held = eng.on_tick(&pos, &mut state, dec!(100.9), mins(60));
        assert_eq!(held.decision, TickDecision::Hold);
        let stale = eng.on_tick(&pos, &mut state, dec!(100.9), mins(62));
        assert_eq!(stale.decision, TickDecision::Close(CloseReason::Stagnation));
    }

    #[test]
    fn stagnation_ignores_low_roe_positions() {
        let eng = engine();
        let pos = position(Direction::Long, dec!(100), 10);
        let mut state = eng.seed(&pos);

        eng.on_tick(&pos, &mut state, dec!(100.2), mins(1));
        let out = eng.on_tick(&pos, &mut state, dec!(100.2), mins(80));
        // ROE 2% is below the stagnation minimum; phase-1 timeout has not
        // fired yet either.
        assert_eq!(out.decision, TickDecision::Hold);
    }

    #[test]
    fn phase1_timeout_fires_at_max_age() {
        let eng = engine();
        let pos = position(Direction::Long, dec!(100), 10);
        let mut state = eng.seed(&pos);

        eng.on_tick(&pos, &mut state, dec!(100.2), mins(1));
        let out = eng.on_tick(&pos, &mut state, dec!(100.2), mins(90));
        assert_eq!(out.decision, TickDecision::Close(CloseReason::Phase1Timeout));
    }

    #[test]
    fn weak_peak_closes_declining_low_peak_position() {
        let eng = engine();
        let pos = position(Direction::Long, dec!(100), 10);
        let mut state = eng.seed(&pos);

        // Peak ROE 2%, now declining, 50 minutes in.
        eng.on_tick(&pos, &mut state, dec!(100.2), mins(10));
        let out = eng.on_tick(&pos, &mut state, dec!(100.1), mins(50));
        assert_eq!(out.decision, TickDecision::Close(CloseReason::WeakPeak));
    }

    #[test]
    fn weak_peak_spares_position_still_at_its_peak() {
        let eng = engine();
        let pos = position(Direction::Long, dec!(100), 10);
        let mut state = eng.seed(&pos);

        eng.on_tick(&pos, &mut state, dec!(100.1), mins(10));
        let out = eng.on_tick(&pos, &mut state, dec!(100.2), mins(50));
        assert_eq!(out.decision, TickDecision::Hold);
    }

    #[test]
    fn duplicate_tick_is_a_noop() {
        let eng = engine();
        let pos = position(Direction::Short, dec!(100), 10);
        let mut state = eng.seed(&pos);

        eng.on_tick(&pos, &mut state, dec!(100.6), mins(1));
        assert_eq!(state.breach_count, 1);
        let replay = eng.on_tick(&pos, &mut state, dec!(100.6), mins(1));
        assert_eq!(replay.decision, TickDecision::Duplicate);
        assert_eq!(state.breach_count, 1);
    }

    #[test]
    fn pending_close_reissues_same_reason() {
        let eng = engine();
        let pos = position(Direction::Long, dec!(100), 10);
        let mut state = eng.seed(&pos);
        state.pending_close = true;
        state.pending_reason = Some(CloseReason::Stagnation);

        let out = eng.on_tick(&pos, &mut state, dec!(105.0), mins(1));
        assert_eq!(out.decision, TickDecision::Close(CloseReason::Stagnation));
    }

    #[test]
    fn fetch_failures_deactivate_at_budget() {
        let eng = engine();
        let pos = position(Direction::Long, dec!(100), 10);
        let mut state = eng.seed(&pos);

        for _ in 0..9 {
            assert!(!eng.record_fetch_failure(&mut state));
        }
        assert!(eng.record_fetch_failure(&mut state));
        assert!(!state.active);

        // A successful tick resets the counter on a fresh state.
        let mut fresh = eng.seed(&pos);
        eng.record_fetch_failure(&mut fresh);
        eng.on_tick(&pos, &mut fresh, dec!(100.1), mins(1));
        assert_eq!(fresh.consecutive_fetch_failures, 0);
    }

    #[test]
    fn roe_is_signed_by_direction() {
        assert_eq!(roe_pct(Direction::Long, dec!(100), dec!(101), 10), dec!(10));
        assert_eq!(roe_pct(Direction::Short, dec!(100), dec!(101), 10), dec!(-10));
        assert_eq!(roe_pct(Direction::Short, dec!(100), dec!(99), 5), dec!(5));
    }
}
