//! Budget-to-allocation sizing.
//!
//! A deterministic function from allocated capital to slot count, per-slot
//! margin, leverage bounds, and loss limits. No side effects; the orchestrator
//! consumes the plan at open time and risk monitoring consumes the limits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TrailguardError;

/// Capital allocation derived from the budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingPlan {
    pub budget: Decimal,
    /// Concurrent position capacity.
    pub slots: u32,
    /// Margin allocated per slot: a fixed 30% of budget.
    pub margin_per_slot: Decimal,
    /// Budget left unallocated as a liquidation buffer.
    pub margin_buffer: Decimal,
    pub default_leverage: u8,
    pub max_leverage: u8,
    pub notional_per_slot: Decimal,
    /// Negative: stop opening for the day past this realized loss.
    pub daily_loss_limit: Decimal,
    /// Negative: halt the strategy past this peak-to-trough loss.
    pub drawdown_cap: Decimal,
    /// Account value below this drops capacity by one slot.
    pub auto_delever_threshold: Decimal,
}

/// Computes the sizing plan for an allocated budget.
///
/// Slot count and leverage are banded by capital thresholds; limits are fixed
/// fractions of the budget.
///
/// # Errors
///
/// Returns `TrailguardError::Configuration` for budgets below the 500 minimum.
pub fn sizing_plan(budget: Decimal) -> Result<SizingPlan, TrailguardError> {
    if budget < Decimal::from(500) {
        return Err(TrailguardError::Configuration(format!(
            "budget {budget} below minimum 500"
        )));
    }

    let slots: u32 = if budget < Decimal::from(6000) { 2 } else { 3 };

    let margin_fraction = Decimal::new(30, 2); // 0.30
    let margin_per_slot = (budget * margin_fraction).round_dp(2);
    let margin_buffer =
        (budget - margin_per_slot * Decimal::from(slots)).round_dp(2);

    let default_leverage: u8 = if budget < Decimal::from(1000) {
        5
    } else if budget < Decimal::from(5000) {
        7
    } else {
        10
    };

    let daily_loss_limit = (budget * Decimal::new(-15, 2)).round_dp(2);
    let drawdown_cap = (budget * Decimal::new(-30, 2)).round_dp(2);
    let auto_delever_threshold = if slots == 3 {
        Decimal::from(6000)
    } else {
        Decimal::from(3000)
    };

    Ok(SizingPlan {
        budget,
        slots,
        margin_per_slot,
        margin_buffer,
        default_leverage,
        max_leverage: 20,
        notional_per_slot: (margin_per_slot * Decimal::from(default_leverage)).round_dp(2),
        daily_loss_limit,
        drawdown_cap,
        auto_delever_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mid_budget_gets_three_slots_and_ten_x() {
        let plan = sizing_plan(dec!(6500)).unwrap();
        assert_eq!(plan.slots, 3);
        assert_eq!(plan.margin_per_slot, dec!(1950.00));
        assert_eq!(plan.margin_buffer, dec!(650.00));
        assert_eq!(plan.default_leverage, 10);
        assert_eq!(plan.notional_per_slot, dec!(19500.00));
        assert_eq!(plan.daily_loss_limit, dec!(-975.00));
        assert_eq!(plan.drawdown_cap, dec!(-1950.00));
        assert_eq!(plan.auto_delever_threshold, dec!(6000));
    }

    #[test]
    fn small_budget_gets_two_slots_and_five_x() {
        let plan = sizing_plan(dec!(800)).unwrap();
        assert_eq!(plan.slots, 2);
        assert_eq!(plan.default_leverage, 5);
        assert_eq!(plan.auto_delever_threshold, dec!(3000));
    }

    #[test]
    fn band_edges_are_inclusive_below() {
        assert_eq!(sizing_plan(dec!(5999)).unwrap().slots, 2);
        assert_eq!(sizing_plan(dec!(6000)).unwrap().slots, 3);
        assert_eq!(sizing_plan(dec!(999)).unwrap().default_leverage, 5);
        assert_eq!(sizing_plan(dec!(1000)).unwrap().default_leverage, 7);
        assert_eq!(sizing_plan(dec!(4999)).unwrap().default_leverage, 7);
        assert_eq!(sizing_plan(dec!(5000)).unwrap().default_leverage, 10);
    }

    #[test]
    fn below_minimum_budget_is_rejected() {
        assert!(sizing_plan(dec!(499)).is_err());
        assert!(sizing_plan(dec!(500)).is_ok());
    }

    #[test]
    fn plan_is_deterministic() {
        assert_eq!(sizing_plan(dec!(2500)).unwrap(), sizing_plan(dec!(2500)).unwrap());
    }
}
