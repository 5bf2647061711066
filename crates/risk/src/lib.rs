//! Trailing-stop engine for leveraged positions.
//!
//! The engine is a pure state machine: each call to [`TrailingStopEngine::on_tick`]
//! takes the current price and instant, mutates the per-position
//! [`RiskState`](trailguard_core::RiskState), and returns a
//! [`TickDecision`] telling the caller whether the position should be held
//! or closed. The engine never talks to an exchange; execution and retry
//! live in the orchestrator.

pub mod engine;

pub use engine::{roe_pct, TickDecision, TickOutcome, TrailingStopEngine};
