use std::sync::atomic::Ordering;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use trailguard_risk::roe_pct;

use super::Jobs;

impl Jobs {
    /// Portfolio report pass: log the state of every holding and enforce the
    /// daily-loss and drawdown limits. Tripping a limit halts new entries;
    /// open positions keep their protection.
    pub async fn report(&self) -> Result<()> {
        let records = self.store.snapshot().await;
        let mut active = 0u32;
        let mut unrealized = Decimal::ZERO;

        for record in &records {
            if !record.risk.active {
                continue;
            }
            active += 1;
            let Some((price, _)) = record.risk.last_tick else {
                continue;
            };
            let roe = roe_pct(
                record.position.direction,
                record.position.entry_price,
                price,
                record.position.leverage,
            );
            unrealized += record.position.margin * roe / Decimal::ONE_HUNDRED;
            tracing::info!(
                asset = %record.key.asset,
                direction = %record.position.direction,
                phase = ?record.risk.phase,
                tier = ?record.risk.tier_index,
                roe = %roe.round_dp(2),
                floor = %record.risk.floor_price,
                "holding"
            );
        }

        let closed = self.trade_log.read_all().unwrap_or_default();
        let today = Utc::now().date_naive();
        let realized_today: Decimal = closed
            .iter()
            .filter(|r| r.closed_at.date_naive() == today)
            .map(|r| r.realized_pnl)
            .sum();
        let realized_total: Decimal = closed.iter().map(|r| r.realized_pnl).sum();

        tracing::info!(
            active,
            reserved = self.slots.reserved(),
            available = self.slots.available(),
            unrealized = %unrealized.round_dp(2),
            realized_today = %realized_today.round_dp(2),
            "portfolio report"
        );

        let day_total = realized_today + unrealized;
        let overall = realized_total + unrealized;
        if day_total <= self.config.daily_loss_limit {
            self.halt(&format!(
                "daily loss limit hit: {} <= {}",
                day_total.round_dp(2),
                self.config.daily_loss_limit
            ))
            .await;
        } else if overall <= self.config.drawdown_cap {
            self.halt(&format!(
                "drawdown cap hit: {} <= {}",
                overall.round_dp(2),
                self.config.drawdown_cap
            ))
            .await;
        }
        Ok(())
    }

    async fn halt(&self, why: &str) {
        if self.halted.swap(true, Ordering::SeqCst) {
            return;
        }
        let message = format!("HALT: {why}; no new entries until restart");
        tracing::error!("{message}");
        self.notify(&message).await;
    }
}
