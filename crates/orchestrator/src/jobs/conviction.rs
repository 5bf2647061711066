use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use trailguard_risk::roe_pct;

use super::Jobs;

impl Jobs {
    /// Conviction pass: an independent exit trigger that rides the same
    /// lease protocol as the risk sweep. It never applies tier or breach
    /// logic, only flip and dead-weight rules.
    pub async fn conviction_check(&self) -> Result<()> {
        let now = Utc::now();
        for key in self.store.keys().await {
            let Some(mut lease) = self.store.lease(&key).await else {
                continue;
            };
            if !lease.risk.active {
                continue;
            }

            let snapshot = match self.conviction.conviction(&key.asset).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(asset = %key.asset, "conviction fetch failed: {e}");
                    continue;
                }
            };

            // Prefer the sweep's last price; fall back to a fresh quote.
            let price = match lease.risk.last_tick {
                Some((price, _)) => price,
                None => match self.gateway.price(&key.asset).await {
                    Ok(price) => price,
                    Err(e) => {
                        tracing::warn!(asset = %key.asset, "no price for conviction check: {e}");
                        continue;
                    }
                },
            };
            let roe = roe_pct(
                lease.position.direction,
                lease.position.entry_price,
                price,
                lease.position.leverage,
            );

            let losing_since = {
                let mut losing = self.losing_since.lock().await;
                if roe < Decimal::ZERO {
                    Some(*losing.entry(key.clone()).or_insert(now))
                } else {
                    losing.remove(&key);
                    None
                }
            };

            if let Some(trigger) = self.monitor.assess(
                lease.position.direction,
                &snapshot,
                roe,
                losing_since,
                now,
            ) {
                let reason = trigger.close_reason();
                tracing::warn!(
                    asset = %key.asset,
                    ?trigger,
                    roe = %roe.round_dp(2),
                    "conviction exit triggered"
                );
                self.attempt_close(&mut lease, reason, price).await?;
            }
        }
        Ok(())
    }
}
