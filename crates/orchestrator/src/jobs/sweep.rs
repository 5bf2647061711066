use anyhow::Result;
use chrono::Utc;
use trailguard_core::Phase;
use trailguard_risk::TickDecision;

use super::Jobs;

impl Jobs {
    /// Risk-sweep pass: tick the trailing-stop engine for every active
    /// position whose lease is free. Leased positions are skipped, never
    /// awaited.
    pub async fn risk_sweep(&self) -> Result<()> {
        let now = Utc::now();
        for key in self.store.keys().await {
            let Some(mut lease) = self.store.lease(&key).await else {
                tracing::debug!(%key, "lease held, skipping sweep for this cycle");
                continue;
            };
            if !lease.risk.active || lease.risk.phase == Phase::Closed {
                continue;
            }

            let price = match self.gateway.price(&key.asset).await {
                Ok(price) => price,
                Err(e) if e.is_transient() => {
                    if self.engine.record_fetch_failure(&mut lease.risk) {
                        let message = format!(
                            "deactivated {} after {} consecutive price-fetch failures; \
                             position untouched on the venue",
                            key.asset, lease.risk.consecutive_fetch_failures
                        );
                        tracing::error!("{message}");
                        self.notify(&message).await;
                    } else {
                        tracing::warn!(
                            asset = %key.asset,
                            failures = lease.risk.consecutive_fetch_failures,
                            "price fetch failed: {e}"
                        );
                    }
                    continue;
                }
                Err(e) => {
                    tracing::error!(asset = %key.asset, "price fetch rejected: {e}");
                    continue;
                }
            };

            let record = &mut *lease;
            let outcome = self
                .engine
                .on_tick(&record.position, &mut record.risk, price, now);
            match outcome.decision {
                TickDecision::Close(reason) => {
                    self.attempt_close(&mut lease, reason, price).await?;
                }
                TickDecision::Hold => {
                    if outcome.tier_advanced {
                        tracing::info!(
                            asset = %key.asset,
                            tier = ?lease.risk.tier_index,
                            floor = %outcome.floor,
                            roe = %outcome.roe.round_dp(2),
                            "tier advanced"
                        );
                    } else if outcome.breached {
                        tracing::warn!(
                            asset = %key.asset,
                            breaches = lease.risk.breach_count,
                            floor = %outcome.floor,
                            "floor breached"
                        );
                    }
                }
                TickDecision::Duplicate => {}
            }
        }
        Ok(())
    }
}
