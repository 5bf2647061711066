use std::collections::HashMap;

use anyhow::Result;
use trailguard_core::{LivePosition, Phase, Position, PositionRecord};

use super::Jobs;

impl Jobs {
    /// Reconciliation pass against the venue's ground truth.
    ///
    /// Heals the three divergence classes: a tracked state with no live
    /// position is retired and its slot released, a live position with no
    /// active state gets one seeded from defaults, and a direction mismatch
    /// is escalated without touching either side.
    pub async fn health_audit(&self) -> Result<()> {
        let live = match self.gateway.positions(&self.config.wallet).await {
            Ok(live) => live,
            Err(e) if e.is_transient() => {
                tracing::warn!("venue state fetch failed, skipping audit: {e}");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let live_by_asset: HashMap<&str, &LivePosition> =
            live.iter().map(|p| (p.asset.as_str(), p)).collect();

        for key in self.store.keys().await {
            let Some(mut lease) = self.store.lease(&key).await else {
                continue;
            };
            // Closed records already gave their slot back; everything else
            // still holds a reservation, deactivated or not.
            if lease.risk.phase == Phase::Closed {
                continue;
            }
            match live_by_asset.get(key.asset.as_str()) {
                None => {
                    // Closed on the venue behind our back; the state is an
                    // orphan and its reservation comes back with it.
                    lease.risk.active = false;
                    lease.risk.phase = Phase::Closed;
                    self.slots.release();
                    let message =
                        format!("audit: deactivated orphan state for {} (no live position)", key);
                    tracing::warn!("{message}");
                    self.notify(&message).await;
                }
                Some(live) if lease.risk.active && live.direction != lease.position.direction => {
                    let message = format!(
                        "CRITICAL: direction mismatch on {}: tracked {}, venue {}; \
                         leaving both untouched",
                        key, lease.position.direction, live.direction
                    );
                    tracing::error!("{message}");
                    self.notify(&message).await;
                }
                Some(_) => {}
            }
        }

        for position in &live {
            let key = self.key_for(&position.asset);
            if self.store.is_active(&key).await {
                continue;
            }
            // A deactivated record that never closed still owns its slot;
            // adoption reuses that reservation instead of stacking a second.
            let holds_slot = match self.store.lease(&key).await {
                Some(lease) => lease.risk.phase != Phase::Closed,
                None => false,
            };
            self.adopt_untracked(position, holds_slot).await;
        }
        Ok(())
    }

    /// Seed a risk state for a live position we are not tracking, e.g. after
    /// a crash between open and insert. Uses config defaults for what the
    /// venue cannot tell us.
    async fn adopt_untracked(&self, live: &LivePosition, holds_slot: bool) {
        if !holds_slot {
            if let Err(e) = self.slots.reserve() {
                let message = format!(
                    "audit: live position {} cannot be adopted, {e}; close it manually",
                    live.asset
                );
                tracing::error!("{message}");
                self.notify(&message).await;
                return;
            }
        }

        let leverage = self.config.default_leverage;
        let size = live.size.abs();
        let position = Position {
            asset: live.asset.clone(),
            direction: live.direction,
            entry_price: live.entry_price,
            size,
            leverage,
            margin: (live.entry_price * size / rust_decimal::Decimal::from(leverage)).round_dp(2),
            opened_at: chrono::Utc::now(),
        };
        let risk = self.engine.seed(&position);
        let message = format!(
            "audit: adopted untracked {} {} @ {}, floor {}",
            position.direction, position.asset, position.entry_price, risk.floor_price
        );
        tracing::warn!("{message}");
        self.store
            .insert(PositionRecord {
                key: self.key_for(&position.asset),
                position,
                risk,
            })
            .await;
        self.notify(&message).await;
    }
}
