use std::sync::atomic::Ordering;

use anyhow::Result;
use trailguard_core::{MarginMode, PositionRecord, TrailguardError};
use trailguard_signals::{classify, Signal, SignalCategory};

use super::Jobs;

/// Categories strong enough to evict a weak holding when slots are full.
fn rotation_worthy(category: SignalCategory) -> bool {
    matches!(
        category,
        SignalCategory::FirstJump | SignalCategory::ContribExplosion
    )
}

fn priority(category: SignalCategory) -> u8 {
    match category {
        SignalCategory::FirstJump => 0,
        SignalCategory::ContribExplosion => 1,
        SignalCategory::ImmediateMover => 2,
        SignalCategory::DeepClimber => 3,
        SignalCategory::NewEntryDeep => 4,
        SignalCategory::None => 5,
    }
}

impl Jobs {
    /// Signal-scan pass: ingest one leaderboard scan, classify every asset,
    /// and try to enter the strongest candidates.
    pub async fn signal_scan(&self) -> Result<()> {
        let scan = match self.feed.leaderboard().await {
            Ok(scan) => scan,
            Err(e) if e.is_transient() => {
                tracing::warn!("leaderboard fetch failed, skipping scan: {e}");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if scan.is_empty() {
            return Ok(());
        }

        let mut candidates: Vec<Signal> = {
            let mut history = self.history.lock().await;
            history.record_scan(&scan);
            scan.iter()
                .map(|s| classify(&self.classifier, &history.window(&s.asset, self.classifier.lookback)))
                .filter(|signal| signal.category.is_entry())
                .collect()
        };
        if candidates.is_empty() {
            return Ok(());
        }
        candidates.sort_by_key(|s| (priority(s.category), -s.rank_delta));

        if self.halted.load(Ordering::SeqCst) {
            tracing::warn!(
                candidates = candidates.len(),
                "entries halted by capital limit, ignoring signals"
            );
            return Ok(());
        }

        for signal in candidates {
            let key = self.key_for(&signal.asset);
            if self.store.is_active(&key).await {
                continue;
            }
            tracing::info!(
                asset = %signal.asset,
                category = signal.category.as_str(),
                rank = signal.rank,
                rank_delta = signal.rank_delta,
                reasons = ?signal.reasons,
                "entry candidate"
            );
            self.try_enter(&signal).await;
        }
        Ok(())
    }

    async fn try_enter(&self, signal: &Signal) {
        match self.slots.reserve() {
            Ok(()) => {
                if !self.open_position(signal).await {
                    self.slots.release();
                }
            }
            Err(TrailguardError::CapacityExceeded { .. }) => {
                if rotation_worthy(signal.category) {
                    self.consider_rotation(signal).await;
                }
            }
            Err(e) => tracing::warn!("slot reservation failed: {e}"),
        }
    }

    /// Open transaction: the slot is already reserved; open on the venue,
    /// then seed and publish the risk state. Returns false when the caller
    /// must hand the slot back.
    async fn open_position(&self, signal: &Signal) -> bool {
        let opened = self
            .gateway
            .open(
                &signal.asset,
                signal.direction,
                self.config.margin_per_slot,
                self.config.default_leverage,
                MarginMode::Isolated,
            )
            .await;
        let position = match opened {
            Ok(position) => position,
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(asset = %signal.asset, "open failed: {e}");
                } else {
                    tracing::error!(asset = %signal.asset, "open rejected: {e}");
                    self.notify(&format!("open {} rejected: {e}", signal.asset)).await;
                }
                return false;
            }
        };

        let risk = self.engine.seed(&position);
        tracing::info!(
            asset = %position.asset,
            direction = %position.direction,
            entry = %position.entry_price,
            floor = %risk.floor_price,
            category = signal.category.as_str(),
            "position opened"
        );
        self.notify(&format!(
            "opened {} {} @ {} ({})",
            position.direction,
            position.asset,
            position.entry_price,
            signal.category.as_str()
        ))
        .await;
        self.store
            .insert(PositionRecord {
                key: self.key_for(&position.asset),
                position,
                risk,
            })
            .await;
        true
    }

    /// Rotation: close the weakest downgrade-eligible holding, then open the
    /// candidate. Strictly sequential; if any step fails the candidate is
    /// dropped and reconciliation inherits the cleanup.
    async fn consider_rotation(&self, signal: &Signal) {
        let Some(victim_key) = self.weakest_holding().await else {
            tracing::debug!(asset = %signal.asset, "no rotation victim, dropping candidate");
            return;
        };

        let Some(mut lease) = self.store.lease(&victim_key).await else {
            // Another job is mutating the victim; skip this cycle.
            return;
        };
        if !lease.risk.active {
            return;
        }
        let exit_price = match self.gateway.price(&victim_key.asset).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(asset = %victim_key.asset, "rotation aborted, no price: {e}");
                return;
            }
        };

        tracing::info!(
            victim = %victim_key.asset,
            candidate = %signal.asset,
            "rotating weakest holding for stronger signal"
        );
        if self
            .attempt_close(&mut lease, trailguard_core::CloseReason::Rotation, exit_price)
            .await
            .is_err()
            || lease.risk.pending_close
        {
            // Close did not complete; never open on top of it.
            return;
        }
        drop(lease);

        if self.slots.reserve().is_ok() && !self.open_position(signal).await {
            self.slots.release();
        }
    }

    /// A holding qualifies as rotation victim only if it never left phase 1
    /// and its conviction has degraded.
    async fn weakest_holding(&self) -> Option<trailguard_core::PositionKey> {
        let mut weakest: Option<(trailguard_core::PositionKey, rust_decimal::Decimal)> = None;
        for record in self.store.snapshot().await {
            if !record.risk.active || record.risk.tier_index.is_some() {
                continue;
            }
            if record.risk.peak_roe >= self.config.phase1.weak_peak_roe {
                continue;
            }
            let degraded = match self.conviction.conviction(&record.key.asset).await {
                Ok(Some(snapshot)) => trailguard_signals::conviction_score(&snapshot) <= 1,
                Ok(None) => true,
                // Unverified state never justifies an eviction.
                Err(_) => false,
            };
            if !degraded {
                continue;
            }
            let last_roe = record
                .risk
                .last_tick
                .map(|(price, _)| {
                    trailguard_risk::roe_pct(
                        record.position.direction,
                        record.position.entry_price,
                        price,
                        record.position.leverage,
                    )
                })
                .unwrap_or(rust_decimal::Decimal::ZERO);
            match &weakest {
                Some((_, roe)) if last_roe >= *roe => {}
                _ => weakest = Some((record.key.clone(), last_roe)),
            }
        }
        weakest.map(|(key, _)| key)
    }

    /// One-shot scan used by the CLI: classify the current board without
    /// touching capital.
    pub async fn dry_scan(&self) -> Result<Vec<Signal>> {
        let scan = self.feed.leaderboard().await?;
        let mut history = self.history.lock().await;
        history.record_scan(&scan);
        let mut signals: Vec<Signal> = scan
            .iter()
            .map(|s| classify(&self.classifier, &history.window(&s.asset, self.classifier.lookback)))
            .filter(|signal| signal.category.is_entry())
            .collect();
        signals.sort_by_key(|s| (priority(s.category), -s.rank_delta));
        Ok(signals)
    }
}
