mod audit;
mod conviction;
mod report;
mod scan;
mod sweep;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use trailguard_core::{
    retire, CloseReason, ExecutionGateway, MarketDataFeed, Notifier, PositionKey, PositionLease,
    RiskStateStore, SlotLedger, StrategyConfig, TradeLogRecord,
};
use trailguard_risk::{roe_pct, TrailingStopEngine};
use trailguard_signals::{
    ClassifierConfig, ConvictionConfig, ConvictionFeed, ConvictionMonitor, SnapshotHistory,
};

use crate::trade_log::TradeLog;

/// Shared state and collaborators for every periodic job.
///
/// One instance is shared by all cadence loops; nothing in here may be
/// mutated without either the store lease (per-position state) or an atomic
/// (slots, halt flag).
pub struct Jobs {
    pub(crate) config: StrategyConfig,
    pub(crate) classifier: ClassifierConfig,
    pub(crate) engine: TrailingStopEngine,
    pub(crate) monitor: ConvictionMonitor,
    pub(crate) store: Arc<RiskStateStore>,
    pub(crate) slots: Arc<SlotLedger>,
    pub(crate) gateway: Arc<dyn ExecutionGateway>,
    pub(crate) feed: Arc<dyn MarketDataFeed>,
    pub(crate) conviction: Arc<dyn ConvictionFeed>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) trade_log: TradeLog,
    pub(crate) history: Mutex<SnapshotHistory>,
    /// When each position's ROE first went negative; cleared on recovery.
    pub(crate) losing_since: Mutex<HashMap<PositionKey, DateTime<Utc>>>,
    /// Set when a capital limit is breached; blocks new entries until restart.
    pub(crate) halted: AtomicBool,
}

impl Jobs {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: StrategyConfig,
        classifier: ClassifierConfig,
        conviction: ConvictionConfig,
        gateway: Arc<dyn ExecutionGateway>,
        feed: Arc<dyn MarketDataFeed>,
        conviction_feed: Arc<dyn ConvictionFeed>,
        notifier: Arc<dyn Notifier>,
        trade_log: TradeLog,
    ) -> Self {
        let engine = TrailingStopEngine::new(&config);
        let slots = Arc::new(SlotLedger::new(config.slots));
        Self {
            classifier,
            monitor: ConvictionMonitor::new(conviction),
            engine,
            store: Arc::new(RiskStateStore::new()),
            slots,
            gateway,
            feed,
            conviction: conviction_feed,
            notifier,
            trade_log,
            history: Mutex::new(SnapshotHistory::default()),
            losing_since: Mutex::new(HashMap::new()),
            halted: AtomicBool::new(false),
            config,
        }
    }

    pub fn store(&self) -> &Arc<RiskStateStore> {
        &self.store
    }

    pub fn slots(&self) -> &Arc<SlotLedger> {
        &self.slots
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub(crate) fn key_for(&self, asset: &str) -> PositionKey {
        PositionKey::new(&self.config.strategy_id, asset)
    }

    pub(crate) async fn notify(&self, message: &str) {
        if let Err(e) = self.notifier.send(message).await {
            tracing::warn!("notification failed: {e:#}");
        }
    }

    /// Request a close through the gateway and, on success, run the close
    /// transaction. On failure the close is marked pending and retried on
    /// later ticks up to the configured attempt budget.
    pub(crate) async fn attempt_close(
        &self,
        lease: &mut PositionLease,
        reason: CloseReason,
        exit_price: Decimal,
    ) -> Result<()> {
        let asset = lease.key.asset.clone();
        let reason_str = reason.to_string();
        match self.gateway.close(&asset, &reason_str).await {
            Ok(()) => self.finalize_close(lease, reason, exit_price).await,
            // Already flat on the venue: the close is done, finish our side.
            Err(e) if e.is_already_closed() => self.finalize_close(lease, reason, exit_price).await,
            Err(e) => {
                lease.risk.pending_close = true;
                lease.risk.pending_reason.get_or_insert(reason);
                lease.risk.close_attempts += 1;
                if lease.risk.close_attempts >= self.config.max_close_attempts {
                    lease.risk.active = false;
                    let message = format!(
                        "FATAL: close {asset} ({reason_str}) failed {} times, last error: {e}; \
                         position left untouched, manual intervention required",
                        lease.risk.close_attempts
                    );
                    tracing::error!("{message}");
                    self.notify(&message).await;
                } else {
                    tracing::warn!(
                        %asset,
                        attempt = lease.risk.close_attempts,
                        "close failed, will retry: {e}"
                    );
                }
                Ok(())
            }
        }
    }

    /// The close transaction: retire the risk state, release the slot, and
    /// append the audit record, all under the held lease.
    async fn finalize_close(
        &self,
        lease: &mut PositionLease,
        reason: CloseReason,
        exit_price: Decimal,
    ) -> Result<()> {
        let now = Utc::now();
        let position = lease.position.clone();
        let roe = roe_pct(
            position.direction,
            position.entry_price,
            exit_price,
            position.leverage,
        );
        let record = TradeLogRecord {
            asset: position.asset.clone(),
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            reason,
            tier_reached: lease.risk.tier_index,
            duration_secs: (now - position.opened_at).num_seconds(),
            realized_pnl: (position.margin * roe / Decimal::ONE_HUNDRED).round_dp(2),
            closed_at: now,
        };

        retire(lease);
        self.slots.release();
        self.losing_since.lock().await.remove(&lease.key);

        if let Err(e) = self.trade_log.append(&record) {
            tracing::error!(asset = %record.asset, "trade log append failed: {e:#}");
        }
        tracing::info!(
            asset = %record.asset,
            %reason,
            roe = %roe.round_dp(2),
            pnl = %record.realized_pnl,
            "position closed"
        );
        self.notify(&format!(
            "closed {} {} @ {} ({}, pnl {})",
            record.direction, record.asset, exit_price, reason, record.realized_pnl
        ))
        .await;
        Ok(())
    }
}
