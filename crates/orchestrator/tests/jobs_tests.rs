use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;
use trailguard_core::{
    ClassifierConfig, CloseReason, ConvictionConfig, Direction, ExecutionGateway, MarketSnapshot,
    Notifier, Phase, StrategyConfig,
};
use trailguard_gateway::{PaperGateway, StaticConviction, StaticFeed};
use trailguard_orchestrator::{Jobs, TradeLog};
use trailguard_signals::ConvictionSnapshot;

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        self.messages.lock().await.push(message.to_string());
        Ok(())
    }
}

impl RecordingNotifier {
    async fn any_contains(&self, needle: &str) -> bool {
        self.messages.lock().await.iter().any(|m| m.contains(needle))
    }
}

struct Harness {
    jobs: Arc<Jobs>,
    gateway: Arc<PaperGateway>,
    feed: Arc<StaticFeed>,
    conviction: Arc<StaticConviction>,
    notifier: Arc<RecordingNotifier>,
    log_path: PathBuf,
}

fn harness_with(config: StrategyConfig, conviction_cfg: ConvictionConfig) -> Harness {
    let gateway = Arc::new(PaperGateway::new());
    let feed = Arc::new(StaticFeed::new());
    let conviction = Arc::new(StaticConviction::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let log_path = std::env::temp_dir().join(format!(
        "trailguard-jobs-{}-{}.jsonl",
        std::process::id(),
        LOG_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_file(&log_path);
    let jobs = Arc::new(Jobs::new(
        config,
        ClassifierConfig::default(),
        conviction_cfg,
        gateway.clone(),
        feed.clone(),
        conviction.clone(),
        notifier.clone(),
        TradeLog::new(&log_path),
    ));
    Harness {
        jobs,
        gateway,
        feed,
        conviction,
        notifier,
        log_path,
    }
}

fn harness(slots: u32) -> Harness {
    let mut config = StrategyConfig::default();
    config.slots = slots;
    config.margin_per_slot = dec!(650);
    harness_with(config, ConvictionConfig::default())
}

fn board_row(asset: &str, rank: u32) -> MarketSnapshot {
    MarketSnapshot {
        asset: asset.to_string(),
        rank,
        contribution: 1.5,
        traders: 60,
        direction: Direction::Long,
        price_chg_4h: 4.0,
        timestamp: Utc::now(),
    }
}

/// Scan with fresh assets inside the top band: every one classifies as
/// NEW_ENTRY_DEEP on its first appearance.
async fn seed_entries(h: &Harness, assets: &[&str]) {
    let scan: Vec<MarketSnapshot> = assets
        .iter()
        .enumerate()
        .map(|(i, asset)| board_row(asset, 10 + i as u32))
        .collect();
    for asset in assets {
        h.gateway.set_price(asset, dec!(100)).await;
    }
    h.feed.push_scan(scan).await;
    h.jobs.signal_scan().await.unwrap();
}

#[tokio::test]
async fn scan_opens_up_to_slot_capacity_and_no_further() {
    let h = harness(2);
    seed_entries(&h, &["WIF", "PEPE", "JUP"]).await;

    assert_eq!(h.gateway.open_count(), 2);
    assert_eq!(h.jobs.slots().available(), 0);

    // A later scan with capacity exhausted opens nothing.
    h.jobs.signal_scan().await.unwrap();
    assert_eq!(h.gateway.open_count(), 2);
}

#[tokio::test]
async fn breach_close_frees_the_slot_and_logs_the_trade() {
    let h = harness(1);
    seed_entries(&h, &["WIF"]).await;
    assert!(h.gateway.holds("WIF").await);

    // Floor for a 10x long at 100 with a 5% retrace threshold is 99.5.
    h.gateway.set_price("WIF", dec!(99.4)).await;
    for _ in 0..3 {
        h.jobs.risk_sweep().await.unwrap();
    }

    assert!(!h.gateway.holds("WIF").await);
    assert_eq!(h.jobs.slots().available(), 1);
    let records = TradeLog::new(&h.log_path).read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, CloseReason::Phase1Breach);
    assert_eq!(records[0].exit_price, dec!(99.4));

    let key = trailguard_core::PositionKey::new("wolf-dsl", "WIF");
    let lease = h.jobs.store().lease(&key).await.unwrap();
    assert_eq!(lease.risk.phase, Phase::Closed);
    assert!(!lease.risk.active);
}

#[tokio::test]
async fn pending_close_escalates_after_the_attempt_budget() {
    let h = harness(1);
    seed_entries(&h, &["WIF"]).await;
    h.gateway.set_price("WIF", dec!(99.4)).await;
    h.gateway.fail_closes(true);

    // Three sweeps to reach the breach threshold, then retries until the
    // five-attempt budget is spent.
    for _ in 0..7 {
        h.jobs.risk_sweep().await.unwrap();
    }

    let key = trailguard_core::PositionKey::new("wolf-dsl", "WIF");
    let lease = h.jobs.store().lease(&key).await.unwrap();
    assert!(lease.risk.pending_close);
    assert_eq!(lease.risk.close_attempts, 5);
    assert!(!lease.risk.active);
    drop(lease);
    assert!(h.notifier.any_contains("FATAL").await);
    // The venue still holds the position; the slot is not recycled.
    assert!(h.gateway.holds("WIF").await);
    assert_eq!(h.jobs.slots().available(), 0);
}

#[tokio::test]
async fn audit_deactivates_orphaned_state_in_one_cycle() {
    let h = harness(2);
    seed_entries(&h, &["WIF"]).await;

    // Closed out-of-band on the venue.
    h.gateway.close("WIF", "MANUAL").await.unwrap();
    h.jobs.health_audit().await.unwrap();

    let key = trailguard_core::PositionKey::new("wolf-dsl", "WIF");
    assert!(!h.jobs.store().is_active(&key).await);
    assert_eq!(h.jobs.slots().available(), 2);
    assert!(h.notifier.any_contains("orphan").await);
}

#[tokio::test]
async fn audit_adopts_an_untracked_live_position() {
    let h = harness(2);
    h.gateway.set_price("JUP", dec!(0.8)).await;
    h.gateway
        .open(
            "JUP",
            Direction::Long,
            dec!(650),
            10,
            trailguard_core::MarginMode::Isolated,
        )
        .await
        .unwrap();

    h.jobs.health_audit().await.unwrap();

    let key = trailguard_core::PositionKey::new("wolf-dsl", "JUP");
    assert!(h.jobs.store().is_active(&key).await);
    assert_eq!(h.jobs.slots().reserved(), 1);
    assert!(h.notifier.any_contains("adopted").await);
}

#[tokio::test]
async fn conviction_flip_closes_through_the_same_protocol() {
    let h = harness(1);
    seed_entries(&h, &["WIF"]).await;
    h.conviction
        .set(ConvictionSnapshot {
            asset: "WIF".to_string(),
            direction: Direction::Short,
            pnl_pct: 6.0,
            traders: 150,
            near_peak_pct: 60.0,
            avg_at_peak: 85.0,
            timestamp: Utc::now(),
        })
        .await;

    h.jobs.conviction_check().await.unwrap();

    assert!(!h.gateway.holds("WIF").await);
    let records = TradeLog::new(&h.log_path).read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, CloseReason::ConvictionFlip);
}

#[tokio::test]
async fn rejected_open_releases_the_reserved_slot() {
    let h = harness(2);
    h.gateway.fail_opens(true);
    seed_entries(&h, &["WIF"]).await;

    assert_eq!(h.gateway.open_count(), 0);
    assert_eq!(h.jobs.slots().available(), 2);
}

#[tokio::test]
async fn audit_reuses_the_slot_of_a_deactivated_live_position() {
    let h = harness(2);
    seed_entries(&h, &["WIF"]).await;
    assert_eq!(h.jobs.slots().reserved(), 1);

    // A feed outage burns the whole fetch-failure budget; the state is
    // deactivated while the venue still holds the position and its slot.
    h.gateway.fail_prices(true);
    for _ in 0..10 {
        h.jobs.risk_sweep().await.unwrap();
    }
    let key = trailguard_core::PositionKey::new("wolf-dsl", "WIF");
    assert!(!h.jobs.store().is_active(&key).await);
    assert_eq!(h.jobs.slots().reserved(), 1);

    h.gateway.fail_prices(false);
    h.jobs.health_audit().await.unwrap();

    // Adoption revived protection on the existing reservation; one live
    // position still means exactly one reserved slot.
    assert!(h.jobs.store().is_active(&key).await);
    assert_eq!(h.jobs.slots().reserved(), 1);
    assert!(h.notifier.any_contains("adopted").await);
}

#[tokio::test]
async fn audit_releases_the_slot_of_a_deactivated_orphan() {
    let h = harness(2);
    seed_entries(&h, &["WIF"]).await;
    h.gateway.fail_prices(true);
    for _ in 0..10 {
        h.jobs.risk_sweep().await.unwrap();
    }

    // The venue position disappears while the state sits deactivated.
    h.gateway.close("WIF", "MANUAL").await.unwrap();
    h.gateway.fail_prices(false);
    h.jobs.health_audit().await.unwrap();

    assert_eq!(h.jobs.slots().reserved(), 0);
    let key = trailguard_core::PositionKey::new("wolf-dsl", "WIF");
    assert!(!h.jobs.store().is_active(&key).await);
    assert!(h.notifier.any_contains("orphan").await);
}

#[tokio::test]
async fn rotation_closes_the_weak_holding_before_opening_the_jumper() {
    let h = harness(1);
    seed_entries(&h, &["WIF"]).await;
    assert!(h.gateway.holds("WIF").await);
    h.gateway.set_price("JUP", dec!(2)).await;

    // Build JUP's history: a deep appearance at rank 31, then a 15-rank
    // jump into 16. Each pass first drains the previously replayed scan.
    h.feed
        .push_scan(vec![board_row("WIF", 10), board_row("JUP", 31)])
        .await;
    h.jobs.signal_scan().await.unwrap();
    h.feed
        .push_scan(vec![board_row("WIF", 10), board_row("JUP", 16)])
        .await;
    h.jobs.signal_scan().await.unwrap();
    h.jobs.signal_scan().await.unwrap();

    // The weak phase-1 holder went out first, then the jumper took its slot.
    assert!(!h.gateway.holds("WIF").await);
    assert!(h.gateway.holds("JUP").await);
    assert_eq!(h.gateway.close_count(), 1);
    assert_eq!(h.gateway.open_count(), 2);
    assert_eq!(h.jobs.slots().reserved(), 1);
    let records = TradeLog::new(&h.log_path).read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, CloseReason::Rotation);
    assert_eq!(records[0].exit_price, dec!(100));
}

#[tokio::test]
async fn audit_escalates_direction_mismatch_without_touching_either_side() {
    let h = harness(2);
    seed_entries(&h, &["WIF"]).await;

    // The venue position was flipped to a short out-of-band.
    h.gateway.close("WIF", "MANUAL").await.unwrap();
    h.gateway
        .open(
            "WIF",
            Direction::Short,
            dec!(650),
            10,
            trailguard_core::MarginMode::Isolated,
        )
        .await
        .unwrap();

    h.jobs.health_audit().await.unwrap();

    assert!(h.notifier.any_contains("CRITICAL").await);
    // Both sides untouched: the venue short stays, the tracked long stays.
    assert!(h.gateway.holds("WIF").await);
    let key = trailguard_core::PositionKey::new("wolf-dsl", "WIF");
    assert!(h.jobs.store().is_active(&key).await);
    assert_eq!(h.jobs.slots().reserved(), 1);
    let lease = h.jobs.store().lease(&key).await.unwrap();
    assert_eq!(lease.position.direction, Direction::Long);
}

#[tokio::test]
async fn conviction_flip_floor_comes_from_config() {
    let mut config = StrategyConfig::default();
    config.slots = 1;
    config.margin_per_slot = dec!(650);
    let h = harness_with(
        config,
        ConvictionConfig {
            flip_min_traders: 50,
            ..ConvictionConfig::default()
        },
    );
    seed_entries(&h, &["WIF"]).await;

    // 60 opposing traders: below the default floor of 100, above ours.
    h.conviction
        .set(ConvictionSnapshot {
            asset: "WIF".to_string(),
            direction: Direction::Short,
            pnl_pct: 6.0,
            traders: 60,
            near_peak_pct: 60.0,
            avg_at_peak: 85.0,
            timestamp: Utc::now(),
        })
        .await;

    h.jobs.conviction_check().await.unwrap();
    assert!(!h.gateway.holds("WIF").await);
    let records = TradeLog::new(&h.log_path).read_all().unwrap();
    assert_eq!(records[0].reason, CloseReason::ConvictionFlip);
}

#[tokio::test]
async fn daily_loss_halt_blocks_new_entries() {
    let h = harness(2);
    seed_entries(&h, &["WIF"]).await;

    // Deep loss: ROE -160% on 650 margin is far past the default -975 limit.
    h.gateway.set_price("WIF", dec!(84)).await;
    h.jobs.risk_sweep().await.unwrap();
    h.jobs.report().await.unwrap();
    assert!(h.jobs.is_halted());
    assert!(h.notifier.any_contains("HALT").await);

    h.gateway.set_price("PEPE", dec!(1)).await;
    h.feed
        .push_scan(vec![board_row("WIF", 10), board_row("PEPE", 11)])
        .await;
    // Two passes: the first drains the stale scan, the second sees PEPE as a
    // fresh top-band entry and must still refuse it.
    h.jobs.signal_scan().await.unwrap();
    h.jobs.signal_scan().await.unwrap();
    assert_eq!(h.gateway.open_count(), 1);
}
