use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use trailguard_core::{
    Direction, ExecutionGateway, GatewayError, LivePosition, MarginMode, MarketDataFeed,
    MarketSnapshot, Position,
};
use trailguard_signals::{ConvictionFeed, ConvictionSnapshot};

/// Deterministic in-memory gateway for dry runs and tests.
///
/// Fills happen instantly at the configured price. Failure toggles let a
/// test force a specific error path without a network in sight.
#[derive(Default)]
pub struct PaperGateway {
    prices: Mutex<HashMap<String, Decimal>>,
    positions: Mutex<HashMap<String, Position>>,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    fail_price: AtomicBool,
    opens: AtomicU32,
    closes: AtomicU32,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, asset: &str, price: Decimal) {
        self.prices.lock().await.insert(asset.to_string(), price);
    }

    pub fn fail_opens(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_closes(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn fail_prices(&self, fail: bool) {
        self.fail_price.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub async fn holds(&self, asset: &str) -> bool {
        self.positions.lock().await.contains_key(asset)
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn open(
        &self,
        asset: &str,
        direction: Direction,
        margin: Decimal,
        leverage: u8,
        _margin_mode: MarginMode,
    ) -> Result<Position, GatewayError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("paper open rejected".into()));
        }
        let price = self.price(asset).await?;
        let position = Position {
            asset: asset.to_string(),
            direction,
            entry_price: price,
            size: (margin * Decimal::from(leverage) / price).round_dp(4),
            leverage,
            margin,
            opened_at: Utc::now(),
        };
        self.positions
            .lock()
            .await
            .insert(asset.to_string(), position.clone());
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(position)
    }

    async fn close(&self, asset: &str, _reason: &str) -> Result<(), GatewayError> {
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(GatewayError::Network("paper close unavailable".into()));
        }
        match self.positions.lock().await.remove(asset) {
            Some(_) => {
                self.closes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(GatewayError::AlreadyClosed {
                asset: asset.to_string(),
            }),
        }
    }

    async fn price(&self, asset: &str) -> Result<Decimal, GatewayError> {
        if self.fail_price.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout("paper price feed down".into()));
        }
        self.prices
            .lock()
            .await
            .get(asset)
            .copied()
            .ok_or_else(|| GatewayError::Timeout(format!("no paper price for {asset}")))
    }

    async fn positions(&self, _wallet: &str) -> Result<Vec<LivePosition>, GatewayError> {
        let held = self.positions.lock().await;
        Ok(held
            .values()
            .map(|p| LivePosition {
                asset: p.asset.clone(),
                direction: p.direction,
                size: p.size * p.direction.sign(),
                entry_price: p.entry_price,
                unrealized_pnl: Decimal::ZERO,
            })
            .collect())
    }
}

/// Conviction feed backed by a settable map. Missing assets return `None`,
/// matching an untracked coin on the live feed.
#[derive(Default)]
pub struct StaticConviction {
    readings: Mutex<HashMap<String, ConvictionSnapshot>>,
}

impl StaticConviction {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, snapshot: ConvictionSnapshot) {
        self.readings
            .lock()
            .await
            .insert(snapshot.asset.clone(), snapshot);
    }
}

#[async_trait]
impl ConvictionFeed for StaticConviction {
    async fn conviction(&self, asset: &str) -> Result<Option<ConvictionSnapshot>, GatewayError> {
        Ok(self.readings.lock().await.get(asset).cloned())
    }
}

/// Feed that replays preloaded scans, then repeats the last one.
#[derive(Default)]
pub struct StaticFeed {
    scans: Mutex<Vec<Vec<MarketSnapshot>>>,
    fail: AtomicBool,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_scan(&self, scan: Vec<MarketSnapshot>) {
        self.scans.lock().await.push(scan);
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MarketDataFeed for StaticFeed {
    async fn leaderboard(&self) -> Result<Vec<MarketSnapshot>, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout("static feed down".into()));
        }
        let mut scans = self.scans.lock().await;
        if scans.len() > 1 {
            Ok(scans.remove(0))
        } else {
            Ok(scans.first().cloned().unwrap_or_default())
        }
    }
}
