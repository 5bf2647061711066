use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use trailguard_core::{
    Direction, ExecutionGateway, GatewayError, LivePosition, MarginMode, Position,
};

use crate::client::InfoClient;

/// Live Hyperliquid execution gateway.
///
/// Orders are placed as aggressive IOC limits at the mid adjusted by a
/// slippage allowance, so they behave like market orders while keeping a
/// price bound the venue can reject against.
pub struct HyperliquidGateway {
    client: InfoClient,
    /// Allowed slippage from mid when crossing the book, as a fraction.
    slippage: Decimal,
}

impl HyperliquidGateway {
    pub fn new(client: InfoClient) -> Self {
        Self {
            client,
            slippage: Decimal::new(5, 3), // 0.5%
        }
    }

    async fn mid_price(&self, asset: &str) -> Result<Decimal, GatewayError> {
        let mids = self.client.info(json!({ "type": "allMids" })).await?;
        let raw = mids
            .get(asset)
            .and_then(|p| p.as_str())
            .ok_or_else(|| GatewayError::Rejected(format!("no mid price for {asset}")))?;
        Decimal::from_str_exact(raw)
            .map_err(|e| GatewayError::Rejected(format!("unparseable mid for {asset}: {e}")))
    }

    fn limit_price(&self, mid: Decimal, direction: Direction, closing: bool) -> Decimal {
        // Crossing side: pay up when opening with the direction, and when
        // closing against it.
        let aggress_up = direction.is_long() != closing;
        if aggress_up {
            mid * (Decimal::ONE + self.slippage)
        } else {
            mid * (Decimal::ONE - self.slippage)
        }
    }
}

/// Maps an order-response error string onto the typed taxonomy.
fn classify_rejection(message: &str, asset: &str) -> GatewayError {
    let lower = message.to_lowercase();
    if lower.contains("margin") {
        GatewayError::InsufficientMargin {
            requested: message.to_string(),
            available: String::new(),
        }
    } else if lower.contains("leverage") {
        GatewayError::LeverageExceeded {
            asset: asset.to_string(),
            requested: 0,
            max: 0,
        }
    } else if lower.contains("already closed") || lower.contains("no position") {
        GatewayError::AlreadyClosed {
            asset: asset.to_string(),
        }
    } else {
        GatewayError::Rejected(message.to_string())
    }
}

fn order_status(response: &serde_json::Value, asset: &str) -> Result<(), GatewayError> {
    let status = response
        .get("status")
        .and_then(|s| s.as_str())
        .ok_or_else(|| GatewayError::Rejected("missing status in order response".into()))?;
    if status == "ok" {
        return Ok(());
    }
    let error = response
        .get("response")
        .and_then(|r| r.as_str())
        .unwrap_or("unknown error");
    Err(classify_rejection(error, asset))
}

#[async_trait]
impl ExecutionGateway for HyperliquidGateway {
    async fn open(
        &self,
        asset: &str,
        direction: Direction,
        margin: Decimal,
        leverage: u8,
        margin_mode: MarginMode,
    ) -> Result<Position, GatewayError> {
        let mid = self.mid_price(asset).await?;
        let size = (margin * Decimal::from(leverage) / mid).round_dp(4);
        let limit = self.limit_price(mid, direction, false);

        let request = json!({
            "type": "order",
            "leverage": { "value": leverage, "mode": match margin_mode {
                MarginMode::Isolated => "isolated",
                MarginMode::Cross => "cross",
            }},
            "orders": [{
                "coin": asset,
                "is_buy": direction.is_long(),
                "limit_px": limit.to_string(),
                "sz": size.to_string(),
                "reduce_only": false,
                "order_type": { "limit": { "tif": "Ioc" } },
            }],
            "grouping": "na",
        });

        let response = self.client.exchange(request).await?;
        order_status(&response, asset)?;

        let fill_price = response
            .pointer("/response/data/statuses/0/filled/avgPx")
            .and_then(|p| p.as_str())
            .and_then(|p| Decimal::from_str_exact(p).ok())
            .unwrap_or(mid);

        tracing::info!(%asset, %direction, %fill_price, %size, leverage, "position opened");
        Ok(Position {
            asset: asset.to_string(),
            direction,
            entry_price: fill_price,
            size,
            leverage,
            margin,
            opened_at: Utc::now(),
        })
    }

    async fn close(&self, asset: &str, reason: &str) -> Result<(), GatewayError> {
        let live = self.positions_for_asset(asset).await?;
        let Some(position) = live else {
            // Nothing on the venue: treat as already closed, see the
            // idempotency contract on the trait.
            return Err(GatewayError::AlreadyClosed {
                asset: asset.to_string(),
            });
        };

        let mid = self.mid_price(asset).await?;
        let limit = self.limit_price(mid, position.direction, true);
        let request = json!({
            "type": "order",
            "orders": [{
                "coin": asset,
                "is_buy": !position.direction.is_long(),
                "limit_px": limit.to_string(),
                "sz": position.size.abs().to_string(),
                "reduce_only": true,
                "order_type": { "limit": { "tif": "Ioc" } },
            }],
            "grouping": "na",
        });

        let response = self.client.exchange(request).await?;
        order_status(&response, asset)?;
        tracing::info!(%asset, reason, "position closed");
        Ok(())
    }

    async fn price(&self, asset: &str) -> Result<Decimal, GatewayError> {
        self.mid_price(asset).await
    }

    async fn positions(&self, wallet: &str) -> Result<Vec<LivePosition>, GatewayError> {
        let state = self
            .client
            .info(json!({ "type": "clearinghouseState", "user": wallet }))
            .await?;
        let entries = state
            .get("assetPositions")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let mut positions = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(item) = entry.get("position") else {
                continue;
            };
            let asset = item
                .get("coin")
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string();
            let size = decimal_field(item, "szi");
            if size.is_zero() {
                continue;
            }
            positions.push(LivePosition {
                asset,
                direction: if size > Decimal::ZERO {
                    Direction::Long
                } else {
                    Direction::Short
                },
                size,
                entry_price: decimal_field(item, "entryPx"),
                unrealized_pnl: decimal_field(item, "unrealizedPnl"),
            });
        }
        Ok(positions)
    }
}

impl HyperliquidGateway {
    async fn positions_for_asset(&self, asset: &str) -> Result<Option<LivePosition>, GatewayError> {
        // Close paths do not know the wallet; the venue resolves it from the
        // API key, so an empty user falls back to the authenticated account.
        let all = self.positions("").await?;
        Ok(all.into_iter().find(|p| p.asset == asset))
    }
}

fn decimal_field(value: &serde_json::Value, key: &str) -> Decimal {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|v| Decimal::from_str_exact(v).ok())
        .unwrap_or(Decimal::ZERO)
}
