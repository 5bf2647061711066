pub mod config;
pub mod config_loader;
pub mod error;
pub mod sizing;
pub mod slots;
pub mod store;
pub mod traits;
pub mod types;

pub use config::{
    BreachDecay, CadenceConfig, ClassifierConfig, ConvictionConfig, GatewayConfig, Phase1Config,
    StagnationConfig, StrategyConfig, TierConfig, TrailguardConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{GatewayError, TrailguardError};
pub use sizing::{sizing_plan, SizingPlan};
pub use slots::SlotLedger;
pub use store::{retire, PositionKey, PositionLease, PositionRecord, RiskStateStore};
pub use traits::{ExecutionGateway, LivePosition, LogNotifier, MarginMode, MarketDataFeed, Notifier};
pub use types::{
    CloseReason, Direction, MarketSnapshot, Phase, Position, RiskState, TradeLogRecord,
};
