use crate::config::TrailguardConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging TOML, environment variables, and JSON,
    /// then validates the strategy section.
    ///
    /// # Errors
    ///
    /// Returns an error if files cannot be parsed or validation fails.
    pub fn load(path: &str) -> Result<TrailguardConfig> {
        let config: TrailguardConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TRAILGUARD_"))
            .join(Json::file("config/Trailguard.json"))
            .extract()?;

        config.strategy.validate()?;
        Ok(config)
    }
}
