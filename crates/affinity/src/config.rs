//! Service configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `config/affinity.{toml,yaml,json}` file, then `AFFINITY_*` environment
//! variables (nested keys separated by `__`).
//!
//! ```bash
//! export AFFINITY_SERVER__PORT="7860"
//! export AFFINITY_DATA__INTERACTIONS_PATH="Input_Data/MF_Semantic_Type_Interactions.csv"
//! export AFFINITY_STAGE__CATEGORY_TYPE="Planet"
//! export AFFINITY_STAGE__REDUCER="max"
//! export AFFINITY_STAGE__SGD__RANK="4"
//! ```
//!
//! The stage reducer has no built-in default and must come from the file or
//! the environment.

use crate::error::{AffinityError, Result};
use crate::pipeline::StageConfig;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "config/affinity";
const ENV_PREFIX: &str = "AFFINITY";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub stage: StageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind host (default: 0.0.0.0)
    pub host: String,
    /// Bind port (default: 7860)
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// Interaction export read by `POST /run`
    pub interactions_path: PathBuf,
    /// Destination of the prediction table
    pub predictions_path: PathBuf,
}

impl ServiceConfig {
    /// Load from `config/affinity` and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(file: &str) -> Result<Self> {
        let builder = defaults()?
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings = builder.build().map_err(config_error)?;
        let config: Self = settings.try_deserialize().map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AffinityError::Configuration {
                message: "port must be greater than 0".to_string(),
                key: Some("server.port".to_string()),
            });
        }

        if self.stage.category_type.trim().is_empty() {
            return Err(AffinityError::Configuration {
                message: "category_type must not be empty".to_string(),
                key: Some("stage.category_type".to_string()),
            });
        }

        self.stage
            .sgd
            .validate()
            .map_err(|e| AffinityError::Configuration {
                message: e.to_string(),
                key: Some("stage.sgd".to_string()),
            })
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    config::Config::builder()
        .set_default("server.host", "0.0.0.0")
        .and_then(|b| b.set_default("server.port", 7860))
        .and_then(|b| {
            b.set_default(
                "data.interactions_path",
                "Input_Data/MF_Semantic_Type_Interactions.csv",
            )
        })
        .and_then(|b| {
            b.set_default(
                "data.predictions_path",
                "Output_Data/Layer3_Planet_Predictions.csv",
            )
        })
        .and_then(|b| b.set_default("stage.category_type", "Planet"))
        .map_err(config_error)
}

fn config_error(e: config::ConfigError) -> AffinityError {
    AffinityError::Configuration {
        message: e.to_string(),
        key: None,
    }
}

/// Load `.env` if present; a missing file is not an error.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }
}
