//! Typed service configuration.
//!
//! Every value can be given as a command-line flag or through the
//! environment. Missing credentials never abort startup: the dependent
//! service is simply reported as unconfigured.

use crate::domain::payment::Amount;
use crate::error::Result;
use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MODEL_ID: &str = "google/flan-t5-nano";

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Connection parameters for the relational store.
#[derive(Debug, Clone, Default, Args)]
pub struct DatabaseConfig {
    /// Database host, optionally as host:port
    #[arg(long = "db-host", env = "DB_HOST")]
    pub host: Option<String>,
    #[arg(long = "db-name", env = "DB_NAME")]
    pub name: Option<String>,
    #[arg(long = "db-user", env = "DB_USER")]
    pub user: Option<String>,
    #[arg(long = "db-password", env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl DatabaseConfig {
    /// Returns host, database, user and password when all four are set and non-empty.
    pub fn parts(&self) -> Option<(&str, &str, &str, &str)> {
        Some((
            present(&self.host)?,
            present(&self.name)?,
            present(&self.user)?,
            present(&self.password)?,
        ))
    }

    pub fn is_configured(&self) -> bool {
        self.parts().is_some()
    }
}

/// Credentials and behaviour of the mobile-money gateway.
#[derive(Debug, Clone, Args)]
pub struct GatewayConfig {
    #[arg(long = "intasend-publishable-key", env = "INTASEND_PUBLISHABLE_KEY")]
    pub publishable_key: Option<String>,
    #[arg(
        long = "intasend-secret-key",
        env = "INTASEND_SECRET_KEY",
        hide_env_values = true
    )]
    pub secret_key: Option<String>,
    /// Use the gateway sandbox instead of the live environment
    #[arg(long = "intasend-test", env = "INTASEND_TEST")]
    pub sandbox: bool,
    /// Shared challenge expected on inbound webhook events
    #[arg(
        long = "webhook-challenge",
        env = "INTASEND_WEBHOOK_CHALLENGE",
        hide_env_values = true
    )]
    pub webhook_challenge: Option<String>,
    #[arg(long = "gateway-timeout-secs", env = "GATEWAY_TIMEOUT_SECS", default_value_t = 15)]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            publishable_key: None,
            secret_key: None,
            sandbox: false,
            webhook_challenge: None,
            timeout_secs: 15,
        }
    }
}

impl GatewayConfig {
    /// Returns the publishable and secret keys when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((present(&self.publishable_key)?, present(&self.secret_key)?))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where the text-generation model is served from.
#[derive(Debug, Clone, Args)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible completions server
    #[arg(long = "model-endpoint", env = "MODEL_ENDPOINT")]
    pub endpoint: Option<String>,
    #[arg(long = "model-id", env = "MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,
    #[arg(long = "model-api-key", env = "MODEL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    #[arg(
        long = "generation-timeout-secs",
        env = "GENERATION_TIMEOUT_SECS",
        default_value_t = 30
    )]
    pub generation_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_key: None,
            generation_timeout_secs: 30,
        }
    }
}

impl ModelConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind: String,
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Price of premium access, in the gateway currency
    #[arg(long = "price", env = "PRICE_PREMIUM_ACCESS", default_value = "20")]
    pub premium_price: Decimal,
    #[command(flatten)]
    pub database: DatabaseConfig,
    #[command(flatten)]
    pub gateway: GatewayConfig,
    #[command(flatten)]
    pub model: ModelConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            premium_price: dec!(20),
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn premium_amount(&self) -> Result<Amount> {
        Amount::new(self.premium_price)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
