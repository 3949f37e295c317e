use std::env;
use std::time::Duration;

use log::info;
use thiserror::Error;

use crate::model::SettlementMode;
use crate::wallet::approval::PERMIT2_ADDRESS;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_RPC_URL: &str = "https://sepolia.base.org";
pub const DEFAULT_OPG_TOKEN: &str = "0x240b09731D96979f50B2C649C9CE10FcF9C7987F";
pub const DEFAULT_LLM_SERVER_URL: &str = "https://llm.opengradient.ai";
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_APPROVAL_AMOUNT: &str = "5";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OG_PRIVATE_KEY is not set")]
    MissingPrivateKey,
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

// Everything the process reads from its environment, resolved once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub private_key: String,
    pub host: String,
    pub port: u16,
    pub rpc_url: String,
    pub token_address: String,
    pub llm_server_url: String,
    pub call_timeout: Duration,
    pub rpc_timeout: Duration,
    pub permit2_address: String,
    pub approval_amount: String,
    pub settlement: SettlementMode,
    pub templates_dir: String,
    pub static_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let private_key = lookup("OG_PRIVATE_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingPrivateKey)?;

        let port = parse_or("PORT", lookup("PORT"), DEFAULT_PORT)?;
        let timeout_secs = parse_or(
            "CALL_TIMEOUT_SECS",
            lookup("CALL_TIMEOUT_SECS"),
            DEFAULT_CALL_TIMEOUT_SECS,
        )?;
        let rpc_timeout_secs = parse_or(
            "RPC_TIMEOUT_SECS",
            lookup("RPC_TIMEOUT_SECS"),
            DEFAULT_RPC_TIMEOUT_SECS,
        )?;
        let settlement = parse_or(
            "OG_SETTLEMENT_MODE",
            lookup("OG_SETTLEMENT_MODE"),
            SettlementMode::default(),
        )?;

        let config = Self {
            private_key,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            rpc_url: lookup("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            token_address: lookup("OPG_TOKEN_ADDRESS")
                .unwrap_or_else(|| DEFAULT_OPG_TOKEN.to_string()),
            llm_server_url: lookup("LLM_SERVER_URL")
                .unwrap_or_else(|| DEFAULT_LLM_SERVER_URL.to_string()),
            call_timeout: Duration::from_secs(timeout_secs),
            rpc_timeout: Duration::from_secs(rpc_timeout_secs),
            permit2_address: lookup("PERMIT2_ADDRESS")
                .unwrap_or_else(|| PERMIT2_ADDRESS.to_string()),
            approval_amount: lookup("OPG_APPROVAL_AMOUNT")
                .unwrap_or_else(|| DEFAULT_APPROVAL_AMOUNT.to_string()),
            settlement,
            templates_dir: lookup("TEMPLATES_DIR").unwrap_or_else(|| "templates".to_string()),
            static_dir: lookup("STATIC_DIR").unwrap_or_else(|| "static".to_string()),
        };

        info!(
            "Config: listen {}:{}, rpc {}, llm {}, timeout {}s, settlement {}",
            config.host,
            config.port,
            config.rpc_url,
            config.llm_server_url,
            config.call_timeout.as_secs(),
            config.settlement
        );
        Ok(config)
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}
