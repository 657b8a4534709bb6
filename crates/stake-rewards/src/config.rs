//! Configuration for the stake rewards exporter

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use thiserror::Error;

use crate::constants;

/// Fatal configuration problems, raised before any network activity
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not defined")]
    MissingConfiguration(&'static str),

    #[error("invalid wallet address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },
}

/// Runtime configuration with parsed values
#[derive(Debug, Clone)]
pub struct Config {
    /// RPC URL
    pub rpc_url: String,
    /// Wallet whose stake accounts are exported (withdraw authority)
    pub wallet: Pubkey,
}

impl Config {
    /// Create config from the process environment and an optional RPC URL override
    pub fn from_env(rpc_url: Option<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), rpc_url)
    }

    /// Create config from any variable source
    pub fn from_lookup<F>(lookup: F, rpc_url: Option<String>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_url = rpc_url
            .or_else(|| lookup(constants::RPC_URL_ENV))
            .and_then(non_empty)
            .ok_or(ConfigError::MissingConfiguration(constants::RPC_URL_ENV))?;

        let wallet = lookup(constants::WALLET_ENV)
            .and_then(non_empty)
            .ok_or(ConfigError::MissingConfiguration(constants::WALLET_ENV))?;

        let wallet = Pubkey::from_str(&wallet).map_err(|e| ConfigError::InvalidAddress {
            reason: e.to_string(),
            value: wallet,
        })?;

        Ok(Self { rpc_url, wallet })
    }

    /// RPC URL with API keys masked, for logging
    /// Converts "https://example.com/?api-key=SECRET" to "https://example.com/?api-key=****"
    pub fn masked_rpc_url(&self) -> String {
        mask_api_key(&self.rpc_url)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn mask_api_key(url: &str) -> String {
    for marker in ["api-key=", "apikey="] {
        if let Some(idx) = url.find(marker) {
            return format!("{}****", &url[..idx + marker.len()]);
        }
    }
    url.to_string()
}
