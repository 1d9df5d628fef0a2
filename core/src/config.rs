use crate::allowance::ApprovalPolicy;
use crate::amount::{AmountCodec, DEFAULT_UNIT_SCALE};
use crate::ledger::{Address, LedgerContracts};
use crate::network_config::{self, NetworkPreset, DEFAULT_PURCHASE_CONTRACT};
use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub rust_log: String,
    /// Preset name, see [`network_config::resolve_preset`].
    pub network: String,
    /// Overrides the preset's RPC endpoint.
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Wallet bridge that signs and broadcasts invocations.
    pub wallet_url: String,
    pub purchase_contract: String,
    /// Overrides the preset's payment token.
    #[serde(default)]
    pub payment_token: Option<String>,
    pub unit_scale: u32,
    pub approval_policy: ApprovalPolicy,
    pub request_timeout_secs: u64,
    pub confirmation_poll_ms: u64,
    pub confirmation_timeout_secs: u64,
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    load_config_from(Environment::default())
}

pub fn load_config_from(environment: Environment) -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .add_source(environment)
        .set_default("server_port", 8080)?
        .set_default("rust_log", "info")?
        .set_default("network", "testnet")?
        .set_default("wallet_url", "http://127.0.0.1:5051")?
        .set_default("purchase_contract", DEFAULT_PURCHASE_CONTRACT)?
        .set_default("unit_scale", i64::from(DEFAULT_UNIT_SCALE))?
        .set_default("approval_policy", "unlimited")?
        .set_default("request_timeout_secs", 30)?
        .set_default("confirmation_poll_ms", 2_000)?
        .set_default("confirmation_timeout_secs", 300)?
        .build()?;

    settings.try_deserialize()
}

impl AppConfig {
    pub fn network_preset(&self) -> Result<NetworkPreset, ConfigError> {
        network_config::resolve_preset(&self.network)
            .ok_or_else(|| ConfigError::Message(format!("Unknown network '{}'", self.network)))
    }

    pub fn rpc_url(&self) -> Result<String, ConfigError> {
        match &self.rpc_url {
            Some(url) => Ok(url.clone()),
            None => Ok(self.network_preset()?.rpc_url),
        }
    }

    pub fn contracts(&self) -> Result<LedgerContracts, ConfigError> {
        let payment_token = match &self.payment_token {
            Some(token) => token.clone(),
            None => self.network_preset()?.payment_token,
        };
        Ok(LedgerContracts {
            purchase_contract: parse_address("purchase_contract", &self.purchase_contract)?,
            payment_token: parse_address("payment_token", &payment_token)?,
        })
    }

    pub fn codec(&self) -> Result<AmountCodec, ConfigError> {
        AmountCodec::new(self.unit_scale).map_err(|e| ConfigError::Message(e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::Message(format!("Invalid {}: {}", key, e)))
}
