use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIN_SECRET_CHARS: usize = 32;
const ED25519_SEED_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::str::FromStr for AppEnv {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Development),
            "prod" | "production" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnv(other.to_string())),
        }
    }
}

/// Which deployment of the ZK transfer backend and chain anchor the process
/// talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkTag {
    Devnet,
    Mainnet,
}

impl NetworkTag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Devnet => "devnet",
            Self::Mainnet => "mainnet",
        }
    }

    #[must_use]
    pub fn default_zk_backend_url(self) -> &'static str {
        match self {
            Self::Devnet => "https://zk-backend.devnet.radr.games",
            Self::Mainnet => "https://zk-backend.radr.games",
        }
    }

    #[must_use]
    pub fn default_anchor_url(self) -> &'static str {
        match self {
            Self::Devnet => "https://anchor.devnet.radr.games",
            Self::Mainnet => "https://anchor.radr.games",
        }
    }
}

impl std::str::FromStr for NetworkTag {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "devnet" => Ok(Self::Devnet),
            "mainnet" | "mainnet-beta" => Ok(Self::Mainnet),
            other => Err(ConfigError::InvalidNetwork(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(&'static str),
    #[error("{name} must be at least {min} characters")]
    TooShort { name: &'static str, min: usize },
    #[error("{name} is not a base58-encoded {ED25519_SEED_BYTES}-byte seed")]
    InvalidSeed { name: &'static str },
    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be between {min} and {max}")]
    OutOfRange {
        name: &'static str,
        min: u64,
        max: u64,
    },
    #[error("invalid APP_ENV value: {0}")]
    InvalidEnv(String),
    #[error("invalid NETWORK value: {0}")]
    InvalidNetwork(String),
}

/// Process configuration, loaded once at start-up and immutable after.
/// Construction fails fast on any malformed secret so the service never
/// comes up half-configured.
#[derive(Clone)]
pub struct EscrowConfig {
    pub env: AppEnv,
    pub network: NetworkTag,
    pub bind_addr: String,
    pub escrow_wallet_secret: String,
    pub treasury_wallet_secret: String,
    pub server_authority_secret: String,
    pub wallet_pepper: String,
    pub internal_api_key: String,
    pub house_fee_percent: u8,
    pub escrow_timeout_seconds: u64,
    pub zk_backend_url: String,
    pub anchor_url: String,
}

impl std::fmt::Debug for EscrowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowConfig")
            .field("env", &self.env)
            .field("network", &self.network)
            .field("bind_addr", &self.bind_addr)
            .field("house_fee_percent", &self.house_fee_percent)
            .field("escrow_timeout_seconds", &self.escrow_timeout_seconds)
            .field("zk_backend_url", &self.zk_backend_url)
            .field("anchor_url", &self.anchor_url)
            .finish_non_exhaustive()
    }
}

impl EscrowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same loading path as [`Self::from_env`] with an injectable source,
    /// so tests never mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let escrow_wallet_secret = required_seed(&lookup, "ESCROW_WALLET_SECRET")?;
        let treasury_wallet_secret = required_seed(&lookup, "TREASURY_WALLET_SECRET")?;
        let server_authority_secret = required_seed(&lookup, "SERVER_AUTHORITY_SECRET")?;
        let wallet_pepper = required_min_len(&lookup, "WALLET_PEPPER", MIN_SECRET_CHARS)?;
        let internal_api_key = required_min_len(&lookup, "INTERNAL_API_KEY", MIN_SECRET_CHARS)?;

        let house_fee_percent = match lookup("HOUSE_FEE_PERCENT") {
            Some(raw) => {
                let value: u64 =
                    raw.trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidNumber {
                            name: "HOUSE_FEE_PERCENT",
                            value: raw.clone(),
                        })?;
                if value > 10 {
                    return Err(ConfigError::OutOfRange {
                        name: "HOUSE_FEE_PERCENT",
                        min: 0,
                        max: 10,
                    });
                }
                value as u8
            }
            None => 2,
        };

        let escrow_timeout_seconds = match lookup("ESCROW_TIMEOUT_SECONDS") {
            Some(raw) => {
                let value: u64 =
                    raw.trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidNumber {
                            name: "ESCROW_TIMEOUT_SECONDS",
                            value: raw.clone(),
                        })?;
                if value == 0 {
                    return Err(ConfigError::OutOfRange {
                        name: "ESCROW_TIMEOUT_SECONDS",
                        min: 1,
                        max: u64::MAX,
                    });
                }
                value
            }
            None => 1800,
        };

        let env_tag = match lookup("APP_ENV") {
            Some(raw) => raw.parse()?,
            None => AppEnv::Development,
        };
        let network = match lookup("NETWORK") {
            Some(raw) => raw.parse()?,
            None => NetworkTag::Devnet,
        };
        let zk_backend_url = lookup("ZK_BACKEND_URL")
            .unwrap_or_else(|| network.default_zk_backend_url().to_string());
        let anchor_url =
            lookup("ANCHOR_URL").unwrap_or_else(|| network.default_anchor_url().to_string());
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8787".to_string());

        Ok(Self {
            env: env_tag,
            network,
            bind_addr,
            escrow_wallet_secret,
            treasury_wallet_secret,
            server_authority_secret,
            wallet_pepper,
            internal_api_key,
            house_fee_percent,
            escrow_timeout_seconds,
            zk_backend_url,
            anchor_url,
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingRequired(name))
}

fn required_min_len<F>(lookup: &F, name: &'static str, min: usize) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = required(lookup, name)?;
    if value.len() < min {
        return Err(ConfigError::TooShort { name, min });
    }
    Ok(value)
}

fn required_seed<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = required(lookup, name)?;
    let decoded = bs58::decode(&value)
        .into_vec()
        .map_err(|_| ConfigError::InvalidSeed { name })?;
    if decoded.len() != ED25519_SEED_BYTES {
        return Err(ConfigError::InvalidSeed { name });
    }
    Ok(value)
}

/// Every API response carries a top-level `success` flag; payload fields
/// flatten beside it, failures carry a short human-readable error.
#[derive(Debug, Clone, Serialize)]
pub struct ApiEnvelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiEnvelope<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_vars() -> HashMap<&'static str, String> {
        let seed = bs58::encode([9_u8; 32]).into_string();
        HashMap::from([
            ("ESCROW_WALLET_SECRET", seed.clone()),
            ("TREASURY_WALLET_SECRET", seed.clone()),
            ("SERVER_AUTHORITY_SECRET", seed),
            (
                "WALLET_PEPPER",
                "pepper-pepper-pepper-pepper-pepper-pepper".to_string(),
            ),
            (
                "INTERNAL_API_KEY",
                "api-key-api-key-api-key-api-key-api-key".to_string(),
            ),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<EscrowConfig, ConfigError> {
        EscrowConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn loads_with_documented_defaults() {
        let config = load(&valid_vars()).expect("config");
        assert_eq!(config.house_fee_percent, 2);
        assert_eq!(config.escrow_timeout_seconds, 1800);
        assert_eq!(config.network, NetworkTag::Devnet);
        assert_eq!(config.env, AppEnv::Development);
        assert_eq!(config.zk_backend_url, "https://zk-backend.devnet.radr.games");
    }

    #[test]
    fn rejects_missing_and_short_secrets() {
        let mut vars = valid_vars();
        vars.remove("ESCROW_WALLET_SECRET");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::MissingRequired("ESCROW_WALLET_SECRET"))
        ));

        let mut vars = valid_vars();
        vars.insert("WALLET_PEPPER", "short".to_string());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::TooShort {
                name: "WALLET_PEPPER",
                ..
            })
        ));
    }

    #[test]
    fn rejects_seeds_that_are_not_32_byte_base58() {
        let mut vars = valid_vars();
        vars.insert("TREASURY_WALLET_SECRET", "definitely-not-base58-0OIl".to_string());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidSeed {
                name: "TREASURY_WALLET_SECRET"
            })
        ));

        let mut vars = valid_vars();
        vars.insert(
            "SERVER_AUTHORITY_SECRET",
            bs58::encode([1_u8; 16]).into_string(),
        );
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidSeed {
                name: "SERVER_AUTHORITY_SECRET"
            })
        ));
    }

    #[test]
    fn bounds_house_fee_and_timeout() {
        let mut vars = valid_vars();
        vars.insert("HOUSE_FEE_PERCENT", "11".to_string());
        assert!(matches!(load(&vars), Err(ConfigError::OutOfRange { .. })));

        let mut vars = valid_vars();
        vars.insert("HOUSE_FEE_PERCENT", "ten".to_string());
        assert!(matches!(load(&vars), Err(ConfigError::InvalidNumber { .. })));

        let mut vars = valid_vars();
        vars.insert("ESCROW_TIMEOUT_SECONDS", "0".to_string());
        assert!(matches!(load(&vars), Err(ConfigError::OutOfRange { .. })));

        let mut vars = valid_vars();
        vars.insert("HOUSE_FEE_PERCENT", "5".to_string());
        vars.insert("ESCROW_TIMEOUT_SECONDS", "600".to_string());
        let config = load(&vars).expect("config");
        assert_eq!(config.house_fee_percent, 5);
        assert_eq!(config.escrow_timeout_seconds, 600);
    }

    #[test]
    fn network_selects_backend_urls_unless_overridden() {
        let mut vars = valid_vars();
        vars.insert("NETWORK", "mainnet".to_string());
        let config = load(&vars).expect("config");
        assert_eq!(config.zk_backend_url, "https://zk-backend.radr.games");
        assert_eq!(config.anchor_url, "https://anchor.radr.games");

        vars.insert("ZK_BACKEND_URL", "http://127.0.0.1:7000".to_string());
        let config = load(&vars).expect("config");
        assert_eq!(config.zk_backend_url, "http://127.0.0.1:7000");

        let mut vars = valid_vars();
        vars.insert("NETWORK", "testnet".to_string());
        assert!(matches!(load(&vars), Err(ConfigError::InvalidNetwork(_))));
    }

    #[test]
    fn envelope_always_carries_success_and_flattens_payload() {
        #[derive(Serialize)]
        struct Payload {
            #[serde(rename = "duelId")]
            duel_id: &'static str,
        }

        let ok = serde_json::to_value(ApiEnvelope::ok(Payload { duel_id: "abc" }))
            .expect("serialize");
        assert_eq!(ok["success"], true);
        assert_eq!(ok["duelId"], "abc");
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(ApiEnvelope::<Payload>::err("Stake too low"))
            .expect("serialize");
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "Stake too low");
        assert!(err.get("duelId").is_none());
    }

    #[test]
    fn debug_never_prints_secret_material() {
        let config = load(&valid_vars()).expect("config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains(&config.internal_api_key));
        assert!(!rendered.contains(&config.wallet_pepper));
        assert!(!rendered.contains(&config.escrow_wallet_secret));
    }
}
