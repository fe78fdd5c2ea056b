use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use url::Url;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub carrier: CarrierConfig,
    pub provisioning: ProvisioningConfig,
    pub access: AccessConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            carrier: CarrierConfig::from_env()?,
            provisioning: ProvisioningConfig::from_env()?,
            access: AccessConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

pub const DEFAULT_CARRIER_BASE_URL: &str = "https://api.surge.app";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RECONCILE_BATCH_SIZE: usize = 200;
const DEFAULT_DRAIN_BATCH_SIZE: usize = 50;

/// Credentials and behavior toggles for the carrier API.
#[derive(Clone)]
pub struct CarrierConfig {
    pub api_base_url: Url,
    pub api_key: Option<String>,
    pub master_account_id: Option<String>,
    /// When false every business shares `master_account_id`.
    pub use_sub_accounts: bool,
    pub request_timeout_secs: u64,
    pub webhook_secret: Option<String>,
    /// Maximum webhook timestamp skew; zero disables the freshness check.
    pub signature_tolerance_secs: u64,
}

impl CarrierConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_base =
            env::var("SURGE_API_BASE_URL").unwrap_or_else(|_| DEFAULT_CARRIER_BASE_URL.to_string());
        let api_base_url = Url::parse(raw_base.trim()).map_err(|_| ConfigError::InvalidUrl {
            name: "SURGE_API_BASE_URL",
        })?;

        Ok(Self {
            api_base_url,
            api_key: non_empty_var("SURGE_API_KEY"),
            master_account_id: non_empty_var("SURGE_MASTER_ACCOUNT_ID"),
            use_sub_accounts: bool_var("SURGE_USE_SUB_ACCOUNTS", false)?,
            request_timeout_secs: number_var(
                "SURGE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            webhook_secret: non_empty_var("SURGE_WEBHOOK_SECRET"),
            signature_tolerance_secs: number_var("SURGE_SIGNATURE_TOLERANCE_SECS", 0)?,
        })
    }
}

impl fmt::Debug for CarrierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarrierConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("master_account_id", &self.master_account_id)
            .field("use_sub_accounts", &self.use_sub_accounts)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .finish()
    }
}

/// Global number capacity and reconciler cadence.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Zero means unlimited.
    pub max_numbers: usize,
    pub reconcile_batch_size: usize,
    /// Items one drain run may process when capacity is unlimited.
    pub drain_batch_size: usize,
    /// Zero disables the in-process reconciler schedule.
    pub reconcile_interval_secs: u64,
}

impl ProvisioningConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_numbers: number_var("TFN_MAX_NUMBERS", 0)?,
            reconcile_batch_size: number_var(
                "TFN_RECONCILE_BATCH_SIZE",
                DEFAULT_RECONCILE_BATCH_SIZE,
            )?,
            drain_batch_size: number_var("TFN_DRAIN_BATCH_SIZE", DEFAULT_DRAIN_BATCH_SIZE)?,
            reconcile_interval_secs: number_var("TFN_RECONCILE_INTERVAL_SECS", 0)?,
        })
    }

    pub fn unlimited(&self) -> bool {
        self.max_numbers == 0
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_numbers: 0,
            reconcile_batch_size: DEFAULT_RECONCILE_BATCH_SIZE,
            drain_batch_size: DEFAULT_DRAIN_BATCH_SIZE,
            reconcile_interval_secs: 0,
        }
    }
}

/// Shared secrets for operator endpoints and the owner token directory.
#[derive(Clone, Default)]
pub struct AccessConfig {
    pub admin_token: Option<String>,
    pub cron_secret: Option<String>,
    pub owner_tokens: BTreeMap<String, BTreeSet<String>>,
}

impl AccessConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let owner_tokens = match non_empty_var("APP_OWNER_TOKENS") {
            Some(raw) => parse_owner_tokens(&raw)?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            admin_token: non_empty_var("APP_ADMIN_TOKEN"),
            cron_secret: non_empty_var("APP_CRON_SECRET"),
            owner_tokens,
        })
    }
}

impl fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessConfig")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<redacted>"))
            .field("owner_tokens", &self.owner_tokens.len())
            .finish()
    }
}

/// Parses `token=biz1|biz2;token2=biz3`.
pub fn parse_owner_tokens(raw: &str) -> Result<BTreeMap<String, BTreeSet<String>>, ConfigError> {
    let mut directory = BTreeMap::new();
    for entry in raw.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (token, businesses) = entry
            .split_once('=')
            .ok_or(ConfigError::InvalidOwnerTokens)?;
        let token = token.trim();
        if token.is_empty() {
            return Err(ConfigError::InvalidOwnerTokens);
        }
        let ids: BTreeSet<String> = businesses
            .split('|')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Err(ConfigError::InvalidOwnerTokens);
        }
        directory
            .entry(token.to_string())
            .or_insert_with(BTreeSet::new)
            .extend(ids);
    }
    Ok(directory)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn number_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        None => Ok(default),
    }
}

fn bool_var(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool { name }),
        },
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
    InvalidBool { name: &'static str },
    InvalidUrl { name: &'static str },
    InvalidOwnerTokens,
    Missing { name: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a non-negative integer")
            }
            ConfigError::InvalidBool { name } => write!(f, "{name} must be true or false"),
            ConfigError::InvalidUrl { name } => write!(f, "{name} must be an absolute URL"),
            ConfigError::InvalidOwnerTokens => {
                write!(f, "APP_OWNER_TOKENS must look like token=biz1|biz2;token2=biz3")
            }
            ConfigError::Missing { name } => write!(f, "{name} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "SURGE_API_BASE_URL",
            "SURGE_API_KEY",
            "SURGE_MASTER_ACCOUNT_ID",
            "SURGE_USE_SUB_ACCOUNTS",
            "SURGE_REQUEST_TIMEOUT_SECS",
            "SURGE_WEBHOOK_SECRET",
            "SURGE_SIGNATURE_TOLERANCE_SECS",
            "TFN_MAX_NUMBERS",
            "TFN_RECONCILE_BATCH_SIZE",
            "TFN_RECONCILE_INTERVAL_SECS",
            "APP_ADMIN_TOKEN",
            "APP_CRON_SECRET",
            "APP_OWNER_TOKENS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.carrier.api_base_url.as_str(), "https://api.surge.app/");
        assert!(!config.carrier.use_sub_accounts);
        assert_eq!(config.carrier.request_timeout_secs, 15);
        assert_eq!(config.provisioning.max_numbers, 0);
        assert!(config.provisioning.unlimited());
        assert_eq!(config.provisioning.reconcile_batch_size, 200);
        assert!(config.access.owner_tokens.is_empty());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn reads_carrier_and_capacity_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SURGE_USE_SUB_ACCOUNTS", "yes");
        env::set_var("SURGE_MASTER_ACCOUNT_ID", "acct_master");
        env::set_var("TFN_MAX_NUMBERS", "25");
        env::set_var("APP_OWNER_TOKENS", "tok-a=biz-1|biz-2; tok-b=biz-3");
        let config = AppConfig::load().expect("config loads");
        reset_env();

        assert!(config.carrier.use_sub_accounts);
        assert_eq!(config.carrier.master_account_id.as_deref(), Some("acct_master"));
        assert_eq!(config.provisioning.max_numbers, 25);
        assert!(!config.provisioning.unlimited());
        let owned = config.access.owner_tokens.get("tok-a").expect("token parsed");
        assert!(owned.contains("biz-1") && owned.contains("biz-2"));
        assert_eq!(config.access.owner_tokens.len(), 2);
    }

    #[test]
    fn rejects_invalid_capacity() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("TFN_MAX_NUMBERS", "-1");
        let err = AppConfig::load().expect_err("negative capacity rejected");
        reset_env();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                name: "TFN_MAX_NUMBERS"
            }
        ));
    }

    #[test]
    fn owner_tokens_require_business_ids() {
        assert!(parse_owner_tokens("tok=").is_err());
        assert!(parse_owner_tokens("no-separator").is_err());
        assert!(parse_owner_tokens("").expect("empty ok").is_empty());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = AccessConfig {
            admin_token: Some("super-secret".to_string()),
            cron_secret: None,
            owner_tokens: BTreeMap::new(),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
