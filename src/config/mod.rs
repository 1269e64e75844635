use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Minimum length accepted for the wallet encryption key
pub const MIN_ENCRYPTION_KEY_LEN: usize = 32;

const DEFAULT_CAELIAN_RPC: &str = "https://caelian.testnet.romeprotocol.xyz/";
const DEFAULT_MARTIS_RPC: &str = "https://martis.testnet.romeprotocol.xyz/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ENCRYPTION_KEY must be at least {MIN_ENCRYPTION_KEY_LEN} characters")]
    EncryptionKeyTooShort,
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("activity delay range is inverted ({min} > {max})")]
    InvertedDelay { min: u64, max: u64 },
    #[error("activity amount range is invalid ({min} .. {max})")]
    InvalidAmount { min: f64, max: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub security: SecurityConfig,
    pub solana: SolanaConfig,
    pub rome: RomeConfig,
    pub transactions: TransactionConfig,
    pub activity: ActivityConfig,
    pub wallet: WalletConfig,
    pub forms: FormConfig,
    pub browser: BrowserConfig,
    pub report: ReportConfig,
    pub paths: PathsConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    // Prefer ENCRYPTION_KEY / SEED_PHRASE in the environment over the TOML file.
    pub encryption_key: String,
    #[serde(default)]
    pub seed_phrase: Option<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("encryption_key", &"<redacted>")
            .field("seed_phrase", &self.seed_phrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub faucet_url: String,
    /// Base delay between wallets when requesting airdrops in bulk
    pub faucet_delay_ms: u64,
    /// Attempts against the web faucet before falling back
    pub max_retries: u32,
    pub airdrop_amount_sol: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RomeConfig {
    pub deposit_url: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub martis_rpc_url: String,
    #[serde(default)]
    pub fallback_rpc_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    pub max_transactions: usize,
    pub batch_size: usize,
    /// Per-address throttle and pause between batches
    pub delay_ms: u64,
    /// Fixed pause after a failed attempt before moving to the next endpoint
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub min_amount: f64,
    pub max_amount: f64,
    /// How long the background activity keeps running before forms are submitted
    pub window_secs: u64,
    pub multi_transfer_gap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub default_count: usize,
    pub default_contracts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FormConfig {
    pub url: String,
    pub entry_address: String,
    pub entry_tx_count: String,
}

impl FormConfig {
    pub fn is_complete(&self) -> bool {
        !self.url.is_empty() && !self.entry_address.is_empty() && !self.entry_tx_count.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub timeout_ms: u64,
    pub screenshots: bool,
    pub webdriver_url: String,
    #[serde(default)]
    pub extension_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub file_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            security: SecurityConfig {
                encryption_key: String::new(),
                seed_phrase: None,
            },
            solana: SolanaConfig {
                rpc_url: "https://api.devnet.solana.com".to_string(),
                faucet_url: "https://faucet.solana.com/api/v1/airdrop".to_string(),
                faucet_delay_ms: 5000,
                max_retries: 3,
                airdrop_amount_sol: 1.0,
            },
            rome: RomeConfig {
                deposit_url: "https://deposit.testnet.romeprotocol.xyz".to_string(),
                chain_id: 57005,
                rpc_url: DEFAULT_CAELIAN_RPC.to_string(),
                martis_rpc_url: DEFAULT_MARTIS_RPC.to_string(),
                fallback_rpc_urls: vec![
                    DEFAULT_CAELIAN_RPC.to_string(),
                    DEFAULT_MARTIS_RPC.to_string(),
                ],
            },
            transactions: TransactionConfig {
                max_transactions: 10_000,
                batch_size: 50,
                delay_ms: 100,
                retry_backoff_ms: 2000,
            },
            activity: ActivityConfig {
                min_delay_ms: 5_000,
                max_delay_ms: 30_000,
                min_amount: 0.0001,
                max_amount: 0.001,
                window_secs: 30,
                multi_transfer_gap_ms: 2000,
            },
            wallet: WalletConfig {
                default_count: 5,
                default_contracts: 3,
            },
            forms: FormConfig::default(),
            browser: BrowserConfig {
                headless: false,
                timeout_ms: 30_000,
                screenshots: true,
                webdriver_url: "http://localhost:9515".to_string(),
                extension_dir: None,
            },
            report: ReportConfig {
                file_name: "rome_automation_stats.xlsx".to_string(),
                enabled: true,
            },
            paths: PathsConfig {
                data_dir: PathBuf::from("."),
            },
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build the configuration from process environment variables (after `.env` is loaded)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay the given key lookup onto the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ENCRYPTION_KEY") {
            config.security.encryption_key = v;
        }
        config.security.seed_phrase = get("SEED_PHRASE");

        if let Some(v) = get("SOLANA_RPC_URL") {
            config.solana.rpc_url = v;
        }
        if let Some(v) = get("SOLANA_FAUCET_URL") {
            config.solana.faucet_url = v;
        }
        parse_into(&get, "SOLANA_FAUCET_DELAY_MS", &mut config.solana.faucet_delay_ms)?;
        parse_into(&get, "SOLANA_MAX_RETRIES", &mut config.solana.max_retries)?;

        if let Some(v) = get("ROME_DEPOSIT_URL") {
            config.rome.deposit_url = v;
        }
        parse_into(&get, "ROME_CHAIN_ID", &mut config.rome.chain_id)?;
        if let Some(v) = get("ROME_RPC_URL") {
            config.rome.rpc_url = v;
        }
        if let Some(v) = get("ROME_MARTIS_RPC_URL") {
            config.rome.martis_rpc_url = v;
        }

        parse_into(&get, "MAX_TRANSACTIONS", &mut config.transactions.max_transactions)?;
        parse_into(&get, "TX_BATCH_SIZE", &mut config.transactions.batch_size)?;
        parse_into(&get, "TX_DELAY_MS", &mut config.transactions.delay_ms)?;

        parse_into(&get, "ACTIVITY_MIN_DELAY_MS", &mut config.activity.min_delay_ms)?;
        parse_into(&get, "ACTIVITY_MAX_DELAY_MS", &mut config.activity.max_delay_ms)?;
        parse_into(&get, "ACTIVITY_MIN_AMOUNT", &mut config.activity.min_amount)?;
        parse_into(&get, "ACTIVITY_MAX_AMOUNT", &mut config.activity.max_amount)?;
        parse_into(&get, "ACTIVITY_WINDOW_SECS", &mut config.activity.window_secs)?;

        parse_into(&get, "DEFAULT_WALLET_COUNT", &mut config.wallet.default_count)?;
        parse_into(&get, "DEFAULT_CONTRACTS_PER_WALLET", &mut config.wallet.default_contracts)?;

        if let Some(v) = get("GOOGLE_FORM_URL") {
            config.forms.url = v;
        }
        if let Some(v) = get("GOOGLE_FORM_ENTRY_ADDRESS") {
            config.forms.entry_address = v;
        }
        if let Some(v) = get("GOOGLE_FORM_ENTRY_TX_COUNT") {
            config.forms.entry_tx_count = v;
        }

        parse_flag(&get, "HEADLESS", &mut config.browser.headless)?;
        parse_into(&get, "BROWSER_TIMEOUT", &mut config.browser.timeout_ms)?;
        parse_flag(&get, "TAKE_SCREENSHOTS", &mut config.browser.screenshots)?;
        if let Some(v) = get("WEBDRIVER_URL") {
            config.browser.webdriver_url = v;
        }
        config.browser.extension_dir = get("BROWSER_EXTENSION_DIR");

        if let Some(v) = get("EXCEL_FILE_NAME") {
            config.report.file_name = v;
        }
        parse_flag(&get, "SAVE_EXCEL_STATS", &mut config.report.enabled)?;

        if let Some(v) = get("DATA_DIR") {
            config.paths.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v;
        }

        Ok(config)
    }

    /// Reject configurations that cannot run at all
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.encryption_key.chars().count() < MIN_ENCRYPTION_KEY_LEN {
            return Err(ConfigError::EncryptionKeyTooShort);
        }
        if self.solana.rpc_url.is_empty() {
            return Err(ConfigError::Missing("SOLANA_RPC_URL"));
        }
        if self.rome.rpc_url.is_empty() {
            return Err(ConfigError::Missing("ROME_RPC_URL"));
        }
        if self.activity.min_delay_ms > self.activity.max_delay_ms {
            return Err(ConfigError::InvertedDelay {
                min: self.activity.min_delay_ms,
                max: self.activity.max_delay_ms,
            });
        }
        if self.activity.min_amount <= 0.0 || self.activity.min_amount > self.activity.max_amount {
            return Err(ConfigError::InvalidAmount {
                min: self.activity.min_amount,
                max: self.activity.max_amount,
            });
        }
        if self.transactions.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "TX_BATCH_SIZE",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Ordered EVM endpoint list used by the sender, duplicates removed
    pub fn rpc_endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = Vec::new();
        let candidates = [&self.rome.rpc_url, &self.rome.martis_rpc_url]
            .into_iter()
            .chain(self.rome.fallback_rpc_urls.iter());
        for url in candidates {
            if !url.is_empty() && !endpoints.iter().any(|e| e == url) {
                endpoints.push(url.clone());
            }
        }
        endpoints
    }

    pub fn wallets_dir(&self) -> PathBuf {
        self.paths.data_dir.join("wallets")
    }

    pub fn progress_dir(&self) -> PathBuf {
        self.paths.data_dir.join("progress")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.paths.data_dir.join("screenshots")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.paths.data_dir.join("logs")
    }

    pub fn report_path(&self) -> PathBuf {
        self.paths.data_dir.join(&self.report.file_name)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_millis(self.browser.timeout_ms)
    }
}

fn parse_into<T, G>(get: &G, key: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw.clone() })?;
    }
    Ok(())
}

fn parse_flag<G>(get: &G, key: &'static str, target: &mut bool) -> Result<(), ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *target = match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => return Err(ConfigError::Invalid { key, value: raw }),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overlay() {
        let config = Config::from_lookup(lookup(&[
            ("ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef"),
            ("TX_BATCH_SIZE", "25"),
            ("HEADLESS", "true"),
            ("ROME_CHAIN_ID", "1234"),
        ]))
        .unwrap();

        assert_eq!(config.transactions.batch_size, 25);
        assert!(config.browser.headless);
        assert_eq!(config.rome.chain_id, 1234);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_key_rejected() {
        let config = Config::from_lookup(lookup(&[("ENCRYPTION_KEY", "too-short")])).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::EncryptionKeyTooShort)));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let result = Config::from_lookup(lookup(&[("TX_DELAY_MS", "soon")]));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "TX_DELAY_MS", .. })));
    }

    #[test]
    fn test_rpc_endpoints_deduplicated() {
        let config = Config::default();
        let endpoints = config.rpc_endpoints();
        assert_eq!(endpoints, vec![DEFAULT_CAELIAN_RPC.to_string(), DEFAULT_MARTIS_RPC.to_string()]);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.wallet.default_count = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.wallet.default_count, 7);
        assert_eq!(loaded.rome.chain_id, 57005);
    }
}
