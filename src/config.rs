//! Configuration management
//!
//! The node endpoint comes from the environment (`MAINNET_RPC_URL`, loaded
//! from `.env` if present). Everything else has a built-in default and can
//! be overridden from an optional TOML file.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default CSV location (relative to the working directory)
pub const DEFAULT_CSV_PATH: &str = "susde_price_history.csv";

/// Pair label → CSV column header
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PriceColumn {
    pub header: String,
    pub pair: String,
}

/// Tunable settings (TOML). Unset fields keep their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub tracked_asset: String,
    pub tracked_symbol: String,
    pub liquidity_layer: String,
    pub reserves_resolver: String,

    pub price_check_interval_secs: u64,
    pub next_block_timeout_secs: u64,
    pub pool_event_delay_ms: u64,
    pub liquidity_event_delay_ms: u64,

    /// Significance threshold for periodic checks, in percent
    pub periodic_threshold_percent: Decimal,
    /// Significance threshold for every other trigger, in percent
    pub event_threshold_percent: Decimal,
    /// Minimum |supply| or |borrow| of a LogOperate worth correlating
    pub operation_floor: Decimal,
    /// Minimum token amount of a Deposit/Withdraw worth a price check
    pub liquidity_floor: Decimal,

    pub price_columns: Vec<PriceColumn>,
    pub reference_column: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tracked_asset: "0x9D39A5DE30e57443BfF2A8307A4256c8797A3497".to_string(),
            tracked_symbol: "sUSDe".to_string(),
            liquidity_layer: "0x52Aa899454998Be5b000Ad077a46Bbe360F4e497".to_string(),
            reserves_resolver: "0xC93876C0EEd99645DD53937b25433e311881A27C".to_string(),
            price_check_interval_secs: 30,
            next_block_timeout_secs: 30,
            pool_event_delay_ms: 2000,
            liquidity_event_delay_ms: 3000,
            periodic_threshold_percent: Decimal::new(1, 4), // 0.0001%
            event_threshold_percent: Decimal::new(1, 3),    // 0.001%
            operation_floor: Decimal::new(1, 2),            // 0.01
            liquidity_floor: Decimal::new(10_000, 0),
            price_columns: vec![
                PriceColumn {
                    header: "susde_usdt_price".to_string(),
                    pair: "sUSDe/USDT".to_string(),
                },
                PriceColumn {
                    header: "gho_susde_price".to_string(),
                    pair: "GHO/sUSDe".to_string(),
                },
            ],
            reference_column: "susde_official_price".to_string(),
        }
    }
}

impl MonitorSettings {
    /// Load settings from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.tracked_asset_address()?;
        self.liquidity_layer_address()?;
        self.reserves_resolver_address()?;
        if self.price_check_interval_secs == 0 {
            anyhow::bail!("price_check_interval_secs must be > 0");
        }
        if self.next_block_timeout_secs == 0 {
            anyhow::bail!("next_block_timeout_secs must be > 0");
        }
        if self.price_columns.is_empty() {
            anyhow::bail!("price_columns must list at least one pair");
        }
        Ok(())
    }

    pub fn tracked_asset_address(&self) -> Result<Address> {
        parse_address("tracked_asset", &self.tracked_asset)
    }

    pub fn liquidity_layer_address(&self) -> Result<Address> {
        parse_address("liquidity_layer", &self.liquidity_layer)
    }

    pub fn reserves_resolver_address(&self) -> Result<Address> {
        parse_address("reserves_resolver", &self.reserves_resolver)
    }

    pub fn price_check_interval(&self) -> Duration {
        Duration::from_secs(self.price_check_interval_secs)
    }

    pub fn next_block_timeout(&self) -> Duration {
        Duration::from_secs(self.next_block_timeout_secs)
    }

    pub fn pool_event_delay(&self) -> Duration {
        Duration::from_millis(self.pool_event_delay_ms)
    }

    pub fn liquidity_event_delay(&self) -> Duration {
        Duration::from_millis(self.liquidity_event_delay_ms)
    }

    /// Full CSV header row for these settings
    pub fn csv_headers(&self) -> Vec<String> {
        let mut headers = vec!["timestamp".to_string(), "datetime".to_string()];
        headers.extend(self.price_columns.iter().map(|c| c.header.clone()));
        headers.push(self.reference_column.clone());
        headers.extend(["event_type", "pool_affected", "notes"].map(String::from));
        headers
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim()).with_context(|| format!("Invalid {} address: '{}'", field, value))
}

/// Complete runtime configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub rpc_url: String,
    pub csv_path: PathBuf,
    pub settings: MonitorSettings,
}

impl MonitorConfig {
    /// Assemble from resolved inputs. Fails on a missing or non-WebSocket URL.
    pub fn new(
        rpc_url: Option<String>,
        csv_path: Option<PathBuf>,
        settings_path: Option<&Path>,
    ) -> Result<Self> {
        let rpc_url = rpc_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .context("MAINNET_RPC_URL not set")?;
        validate_ws_url(&rpc_url)?;

        let settings = match settings_path {
            Some(path) => MonitorSettings::load(path)?,
            None => MonitorSettings::default(),
        };

        Ok(Self {
            rpc_url,
            csv_path: csv_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CSV_PATH)),
            settings,
        })
    }
}

/// Event subscriptions require a pub-sub transport
fn validate_ws_url(url: &str) -> Result<()> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        let scheme = url.split("://").next().unwrap_or(url);
        anyhow::bail!(
            "MAINNET_RPC_URL must be a WebSocket endpoint (ws:// or wss://), got scheme '{}'",
            scheme
        )
    }
}

/// Load `.env` (if present) into the process environment
pub fn load_dotenv(env_file: Option<&Path>) {
    match env_file {
        Some(path) => {
            dotenv::from_path(path).ok();
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let settings = MonitorSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.periodic_threshold_percent, dec!(0.0001));
        assert_eq!(settings.event_threshold_percent, dec!(0.001));
        assert_eq!(settings.operation_floor, dec!(0.01));
        assert_eq!(settings.price_check_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_default_csv_headers() {
        assert_eq!(
            MonitorSettings::default().csv_headers().join(","),
            "timestamp,datetime,susde_usdt_price,gho_susde_price,susde_official_price,event_type,pool_affected,notes"
        );
    }

    #[test]
    fn test_toml_overrides_keep_other_defaults() {
        let settings = MonitorSettings::from_toml(
            r#"
            price_check_interval_secs = 10
            event_threshold_percent = "0.005"

            [[price_columns]]
            header = "a_price"
            pair = "A/sUSDe"
            "#,
        )
        .unwrap();

        assert_eq!(settings.price_check_interval_secs, 10);
        assert_eq!(settings.event_threshold_percent, dec!(0.005));
        assert_eq!(settings.periodic_threshold_percent, dec!(0.0001));
        assert_eq!(settings.price_columns.len(), 1);
        assert_eq!(settings.tracked_symbol, "sUSDe");
    }

    #[test]
    fn test_invalid_address_rejected() {
        let err = MonitorSettings::from_toml(r#"tracked_asset = "0x1234""#).unwrap_err();
        assert!(format!("{:#}", err).contains("tracked_asset"));
    }

    #[test]
    fn test_missing_rpc_url_fails() {
        let err = MonitorConfig::new(None, None, None).unwrap_err();
        assert!(err.to_string().contains("MAINNET_RPC_URL not set"));

        assert!(MonitorConfig::new(Some("  ".to_string()), None, None).is_err());
    }

    #[test]
    fn test_http_rpc_url_rejected() {
        let err = MonitorConfig::new(Some("https://eth.example".to_string()), None, None).unwrap_err();
        assert!(err.to_string().contains("WebSocket"));

        let config = MonitorConfig::new(Some("wss://eth.example".to_string()), None, None).unwrap();
        assert_eq!(config.csv_path, PathBuf::from(DEFAULT_CSV_PATH));
    }
}
