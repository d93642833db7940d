//! Configuration management for the vote submitter
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Percentiles requested from `eth_feeHistory`
pub const FEE_HISTORY_PERCENTILES: [f64; 3] = [10.0, 50.0, 90.0];

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    #[serde(default)]
    pub submitter: SubmitterConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub contract_address: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmitterConfig {
    /// Delay between the end of one cycle and the start of the next
    pub interval_secs: u64,
    /// Wei attached to every vote() call
    pub value_wei: u64,
    /// Ratio applied to eth_estimateGas, must be >= 1.0
    pub gas_limit_multiplier: f64,
    /// Lower bound for the priority fee
    pub tip_floor_wei: u64,
    /// One of 10, 50 or 90
    pub fee_history_percentile: u8,
    /// Stop after this many cycles; run until interrupted when unset
    pub max_cycles: Option<u64>,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            value_wei: 0,
            gas_limit_multiplier: 1.20,
            tip_floor_wei: 100,
            fee_history_percentile: 50,
            max_cycles: None,
        }
    }
}

impl SubmitterConfig {
    /// Index of the configured percentile inside each fee-history reward row
    pub fn percentile_index(&self) -> usize {
        match self.fee_history_percentile {
            10 => 0,
            90 => 2,
            _ => 1,
        }
    }

    /// Gas multiplier in basis points (1.20 -> 12_000)
    pub fn gas_limit_multiplier_bps(&self) -> u64 {
        (self.gas_limit_multiplier * 10_000.0).round() as u64
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Name of the environment variable holding the hex private key
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "PRIVATE_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Settings {
    /// Load settings from the configured file
    pub fn load() -> Result<Self> {
        // Variables from a .env file never override the process environment
        dotenvy::dotenv().ok();

        let config_path = env::var("VOTE_SUBMITTER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse and validate a TOML document
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.iter().all(|u| u.trim().is_empty()) {
            anyhow::bail!("Chain {} has no RPC URLs configured", self.chain.name);
        }
        if self.chain.contract_address.trim().is_empty() {
            anyhow::bail!("Chain {} has no contract address", self.chain.name);
        }

        let submitter = &self.submitter;
        if submitter.interval_secs == 0 {
            anyhow::bail!("submitter.interval_secs must be greater than zero");
        }
        if !submitter.gas_limit_multiplier.is_finite() || submitter.gas_limit_multiplier < 1.0 {
            anyhow::bail!(
                "submitter.gas_limit_multiplier must be >= 1.0, got {}",
                submitter.gas_limit_multiplier
            );
        }
        if ![10, 50, 90].contains(&submitter.fee_history_percentile) {
            anyhow::bail!(
                "submitter.fee_history_percentile must be one of 10, 50, 90, got {}",
                submitter.fee_history_percentile
            );
        }
        if submitter.max_cycles == Some(0) {
            tracing::warn!("submitter.max_cycles is 0 - no vote will be submitted");
        }

        Ok(())
    }

    /// RPC URLs with blank entries removed (unset `${VAR}` placeholders)
    pub fn rpc_urls(&self) -> Vec<String> {
        self.chain
            .rpc_urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [chain]
        chain_id = 1868
        name = "soneium"
        rpc_urls = ["https://rpc.example.com"]
        contract_address = "0xb0F3b3553cE518339c1B5807A392ae904fB658Ec"
    "#;

    fn with_submitter(section: &str) -> String {
        format!("{MINIMAL}\n[submitter]\n{section}")
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("VOTE_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${VOTE_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::parse(MINIMAL).unwrap();
        assert_eq!(settings.chain.chain_id, 1868);
        assert_eq!(settings.chain.request_timeout_secs, 30);
        assert_eq!(settings.submitter.interval_secs, 10);
        assert_eq!(settings.submitter.value_wei, 0);
        assert_eq!(settings.submitter.tip_floor_wei, 100);
        assert_eq!(settings.submitter.percentile_index(), 1);
        assert_eq!(settings.submitter.gas_limit_multiplier_bps(), 12_000);
        assert_eq!(settings.wallet.private_key_env, "PRIVATE_KEY");
        assert!(!settings.metrics.enabled);
    }

    #[test]
    fn test_percentile_index_mapping() {
        let mut submitter = SubmitterConfig::default();
        submitter.fee_history_percentile = 10;
        assert_eq!(submitter.percentile_index(), 0);
        submitter.fee_history_percentile = 90;
        assert_eq!(submitter.percentile_index(), 2);
    }

    #[test]
    fn test_rejects_invalid_submitter_values() {
        let cases = [
            "interval_secs = 0\nvalue_wei = 0\ngas_limit_multiplier = 1.2\ntip_floor_wei = 100\nfee_history_percentile = 50",
            "interval_secs = 10\nvalue_wei = 0\ngas_limit_multiplier = 0.9\ntip_floor_wei = 100\nfee_history_percentile = 50",
            "interval_secs = 10\nvalue_wei = 0\ngas_limit_multiplier = 1.2\ntip_floor_wei = 100\nfee_history_percentile = 25",
        ];
        for case in cases {
            assert!(Settings::parse(&with_submitter(case)).is_err(), "{case}");
        }
    }

    #[test]
    fn test_rejects_empty_rpc_urls() {
        env::remove_var("VOTE_TEST_UNSET_RPC");
        let config = MINIMAL.replace("https://rpc.example.com", "${VOTE_TEST_UNSET_RPC}");
        assert!(Settings::parse(&config).is_err());
    }

    #[test]
    fn test_env_file_fills_placeholders() {
        env::remove_var("VOTE_TEST_DOTENV_RPC");
        env::set_var("VOTE_TEST_DOTENV_KEY", "from-process");

        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join(".env");
        std::fs::write(
            &env_path,
            "VOTE_TEST_DOTENV_RPC=https://dotenv.example.com\nVOTE_TEST_DOTENV_KEY=from-file\n",
        )
        .unwrap();
        dotenvy::from_path(&env_path).unwrap();

        assert_eq!(env::var("VOTE_TEST_DOTENV_KEY").unwrap(), "from-process");

        let config = MINIMAL.replace("https://rpc.example.com", "${VOTE_TEST_DOTENV_RPC}");
        let settings = Settings::parse(&config).unwrap();
        assert_eq!(
            settings.rpc_urls(),
            vec!["https://dotenv.example.com".to_string()]
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "{}",
            with_submitter(
                "interval_secs = 3\nvalue_wei = 5\ngas_limit_multiplier = 1.5\ntip_floor_wei = 7\nfee_history_percentile = 90\nmax_cycles = 2"
            )
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.submitter.interval_secs, 3);
        assert_eq!(settings.submitter.value_wei, 5);
        assert_eq!(settings.submitter.gas_limit_multiplier_bps(), 15_000);
        assert_eq!(settings.submitter.percentile_index(), 2);
        assert_eq!(settings.submitter.max_cycles, Some(2));
        assert_eq!(settings.rpc_urls(), vec!["https://rpc.example.com".to_string()]);
    }
}
