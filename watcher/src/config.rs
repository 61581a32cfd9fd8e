//! Watcher configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stake_model::{Address, FixedPointAmount};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RPC URL of the chain the contracts live on
    pub rpc_url: String,

    /// Expected chain id (56 = BSC mainnet)
    pub chain_id: u64,

    /// Staking contract (plans, positions, claims)
    pub investment_contract: Address,

    /// Token contract investments are paid in
    pub usdt_contract: Address,

    /// Referrer used when a registration names none
    pub default_referrer: Address,

    /// Account whose dashboard is computed and who signs its requests
    pub account: Address,

    /// Contract-state JSON served by the snapshot reader
    pub snapshot_path: String,

    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// Referral levels to walk (1 = direct referrals only)
    pub referral_depth: u8,

    /// Smallest claimable reward worth proposing a claim for (decimal tokens)
    pub min_claim_amount: String,

    /// Maximum claim requests proposed per cycle
    pub max_claims_per_cycle: usize,
}

impl Config {
    /// Load configuration from TOML file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("USDSTACK_CONFIG")
            .unwrap_or_else(|_| "watcher-config.toml".to_string());
        let expanded_path = shellexpand::tilde(&config_path);

        let config_str = std::fs::read_to_string(expanded_path.as_ref())
            .context(format!("Failed to read config file: {}", config_path))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config TOML")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_mainnet() -> Self {
        Self {
            rpc_url: "https://bsc-dataseed1.binance.org/".to_string(),
            chain_id: 56,
            investment_contract: known_address("0x5209866447cad3d6678655ed04c405d17e53f12e"),
            usdt_contract: known_address("0x55d398326f99059fF775485246999027B3197955"),
            default_referrer: known_address("0x3AE96f8Da38202E856860aBb794229fdE024De26"),
            account: known_address("0x3AE96f8Da38202E856860aBb794229fdE024De26"),
            snapshot_path: "~/.usdstack/snapshot.json".to_string(),
            poll_interval_secs: 30,
            referral_depth: 3,
            min_claim_amount: "1".to_string(),
            max_claims_per_cycle: 5,
        }
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_mainnet();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        std::fs::write(path, toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }

    /// Reject settings that would only fail later, mid-cycle
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if self.referral_depth == 0 {
            anyhow::bail!("referral_depth must be at least 1");
        }
        self.min_claim()?;
        Ok(())
    }

    /// Parsed claim threshold
    pub fn min_claim(&self) -> Result<FixedPointAmount> {
        FixedPointAmount::from_decimal_str(&self.min_claim_amount)
            .context(format!("Invalid min_claim_amount {:?}", self.min_claim_amount))
    }

    /// Snapshot path with `~` expanded
    pub fn snapshot_path(&self) -> String {
        shellexpand::tilde(&self.snapshot_path).into_owned()
    }
}

/// Compile-time constant addresses; a typo here is a programming error
fn known_address(s: &str) -> Address {
    match s.parse() {
        Ok(address) => address,
        Err(e) => panic!("invalid built-in address: {}", e),
    }
}
