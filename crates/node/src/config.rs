// node/src/config.rs
use custody_core::{Address, BasisPoints, CoreResult, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strategy::{AssetPair, MarketMakingParams};

/// File name of the persisted world inside `data_dir`
pub const STATE_FILE: &str = "state.bin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    /// Fixed start time; wall-clock time at init when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genesis_time: Option<Timestamp>,
    pub accounts: AccountsConfig,
    pub assets: AssetsConfig,
    pub pools: Vec<PoolConfig>,
    pub market_making: MarketMakingDefaults,
}

/// Every account is a `0x` hex address or a label hashed into one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Orchestrator owner, also administers the lending pools
    pub owner: String,
    pub agent: String,
    /// Custody account of the orchestrator
    pub orchestrator: String,
    /// Custody account of the lending ledger
    pub ledger: String,
    pub vault_factory: String,
    pub yield_reserve: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetsConfig {
    pub base: String,
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub asset: String,
    pub base_apy: BasisPoints,
    #[serde(default)]
    pub utilization: BasisPoints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMakingDefaults {
    pub spread_bps: BasisPoints,
    pub levels: u8,
    pub step_bps: BasisPoints,
    /// Simulated annual yield paid out of the reserve
    pub yield_bps: BasisPoints,
}

/// Accounts with their addresses resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAccounts {
    pub owner: Address,
    pub agent: Address,
    pub orchestrator: Address,
    pub ledger: Address,
    pub vault_factory: Address,
    pub yield_reserve: Address,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            genesis_time: None,
            accounts: AccountsConfig {
                owner: "owner".into(),
                agent: "agent".into(),
                orchestrator: "orchestrator".into(),
                ledger: "lending-ledger".into(),
                vault_factory: "vault-factory".into(),
                yield_reserve: "yield-reserve".into(),
            },
            assets: AssetsConfig {
                base: "weth".into(),
                quote: "usdc".into(),
            },
            pools: vec![
                PoolConfig {
                    asset: "weth".into(),
                    base_apy: 300,
                    utilization: 0,
                },
                PoolConfig {
                    asset: "usdc".into(),
                    base_apy: 500,
                    utilization: 0,
                },
            ],
            market_making: MarketMakingDefaults {
                spread_bps: 50,
                levels: 5,
                step_bps: 10,
                yield_bps: 800,
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn state_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(STATE_FILE)
    }

    pub fn resolve_accounts(&self) -> CoreResult<ResolvedAccounts> {
        let accounts = &self.accounts;
        Ok(ResolvedAccounts {
            owner: parse_account(&accounts.owner)?,
            agent: parse_account(&accounts.agent)?,
            orchestrator: parse_account(&accounts.orchestrator)?,
            ledger: parse_account(&accounts.ledger)?,
            vault_factory: parse_account(&accounts.vault_factory)?,
            yield_reserve: parse_account(&accounts.yield_reserve)?,
        })
    }

    pub fn asset_pair(&self) -> CoreResult<AssetPair> {
        Ok(AssetPair::new(
            parse_account(&self.assets.base)?,
            parse_account(&self.assets.quote)?,
        ))
    }

    pub fn default_params(&self) -> MarketMakingParams {
        MarketMakingParams {
            spread_bps: self.market_making.spread_bps,
            levels: self.market_making.levels,
            step_bps: self.market_making.step_bps,
        }
    }
}

/// `0x`-prefixed hex, or a label hashed into an address
pub fn parse_account(value: &str) -> CoreResult<Address> {
    let value = value.trim();
    if value.starts_with("0x") {
        Address::from_hex(value)
    } else {
        Ok(Address::from_label(value))
    }
}
