//! # Node Configuration
//!
//! The node reads a single JSON document describing the curve deployment and
//! the identities wired into the reference contracts. Every field has a
//! default, so an empty `{}` (or no file at all) yields a runnable devnet.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use bondline_protocol::config::{ASSET_DECIMALS, DEFAULT_OBSERVATION_CAPACITY};
use bondline_protocol::{Address, CurveConfig};

/// File name looked up in the data directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Full node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Curve constants, oracle window, limits and promotion parameters.
    pub curve: CurveConfig,
    /// Initial holder of the `Admin` role.
    pub admin: Address,
    /// Identity the engine mints under. Granted `Minter` at first start.
    pub engine_identity: Address,
    /// Addresses granted `Governor` at first start.
    pub governors: Vec<Address>,
    /// Addresses granted `Bonder` at first start.
    pub bonders: Vec<Address>,
    pub token_name: String,
    pub token_symbol: String,
    /// Ring-buffer size of the tick oracle. Ticks arriving faster than
    /// `twap_window_secs / (capacity - 2)` are merged.
    pub observation_capacity: usize,
    /// Tick recorded at start-up so the oracle has a first observation.
    pub initial_tick: Option<i32>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let admin = Address::new("0x00000000000000000000000000000000000ad111");
        Self {
            curve: CurveConfig::default(),
            governors: vec![admin.clone()],
            bonders: Vec::new(),
            admin,
            engine_identity: Address::new("0x00000000000000000000000000000000000e9913"),
            token_name: "Bondline Asset".into(),
            token_symbol: "BLA".into(),
            observation_capacity: DEFAULT_OBSERVATION_CAPACITY,
            initial_tick: None,
        }
    }
}

impl NodeConfig {
    /// Loads the configuration.
    ///
    /// An explicit `path` must exist. Otherwise `config.json` inside
    /// `data_dir` is used if present, falling back to defaults.
    pub fn load(path: Option<&Path>, data_dir: &Path) -> Result<Self> {
        let config = match path {
            Some(p) => Self::read(p)?,
            None => {
                let fallback = data_dir.join(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::read(&fallback)?
                } else {
                    tracing::info!("no config file found, using defaults");
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Rejects configurations the node cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.curve.validate().context("invalid curve configuration")?;
        let identities = std::iter::once(&self.admin)
            .chain(std::iter::once(&self.engine_identity))
            .chain(&self.governors)
            .chain(&self.bonders);
        for who in identities {
            anyhow::ensure!(who.is_valid(), "invalid address in config: {}", who);
        }
        anyhow::ensure!(
            self.observation_capacity >= 3,
            "observation_capacity must be at least 3"
        );
        anyhow::ensure!(!self.token_symbol.is_empty(), "token_symbol must not be empty");
        Ok(())
    }

    /// Decimals of the issued token.
    pub fn token_decimals(&self) -> u8 {
        ASSET_DECIMALS as u8
    }
}
