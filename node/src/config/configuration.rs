use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ValidationSteps;
use crate::config::*;
use crate::types::{AccountName, BlockId};
use crate::utilities::crypto::{ChainPublicKey, PublicKey};
use crate::utilities::hash::HashType;
use crate::utilities::time::TimePointSec;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration file does not exist: {0}")]
    NotFound(String),
    #[error("Configuration file already exists: {0}")]
    AlreadyExists(String),
    #[error("Unable to find home directory")]
    NoHomeDir,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to read configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Failed to write configuration: {0}")]
    Write(#[from] toml::ser::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub node: NodeConfiguration,
    pub storage: DatabaseConfiguration,
    pub chain: ChainConfiguration,
    #[serde(default)]
    pub validation: ValidationSteps,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointSetting>,
}

/// Local identity, used when this node produces blocks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeConfiguration {
    pub producer_name: String,
    /// Base58 encoded ed25519 private key.
    pub private_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfiguration {
    pub rocksdb_path: String,
    pub sqlite_path: String,
    pub create_if_not_exists: bool,
}

impl Default for DatabaseConfiguration {
    fn default() -> Self {
        Self {
            rocksdb_path: String::new(),
            sqlite_path: String::new(),
            create_if_not_exists: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfiguration {
    pub chain_id: String,
    /// Unix seconds. Slot 1 starts one block interval later.
    pub genesis_time: u32,
    pub init_producer_name: String,
    /// Base58 ed25519 public key controlling the initial producer account.
    pub init_public_key: String,
    pub initial_supply: u64,
    pub producer_reward: u64,
    pub block_interval_sec: u32,
    pub max_producers: u32,
    pub irreversible_threshold_bps: u32,
    pub bootstrap_irreversible_height: u32,
    pub max_undo_history: u32,
    pub max_block_size: usize,
    pub max_time_until_expiration_sec: u32,
    pub max_authority_depth: u32,
    pub max_signatures: usize,
    pub signature_cache_size: usize,
    pub hardforks: Vec<HardforkSetting>,
}

impl Default for ChainConfiguration {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            genesis_time: 0,
            init_producer_name: DEFAULT_INIT_PRODUCER_NAME.to_string(),
            init_public_key: String::new(),
            initial_supply: DEFAULT_INITIAL_SUPPLY,
            producer_reward: DEFAULT_PRODUCER_REWARD,
            block_interval_sec: DEFAULT_BLOCK_INTERVAL_SEC,
            max_producers: DEFAULT_MAX_PRODUCERS,
            irreversible_threshold_bps: DEFAULT_IRREVERSIBLE_THRESHOLD_BPS,
            bootstrap_irreversible_height: DEFAULT_BOOTSTRAP_IRREVERSIBLE_HEIGHT,
            max_undo_history: DEFAULT_MAX_UNDO_HISTORY,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            max_time_until_expiration_sec: DEFAULT_MAX_TIME_UNTIL_EXPIRATION_SEC,
            max_authority_depth: DEFAULT_MAX_AUTHORITY_DEPTH,
            max_signatures: DEFAULT_MAX_SIGNATURES,
            signature_cache_size: DEFAULT_SIGNATURE_CACHE_SIZE,
            hardforks: vec![],
        }
    }
}

impl ChainConfiguration {
    pub fn chain_id(&self) -> HashType {
        HashType::digest(self.chain_id.as_bytes())
    }

    pub fn genesis_time(&self) -> TimePointSec {
        TimePointSec::new(self.genesis_time)
    }

    pub fn init_producer(&self) -> AccountName {
        AccountName::new(self.init_producer_name.clone())
    }

    pub fn init_public_key(&self) -> Result<PublicKey, ConfigurationError> {
        PublicKey::from_base58(&self.init_public_key)
            .map_err(|e| ConfigurationError::Invalid(format!("init_public_key: {e}")))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.block_interval_sec == 0 {
            return Err(ConfigurationError::Invalid(
                "block_interval_sec must be positive".to_string(),
            ));
        }
        if self.max_producers == 0 {
            return Err(ConfigurationError::Invalid(
                "max_producers must be positive".to_string(),
            ));
        }
        if self.irreversible_threshold_bps > BASIS_POINTS {
            return Err(ConfigurationError::Invalid(format!(
                "irreversible_threshold_bps can't exceed {BASIS_POINTS}"
            )));
        }
        if !self.init_producer().is_valid() {
            return Err(ConfigurationError::Invalid(format!(
                "invalid init producer name '{}'",
                self.init_producer_name
            )));
        }
        self.init_public_key()?;
        Ok(())
    }
}

/// Block number whose id is known in advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSetting {
    pub block_num: u32,
    pub block_id: String,
}

impl CheckpointSetting {
    pub fn block_id(&self) -> Result<BlockId, ConfigurationError> {
        let id = BlockId::from_hex_str(&self.block_id)
            .map_err(|e| ConfigurationError::Invalid(format!("checkpoint: {e}")))?;
        if id.block_num() != self.block_num {
            return Err(ConfigurationError::Invalid(format!(
                "checkpoint id {} does not belong to block {}",
                self.block_id, self.block_num
            )));
        }
        Ok(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardforkSetting {
    pub version: u32,
    /// Unix seconds from which the hardfork applies.
    pub time: u32,
}

impl Configuration {
    pub fn try_load<P: AsRef<Path>>(path: P) -> Result<Configuration, ConfigurationError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigurationError::NotFound(path.display().to_string()));
        }
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;

        let configuration = config.try_deserialize::<Configuration>()?;
        configuration.chain.validate()?;
        Ok(configuration)
    }

    pub fn try_load_from_home_dir(node_name: &str) -> Result<Configuration, ConfigurationError> {
        let path = Self::config_file_path(node_name)?;
        Self::try_load(path)
    }

    pub fn try_write<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigurationError> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ConfigurationError::AlreadyExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config = toml::to_string(&self)?;
        let mut file = std::fs::File::create(path)?;
        file.write_all(config.as_bytes())?;
        Ok(())
    }

    pub fn try_write_home_dir(&self, node_name: &str) -> Result<(), ConfigurationError> {
        let path = Self::config_file_path(node_name)?;
        log::info!("Writing configuration to {}", path.display());
        self.try_write(path)
    }

    pub fn chainstate_root_dir() -> Result<PathBuf, ConfigurationError> {
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_ROOT_DIR_NAME))
            .ok_or(ConfigurationError::NoHomeDir)
    }

    pub fn config_file_path(node_name: &str) -> Result<PathBuf, ConfigurationError> {
        Ok(Self::chainstate_root_dir()?
            .join(node_name)
            .join(DEFAULT_CONFIG_FILE_NAME))
    }

    pub fn checkpoints(&self) -> Result<Vec<(u32, BlockId)>, ConfigurationError> {
        self.checkpoints
            .iter()
            .map(|checkpoint| Ok((checkpoint.block_num, checkpoint.block_id()?)))
            .collect()
    }
}
