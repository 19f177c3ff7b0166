pub use configuration::{
    ChainConfiguration, CheckpointSetting, Configuration, ConfigurationError,
    DatabaseConfiguration, HardforkSetting, NodeConfiguration,
};

pub mod configuration;

//chain settings
pub const DEFAULT_CHAIN_ID: &str = "chainstate-testnet";
pub const DEFAULT_INIT_PRODUCER_NAME: &str = "initminer";
pub const DEFAULT_INITIAL_SUPPLY: u64 = 1_000_000_000;
pub const DEFAULT_PRODUCER_REWARD: u64 = 1_000;

//consensus settings
pub const DEFAULT_BLOCK_INTERVAL_SEC: u32 = 3;
pub const DEFAULT_MAX_PRODUCERS: u32 = 21;
/// Share of producers (basis points) that must confirm a block before it is irreversible.
pub const DEFAULT_IRREVERSIBLE_THRESHOLD_BPS: u32 = 7_500;
/// Until this height the last irreversible block trails the head by a fixed distance.
pub const DEFAULT_BOOTSTRAP_IRREVERSIBLE_HEIGHT: u32 = 864_000;
pub const DEFAULT_MAX_UNDO_HISTORY: u32 = 10_000;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 2 * 1024 * 1024;
pub const DEFAULT_MAX_TIME_UNTIL_EXPIRATION_SEC: u32 = 60 * 60;
pub const DEFAULT_MAX_AUTHORITY_DEPTH: u32 = 2;
pub const DEFAULT_MAX_SIGNATURES: usize = 64;
pub const DEFAULT_SIGNATURE_CACHE_SIZE: usize = 10_000;

pub const BASIS_POINTS: u32 = 10_000;

//storage settings
pub const DEFAULT_ROOT_DIR_NAME: &str = ".chainstate";
pub const DEFAULT_CONFIG_FILE_NAME: &str = "config.toml";
