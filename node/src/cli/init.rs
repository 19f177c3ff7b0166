use clap::Parser;

use crate::chain::ValidationSteps;
use crate::config::{
    ChainConfiguration, Configuration, ConfigurationError, DatabaseConfiguration,
    NodeConfiguration, DEFAULT_INIT_PRODUCER_NAME,
};
use crate::utilities::crypto::{ChainKeypair, ChainPublicKey, Keypair};

/// Creates a node directory with a fresh keypair and a single-producer genesis.
#[derive(Debug, Clone, Parser)]
pub struct InitCmd {
    #[arg(long, default_value = "default")]
    pub node_name: String,
    #[clap(long, default_value = DEFAULT_INIT_PRODUCER_NAME)]
    pub producer_name: String,
    /// Genesis time in seconds since the epoch. Defaults to now.
    #[clap(long)]
    pub genesis_time: Option<u32>,
    #[clap(long)]
    pub chain_id: Option<String>,
}

impl InitCmd {
    pub fn execute(self) -> anyhow::Result<()> {
        if Configuration::try_load_from_home_dir(&self.node_name).is_ok() {
            return Err(ConfigurationError::AlreadyExists(self.node_name).into());
        }

        let path = Configuration::chainstate_root_dir()?.join(&self.node_name);
        println!("Creating node configuration in: {path:?}",);

        let db_dir = path.join("db");
        let rocksdb_path = db_dir.join("rocksdb");
        let sqlite_path = db_dir.join("block_log.sqlite");
        std::fs::create_dir_all(&rocksdb_path)?;
        std::fs::File::create(&sqlite_path)?;

        let keypair = Keypair::generate(None);
        let genesis_time = match self.genesis_time {
            Some(time) => time,
            None => u32::try_from(chrono::Utc::now().timestamp())?,
        };

        let mut chain = ChainConfiguration {
            genesis_time,
            init_producer_name: self.producer_name.clone(),
            init_public_key: keypair.public_key().to_base58(),
            ..Default::default()
        };
        if let Some(chain_id) = self.chain_id {
            chain.chain_id = chain_id;
        }

        let configuration = Configuration {
            node: NodeConfiguration {
                producer_name: self.producer_name,
                private_key: keypair.to_base58(),
            },
            storage: DatabaseConfiguration {
                rocksdb_path: rocksdb_path.to_string_lossy().to_string(),
                sqlite_path: sqlite_path.to_string_lossy().to_string(),
                create_if_not_exists: true,
            },
            chain,
            validation: ValidationSteps::all(),
            checkpoints: vec![],
        };
        configuration.chain.validate()?;
        configuration.try_write_home_dir(&self.node_name)?;
        Ok(())
    }
}
