use std::path::PathBuf;

use clap::Parser;

use crate::config::Configuration;
use crate::logging::pretty_json;
use crate::storage::open_block_log;
use crate::types::BlockId;

/// Prints a block from the block log, by height or id. Without either, prints the head.
#[derive(Debug, Clone, Parser)]
pub struct ShowBlockCmd {
    #[clap(short, long)]
    pub config_file: String,
    #[clap(long, conflicts_with = "id")]
    pub height: Option<u32>,
    #[clap(long)]
    pub id: Option<String>,
}

impl ShowBlockCmd {
    pub fn execute(self) -> anyhow::Result<()> {
        let conf = match Configuration::try_load(PathBuf::from(self.config_file.as_str())) {
            Ok(conf) => conf,
            Err(err) => anyhow::bail!("Error loading configuration file: {err:?}"),
        };
        let block_log = open_block_log(&conf.storage)?;

        let block = match (self.height, self.id) {
            (Some(height), _) => block_log.read_block_by_num(height)?,
            (None, Some(id)) => block_log.read_block_by_id(&BlockId::from_hex_str(&id)?)?,
            (None, None) => block_log.head()?,
        };

        match block {
            Some(block) => {
                println!("Block {} ({})", block.block_num(), block.id()?);
                println!("{}", pretty_json(&block));
            }
            None => println!("Block not found"),
        }
        Ok(())
    }
}
