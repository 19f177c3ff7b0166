use std::path::PathBuf;

use clap::Parser;

use crate::chain::LedgerBuilder;
use crate::config::Configuration;

/// Rebuilds state from the block log and reports where the chain ends up.
#[derive(Debug, Clone, Parser)]
pub struct ReindexCmd {
    #[clap(short, long)]
    pub config_file: String,
}

impl ReindexCmd {
    pub fn execute(self) -> anyhow::Result<()> {
        let conf = match Configuration::try_load(PathBuf::from(self.config_file.as_str())) {
            Ok(conf) => conf,
            Err(err) => anyhow::bail!("Error loading configuration file: {err:?}"),
        };

        let started = std::time::Instant::now();
        let ledger = LedgerBuilder::from_configuration(&conf)?.open()?;

        println!(
            "Reindexed {} blocks in {:?}",
            ledger.head_block_num()?,
            started.elapsed()
        );
        println!("Head block: {}", ledger.head_block_id()?);
        println!("Last irreversible block: {}", ledger.last_irreversible_block_num()?);
        println!("Participation: {} bps", ledger.participation_rate()?);
        Ok(())
    }
}
