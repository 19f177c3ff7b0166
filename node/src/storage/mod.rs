//! Durable, append-only log of irreversible blocks.
use crate::config::DatabaseConfiguration;
use crate::types::{BlockId, SignedBlock};

#[cfg(feature = "rocksdb_storage")]
pub(crate) mod rocksdb;
#[cfg(feature = "sqlite_storage")]
pub(crate) mod sqlite;

pub trait BlockLog: Send {
    /// Appends the next block. Block numbers must be consecutive, starting at 1.
    fn append(&mut self, block: &SignedBlock) -> anyhow::Result<()>;

    fn read_block_by_num(&self, block_num: u32) -> anyhow::Result<Option<SignedBlock>>;

    fn read_block_by_id(&self, block_id: &BlockId) -> anyhow::Result<Option<SignedBlock>>;

    fn head(&self) -> anyhow::Result<Option<SignedBlock>>;

    fn head_num(&self) -> anyhow::Result<u32> {
        Ok(self.head()?.map_or(0, |block| block.block_num()))
    }
}

pub(crate) fn check_append_order(head_num: u32, block: &SignedBlock) -> anyhow::Result<()> {
    let expected = head_num + 1;
    if block.block_num() != expected {
        anyhow::bail!(
            "Block log append out of order: expected block {expected}, got {}",
            block.block_num()
        );
    }
    Ok(())
}

/// Opens the block log backend selected at compile time.
pub fn open_block_log(db_conf: &DatabaseConfiguration) -> anyhow::Result<Box<dyn BlockLog>> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "sqlite_storage")] {
            let log = sqlite::SqliteBlockLog::open(db_conf.clone())?;
            Ok(Box::new(log))
        } else if #[cfg(feature = "rocksdb_storage")] {
            let log = rocksdb::RocksDbBlockLog::open(db_conf.clone())?;
            Ok(Box::new(log))
        } else {
            let _ = db_conf;
            anyhow::bail!("No block log backend enabled")
        }
    }
}

#[cfg(feature = "sqlite_storage")]
pub use sqlite::SqliteBlockLog;

#[cfg(feature = "rocksdb_storage")]
pub use rocksdb::RocksDbBlockLog;
