use std::sync::Arc;

use log::info;
use rocksdb::{TransactionDB, TransactionDBOptions};

use crate::config::DatabaseConfiguration;
use crate::storage::rocksdb::query::DbQuery;
use crate::storage::rocksdb::store::DbStore;
use crate::storage::{check_append_order, BlockLog};
use crate::types::{BlockId, SignedBlock};

pub(crate) mod query;
pub(crate) mod store;

const PREFIX_LAST_BLOCK_KEY: &str = "last_block";
const PREFIX_BLOCK_ID: &str = "block_id";
const PREFIX_BLOCK_HEIGHT: &str = "block_height";

pub struct RocksDbBlockLog {
    pub(crate) db_store: DbStore,
    pub(crate) db_query: DbQuery,
}

impl RocksDbBlockLog {
    pub fn open(db_conf: DatabaseConfiguration) -> anyhow::Result<Self> {
        info!("Opening RocksDB block log at {}", db_conf.rocksdb_path);

        let mut options = rocksdb::Options::default();
        options.create_if_missing(db_conf.create_if_not_exists);

        let db = TransactionDB::open(
            &options,
            &TransactionDBOptions::default(),
            db_conf.rocksdb_path.clone(),
        )?;
        let db = Arc::new(db);
        let db_store = DbStore::new(db.clone());
        let db_query = DbQuery::new(db);

        info!("Opened RocksDB block log at {}", db_conf.rocksdb_path);
        Ok(Self { db_store, db_query })
    }
}

impl BlockLog for RocksDbBlockLog {
    fn append(&mut self, block: &SignedBlock) -> anyhow::Result<()> {
        check_append_order(self.head_num()?, block)?;
        self.db_store.store_block(block)
    }

    fn read_block_by_num(&self, block_num: u32) -> anyhow::Result<Option<SignedBlock>> {
        self.db_query.get_block_by_height(block_num)
    }

    fn read_block_by_id(&self, block_id: &BlockId) -> anyhow::Result<Option<SignedBlock>> {
        self.db_query.get_block_by_id(&block_id.to_string())
    }

    fn head(&self) -> anyhow::Result<Option<SignedBlock>> {
        self.db_query.get_last_block()
    }
}

fn block_id_key(block_id: &str) -> String {
    format!("{PREFIX_BLOCK_ID}:{block_id}")
}

fn block_height_key(height: u32) -> String {
    format!("{PREFIX_BLOCK_HEIGHT}:{height}")
}

fn last_block_key() -> String {
    PREFIX_LAST_BLOCK_KEY.to_string()
}
