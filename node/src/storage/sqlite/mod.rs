use rusqlite::{Connection, OpenFlags};

use crate::config::DatabaseConfiguration;
use crate::storage::sqlite::query::DbQuery;
use crate::storage::sqlite::store::DbStore;
use crate::storage::{check_append_order, BlockLog};
use crate::types::{BlockId, SignedBlock};

pub(crate) mod query;
pub(crate) mod store;

mod migrations {
    use refinery::embed_migrations;

    embed_migrations!("migrations");
}

pub(crate) const IN_MEMORY_PATH: &str = ":memory:";

pub struct SqliteBlockLog {
    pub(crate) db_store: DbStore,
    pub(crate) db_query: DbQuery,
}

impl SqliteBlockLog {
    pub fn open(db_conf: DatabaseConfiguration) -> anyhow::Result<Self> {
        let mut flags = OpenFlags::default();
        if !db_conf.create_if_not_exists {
            flags.remove(OpenFlags::SQLITE_OPEN_CREATE);
        }

        log::info!("Starting block log with path: {}", db_conf.sqlite_path);
        let path = if db_conf.sqlite_path == IN_MEMORY_PATH {
            // Store and query use separate connections, so they need a named shared database.
            format!(
                "file:block-log-{}?mode=memory&cache=shared",
                rand::random::<u64>()
            )
        } else {
            db_conf.sqlite_path
        };

        let mut connection = Connection::open_with_flags(&path, flags)?;
        Self::run_migrations(&mut connection)?;

        let db_query = DbQuery::open(&path, flags)?;
        let db_store = DbStore::new(connection);
        Ok(Self { db_store, db_query })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::open(DatabaseConfiguration {
            sqlite_path: IN_MEMORY_PATH.to_string(),
            create_if_not_exists: true,
            ..Default::default()
        })
    }

    pub fn run_migrations(connection: &mut Connection) -> anyhow::Result<()> {
        log::info!("Running block log migrations");
        match migrations::migrations::runner().run(connection) {
            Ok(ok) => {
                log::info!("Block log migrations completed:{:?} ", ok);
                Ok(())
            }
            Err(err) => {
                log::error!("Block log migrations failed: {}", err);
                Err(anyhow::anyhow!(err))
            }
        }
    }
}

impl BlockLog for SqliteBlockLog {
    fn append(&mut self, block: &SignedBlock) -> anyhow::Result<()> {
        check_append_order(self.head_num()?, block)?;
        self.db_store.store_block(block)
    }

    fn read_block_by_num(&self, block_num: u32) -> anyhow::Result<Option<SignedBlock>> {
        self.db_query.get_block_by_height(block_num)
    }

    fn read_block_by_id(&self, block_id: &BlockId) -> anyhow::Result<Option<SignedBlock>> {
        self.db_query.get_block_by_id(block_id)
    }

    fn head(&self) -> anyhow::Result<Option<SignedBlock>> {
        self.db_query.get_last_block()
    }
}

#[cfg(test)]
mod test {
    use crate::types::BlockHeader;
    use crate::utilities::encoding::encode;
    use crate::utilities::time::TimePointSec;

    use super::*;

    fn next_block(previous: Option<&SignedBlock>) -> SignedBlock {
        let header = BlockHeader {
            previous: previous.map(|b| b.id().unwrap()).unwrap_or_default(),
            timestamp: TimePointSec::new(3 * previous.map_or(1, |b| b.block_num() + 1)),
            producer: "initminer".into(),
            transaction_merkle_root: Default::default(),
        };
        SignedBlock::new(header, vec![])
    }

    #[test]
    fn empty_log_has_no_head() {
        let log = SqliteBlockLog::open_in_memory().unwrap();
        assert!(log.head().unwrap().is_none());
        assert_eq!(log.head_num().unwrap(), 0);
    }

    #[test]
    fn append_and_read_back() {
        let mut log = SqliteBlockLog::open_in_memory().unwrap();
        let first = next_block(None);
        let second = next_block(Some(&first));
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        assert_eq!(log.head().unwrap().unwrap(), second);
        assert_eq!(log.read_block_by_num(1).unwrap().unwrap(), first);
        assert_eq!(
            log.read_block_by_id(&second.id().unwrap()).unwrap().unwrap(),
            second
        );
        assert!(log.read_block_by_num(3).unwrap().is_none());
    }

    #[test]
    fn stored_bytes_round_trip() {
        let mut log = SqliteBlockLog::open_in_memory().unwrap();
        let block = next_block(None);
        log.append(&block).unwrap();

        let raw = log.db_query.get_raw_block_by_height(1).unwrap().unwrap();
        let read = log.read_block_by_num(1).unwrap().unwrap();
        assert_eq!(encode(&read).unwrap(), raw);
    }

    #[test]
    fn out_of_order_append_fails() {
        let mut log = SqliteBlockLog::open_in_memory().unwrap();
        let first = next_block(None);
        let second = next_block(Some(&first));

        assert!(log.append(&second).is_err());
        log.append(&first).unwrap();
        assert!(log.append(&first).is_err());
    }
}
