use std::sync::Arc;

use rocksdb::{TransactionDB, WriteBatchWithTransaction, WriteOptions};

use crate::storage::rocksdb::{block_height_key, block_id_key, last_block_key};
use crate::types::SignedBlock;
use crate::utilities::encoding::encode;

pub struct DbStore {
    connection: Arc<TransactionDB>,
}

impl DbStore {
    pub fn new(db: Arc<TransactionDB>) -> DbStore {
        DbStore { connection: db }
    }

    pub(crate) fn store_block(&self, block: &SignedBlock) -> anyhow::Result<()> {
        log::debug!("Storing block: {}", block.header);
        let id_str = block.id()?.to_string();
        let block_id_key = block_id_key(&id_str);
        log::trace!("Block id key: {}", block_id_key);

        if self.connection.get(&block_id_key)?.is_some() {
            return Err(anyhow::anyhow!("Block already exists"));
        }

        let mut batch = WriteBatchWithTransaction::<true>::default();

        //Store last block id(without prefix!)
        batch.put(last_block_key(), id_str.clone());

        batch.put(block_height_key(block.block_num()).as_bytes(), id_str);

        let block_bytes = encode(block)?;
        batch.put(block_id_key.as_bytes(), block_bytes);

        // Synced before the ledger commits past this block.
        let mut write_options = WriteOptions::default();
        write_options.set_sync(true);
        self.connection.write_opt(batch, &write_options)?;
        Ok(())
    }
}
