use std::sync::Arc;

use log::trace;
use rocksdb::TransactionDB;

use crate::storage::rocksdb::{block_height_key, block_id_key, last_block_key};
use crate::types::SignedBlock;
use crate::utilities::encoding::decode;

pub struct DbQuery {
    database: Arc<TransactionDB>,
}

impl DbQuery {
    pub fn new(db: Arc<TransactionDB>) -> DbQuery {
        DbQuery { database: db }
    }

    pub(crate) fn get_block_by_id(&self, block_id: &str) -> anyhow::Result<Option<SignedBlock>> {
        trace!("Getting block by id: {:?}", block_id);

        let block = if let Some(block) = self.database.get(block_id_key(block_id))? {
            let block = decode::<SignedBlock>(&block)?;
            trace!("Found block: {}", block.header);
            Some(block)
        } else {
            trace!("Didn't find block");
            None
        };
        Ok(block)
    }

    pub(crate) fn get_last_block(&self) -> anyhow::Result<Option<SignedBlock>> {
        trace!("Getting last block");

        if let Some(block_id) = self.database.get(last_block_key())? {
            let block_id = String::from_utf8(block_id)?;
            self.get_block_by_id(&block_id)
        } else {
            trace!("Unable to get last block");
            Ok(None)
        }
    }

    pub(crate) fn get_block_by_height(&self, height: u32) -> anyhow::Result<Option<SignedBlock>> {
        trace!("Getting block by height: {}", height);

        if let Some(block_id) = self.database.get(block_height_key(height))? {
            let block_id = String::from_utf8(block_id)?;
            self.get_block_by_id(&block_id)
        } else {
            trace!("Didn't find block");
            Ok(None)
        }
    }
}
