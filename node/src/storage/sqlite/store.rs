use anyhow::Result;
use rusqlite::{params, Connection};

use crate::types::SignedBlock;
use crate::utilities::encoding::encode;

pub(crate) struct DbStore {
    connection: Connection,
}

impl DbStore {
    pub(crate) fn new(connection: Connection) -> DbStore {
        DbStore { connection }
    }

    pub(crate) fn store_block(&mut self, block: &SignedBlock) -> Result<()> {
        log::debug!("Storing block: {}", block.header);

        let id = block.id()?.to_string();
        let height = block.block_num();
        let block_bytes = encode(block)?;

        let tx = self.connection.transaction()?;
        {
            let mut statement = tx.prepare_cached(
                "INSERT INTO blocks (block_id, height, block) VALUES (?1, ?2, ?3)",
            )?;
            statement.execute(params![&id, &height, &block_bytes,])?;
        }

        tx.commit()?;

        Ok(())
    }
}
