use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use crate::types::{BlockId, SignedBlock};
use crate::utilities::encoding::decode;

pub(crate) struct DbQuery {
    pub(crate) connection: Connection,
}

impl DbQuery {
    pub(crate) fn open(path: &str, flags: OpenFlags) -> anyhow::Result<Self> {
        let connection = Connection::open_with_flags(path, flags)?;
        let query = Self { connection };
        Ok(query)
    }

    pub(crate) fn get_block_by_id(&self, block_id: &BlockId) -> anyhow::Result<Option<SignedBlock>> {
        log::trace!("Getting block by id: {}", block_id);

        let mut stmt = self
            .connection
            .prepare_cached("SELECT block FROM blocks WHERE block_id = ?1")?;
        let block = stmt
            .query_row(params![block_id.to_string()], Self::map_block())
            .optional()?;

        if let Some(block) = &block {
            log::trace!("Found block: {}", block.header);
        } else {
            log::trace!("Block not found: {}", block_id);
        };

        Ok(block)
    }

    pub(crate) fn get_last_block(&self) -> anyhow::Result<Option<SignedBlock>> {
        log::trace!("Getting last block");

        let mut stmt = self.connection.prepare_cached(
            "SELECT block FROM blocks where height = (select max(height) from blocks)",
        )?;

        let block = stmt.query_row(params![], Self::map_block()).optional()?;

        if let Some(block) = &block {
            log::trace!("Found last block: {}", block.header);
        } else {
            log::trace!("Last block not found");
        };

        Ok(block)
    }

    pub(crate) fn get_block_by_height(&self, height: u32) -> anyhow::Result<Option<SignedBlock>> {
        log::trace!("Getting block by height: {}", height);

        self.get_raw_block_by_height(height)?
            .map(|bytes| decode::<SignedBlock>(&bytes))
            .transpose()
    }

    pub(crate) fn get_raw_block_by_height(&self, height: u32) -> anyhow::Result<Option<Vec<u8>>> {
        let mut stmt = self
            .connection
            .prepare_cached("SELECT block FROM blocks WHERE height = ?1")?;
        let bytes = stmt
            .query_row(params![height], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;

        if bytes.is_none() {
            log::trace!("Block not found: {}", height);
        }
        Ok(bytes)
    }

    fn map_block() -> impl FnOnce(&Row) -> Result<SignedBlock, rusqlite::Error> {
        |row| {
            let body: Vec<u8> = row.get(0)?;
            let block = decode::<SignedBlock>(&body).map_err(|e| {
                log::error!("Error deserializing block: {}", e);
                rusqlite::Error::InvalidQuery {}
            })?;
            Ok(block)
        }
    }
}
