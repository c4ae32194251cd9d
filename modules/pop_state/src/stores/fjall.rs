use std::{fs, path::PathBuf, sync::Arc};

use anyhow::Result;
use config::Config;
use fjall::{Database, Keyspace};
use pharos_common::entities::Block;
use pharos_common::BlockHash;

use crate::stores::Store;

const DEFAULT_DATABASE_PATH: &str = "fjall-pop-blocks";
const DEFAULT_CLEAR_ON_START: bool = true;
const BLOCKS_KEYSPACE: &str = "blocks";

pub struct FjallStore {
    database: Database,
    blocks: Keyspace,
}

impl FjallStore {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let path =
            config.get_string("database-path").unwrap_or(DEFAULT_DATABASE_PATH.to_string());
        let clear = config.get_bool("clear-on-start").unwrap_or(DEFAULT_CLEAR_ON_START);
        let path = PathBuf::from(path);
        if clear && path.exists() {
            fs::remove_dir_all(&path)?;
        }
        let database = Database::builder(&path).open()?;
        let blocks = database.keyspace(BLOCKS_KEYSPACE, fjall::KeyspaceCreateOptions::default)?;

        Ok(Self { database, blocks })
    }
}

impl Store for FjallStore {
    fn insert_block(&self, hash: &BlockHash, block: &Block) -> Result<()> {
        let encoded = {
            let mut bytes = vec![];
            minicbor::encode(block, &mut bytes).expect("infallible");
            bytes
        };
        let mut batch = self.database.batch();
        batch.insert(&self.blocks, **hash, encoded);
        batch.commit()?;
        Ok(())
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>> {
        let Some(bytes) = self.blocks.get(hash.as_ref())? else {
            return Ok(None);
        };
        Ok(Some(minicbor::decode(&bytes)?))
    }

    fn remove_block(&self, hash: &BlockHash) -> Result<()> {
        let mut batch = self.database.batch();
        batch.remove(&self.blocks, **hash);
        batch.commit()?;
        Ok(())
    }
}
