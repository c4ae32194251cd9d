use anyhow::Result;
use pharos_common::entities::Block;
use pharos_common::BlockHash;

pub mod fjall;

/// Own-chain block body storage.
///
/// Which blocks exist and whether their data is retained is tracked by
/// the header index; the store only moves encoded block bodies.
pub trait Store: Send + Sync {
    fn insert_block(&self, hash: &BlockHash, block: &Block) -> Result<()>;

    fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>>;

    /// Drop a pruned block's body
    fn remove_block(&self, hash: &BlockHash) -> Result<()>;
}
