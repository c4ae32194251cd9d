//! Read capability over a mirrored block tree.
//!
//! Tip classification and payload lookup are written once against this
//! trait and reused for both mirrored chains.

use crate::mirror_tree::TreeEntry;
use pharos_common::Hash;

/// Errors returned by mirrored-tree read operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Requested height is below the first retained block
    #[error("chain starts at {first}, provided {requested}")]
    BelowRange { first: u64, requested: u64 },

    /// Requested height is above the current tip
    #[error("chain tip is at {tip}, provided {requested}")]
    AboveRange { tip: u64, requested: u64 },

    /// The tree has no blocks yet
    #[error("chain is not bootstrapped")]
    NotBootstrapped,

    /// An enumerated tip has no fork point against the best chain.
    /// The tree guarantees one for every member; this is corruption.
    #[error("fork point missing for tip {tip}: state corruption")]
    MissingForkPoint { tip: String },

    /// The offered block's parent hash is not present in the tree
    #[error("previous block not found: {hash}")]
    PreviousNotFound { hash: String },

    /// A block hash referenced by an operation is not in the tree
    #[error("block not in tree: {hash}")]
    BlockNotFound { hash: String },

    /// The offered block's height does not equal parent height + 1
    #[error("invalid block height: expected {expected}, got {got}")]
    InvalidHeight { expected: u64, got: u64 },
}

/// Uniform read access over one mirrored block tree.
///
/// All operations are snapshots; callers hold the state lock for the
/// duration of a logical operation, so a snapshot cannot observe a
/// concurrent mutation.
pub trait ChainReader<const N: usize> {
    /// Look up a block index entry by hash
    fn get(&self, hash: &Hash<N>) -> Option<&TreeEntry<N>>;

    /// Tip of the best fully-validated chain, `None` until bootstrapped
    fn best_tip(&self) -> Option<&TreeEntry<N>>;

    /// First retained block of the best chain
    fn first(&self) -> Option<&TreeEntry<N>>;

    /// Best-chain block at the given height, with range errors naming
    /// the violated bound
    fn block_at_height(&self, height: u64) -> Result<&TreeEntry<N>, TreeError>;

    /// Whether the entry is part of the best chain
    fn contains(&self, entry: &TreeEntry<N>) -> bool;

    /// Every known tip, height descending then hash ascending
    fn tips(&self) -> Vec<&TreeEntry<N>>;

    /// Highest common ancestor of `tip` and the best chain
    fn find_fork(&self, tip: &TreeEntry<N>) -> Result<&TreeEntry<N>, TreeError>;
}
