//! Chain-tip classification.
//!
//! Maps a tip's raw status bits plus best-chain membership onto the
//! consensus-meaningful status reported by chain-tip queries. The
//! checks run in a fixed priority order; membership of the active
//! chain wins over everything, and an invalid ancestor condemns the
//! whole branch regardless of connectivity.

use pharos_common::queries::pop::TipInfo;
use pharos_common::{BlockFlags, TipStatus};
use tracing::warn;

use crate::chain_view::{ChainReader, TreeError};
use crate::mirror_tree::TreeEntry;

/// Classify one tip against the tree's best chain.
pub fn classify<const N: usize>(tree: &impl ChainReader<N>, tip: &TreeEntry<N>) -> TipStatus {
    if tree.contains(tip) {
        // This block is part of the currently active chain.
        TipStatus::Active
    } else if tip.flags.contains(BlockFlags::FAILED) {
        // This block or one of its ancestors is invalid.
        TipStatus::Invalid
    } else if !tip.flags.contains(BlockFlags::CONNECTED) {
        // This block cannot be connected because full data for it or
        // one of its parents is missing.
        TipStatus::HeadersOnly
    } else if tip.flags.contains(BlockFlags::CAN_BE_APPLIED) {
        // Fully validated but no longer part of the active chain.
        TipStatus::ValidFork
    } else if tip.flags.contains(BlockFlags::CONNECTED) {
        // Headers valid and data present, but never fully validated.
        TipStatus::ValidHeaders
    } else {
        // No clue.
        warn!(tip = %tip.hash, flags = tip.flags.bits(), "tip in unmodelled state");
        TipStatus::Unknown
    }
}

/// Assemble the full tip report: classification plus the branch length
/// back to the fork point with the best chain.
///
/// The fork walk runs for every tip, including the active one (where
/// the branch length is zero); a missing fork point is corruption and
/// propagates as an error.
pub fn tip_info<const N: usize>(
    tree: &impl ChainReader<N>,
    tip: &TreeEntry<N>,
) -> Result<TipInfo, TreeError> {
    let fork = tree.find_fork(tip)?;
    Ok(TipInfo {
        height: tip.height,
        hash: tip.hash.to_string(),
        branch_len: tip.height - fork.height,
        status_flags: tip.flags.bits(),
        status: classify(tree, tip),
    })
}
