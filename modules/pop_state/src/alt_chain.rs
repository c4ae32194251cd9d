//! Own-chain header index.
//!
//! Tracks the node's own chain as announced by the block feed: headers
//! by hash, the active chain by height, and whether each block's full
//! data is still on disk. Also derives the keystone context a PoP miner
//! needs for endorsing a block.

use std::collections::HashMap;

use pharos_common::crypto::sha256d;
use pharos_common::pow::header_hash;
use pharos_common::{BlockHash, BlockHeader, BlockInfo, NetworkMode};

/// Spacing of keystone blocks on the own chain
pub const KEYSTONE_INTERVAL: u64 = 5;

#[derive(Debug, Clone)]
pub struct AltHeaderEntry {
    pub height: u64,
    pub header: BlockHeader,
    /// Whether the block body is still readable from storage
    pub has_data: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AltChainError {
    #[error("announced hash {announced} does not match header hash {computed}")]
    HashMismatch {
        announced: BlockHash,
        computed: BlockHash,
    },

    #[error("non-contiguous block at height {height}, tip is {tip_height}")]
    NonContiguous { height: u64, tip_height: u64 },

    #[error("block {height} does not extend the tip")]
    WrongParent { height: u64 },
}

#[derive(Debug, Default)]
pub struct AltChainIndex {
    by_hash: HashMap<BlockHash, AltHeaderEntry>,
    /// Active chain, height-indexed from `base_height`
    active: Vec<BlockHash>,
    base_height: u64,
    keystone_interval: u64,
}

impl AltChainIndex {
    pub fn new(keystone_interval: u64) -> Self {
        Self {
            keystone_interval,
            ..Default::default()
        }
    }

    /// Append an announced block to the active chain.
    ///
    /// The announced hash is recomputed from the header through the
    /// network's hash selector; a mismatch rejects the block. The first
    /// block accepted sets the chain base; every later block must
    /// extend the current tip.
    pub fn append(
        &mut self,
        info: &BlockInfo,
        header: BlockHeader,
        network: NetworkMode,
    ) -> Result<(), AltChainError> {
        let computed = header_hash(&header, network);
        if computed != info.hash {
            return Err(AltChainError::HashMismatch {
                announced: info.hash,
                computed,
            });
        }

        if let Some(tip_hash) = self.active.last() {
            let tip_height = self.base_height + self.active.len() as u64 - 1;
            if info.height != tip_height + 1 {
                return Err(AltChainError::NonContiguous {
                    height: info.height,
                    tip_height,
                });
            }
            if header.previous != *tip_hash {
                return Err(AltChainError::WrongParent {
                    height: info.height,
                });
            }
        } else {
            self.base_height = info.height;
        }

        self.by_hash.insert(
            info.hash,
            AltHeaderEntry {
                height: info.height,
                header,
                has_data: true,
            },
        );
        self.active.push(info.hash);
        Ok(())
    }

    /// Roll the active chain back to the given height. Disconnected
    /// entries remain known by hash, like any other fork block.
    pub fn rollback_to(&mut self, height: u64) {
        if height < self.base_height {
            self.active.clear();
            return;
        }
        let keep = (height - self.base_height + 1) as usize;
        self.active.truncate(keep);
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&AltHeaderEntry> {
        self.by_hash.get(hash)
    }

    pub fn is_known(&self, hash: &BlockHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn mark_pruned(&mut self, hash: &BlockHash) {
        if let Some(entry) = self.by_hash.get_mut(hash) {
            entry.has_data = false;
        }
    }

    pub fn is_active(&self, hash: &BlockHash) -> bool {
        match self.by_hash.get(hash) {
            Some(entry) if entry.height >= self.base_height => {
                let offset = (entry.height - self.base_height) as usize;
                self.active.get(offset) == Some(hash)
            }
            _ => false,
        }
    }

    pub fn tip_height(&self) -> Option<u64> {
        if self.active.is_empty() {
            None
        } else {
            Some(self.base_height + self.active.len() as u64 - 1)
        }
    }

    pub fn base_height(&self) -> u64 {
        self.base_height
    }

    pub fn hash_at_height(&self, height: u64) -> Option<&BlockHash> {
        if height < self.base_height {
            return None;
        }
        self.active.get((height - self.base_height) as usize)
    }

    /// Keystone hashes for the block following the one at `height`:
    /// the highest keystone at or below `height` and the one before it,
    /// newest first. Keystones below the chain base are unavailable.
    pub fn keystones_for_next_block(&self, height: u64) -> Vec<BlockHash> {
        let interval = self.keystone_interval.max(1);
        let mut keystones = Vec::with_capacity(2);
        let first = height - height % interval;
        for keystone_height in [Some(first), first.checked_sub(interval)].into_iter().flatten() {
            if let Some(hash) = self.hash_at_height(keystone_height) {
                keystones.push(*hash);
            }
        }
        keystones
    }

    /// Authenticated context info for the block at `height`: the
    /// serialized height and keystone set, followed by a commitment
    /// hash binding them to the block's transaction merkle root.
    pub fn authenticated_context_info(&self, height: u64) -> Option<Vec<u8>> {
        let hash = self.hash_at_height(height)?;
        let entry = self.by_hash.get(hash)?;

        let keystones = if height == self.base_height {
            Vec::new()
        } else {
            self.keystones_for_next_block(height - 1)
        };

        let mut raw = Vec::with_capacity(5 + keystones.len() * 32);
        raw.extend_from_slice(&(height as u32).to_be_bytes());
        raw.push(keystones.len() as u8);
        for keystone in &keystones {
            raw.extend_from_slice(keystone.as_ref());
        }

        let mut commitment_input = raw.clone();
        commitment_input.extend_from_slice(entry.header.merkle_root.as_ref());
        let commitment = sha256d(&commitment_input);

        raw.extend_from_slice(commitment.as_ref());
        Some(raw)
    }
}
