//! Mirrored foreign-chain block tree.
//!
//! Tracks every known header of one foreign chain, including forks and
//! invalid branches. Unlike a volatile-window consensus tree, invalid
//! branches are kept and flagged rather than removed, because chain-tip
//! queries report them. Best-chain selection favours the highest
//! fully-validated tip, with ties broken in favour of the incumbent.

use std::collections::HashMap;

use pharos_common::{BlockFlags, Hash};

use crate::chain_view::{ChainReader, TreeError};

/// A block index entry within a mirrored tree.
#[derive(Debug, Clone)]
pub struct TreeEntry<const N: usize> {
    /// Block hash (identity key)
    pub hash: Hash<N>,
    /// Block height
    pub height: u64,
    /// Parent block hash; `None` for the bootstrap block
    pub parent: Option<Hash<N>>,
    /// Child block hashes
    pub children: Vec<Hash<N>>,
    /// Validation status bits
    pub flags: BlockFlags,
}

/// One mirrored foreign block tree.
///
/// Operations are single-threaded; the owning module serializes access
/// under its state lock.
pub struct MirrorTree<const N: usize> {
    /// All blocks keyed by hash
    blocks: HashMap<Hash<N>, TreeEntry<N>>,
    /// Bootstrap block (oldest retained block)
    root: Option<Hash<N>>,
    /// Tip of the current best chain
    best_tip: Option<Hash<N>>,
    /// Best-chain hashes indexed by height offset from `first_height`
    active: Vec<Hash<N>>,
    /// Height of the bootstrap block
    first_height: u64,
}

impl<const N: usize> Default for MirrorTree<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MirrorTree<N> {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            root: None,
            best_tip: None,
            active: Vec::new(),
            first_height: 0,
        }
    }

    /// Install the bootstrap block. The tree answers queries only after
    /// this has been called once; a second call is ignored.
    ///
    /// Returns whether the bootstrap was applied.
    pub fn bootstrap(&mut self, hash: Hash<N>, height: u64) -> bool {
        if self.root.is_some() {
            return false;
        }
        let entry = TreeEntry {
            hash,
            height,
            parent: None,
            children: Vec::new(),
            flags: BlockFlags::HAVE_DATA | BlockFlags::CONNECTED | BlockFlags::CAN_BE_APPLIED,
        };
        self.blocks.insert(hash, entry);
        self.root = Some(hash);
        self.best_tip = Some(hash);
        self.active = vec![hash];
        self.first_height = height;
        true
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.root.is_some()
    }

    pub fn contains_hash(&self, hash: &Hash<N>) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Number of blocks on the best chain
    pub fn blocks_count(&self) -> usize {
        self.active.len()
    }

    /// Insert a block under its parent.
    ///
    /// `want` carries the flags the block arrives with (at most
    /// `HAVE_DATA` and `CAN_BE_APPLIED`); connectivity and validity are
    /// only granted when the parent already has them, and `FAILED` is
    /// inherited unconditionally. Re-inserting a known block under the
    /// same parent is a no-op.
    pub fn insert(
        &mut self,
        hash: Hash<N>,
        height: u64,
        parent: Hash<N>,
        want: BlockFlags,
    ) -> Result<(), TreeError> {
        if let Some(existing) = self.blocks.get(&hash) {
            if existing.parent != Some(parent) {
                return Err(TreeError::PreviousNotFound {
                    hash: parent.to_string(),
                });
            }
            if existing.height != height {
                return Err(TreeError::InvalidHeight {
                    expected: existing.height,
                    got: height,
                });
            }
            return Ok(());
        }

        let parent_entry = self.blocks.get(&parent).ok_or(TreeError::PreviousNotFound {
            hash: parent.to_string(),
        })?;
        if height != parent_entry.height + 1 {
            return Err(TreeError::InvalidHeight {
                expected: parent_entry.height + 1,
                got: height,
            });
        }

        let mut flags = BlockFlags::empty();
        if want.contains(BlockFlags::HAVE_DATA) {
            flags.insert(BlockFlags::HAVE_DATA);
            if parent_entry.flags.contains(BlockFlags::CONNECTED) {
                flags.insert(BlockFlags::CONNECTED);
            }
        }
        if want.contains(BlockFlags::CAN_BE_APPLIED)
            && flags.contains(BlockFlags::CONNECTED)
            && parent_entry.flags.contains(BlockFlags::CAN_BE_APPLIED)
        {
            flags.insert(BlockFlags::CAN_BE_APPLIED);
        }
        if parent_entry.flags.contains(BlockFlags::FAILED) {
            flags.insert(BlockFlags::FAILED);
        }

        self.blocks.insert(
            hash,
            TreeEntry {
                hash,
                height,
                parent: Some(parent),
                children: Vec::new(),
                flags,
            },
        );
        if let Some(parent_entry) = self.blocks.get_mut(&parent) {
            parent_entry.children.push(hash);
        }

        self.recompute_best();
        Ok(())
    }

    /// Mark a block and all its descendants invalid.
    ///
    /// Invalidated blocks stay in the tree so tip queries keep
    /// reporting the branch; the best chain is re-selected among the
    /// remaining valid blocks.
    pub fn invalidate_subtree(&mut self, hash: &Hash<N>) -> Result<(), TreeError> {
        if !self.blocks.contains_key(hash) {
            return Err(TreeError::BlockNotFound {
                hash: hash.to_string(),
            });
        }

        for h in self.collect_subtree(hash) {
            if let Some(entry) = self.blocks.get_mut(&h) {
                entry.flags.insert(BlockFlags::FAILED);
            }
        }

        self.recompute_best();
        Ok(())
    }

    /// Last `max` best-chain hashes, ascending, ending at the tip
    pub fn last_known_hashes(&self, max: usize) -> Vec<Hash<N>> {
        let skip = self.active.len().saturating_sub(max);
        self.active[skip..].to_vec()
    }

    /// A block is a best-chain candidate when it is fully validated
    fn eligible(entry: &TreeEntry<N>) -> bool {
        !entry.flags.contains(BlockFlags::FAILED)
            && entry.flags.contains(BlockFlags::CONNECTED)
            && entry.flags.contains(BlockFlags::CAN_BE_APPLIED)
    }

    /// Re-select the best chain after a mutation.
    ///
    /// Highest eligible block wins; on equal height the incumbent tip
    /// is kept, otherwise the smallest hash, so selection is
    /// deterministic for any insertion order.
    fn recompute_best(&mut self) {
        let mut best: Option<&TreeEntry<N>> = None;
        for entry in self.blocks.values() {
            if !Self::eligible(entry) {
                continue;
            }
            best = match best {
                None => Some(entry),
                Some(current) => {
                    if entry.height > current.height {
                        Some(entry)
                    } else if entry.height == current.height {
                        if Some(current.hash) == self.best_tip {
                            Some(current)
                        } else if Some(entry.hash) == self.best_tip || entry.hash < current.hash {
                            Some(entry)
                        } else {
                            Some(current)
                        }
                    } else {
                        Some(current)
                    }
                }
            };
        }

        self.best_tip = best.map(|entry| entry.hash);
        self.rebuild_active();
    }

    fn rebuild_active(&mut self) {
        self.active.clear();
        let Some(tip) = self.best_tip else {
            return;
        };
        let mut current = Some(tip);
        while let Some(h) = current {
            self.active.push(h);
            current = self.blocks.get(&h).and_then(|entry| entry.parent);
        }
        self.active.reverse();
        if let Some(first) = self.active.first() {
            if let Some(entry) = self.blocks.get(first) {
                self.first_height = entry.height;
            }
        }
    }

    /// Collect a block and everything reachable below it
    fn collect_subtree(&self, hash: &Hash<N>) -> Vec<Hash<N>> {
        let mut result = vec![*hash];
        let mut stack = vec![*hash];
        while let Some(h) = stack.pop() {
            if let Some(entry) = self.blocks.get(&h) {
                for &child in &entry.children {
                    result.push(child);
                    stack.push(child);
                }
            }
        }
        result
    }
}

impl<const N: usize> ChainReader<N> for MirrorTree<N> {
    fn get(&self, hash: &Hash<N>) -> Option<&TreeEntry<N>> {
        self.blocks.get(hash)
    }

    fn best_tip(&self) -> Option<&TreeEntry<N>> {
        self.best_tip.as_ref().and_then(|h| self.blocks.get(h))
    }

    fn first(&self) -> Option<&TreeEntry<N>> {
        self.active.first().and_then(|h| self.blocks.get(h))
    }

    fn block_at_height(&self, height: u64) -> Result<&TreeEntry<N>, TreeError> {
        if self.active.is_empty() {
            return Err(TreeError::NotBootstrapped);
        }
        let first = self.first_height;
        let tip = first + self.active.len() as u64 - 1;
        if height < first {
            return Err(TreeError::BelowRange {
                first,
                requested: height,
            });
        }
        if height > tip {
            return Err(TreeError::AboveRange {
                tip,
                requested: height,
            });
        }
        let hash = &self.active[(height - first) as usize];
        self.blocks.get(hash).ok_or(TreeError::MissingForkPoint {
            tip: hash.to_string(),
        })
    }

    fn contains(&self, entry: &TreeEntry<N>) -> bool {
        if entry.height < self.first_height {
            return false;
        }
        let offset = (entry.height - self.first_height) as usize;
        self.active.get(offset) == Some(&entry.hash)
    }

    fn tips(&self) -> Vec<&TreeEntry<N>> {
        let mut tips: Vec<&TreeEntry<N>> =
            self.blocks.values().filter(|entry| entry.children.is_empty()).collect();
        tips.sort_by(|a, b| b.height.cmp(&a.height).then_with(|| a.hash.cmp(&b.hash)));
        tips
    }

    fn find_fork(&self, tip: &TreeEntry<N>) -> Result<&TreeEntry<N>, TreeError> {
        if self.active.is_empty() {
            return Err(TreeError::NotBootstrapped);
        }
        let mut current = tip.hash;
        loop {
            let entry = self.blocks.get(&current).ok_or(TreeError::MissingForkPoint {
                tip: tip.hash.to_string(),
            })?;
            if self.contains(entry) {
                return Ok(entry);
            }
            current = entry.parent.ok_or(TreeError::MissingForkPoint {
                tip: tip.hash.to_string(),
            })?;
        }
    }
}
