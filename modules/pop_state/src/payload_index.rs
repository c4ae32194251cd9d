//! Payload containment index: payload id bytes to the set of own-chain
//! blocks that embed the payload.

use std::collections::{BTreeSet, HashMap};

use pharos_common::entities::{PopPayload, PopData};
use pharos_common::BlockHash;

#[derive(Debug, Default)]
pub struct PayloadIndex {
    containing: HashMap<Vec<u8>, BTreeSet<BlockHash>>,
}

impl PayloadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every payload embedded in a block
    pub fn add_block_payloads(&mut self, block_hash: BlockHash, pop_data: &PopData) {
        for block in &pop_data.context {
            self.add(block.id_bytes(), block_hash);
        }
        for vtb in &pop_data.vtbs {
            self.add(vtb.id_bytes(), block_hash);
        }
        for atv in &pop_data.atvs {
            self.add(atv.id_bytes(), block_hash);
        }
    }

    fn add(&mut self, id_bytes: Vec<u8>, block_hash: BlockHash) {
        self.containing.entry(id_bytes).or_default().insert(block_hash);
    }

    /// Blocks known to contain the payload, in stable enumeration order
    pub fn containing_blocks(&self, id_bytes: &[u8]) -> Vec<BlockHash> {
        self.containing.get(id_bytes).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharos_common::entities::{Atv, VbkBlock};
    use pharos_common::Hash;

    #[test]
    fn indexes_all_payload_kinds_and_repeats() {
        let block_a = BlockHash::new([1u8; 32]);
        let block_b = BlockHash::new([2u8; 32]);
        let vbk = VbkBlock {
            height: 7,
            ..Default::default()
        };
        let atv = Atv {
            endorsed: Hash::new([9u8; 32]),
            payout_info: vec![1],
            containing: vbk.clone(),
        };
        let pop_data = PopData {
            context: vec![vbk.clone()],
            vtbs: vec![],
            atvs: vec![atv.clone()],
        };

        let mut index = PayloadIndex::new();
        index.add_block_payloads(block_a, &pop_data);
        index.add_block_payloads(block_b, &pop_data);
        // Re-adding the same block is idempotent
        index.add_block_payloads(block_a, &pop_data);

        assert_eq!(index.containing_blocks(&vbk.id_bytes()), vec![block_a, block_b]);
        assert_eq!(index.containing_blocks(&atv.id_bytes()).len(), 2);
        assert!(index.containing_blocks(&[0u8; 12]).is_empty());
    }
}
