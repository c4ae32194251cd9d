//! Three-tier payload lookup.
//!
//! A payload can live in a specific own-chain block, in the PoP
//! mempool, or in any block enumerated by the payload index. Lookup
//! precedence is fixed and short-circuits: an explicit block scope is a
//! precise query and never falls through to the other tiers; an
//! unscoped query prefers the mempool, then consults the index and
//! re-verifies every containing block against storage.

use pharos_common::entities::PopPayload;
use pharos_common::queries::pop::{PayloadContainment, PayloadRecord};
use pharos_common::BlockHash;

use crate::alt_chain::AltChainIndex;
use crate::payload_index::PayloadIndex;
use crate::pop_mempool::{MempoolSlot, PopMempool};
use crate::stores::Store;

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    /// No matching data anywhere; a normal negative result
    #[error("not found")]
    NotFound,

    /// The caller named a block this node does not know
    #[error("block hash not found: {hash}")]
    UnknownBlock { hash: String },

    /// The block exists but its data cannot be produced
    #[error("block {hash} not available ({reason})")]
    BlockUnavailable { hash: String, reason: &'static str },

    /// Index and storage disagree; collaborator state corruption
    #[error("internal consistency violation: {message}")]
    Corruption { message: String },
}

/// A located payload and the blocks that contain it.
///
/// `containing_blocks` is empty for a mempool hit and carries index
/// enumeration order otherwise.
pub struct Located<P> {
    pub payload: P,
    pub containing_blocks: Vec<BlockHash>,
}

/// Shape a lookup result for the query surface. Non-verbose callers
/// get only the payload bytes; verbose callers attach the containment
/// detail they computed.
pub fn located_record<P: PopPayload>(
    located: &Located<P>,
    containing: Option<PayloadContainment>,
) -> PayloadRecord {
    PayloadRecord {
        data: hex::encode(located.payload.encode_bytes()),
        containing,
    }
}

pub fn locate<P: MempoolSlot>(
    alt_index: &AltChainIndex,
    store: &dyn Store,
    mempool: &PopMempool,
    payload_index: &PayloadIndex,
    id_bytes: &[u8],
    scope: Option<BlockHash>,
) -> Result<Located<P>, LocateError> {
    if let Some(block_hash) = scope {
        let payload = read_payload_from_block::<P>(alt_index, store, id_bytes, &block_hash)?
            .ok_or(LocateError::NotFound)?;
        return Ok(Located {
            payload,
            containing_blocks: vec![block_hash],
        });
    }

    if let Some(payload) = mempool.get::<P>(id_bytes) {
        return Ok(Located {
            payload: payload.clone(),
            containing_blocks: Vec::new(),
        });
    }

    let containing = payload_index.containing_blocks(id_bytes);
    if containing.is_empty() {
        return Err(LocateError::NotFound);
    }

    // Re-verify every indexed block actually embeds the payload; an
    // index entry pointing at a block without it means the index and
    // storage have diverged.
    let mut payload = None;
    for block_hash in &containing {
        if !alt_index.is_known(block_hash) {
            return Err(LocateError::Corruption {
                message: format!("payload index references unknown block {block_hash}"),
            });
        }
        payload = Some(
            read_payload_from_block::<P>(alt_index, store, id_bytes, block_hash)?.ok_or_else(
                || LocateError::Corruption {
                    message: format!("payload not present in indexed block {block_hash}"),
                },
            )?,
        );
    }

    let payload = payload.ok_or_else(|| LocateError::Corruption {
        message: "containing block set empty after verification".to_string(),
    })?;
    Ok(Located {
        payload,
        containing_blocks: containing,
    })
}

/// Read one block and scan its embedded payloads for `id_bytes`.
fn read_payload_from_block<P: MempoolSlot>(
    alt_index: &AltChainIndex,
    store: &dyn Store,
    id_bytes: &[u8],
    block_hash: &BlockHash,
) -> Result<Option<P>, LocateError> {
    let entry = alt_index.get(block_hash).ok_or_else(|| LocateError::UnknownBlock {
        hash: block_hash.to_string(),
    })?;
    if !entry.has_data {
        return Err(LocateError::BlockUnavailable {
            hash: block_hash.to_string(),
            reason: "pruned data",
        });
    }

    let block = store
        .get_block(block_hash)
        .map_err(|error| LocateError::Corruption {
            message: format!("storage error reading block {block_hash}: {error}"),
        })?
        .ok_or_else(|| LocateError::BlockUnavailable {
            hash: block_hash.to_string(),
            reason: "not found on disk",
        })?;

    Ok(P::in_pop_data(&block.pop_data).iter().find(|p| p.id_bytes() == id_bytes).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alt_chain::KEYSTONE_INTERVAL;
    use crate::mirror_tree::MirrorTree;
    use crate::stores::fjall::FjallStore;
    use pharos_common::entities::{Atv, Block, PopData, PopPayload, VbkBlock};
    use pharos_common::pow::header_hash;
    use pharos_common::{BlockHeader, BlockInfo, Hash, NetworkMode};
    use std::sync::Arc;

    struct Fixture {
        alt_index: AltChainIndex,
        store: FjallStore,
        mempool: PopMempool,
        payload_index: PayloadIndex,
        #[allow(dead_code)]
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(
            config::Config::builder()
                .set_override("database-path", dir.path().join("blocks").to_str().unwrap())
                .unwrap()
                .build()
                .unwrap(),
        );
        Fixture {
            alt_index: AltChainIndex::new(KEYSTONE_INTERVAL),
            store: FjallStore::new(config).unwrap(),
            mempool: PopMempool::new(),
            payload_index: PayloadIndex::new(),
            dir,
        }
    }

    fn sample_atv(nonce: u64) -> Atv {
        atv_endorsing(Hash::new([4u8; 32]), nonce)
    }

    fn atv_endorsing(endorsed: BlockHash, nonce: u64) -> Atv {
        Atv {
            endorsed,
            payout_info: vec![0x51, 0x52],
            containing: VbkBlock {
                height: 12,
                nonce,
                ..Default::default()
            },
        }
    }

    /// Append a block embedding the given payloads to the fixture's
    /// chain, store and index, returning its hash.
    fn add_block(fixture: &mut Fixture, height: u64, pop_data: PopData) -> BlockHash {
        let previous = fixture
            .alt_index
            .tip_height()
            .and_then(|h| fixture.alt_index.hash_at_height(h).copied())
            .unwrap_or_default();
        let header = BlockHeader {
            version: 1,
            previous,
            merkle_root: Hash::new([height as u8; 32]),
            time: 100 + height as u32,
            bits: 0,
            nonce: height as u32,
        };
        let hash = header_hash(&header, NetworkMode::Regtest);
        let info = BlockInfo { height, hash };
        fixture.alt_index.append(&info, header, NetworkMode::Regtest).unwrap();
        fixture
            .store
            .insert_block(
                &hash,
                &Block {
                    header,
                    pop_data: pop_data.clone(),
                },
            )
            .unwrap();
        fixture.payload_index.add_block_payloads(hash, &pop_data);
        hash
    }

    fn locate_atv(
        fixture: &Fixture,
        id_bytes: &[u8],
        scope: Option<BlockHash>,
    ) -> Result<Located<Atv>, LocateError> {
        locate::<Atv>(
            &fixture.alt_index,
            &fixture.store,
            &fixture.mempool,
            &fixture.payload_index,
            id_bytes,
            scope,
        )
    }

    #[test]
    fn absent_everywhere_is_not_found() {
        let fixture = fixture();
        assert!(matches!(
            locate_atv(&fixture, &[0u8; 32], None),
            Err(LocateError::NotFound)
        ));
    }

    #[test]
    fn indexed_block_lookup_returns_container() {
        let mut fixture = fixture();
        let atv = sample_atv(1);
        add_block(&mut fixture, 0, PopData::default());
        let block_hash = add_block(
            &mut fixture,
            1,
            PopData {
                atvs: vec![atv.clone()],
                ..Default::default()
            },
        );

        let located = locate_atv(&fixture, &atv.id_bytes(), None).unwrap();
        assert_eq!(located.containing_blocks, vec![block_hash]);
        assert_eq!(located.payload, atv);
    }

    #[test]
    fn block_scope_wins_over_mempool() {
        let mut fixture = fixture();
        let genesis = add_block(&mut fixture, 0, PopData::default());
        let atv = atv_endorsing(genesis, 2);
        let block_hash = add_block(
            &mut fixture,
            1,
            PopData {
                atvs: vec![atv.clone()],
                ..Default::default()
            },
        );

        // The same payload is also in the mempool
        let mut vbk_tree = MirrorTree::new();
        vbk_tree.bootstrap(atv.containing.previous, atv.containing.height - 1);
        let outcome = fixture.mempool.submit_atv(&mut vbk_tree, &fixture.alt_index, atv.clone());
        assert!(outcome.accepted);

        let scoped = locate_atv(&fixture, &atv.id_bytes(), Some(block_hash)).unwrap();
        assert_eq!(scoped.containing_blocks, vec![block_hash]);

        let unscoped = locate_atv(&fixture, &atv.id_bytes(), None).unwrap();
        assert!(unscoped.containing_blocks.is_empty());
    }

    #[test]
    fn block_scope_does_not_fall_through() {
        let mut fixture = fixture();
        let genesis = add_block(&mut fixture, 0, PopData::default());
        let embedded = atv_endorsing(genesis, 3);
        let mempool_only = atv_endorsing(genesis, 4);
        let block_hash = add_block(
            &mut fixture,
            1,
            PopData {
                atvs: vec![embedded],
                ..Default::default()
            },
        );

        let mut vbk_tree = MirrorTree::new();
        vbk_tree.bootstrap(mempool_only.containing.previous, mempool_only.containing.height - 1);
        let outcome =
            fixture.mempool.submit_atv(&mut vbk_tree, &fixture.alt_index, mempool_only.clone());
        assert!(outcome.accepted);

        // Present in the mempool but not in the named block
        assert!(matches!(
            locate_atv(&fixture, &mempool_only.id_bytes(), Some(block_hash)),
            Err(LocateError::NotFound)
        ));
    }

    #[test]
    fn unknown_scope_block_reported_to_caller() {
        let fixture = fixture();
        assert!(matches!(
            locate_atv(&fixture, &[0u8; 32], Some(BlockHash::new([9u8; 32]))),
            Err(LocateError::UnknownBlock { .. })
        ));
    }

    #[test]
    fn pruned_block_is_unavailable_not_missing() {
        let mut fixture = fixture();
        let atv = sample_atv(5);
        let block_hash = add_block(
            &mut fixture,
            0,
            PopData {
                atvs: vec![atv.clone()],
                ..Default::default()
            },
        );
        fixture.alt_index.mark_pruned(&block_hash);
        fixture.store.remove_block(&block_hash).unwrap();

        assert!(matches!(
            locate_atv(&fixture, &atv.id_bytes(), Some(block_hash)),
            Err(LocateError::BlockUnavailable {
                reason: "pruned data",
                ..
            })
        ));
    }

    #[test]
    fn index_without_payload_is_corruption() {
        let mut fixture = fixture();
        let atv = sample_atv(6);
        // Index claims the block contains the payload, block is empty
        let block_hash = add_block(&mut fixture, 0, PopData::default());
        fixture.payload_index.add_block_payloads(
            block_hash,
            &PopData {
                atvs: vec![atv.clone()],
                ..Default::default()
            },
        );

        assert!(matches!(
            locate_atv(&fixture, &atv.id_bytes(), None),
            Err(LocateError::Corruption { .. })
        ));
    }
}
