//! PoP payload mempool and submission handling.
//!
//! Holds payloads awaiting inclusion in an own-chain block, validating
//! them contextually against the mirrored trees on the way in. Accepted
//! VBK headers (standalone or carried as VTB/ATV context) are connected
//! into the mirrored trees immediately; the payloads themselves stay in
//! the mempool until a block embeds them.

use std::collections::BTreeMap;

use pharos_common::entities::{Atv, PopData, PopPayload, Vtb, VbkBlock};
use pharos_common::pow::btc_header_hash;
use pharos_common::queries::pop::SubmissionOutcome;
use pharos_common::{BlockFlags, BlockHeader};
use tracing::{info, warn};

use crate::alt_chain::AltChainIndex;
use crate::chain_view::ChainReader;
use crate::mirror_tree::MirrorTree;

#[derive(Debug, Default)]
pub struct PopMempool {
    vbk_blocks: BTreeMap<Vec<u8>, VbkBlock>,
    vtbs: BTreeMap<Vec<u8>, Vtb>,
    atvs: BTreeMap<Vec<u8>, Atv>,
}

/// Binds a payload kind to its mempool slot so lookup and listing can
/// be written once.
pub trait MempoolSlot: PopPayload {
    fn slot(mempool: &PopMempool) -> &BTreeMap<Vec<u8>, Self>;
}

impl MempoolSlot for VbkBlock {
    fn slot(mempool: &PopMempool) -> &BTreeMap<Vec<u8>, Self> {
        &mempool.vbk_blocks
    }
}

impl MempoolSlot for Vtb {
    fn slot(mempool: &PopMempool) -> &BTreeMap<Vec<u8>, Self> {
        &mempool.vtbs
    }
}

impl MempoolSlot for Atv {
    fn slot(mempool: &PopMempool) -> &BTreeMap<Vec<u8>, Self> {
        &mempool.atvs
    }
}

fn accepted<P: PopPayload>(id_hex: String) -> SubmissionOutcome {
    info!("accepted {}={} to POP mempool", P::NAME, id_hex);
    SubmissionOutcome {
        id: id_hex,
        accepted: true,
        reason: None,
    }
}

fn rejected<P: PopPayload>(id_hex: String, reason: String) -> SubmissionOutcome {
    warn!("rejected to add {}={} to POP mempool: {}", P::NAME, id_hex, reason);
    SubmissionOutcome {
        id: id_hex,
        accepted: false,
        reason: Some(reason),
    }
}

impl PopMempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<P: MempoolSlot>(&self, id_bytes: &[u8]) -> Option<&P> {
        P::slot(self).get(id_bytes)
    }

    /// Hex ids currently held, in stable order
    pub fn ids<P: MempoolSlot>(&self) -> Vec<String> {
        P::slot(self).values().map(|payload| hex::encode(payload.id_bytes())).collect()
    }

    /// Drop every payload that a newly connected block embeds
    pub fn remove_included(&mut self, pop_data: &PopData) {
        for block in &pop_data.context {
            self.vbk_blocks.remove(&block.id_bytes());
        }
        for vtb in &pop_data.vtbs {
            self.vtbs.remove(&vtb.id_bytes());
        }
        for atv in &pop_data.atvs {
            self.atvs.remove(&atv.id_bytes());
        }
    }

    /// Submit one VBK block.
    ///
    /// Resubmission of a known block is a no-op success. A block whose
    /// previous block is unknown to both the tree and the mempool is
    /// rejected; a block whose ancestor is still mempool-held is
    /// accepted and connected later.
    pub fn submit_vbk(&mut self, vbk_tree: &mut MirrorTree<24>, block: VbkBlock) -> SubmissionOutcome {
        let id_bytes = block.id_bytes();
        let id_hex = hex::encode(&id_bytes);

        if self.vbk_blocks.contains_key(&id_bytes) || vbk_tree.contains_hash(&block.hash()) {
            return accepted::<VbkBlock>(id_hex);
        }

        if let Err(reason) = self.connect_vbk(vbk_tree, &block) {
            return rejected::<VbkBlock>(id_hex, reason);
        }

        self.vbk_blocks.insert(id_bytes, block);
        self.flush_connectable(vbk_tree);
        accepted::<VbkBlock>(id_hex)
    }

    /// Submit one VTB: the containing VBK block must connect, and the
    /// carried BTC header context must chain onto the mirrored BTC
    /// tree. The context is applied before the VTB is accepted.
    pub fn submit_vtb(
        &mut self,
        vbk_tree: &mut MirrorTree<24>,
        btc_tree: &mut MirrorTree<32>,
        vtb: Vtb,
    ) -> SubmissionOutcome {
        let id_bytes = vtb.id_bytes();
        let id_hex = hex::encode(&id_bytes);

        if self.vtbs.contains_key(&id_bytes) {
            return accepted::<Vtb>(id_hex);
        }

        if let Err(reason) = check_btc_context(btc_tree, &vtb.btc_context) {
            return rejected::<Vtb>(id_hex, reason);
        }
        if let Err(reason) = self.connect_vbk(vbk_tree, &vtb.containing) {
            return rejected::<Vtb>(id_hex, format!("vtb-bad-containing: {reason}"));
        }

        apply_btc_context(btc_tree, &vtb.btc_context);
        self.flush_connectable(vbk_tree);
        self.vtbs.insert(id_bytes, vtb);
        accepted::<Vtb>(id_hex)
    }

    /// Submit one ATV: the endorsed own-chain block must be known and
    /// the containing VBK block must connect.
    pub fn submit_atv(
        &mut self,
        vbk_tree: &mut MirrorTree<24>,
        alt_index: &AltChainIndex,
        atv: Atv,
    ) -> SubmissionOutcome {
        let id_bytes = atv.id_bytes();
        let id_hex = hex::encode(&id_bytes);

        if self.atvs.contains_key(&id_bytes) {
            return accepted::<Atv>(id_hex);
        }

        if !alt_index.is_known(&atv.endorsed) {
            return rejected::<Atv>(
                id_hex,
                format!("atv-endorsed-block-unknown: {}", atv.endorsed),
            );
        }
        if let Err(reason) = self.connect_vbk(vbk_tree, &atv.containing) {
            return rejected::<Atv>(id_hex, format!("atv-bad-containing: {reason}"));
        }

        self.flush_connectable(vbk_tree);
        self.atvs.insert(id_bytes, atv);
        accepted::<Atv>(id_hex)
    }

    /// Connect a VBK header into the tree if its previous block is
    /// there; tolerate it when the previous block is mempool-held.
    fn connect_vbk(&self, tree: &mut MirrorTree<24>, block: &VbkBlock) -> Result<(), String> {
        let hash = block.hash();
        if tree.contains_hash(&hash) {
            return Ok(());
        }
        if tree.contains_hash(&block.previous) {
            return tree
                .insert(
                    hash,
                    block.height,
                    block.previous,
                    BlockFlags::HAVE_DATA | BlockFlags::CAN_BE_APPLIED,
                )
                .map_err(|error| format!("bad-vbk-block: {error}"));
        }
        if self.vbk_blocks.values().any(|held| held.hash() == block.previous) {
            return Ok(());
        }
        Err(format!("bad-prev: previous VBK block {} not known", block.previous))
    }

    /// Connect any mempool-held VBK blocks whose ancestors have arrived
    fn flush_connectable(&mut self, tree: &mut MirrorTree<24>) {
        loop {
            let mut connected_any = false;
            for block in self.vbk_blocks.values() {
                let hash = block.hash();
                if !tree.contains_hash(&hash) && tree.contains_hash(&block.previous) {
                    if tree
                        .insert(
                            hash,
                            block.height,
                            block.previous,
                            BlockFlags::HAVE_DATA | BlockFlags::CAN_BE_APPLIED,
                        )
                        .is_ok()
                    {
                        connected_any = true;
                    }
                }
            }
            if !connected_any {
                break;
            }
        }
    }
}

/// Check that every context header chains onto the BTC tree or onto an
/// earlier header in the same context, without mutating anything.
pub(crate) fn check_btc_context(tree: &MirrorTree<32>, headers: &[BlockHeader]) -> Result<(), String> {
    let mut seen = Vec::with_capacity(headers.len());
    for header in headers {
        let known = tree.contains_hash(&header.previous) || seen.contains(&header.previous);
        if !known {
            return Err(format!(
                "btc-context-disconnected: previous BTC block {} not known",
                header.previous
            ));
        }
        seen.push(btc_header_hash(header));
    }
    Ok(())
}

/// Insert checked context headers into the BTC tree, in order
pub(crate) fn apply_btc_context(tree: &mut MirrorTree<32>, headers: &[BlockHeader]) {
    for header in headers {
        let hash = btc_header_hash(header);
        if tree.contains_hash(&hash) {
            continue;
        }
        let Some(parent) = tree.get(&header.previous).map(|entry| entry.height) else {
            continue;
        };
        let _ = tree.insert(
            hash,
            parent + 1,
            header.previous,
            BlockFlags::HAVE_DATA | BlockFlags::CAN_BE_APPLIED,
        );
    }
}
