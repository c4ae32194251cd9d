//! Combined PoP state and the query facade over it.
//!
//! One [`State`] owns both mirrored trees, the PoP mempool, the
//! payload index, the own-chain header index and the block store. The
//! owning module wraps it in a single mutex and every query or
//! submission runs start to finish under that lock, so no operation
//! ever observes a half-applied mutation.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use pharos_common::entities::{
    Atv, Block, PayloadKind, PopData, PopPayload, Vtb, VbkBlock,
};
use pharos_common::queries::errors::QueryError;
use pharos_common::queries::pop::{
    BatchOutcome, MempoolContents, MirrorBlockSummary, MirrorChain, PayloadContainment,
    PayloadRecord, PopMiningData, PopStateQuery, PopStateQueryResponse, SubmissionOutcome,
};
use pharos_common::{BlockHash, BlockInfo, BtcBlockHash, Hash, NetworkMode, VbkBlockHash};
use tracing::{debug, error, warn};

use crate::alt_chain::AltChainIndex;
use crate::chain_view::{ChainReader, TreeError};
use crate::mirror_tree::{MirrorTree, TreeEntry};
use crate::payload_index::PayloadIndex;
use crate::payload_locator::{locate, located_record, LocateError};
use crate::pop_mempool::{apply_btc_context, check_btc_context, MempoolSlot, PopMempool};
use crate::stores::Store;
use crate::tip_status::tip_info;

/// How many recent mirrored-chain block hashes PoP mining data carries
const LAST_KNOWN_BLOCKS: usize = 16;

pub struct State {
    network: NetworkMode,
    vbk_tree: MirrorTree<24>,
    btc_tree: MirrorTree<32>,
    mempool: PopMempool,
    payload_index: PayloadIndex,
    alt_index: AltChainIndex,
    store: Arc<dyn Store>,
    /// Keep block bodies for this many blocks below the tip; `None`
    /// keeps everything
    retain_blocks: Option<u64>,
}

impl State {
    pub fn new(
        network: NetworkMode,
        store: Arc<dyn Store>,
        keystone_interval: u64,
        retain_blocks: Option<u64>,
    ) -> Self {
        Self {
            network,
            vbk_tree: MirrorTree::new(),
            btc_tree: MirrorTree::new(),
            mempool: PopMempool::new(),
            payload_index: PayloadIndex::new(),
            alt_index: AltChainIndex::new(keystone_interval),
            store,
            retain_blocks,
        }
    }

    pub fn bootstrap_vbk(&mut self, hash: VbkBlockHash, height: u64) -> bool {
        self.vbk_tree.bootstrap(hash, height)
    }

    pub fn bootstrap_btc(&mut self, hash: BtcBlockHash, height: u64) -> bool {
        self.btc_tree.bootstrap(hash, height)
    }

    // ── Own-chain ingestion ───────────────────────────────────────

    /// Ingest one announced own-chain block: verify its hash through
    /// the header-hash selector, extend the header index, persist the
    /// body, index and apply its embedded payloads, and drop them from
    /// the mempool.
    pub fn handle_block(&mut self, info: &BlockInfo, raw: &[u8]) -> Result<()> {
        let block = Block::from_bytes(raw)
            .map_err(|error| anyhow!("cannot decode block {}: {error}", info.hash))?;

        self.alt_index.append(info, block.header, self.network)?;
        self.store.insert_block(&info.hash, &block)?;
        self.payload_index.add_block_payloads(info.hash, &block.pop_data);
        self.apply_pop_data(&block.pop_data);
        self.mempool.remove_included(&block.pop_data);
        self.prune_old_blocks()?;
        Ok(())
    }

    pub fn handle_rollback(&mut self, to_height: u64) {
        self.alt_index.rollback_to(to_height);
    }

    /// Connect the payloads embedded in a connected block into the
    /// mirrored trees. The block already passed full validation, so a
    /// context entry that does not connect is only worth a debug line.
    fn apply_pop_data(&mut self, pop_data: &PopData) {
        for block in &pop_data.context {
            self.connect_embedded_vbk(block);
        }
        for vtb in &pop_data.vtbs {
            match check_btc_context(&self.btc_tree, &vtb.btc_context) {
                Ok(()) => apply_btc_context(&mut self.btc_tree, &vtb.btc_context),
                Err(reason) => debug!("embedded VTB context skipped: {reason}"),
            }
            self.connect_embedded_vbk(&vtb.containing);
        }
        for atv in &pop_data.atvs {
            self.connect_embedded_vbk(&atv.containing);
        }
    }

    fn connect_embedded_vbk(&mut self, block: &VbkBlock) {
        let hash = block.hash();
        if self.vbk_tree.contains_hash(&hash) {
            return;
        }
        if self.vbk_tree.contains_hash(&block.previous) {
            if let Err(error) = self.vbk_tree.insert(
                hash,
                block.height,
                block.previous,
                pharos_common::BlockFlags::HAVE_DATA | pharos_common::BlockFlags::CAN_BE_APPLIED,
            ) {
                debug!("embedded VBK block {hash} rejected: {error}");
            }
        } else {
            debug!("embedded VBK block {hash} does not connect yet");
        }
    }

    fn prune_old_blocks(&mut self) -> Result<()> {
        let (Some(retain), Some(tip)) = (self.retain_blocks, self.alt_index.tip_height()) else {
            return Ok(());
        };
        let base = self.alt_index.base_height();
        if tip < base + retain {
            return Ok(());
        }
        let cutoff = tip - retain;
        for height in base..=cutoff {
            let Some(hash) = self.alt_index.hash_at_height(height).copied() else {
                continue;
            };
            let pruned_already =
                self.alt_index.get(&hash).map(|entry| !entry.has_data).unwrap_or(true);
            if pruned_already {
                continue;
            }
            self.store.remove_block(&hash)?;
            self.alt_index.mark_pruned(&hash);
            debug!("pruned block body at height {height}");
        }
        Ok(())
    }

    // ── Query facade ──────────────────────────────────────────────

    /// Serve one query. Internal-consistency faults are logged here;
    /// caller errors and negative results are returned silently.
    pub fn handle_query(&mut self, query: &PopStateQuery) -> PopStateQueryResponse {
        let result = match query {
            PopStateQuery::GetMirrorBlock { chain, hash } => self.get_mirror_block(*chain, hash),
            PopStateQuery::GetBestBlockHash { chain } => self.get_best_block_hash(*chain),
            PopStateQuery::GetBlockHashAtHeight { chain, height } => {
                self.get_block_hash_at_height(*chain, *height)
            }
            PopStateQuery::GetChainTips { chain } => self.get_chain_tips(*chain),
            PopStateQuery::GetRawPayload {
                kind,
                id,
                verbose,
                block_hash,
            } => self.get_raw_payload(*kind, id, *verbose, block_hash.as_deref()),
            PopStateQuery::GetRawMempool => Ok(self.get_raw_mempool()),
            PopStateQuery::GetPopData { height } => self.get_pop_data(*height),
            PopStateQuery::SubmitPop {
                vbk_blocks,
                vtbs,
                atvs,
            } => Ok(self.submit_pop(vbk_blocks, vtbs, atvs)),
            PopStateQuery::SubmitOne { kind, data } => Ok(self.submit_one(*kind, data)),
        };

        result.unwrap_or_else(|err| {
            if matches!(err, QueryError::InternalError { .. }) {
                error!("{err}");
            }
            PopStateQueryResponse::Error(err)
        })
    }

    fn get_mirror_block(
        &self,
        chain: MirrorChain,
        hash_hex: &str,
    ) -> Result<PopStateQueryResponse, QueryError> {
        match chain {
            MirrorChain::Vbk => mirror_block(&self.vbk_tree, hash_hex),
            MirrorChain::Btc => mirror_block(&self.btc_tree, hash_hex),
        }
    }

    fn get_best_block_hash(&self, chain: MirrorChain) -> Result<PopStateQueryResponse, QueryError> {
        match chain {
            MirrorChain::Vbk => best_block_hash(&self.vbk_tree, chain),
            MirrorChain::Btc => best_block_hash(&self.btc_tree, chain),
        }
    }

    fn get_block_hash_at_height(
        &self,
        chain: MirrorChain,
        height: u64,
    ) -> Result<PopStateQueryResponse, QueryError> {
        match chain {
            MirrorChain::Vbk => block_hash_at_height(&self.vbk_tree, chain, height),
            MirrorChain::Btc => block_hash_at_height(&self.btc_tree, chain, height),
        }
    }

    fn get_chain_tips(&self, chain: MirrorChain) -> Result<PopStateQueryResponse, QueryError> {
        match chain {
            MirrorChain::Vbk => chain_tips(&self.vbk_tree),
            MirrorChain::Btc => chain_tips(&self.btc_tree),
        }
    }

    fn get_raw_payload(
        &self,
        kind: PayloadKind,
        id_hex: &str,
        verbose: bool,
        block_hash: Option<&str>,
    ) -> Result<PopStateQueryResponse, QueryError> {
        let scope = match block_hash {
            Some(hex) => Some(hex.parse::<BlockHash>().map_err(|error| {
                QueryError::invalid_request(format!("Bad block hash: {error}"))
            })?),
            None => None,
        };

        let record = match kind {
            PayloadKind::VbkBlock => self.locate_record::<VbkBlock>(id_hex, verbose, scope)?,
            PayloadKind::Vtb => self.locate_record::<Vtb>(id_hex, verbose, scope)?,
            PayloadKind::Atv => self.locate_record::<Atv>(id_hex, verbose, scope)?,
        };
        Ok(PopStateQueryResponse::RawPayload(record))
    }

    fn locate_record<P: MempoolSlot>(
        &self,
        id_hex: &str,
        verbose: bool,
        scope: Option<BlockHash>,
    ) -> Result<PayloadRecord, QueryError> {
        let id_bytes = hex::decode(id_hex)
            .map_err(|error| QueryError::invalid_request(format!("Bad id: {error}")))?;
        if id_bytes.len() != P::ID_WIDTH {
            return Err(QueryError::invalid_request(format!(
                "Bad id: expected {} bytes for {}, got {}",
                P::ID_WIDTH,
                P::NAME,
                id_bytes.len()
            )));
        }

        let located = locate::<P>(
            &self.alt_index,
            &*self.store,
            &self.mempool,
            &self.payload_index,
            &id_bytes,
            scope,
        )
        .map_err(|error| match error {
            LocateError::NotFound => {
                if scope.is_some() {
                    QueryError::not_found(format!("{} in the provided block", P::NAME))
                } else {
                    QueryError::not_found(format!("mempool or blockchain {}", P::NAME))
                }
            }
            LocateError::UnknownBlock { hash } => {
                QueryError::invalid_request(format!("Block hash not found: {hash}"))
            }
            LocateError::BlockUnavailable { hash, reason } => {
                QueryError::data_unavailable(format!("Block {hash} not available ({reason})"))
            }
            LocateError::Corruption { message } => QueryError::internal_error(message),
        })?;

        let containing = verbose.then(|| self.containment(&located.containing_blocks));
        Ok(located_record(&located, containing))
    }

    /// Verbose containment detail: scan the containing blocks in
    /// enumeration order and describe the first active-chain member,
    /// falling back to the last known container off-chain.
    fn containment(&self, containing_blocks: &[BlockHash]) -> PayloadContainment {
        let mut chosen = None;
        let mut active_hash = None;
        for hash in containing_blocks {
            let Some(entry) = self.alt_index.get(hash) else {
                continue;
            };
            chosen = Some(entry);
            if self.alt_index.is_active(hash) {
                active_hash = Some(*hash);
                break;
            }
        }

        let in_active_chain = active_hash.is_some();
        let tip_height = self.alt_index.tip_height().unwrap_or_default();
        PayloadContainment {
            containing_blocks: containing_blocks.iter().map(|h| h.to_string()).collect(),
            in_active_chain,
            block_hash: active_hash.map(|h| h.to_string()),
            block_height: chosen.map(|entry| entry.height),
            confirmations: match (&chosen, in_active_chain) {
                (Some(entry), true) => 1 + tip_height - entry.height,
                _ => 0,
            },
            block_time: match (&chosen, in_active_chain) {
                (Some(entry), true) => Some(entry.header.time),
                _ => None,
            },
        }
    }

    fn get_raw_mempool(&self) -> PopStateQueryResponse {
        PopStateQueryResponse::RawMempool(MempoolContents {
            vbk_blocks: self.mempool.ids::<VbkBlock>(),
            vtbs: self.mempool.ids::<Vtb>(),
            atvs: self.mempool.ids::<Atv>(),
        })
    }

    fn get_pop_data(&self, height: u64) -> Result<PopStateQueryResponse, QueryError> {
        let tip = self
            .alt_index
            .tip_height()
            .ok_or_else(|| QueryError::not_bootstrapped("alt"))?;
        if height < self.alt_index.base_height() || height > tip {
            return Err(QueryError::invalid_request("Block height out of range"));
        }

        let hash = self
            .alt_index
            .hash_at_height(height)
            .ok_or_else(|| QueryError::internal_error(format!("no active block at {height}")))?;
        let entry = self
            .alt_index
            .get(hash)
            .ok_or_else(|| QueryError::internal_error(format!("active block {hash} unknown")))?;
        let raw_context_info = self
            .alt_index
            .authenticated_context_info(height)
            .ok_or_else(|| QueryError::internal_error(format!("no context info at {height}")))?;

        Ok(PopStateQueryResponse::PopData(PopMiningData {
            block_header: hex::encode(entry.header.serialize()),
            raw_context_info: hex::encode(raw_context_info),
            last_known_vbk_blocks: self
                .vbk_tree
                .last_known_hashes(LAST_KNOWN_BLOCKS)
                .iter()
                .map(|h| h.to_string())
                .collect(),
            last_known_btc_blocks: self
                .btc_tree
                .last_known_hashes(LAST_KNOWN_BLOCKS)
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }))
    }

    // ── Submission ────────────────────────────────────────────────

    /// Submit a whole batch under the already-held state lock, context
    /// blocks first so VTBs and ATVs can connect against them. One
    /// outcome per input item, input order preserved per kind.
    fn submit_pop(
        &mut self,
        vbk_blocks: &[String],
        vtbs: &[String],
        atvs: &[String],
    ) -> PopStateQueryResponse {
        let mut outcome = BatchOutcome::default();
        for data in vbk_blocks {
            outcome.vbk_blocks.push(self.submit_vbk_hex(data));
        }
        for data in vtbs {
            outcome.vtbs.push(self.submit_vtb_hex(data));
        }
        for data in atvs {
            outcome.atvs.push(self.submit_atv_hex(data));
        }
        PopStateQueryResponse::Submitted(outcome)
    }

    fn submit_one(&mut self, kind: PayloadKind, data: &str) -> PopStateQueryResponse {
        let outcome = match kind {
            PayloadKind::VbkBlock => self.submit_vbk_hex(data),
            PayloadKind::Vtb => self.submit_vtb_hex(data),
            PayloadKind::Atv => self.submit_atv_hex(data),
        };
        PopStateQueryResponse::SubmittedOne(outcome)
    }

    fn submit_vbk_hex(&mut self, data: &str) -> SubmissionOutcome {
        match decode_payload::<VbkBlock>(data) {
            Ok(block) => self.mempool.submit_vbk(&mut self.vbk_tree, block),
            Err(outcome) => outcome,
        }
    }

    fn submit_vtb_hex(&mut self, data: &str) -> SubmissionOutcome {
        match decode_payload::<Vtb>(data) {
            Ok(vtb) => self.mempool.submit_vtb(&mut self.vbk_tree, &mut self.btc_tree, vtb),
            Err(outcome) => outcome,
        }
    }

    fn submit_atv_hex(&mut self, data: &str) -> SubmissionOutcome {
        match decode_payload::<Atv>(data) {
            Ok(atv) => self.mempool.submit_atv(&mut self.vbk_tree, &self.alt_index, atv),
            Err(outcome) => outcome,
        }
    }
}

/// Decode one hex payload; a failure rejects only this item.
fn decode_payload<P: PopPayload>(data: &str) -> Result<P, SubmissionOutcome> {
    let bytes = hex::decode(data).map_err(|error| SubmissionOutcome {
        id: String::new(),
        accepted: false,
        reason: Some(format!("deserialize-failure: invalid hex: {error}")),
    })?;
    P::decode_bytes(&bytes).map_err(|error| {
        warn!("rejected undecodable {}: {error}", P::NAME);
        SubmissionOutcome {
            id: String::new(),
            accepted: false,
            reason: Some(format!("deserialize-failure: {error}")),
        }
    })
}

// ── Generic per-tree query helpers ────────────────────────────────

fn summarize<const N: usize>(tree: &MirrorTree<N>, entry: &TreeEntry<N>) -> MirrorBlockSummary {
    MirrorBlockSummary {
        height: entry.height,
        hash: entry.hash.to_string(),
        status_flags: entry.flags.bits(),
        in_active_chain: tree.contains(entry),
    }
}

fn mirror_block<const N: usize>(
    tree: &MirrorTree<N>,
    hash_hex: &str,
) -> Result<PopStateQueryResponse, QueryError> {
    let hash: Hash<N> = hash_hex
        .parse()
        .map_err(|error| QueryError::invalid_request(format!("Bad hash: {error}")))?;
    Ok(PopStateQueryResponse::MirrorBlock(
        tree.get(&hash).map(|entry| summarize(tree, entry)),
    ))
}

fn best_block_hash<const N: usize>(
    tree: &MirrorTree<N>,
    chain: MirrorChain,
) -> Result<PopStateQueryResponse, QueryError> {
    let tip = tree.best_tip().ok_or_else(|| QueryError::not_bootstrapped(chain.to_string()))?;
    Ok(PopStateQueryResponse::BestBlockHash(tip.hash.to_string()))
}

fn block_hash_at_height<const N: usize>(
    tree: &MirrorTree<N>,
    chain: MirrorChain,
    height: u64,
) -> Result<PopStateQueryResponse, QueryError> {
    let entry = tree.block_at_height(height).map_err(|error| match error {
        TreeError::NotBootstrapped => QueryError::not_bootstrapped(chain.to_string()),
        TreeError::BelowRange { first, requested } => QueryError::invalid_request(format!(
            "Chain {chain} starts at {first}, provided {requested}"
        )),
        TreeError::AboveRange { tip, requested } => QueryError::invalid_request(format!(
            "Chain {chain} tip is at {tip}, provided {requested}"
        )),
        other => QueryError::internal_error(other.to_string()),
    })?;
    Ok(PopStateQueryResponse::BlockHashAtHeight(entry.hash.to_string()))
}

fn chain_tips<const N: usize>(tree: &MirrorTree<N>) -> Result<PopStateQueryResponse, QueryError> {
    let mut tips = Vec::new();
    for tip in tree.tips() {
        let info = tip_info(tree, tip)
            .map_err(|error| QueryError::internal_error(error.to_string()))?;
        tips.push(info);
    }
    Ok(PopStateQueryResponse::ChainTips(tips))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alt_chain::KEYSTONE_INTERVAL;
    use crate::stores::fjall::FjallStore;
    use pharos_common::pow::header_hash;
    use pharos_common::{BlockHeader, TipStatus};

    struct Fixture {
        state: State,
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
        let store = Arc::new(FjallStore::new(config).unwrap());
        Fixture {
            state: State::new(NetworkMode::Regtest, store, KEYSTONE_INTERVAL, None),
            dir,
        }
    }

    fn vbk_genesis() -> VbkBlock {
        VbkBlock {
            height: 1000,
            version: 2,
            previous: Hash::new([0u8; 24]),
            merkle_root: Hash::new([1u8; 16]),
            time: 1_600_000_000,
            difficulty: 1,
            nonce: 0,
        }
    }

    fn vbk_child(parent: &VbkBlock, nonce: u64) -> VbkBlock {
        VbkBlock {
            height: parent.height + 1,
            previous: parent.hash(),
            nonce,
            ..parent.clone()
        }
    }

    fn payload_hex<P: PopPayload>(payload: &P) -> String {
        hex::encode(payload.encode_bytes())
    }

    /// Feed `count` own-chain blocks, embedding `pop_data` in the last
    /// one, and return the block infos.
    fn feed_chain(state: &mut State, count: u64, last_pop_data: PopData) -> Vec<BlockInfo> {
        let mut infos = Vec::new();
        let mut previous = BlockHash::default();
        for height in 0..count {
            let pop_data =
                if height == count - 1 { last_pop_data.clone() } else { PopData::default() };
            let header = BlockHeader {
                version: 1,
                previous,
                merkle_root: Hash::new([height as u8; 32]),
                time: 500 + height as u32,
                bits: 0x207f_ffff,
                nonce: height as u32,
            };
            let hash = header_hash(&header, NetworkMode::Regtest);
            let info = BlockInfo { height, hash };
            let block = Block { header, pop_data };
            state.handle_block(&info, &block.to_bytes()).unwrap();
            infos.push(info);
            previous = hash;
        }
        infos
    }

    fn expect_error(response: PopStateQueryResponse) -> QueryError {
        match response {
            PopStateQueryResponse::Error(error) => error,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn height_queries_name_the_violated_bound() {
        let mut fixture = fixture();
        let genesis = vbk_genesis();
        fixture.state.bootstrap_vbk(genesis.hash(), 10);

        let mut at = |height| {
            fixture.state.handle_query(&PopStateQuery::GetBlockHashAtHeight {
                chain: MirrorChain::Vbk,
                height,
            })
        };

        let error = expect_error(at(5));
        assert_eq!(error.to_string(), "Chain vbk starts at 10, provided 5");

        match at(10) {
            PopStateQueryResponse::BlockHashAtHeight(hash) => {
                assert_eq!(hash, genesis.hash().to_string())
            }
            other => panic!("unexpected {other:?}"),
        }

        let error = expect_error(at(11));
        assert_eq!(error.to_string(), "Chain vbk tip is at 10, provided 11");
    }

    #[test]
    fn unbootstrapped_chain_reports_not_bootstrapped() {
        let mut fixture = fixture();
        let error = expect_error(
            fixture.state.handle_query(&PopStateQuery::GetBestBlockHash {
                chain: MirrorChain::Btc,
            }),
        );
        assert!(matches!(error, QueryError::NotBootstrapped { .. }));
    }

    #[test]
    fn batch_rejects_malformed_item_keeps_sibling() {
        let mut fixture = fixture();
        let genesis = vbk_genesis();
        fixture.state.bootstrap_vbk(genesis.hash(), genesis.height);
        let good = vbk_child(&genesis, 1);

        let response = fixture.state.handle_query(&PopStateQuery::SubmitPop {
            vbk_blocks: vec![payload_hex(&good), "zz".to_string()],
            vtbs: vec![],
            atvs: vec![],
        });
        let PopStateQueryResponse::Submitted(outcome) = response else {
            panic!("expected batch outcome");
        };

        assert_eq!(outcome.vbk_blocks.len(), 2);
        assert!(outcome.vbk_blocks[0].accepted);
        assert!(!outcome.vbk_blocks[1].accepted);
        assert!(outcome.vbk_blocks[1]
            .reason
            .as_deref()
            .unwrap()
            .starts_with("deserialize-failure"));

        // First insertion is retained
        let PopStateQueryResponse::RawMempool(contents) =
            fixture.state.handle_query(&PopStateQuery::GetRawMempool)
        else {
            panic!("expected mempool contents");
        };
        assert_eq!(contents.vbk_blocks, vec![good.id().to_string()]);
    }

    #[test]
    fn resubmission_is_a_noop_success() {
        let mut fixture = fixture();
        let genesis = vbk_genesis();
        fixture.state.bootstrap_vbk(genesis.hash(), genesis.height);
        let block = vbk_child(&genesis, 2);

        for _ in 0..2 {
            let response = fixture.state.handle_query(&PopStateQuery::SubmitOne {
                kind: PayloadKind::VbkBlock,
                data: payload_hex(&block),
            });
            let PopStateQueryResponse::SubmittedOne(outcome) = response else {
                panic!("expected submission outcome");
            };
            assert!(outcome.accepted);
            assert_eq!(outcome.id, block.id().to_string());
        }

        let PopStateQueryResponse::RawMempool(contents) =
            fixture.state.handle_query(&PopStateQuery::GetRawMempool)
        else {
            panic!("expected mempool contents");
        };
        assert_eq!(contents.vbk_blocks.len(), 1);
    }

    #[test]
    fn verbose_lookup_reports_active_container() {
        let mut fixture = fixture();
        let genesis = vbk_genesis();
        fixture.state.bootstrap_vbk(genesis.hash(), genesis.height);

        let atv = Atv {
            endorsed: BlockHash::default(),
            payout_info: vec![0x51],
            containing: vbk_child(&genesis, 3),
        };
        let infos = feed_chain(
            &mut fixture.state,
            4,
            PopData {
                atvs: vec![atv.clone()],
                ..Default::default()
            },
        );

        let response = fixture.state.handle_query(&PopStateQuery::GetRawPayload {
            kind: PayloadKind::Atv,
            id: atv.id().to_string(),
            verbose: true,
            block_hash: None,
        });
        let PopStateQueryResponse::RawPayload(record) = response else {
            panic!("expected payload record");
        };

        assert_eq!(record.data, payload_hex(&atv));
        let containing = record.containing.unwrap();
        assert_eq!(containing.containing_blocks, vec![infos[3].hash.to_string()]);
        assert!(containing.in_active_chain);
        assert_eq!(containing.block_height, Some(3));
        assert_eq!(containing.confirmations, 1);
        assert_eq!(containing.block_time, Some(503));
    }

    #[test]
    fn mempool_hit_has_empty_containment() {
        let mut fixture = fixture();
        let genesis = vbk_genesis();
        fixture.state.bootstrap_vbk(genesis.hash(), genesis.height);
        let block = vbk_child(&genesis, 4);
        fixture.state.handle_query(&PopStateQuery::SubmitOne {
            kind: PayloadKind::VbkBlock,
            data: payload_hex(&block),
        });

        let response = fixture.state.handle_query(&PopStateQuery::GetRawPayload {
            kind: PayloadKind::VbkBlock,
            id: block.id().to_string(),
            verbose: true,
            block_hash: None,
        });
        let PopStateQueryResponse::RawPayload(record) = response else {
            panic!("expected payload record");
        };
        let containing = record.containing.unwrap();
        assert!(containing.containing_blocks.is_empty());
        assert!(!containing.in_active_chain);
        assert_eq!(containing.confirmations, 0);
    }

    #[test]
    fn non_verbose_lookup_omits_containment() {
        let mut fixture = fixture();
        let genesis = vbk_genesis();
        fixture.state.bootstrap_vbk(genesis.hash(), genesis.height);
        let block = vbk_child(&genesis, 5);
        fixture.state.handle_query(&PopStateQuery::SubmitOne {
            kind: PayloadKind::VbkBlock,
            data: payload_hex(&block),
        });

        let response = fixture.state.handle_query(&PopStateQuery::GetRawPayload {
            kind: PayloadKind::VbkBlock,
            id: block.id().to_string(),
            verbose: false,
            block_hash: None,
        });
        let PopStateQueryResponse::RawPayload(record) = response else {
            panic!("expected payload record");
        };
        assert!(record.containing.is_none());
    }

    #[test]
    fn pop_mining_data_covers_header_context_and_trees() {
        let mut fixture = fixture();
        let genesis = vbk_genesis();
        fixture.state.bootstrap_vbk(genesis.hash(), genesis.height);
        feed_chain(&mut fixture.state, 7, PopData::default());

        let response =
            fixture.state.handle_query(&PopStateQuery::GetPopData { height: 6 });
        let PopStateQueryResponse::PopData(data) = response else {
            panic!("expected mining data");
        };
        assert_eq!(data.block_header.len(), 160);
        assert!(!data.raw_context_info.is_empty());
        assert_eq!(data.last_known_vbk_blocks, vec![genesis.hash().to_string()]);
        assert!(data.last_known_btc_blocks.is_empty());

        let error = expect_error(
            fixture.state.handle_query(&PopStateQuery::GetPopData { height: 7 }),
        );
        assert!(matches!(error, QueryError::InvalidRequest { .. }));
    }

    #[test]
    fn chain_tips_reports_single_active_tip() {
        let mut fixture = fixture();
        let genesis = vbk_genesis();
        fixture.state.bootstrap_vbk(genesis.hash(), genesis.height);
        let child = vbk_child(&genesis, 6);
        fixture.state.handle_query(&PopStateQuery::SubmitOne {
            kind: PayloadKind::VbkBlock,
            data: payload_hex(&child),
        });

        let response = fixture.state.handle_query(&PopStateQuery::GetChainTips {
            chain: MirrorChain::Vbk,
        });
        let PopStateQueryResponse::ChainTips(tips) = response else {
            panic!("expected chain tips");
        };
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0].status, TipStatus::Active);
        assert_eq!(tips[0].branch_len, 0);
        assert_eq!(tips[0].hash, child.hash().to_string());
    }

    #[test]
    fn mirror_block_lookup_handles_bad_and_unknown_hashes() {
        let mut fixture = fixture();
        let genesis = vbk_genesis();
        fixture.state.bootstrap_vbk(genesis.hash(), genesis.height);

        let error = expect_error(fixture.state.handle_query(&PopStateQuery::GetMirrorBlock {
            chain: MirrorChain::Vbk,
            hash: "not-hex".to_string(),
        }));
        assert!(matches!(error, QueryError::InvalidRequest { .. }));

        let response = fixture.state.handle_query(&PopStateQuery::GetMirrorBlock {
            chain: MirrorChain::Vbk,
            hash: Hash::<24>::new([0x55; 24]).to_string(),
        });
        assert!(matches!(response, PopStateQueryResponse::MirrorBlock(None)));

        let response = fixture.state.handle_query(&PopStateQuery::GetMirrorBlock {
            chain: MirrorChain::Vbk,
            hash: genesis.hash().to_string(),
        });
        let PopStateQueryResponse::MirrorBlock(Some(summary)) = response else {
            panic!("expected block summary");
        };
        assert!(summary.in_active_chain);
        assert_eq!(summary.height, genesis.height);
    }

    #[test]
    fn announced_hash_mismatch_rejects_block() {
        let mut fixture = fixture();
        let header = BlockHeader::default();
        let block = Block {
            header,
            pop_data: PopData::default(),
        };
        let info = BlockInfo {
            height: 0,
            hash: BlockHash::new([0xbe; 32]),
        };
        assert!(fixture.state.handle_block(&info, &block.to_bytes()).is_err());
    }

    #[test]
    fn pruning_marks_old_bodies_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(
            config::Config::builder()
                .set_override("database-path", dir.path().join("blocks").to_str().unwrap())
                .unwrap()
                .build()
                .unwrap(),
        );
        let store = Arc::new(FjallStore::new(config).unwrap());
        let mut state =
            State::new(NetworkMode::Regtest, store, KEYSTONE_INTERVAL, Some(2));

        let genesis = vbk_genesis();
        state.bootstrap_vbk(genesis.hash(), genesis.height);
        let atv = Atv {
            endorsed: BlockHash::default(),
            payout_info: vec![0x51],
            containing: vbk_child(&genesis, 7),
        };
        // The ATV lands in block 0, which gets pruned as the chain grows
        let mut infos = Vec::new();
        let mut previous = BlockHash::default();
        for height in 0..5 {
            let pop_data = if height == 0 {
                PopData {
                    atvs: vec![atv.clone()],
                    ..Default::default()
                }
            } else {
                PopData::default()
            };
            let header = BlockHeader {
                version: 1,
                previous,
                merkle_root: Hash::new([height as u8; 32]),
                time: 500 + height as u32,
                bits: 0,
                nonce: height as u32,
            };
            let hash = header_hash(&header, NetworkMode::Regtest);
            let info = BlockInfo { height, hash };
            state.handle_block(&info, &Block { header, pop_data }.to_bytes()).unwrap();
            infos.push(info);
            previous = hash;
        }

        let response = state.handle_query(&PopStateQuery::GetRawPayload {
            kind: PayloadKind::Atv,
            id: atv.id().to_string(),
            verbose: false,
            block_hash: Some(infos[0].hash.to_string()),
        });
        let error = expect_error(response);
        assert!(matches!(error, QueryError::DataUnavailable { .. }));
    }
}
