//! Query protocol for the PoP state module.
//!
//! This is the exposed surface of the mirrored-chain layer; RPC
//! transports are thin adapters over these request/response pairs.

use crate::entities::PayloadKind;
use crate::queries::errors::QueryError;
use crate::types::TipStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_POP_QUERY_TOPIC: (&str, &str) = ("pop-query-topic", "pop.query");

/// Which mirrored chain a query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorChain {
    Vbk,
    Btc,
}

impl fmt::Display for MirrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vbk => "vbk",
            Self::Btc => "btc",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PopStateQuery {
    /// Block index entry of a mirrored-chain block by hash
    GetMirrorBlock { chain: MirrorChain, hash: String },
    /// Hash of the best (tip) block of a mirrored chain
    GetBestBlockHash { chain: MirrorChain },
    /// Hash of the best-chain block at the given height
    GetBlockHashAtHeight { chain: MirrorChain, height: u64 },
    /// All known tips of a mirrored chain with their status
    GetChainTips { chain: MirrorChain },
    /// Raw payload by id, optionally scoped to one own-chain block
    GetRawPayload {
        kind: PayloadKind,
        id: String,
        verbose: bool,
        block_hash: Option<String>,
    },
    /// Ids currently held in the PoP mempool
    GetRawMempool,
    /// Data needed to PoP-mine the own-chain block at the given height
    GetPopData { height: u64 },
    /// Submit a batch of hex-encoded payloads
    SubmitPop {
        vbk_blocks: Vec<String>,
        vtbs: Vec<String>,
        atvs: Vec<String>,
    },
    /// Submit a single hex-encoded payload
    SubmitOne { kind: PayloadKind, data: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PopStateQueryResponse {
    MirrorBlock(Option<MirrorBlockSummary>),
    BestBlockHash(String),
    BlockHashAtHeight(String),
    ChainTips(Vec<TipInfo>),
    RawPayload(PayloadRecord),
    RawMempool(MempoolContents),
    PopData(PopMiningData),
    Submitted(BatchOutcome),
    SubmittedOne(SubmissionOutcome),
    Error(QueryError),
}

/// Block index entry of a mirrored-chain block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorBlockSummary {
    pub height: u64,
    pub hash: String,
    pub status_flags: u32,
    pub in_active_chain: bool,
}

/// One chain tip with its classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipInfo {
    pub height: u64,
    pub hash: String,
    /// Length of the branch connecting the tip to the main chain,
    /// zero for the active tip
    pub branch_len: u64,
    pub status_flags: u32,
    pub status: TipStatus,
}

/// Raw payload lookup result.
///
/// `containing` is present only for verbose lookups; a payload found
/// only in the mempool reports an empty containing-block list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadRecord {
    /// Serialized, hex-encoded payload
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containing: Option<PayloadContainment>,
}

/// Verbose containment detail for a located payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadContainment {
    /// Blocks known to embed the payload, index enumeration order
    pub containing_blocks: Vec<String>,
    pub in_active_chain: bool,
    /// First active-chain containing block, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    pub confirmations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_time: Option<u32>,
}

/// Per-payload submission outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// Payload id, hex-encoded
    pub id: String,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Batch submission outcomes, input order preserved per kind
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub vbk_blocks: Vec<SubmissionOutcome>,
    pub vtbs: Vec<SubmissionOutcome>,
    pub atvs: Vec<SubmissionOutcome>,
}

/// Ids currently held in the PoP mempool
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MempoolContents {
    pub vbk_blocks: Vec<String>,
    pub vtbs: Vec<String>,
    pub atvs: Vec<String>,
}

/// Everything a PoP miner needs for the block at the requested height
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopMiningData {
    /// Hex-encoded serialized block header
    pub block_header: String,
    /// Hex-encoded authenticated context info
    pub raw_context_info: String,
    /// Last known VBK block hashes at this block
    pub last_known_vbk_blocks: Vec<String>,
    /// Last known BTC block hashes at this block
    pub last_known_btc_blocks: Vec<String>,
}
