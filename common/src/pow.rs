//! Own-chain header hashing.
//!
//! The header hashing algorithm changed mid-life on every network, at a
//! per-network activation timestamp. Every hash computation site in the
//! node funnels through [`header_hash`] so the activation rule is
//! applied in exactly one place; independent call sites deciding the
//! algorithm themselves would risk a chain split.

use crate::crypto::{blake2b_256, sha256d};
use crate::types::{BlockHash, BlockHeader, NetworkMode, BLOCK_HEADER_SIZE};

const MAIN_V2_ACTIVATION_TIME: u32 = 1_568_678_400;
const TEST_V2_ACTIVATION_TIME: u32 = 1_568_158_500;
const REGTEST_V2_ACTIVATION_TIME: u32 = 1_568_158_500;

/// The two deployed header hashing algorithms.
///
/// Both consume the same input, the previous-block hash followed by the
/// 80-byte serialized header; they differ only in mixing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderHashAlgo {
    /// Pre-activation double SHA-256
    Legacy,
    /// Post-activation Blake2b-256
    V2,
}

/// Activation timestamp of the V2 algorithm for a network
pub fn v2_activation_time(network: NetworkMode) -> u32 {
    match network {
        NetworkMode::Main => MAIN_V2_ACTIVATION_TIME,
        NetworkMode::Test => TEST_V2_ACTIVATION_TIME,
        NetworkMode::Regtest => REGTEST_V2_ACTIVATION_TIME,
    }
}

/// Which algorithm applies to a header carrying the given timestamp
pub fn algo_for(network: NetworkMode, time: u32) -> HeaderHashAlgo {
    if time >= v2_activation_time(network) {
        HeaderHashAlgo::V2
    } else {
        HeaderHashAlgo::Legacy
    }
}

/// Canonical hash of an own-chain block header.
///
/// Total and deterministic: every header has exactly one hash for a
/// given network.
pub fn header_hash(header: &BlockHeader, network: NetworkMode) -> BlockHash {
    let mut input = Vec::with_capacity(32 + BLOCK_HEADER_SIZE);
    input.extend_from_slice(header.previous.as_ref());
    input.extend_from_slice(&header.serialize());
    match algo_for(network, header.time) {
        HeaderHashAlgo::Legacy => sha256d(&input),
        HeaderHashAlgo::V2 => blake2b_256(&input),
    }
}

/// Hash of a mirrored BTC-chain header, double SHA-256 on all networks
pub fn btc_header_hash(header: &BlockHeader) -> BlockHash {
    sha256d(&header.serialize())
}
