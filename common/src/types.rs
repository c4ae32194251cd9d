//! Core shared types for the Pharos modules

use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Own-chain block hash
pub type BlockHash = Hash<32>;

/// Mirrored BTC-chain block hash
pub type BtcBlockHash = Hash<32>;

/// Mirrored VBK-chain block hash
pub type VbkBlockHash = Hash<24>;

/// VBK block id, the trailing 12 bytes of the block hash
pub type VbkBlockId = Hash<12>;

/// ATV payload id
pub type AtvId = Hash<32>;

/// VTB payload id
pub type VtbId = Hash<32>;

/// Which network this node runs on.
///
/// Parsed once from configuration at process start and threaded as a
/// value into every call that needs it. Header hashing is
/// network-dependent, so an unknown network name is a startup error,
/// never a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMode {
    Main,
    Test,
    Regtest,
}

impl FromStr for NetworkMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(Self::Main),
            "test" | "testnet" => Ok(Self::Test),
            "regtest" => Ok(Self::Regtest),
            other => Err(anyhow::anyhow!("unknown network name '{other}'")),
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Main => "main",
            Self::Test => "test",
            Self::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

/// An own-chain block header.
///
/// The hash is not a field; it is always recomputed through
/// [`crate::pow::header_hash`] because the hashing algorithm depends on
/// `time` and the network.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    minicbor::Encode,
    minicbor::Decode,
)]
pub struct BlockHeader {
    #[n(0)]
    pub version: i32,
    #[n(1)]
    pub previous: BlockHash,
    #[n(2)]
    pub merkle_root: Hash<32>,
    #[n(3)]
    pub time: u32,
    #[n(4)]
    pub bits: u32,
    #[n(5)]
    pub nonce: u32,
}

/// Serialized header length, version through nonce
pub const BLOCK_HEADER_SIZE: usize = 80;

impl BlockHeader {
    /// Fixed 80-byte serialization: version, previous, merkle root,
    /// time, bits, nonce, integers little-endian.
    pub fn serialize(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut out = [0u8; BLOCK_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.previous.as_ref());
        out[36..68].copy_from_slice(self.merkle_root.as_ref());
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }
}

/// Validation status bits of a mirrored-tree block, as exposed to
/// chain-tip queries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFlags(u32);

impl BlockFlags {
    /// This block, or an ancestor, failed validation
    pub const FAILED: BlockFlags = BlockFlags(1);
    /// Full payload data for this block is present
    pub const HAVE_DATA: BlockFlags = BlockFlags(1 << 1);
    /// This block and all ancestors have their data
    pub const CONNECTED: BlockFlags = BlockFlags(1 << 2);
    /// Fully contextually validated, can be applied to the active chain
    pub const CAN_BE_APPLIED: BlockFlags = BlockFlags(1 << 3);

    pub const fn empty() -> Self {
        BlockFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: BlockFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: BlockFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: BlockFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for BlockFlags {
    type Output = BlockFlags;

    fn bitor(self, rhs: Self) -> Self {
        BlockFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for BlockFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Consensus-meaningful status of a chain tip.
///
/// Serialized with the conventional chain-tip status strings so query
/// results match what operators expect from `getchaintips`-style calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TipStatus {
    /// Tip of the active main chain
    Active,
    /// The branch contains at least one invalid block
    Invalid,
    /// Not all blocks for the branch are available, but the headers are valid
    HeadersOnly,
    /// Not part of the active chain, but fully validated
    ValidFork,
    /// All blocks available but never fully validated
    ValidHeaders,
    /// A state combination this layer does not model
    Unknown,
}

impl TipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Invalid => "invalid",
            Self::HeadersOnly => "headers-only",
            Self::ValidFork => "valid-fork",
            Self::ValidHeaders => "valid-headers",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an own-chain block as announced on the bus
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub hash: BlockHash,
}
