//! PoP payload entities and own-chain block contents.
//!
//! These are the wire shapes this node accepts over submission and
//! embeds in its own blocks: VBK block headers, VTBs (a VBK block
//! endorsed into the BTC chain) and ATVs (an own-chain block endorsed
//! into the VBK chain). Everything is CBOR on the wire; ids are derived
//! from the encoding, never carried in it.

use crate::crypto::{blake2b_192, sha256d};
use crate::hash::Hash;
use crate::types::{AtvId, BlockHash, BlockHeader, VbkBlockHash, VbkBlockId, VtbId};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::fmt;

/// A mirrored VBK-chain block header
#[derive(
    Debug,
    Default,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    minicbor::Encode,
    minicbor::Decode,
)]
pub struct VbkBlock {
    #[n(0)]
    pub height: u64,
    #[n(1)]
    pub version: u16,
    #[n(2)]
    pub previous: VbkBlockHash,
    #[n(3)]
    pub merkle_root: Hash<16>,
    #[n(4)]
    pub time: u32,
    #[n(5)]
    pub difficulty: u32,
    #[n(6)]
    pub nonce: u64,
}

impl VbkBlock {
    /// Block hash, Blake2b-192 over the encoding
    pub fn hash(&self) -> VbkBlockHash {
        blake2b_192(&self.encode_bytes())
    }

    /// Block id, the trailing 12 bytes of the hash
    pub fn id(&self) -> VbkBlockId {
        let hash = self.hash();
        let mut id = [0u8; 12];
        id.copy_from_slice(&hash.as_ref()[12..24]);
        Hash::new(id)
    }
}

/// A VTB: proof that a VBK block was endorsed into the BTC chain.
///
/// Carries the containing VBK block and the BTC header context needed
/// to connect the endorsement to the mirrored BTC tree.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode,
)]
pub struct Vtb {
    #[n(0)]
    pub containing: VbkBlock,
    #[n(1)]
    pub btc_context: Vec<BlockHeader>,
}

impl Vtb {
    pub fn id(&self) -> VtbId {
        sha256d(&self.encode_bytes())
    }
}

/// An ATV: proof that an own-chain block was endorsed into the VBK chain
#[serde_as]
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode,
)]
pub struct Atv {
    /// Hash of the endorsed own-chain block
    #[n(0)]
    pub endorsed: BlockHash,
    /// Opaque payout script for the PoP miner
    #[serde_as(as = "serde_with::hex::Hex")]
    #[cbor(n(1), with = "minicbor::bytes")]
    pub payout_info: Vec<u8>,
    #[n(2)]
    pub containing: VbkBlock,
}

impl Atv {
    pub fn id(&self) -> AtvId {
        sha256d(&self.encode_bytes())
    }
}

/// The PoP payloads embedded in one own-chain block
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode,
)]
pub struct PopData {
    /// VBK context blocks, applied before VTBs and ATVs
    #[n(0)]
    pub context: Vec<VbkBlock>,
    #[n(1)]
    pub vtbs: Vec<Vtb>,
    #[n(2)]
    pub atvs: Vec<Atv>,
}

impl PopData {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.vtbs.is_empty() && self.atvs.is_empty()
    }
}

/// An own-chain block as stored and shipped on the bus
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, minicbor::Encode, minicbor::Decode,
)]
pub struct Block {
    #[n(0)]
    pub header: BlockHeader,
    #[n(1)]
    pub pop_data: PopData,
}

impl Block {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![];
        minicbor::encode(self, &mut bytes).expect("infallible");
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, minicbor::decode::Error> {
        minicbor::decode(bytes)
    }
}

/// The three submittable payload kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    VbkBlock,
    Vtb,
    Atv,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::VbkBlock => "vbkblock",
            Self::Vtb => "vtb",
            Self::Atv => "atv",
        })
    }
}

/// Uniform access to a payload kind: its name, id, encoding, and where
/// it lives inside a block's [`PopData`].
pub trait PopPayload:
    Sized + Clone + minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()>
{
    const NAME: &'static str;

    /// Canonical id width in bytes
    const ID_WIDTH: usize;

    /// Id in its canonical byte form, as keyed by the payload index
    fn id_bytes(&self) -> Vec<u8>;

    fn decode_bytes(bytes: &[u8]) -> Result<Self, minicbor::decode::Error> {
        minicbor::decode(bytes)
    }

    fn encode_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![];
        minicbor::encode(self, &mut bytes).expect("infallible");
        bytes
    }

    fn in_pop_data(pop: &PopData) -> &[Self];
}

impl PopPayload for VbkBlock {
    const NAME: &'static str = "vbkblock";
    const ID_WIDTH: usize = 12;

    fn id_bytes(&self) -> Vec<u8> {
        self.id().to_vec()
    }

    fn in_pop_data(pop: &PopData) -> &[Self] {
        &pop.context
    }
}

impl PopPayload for Vtb {
    const NAME: &'static str = "vtb";
    const ID_WIDTH: usize = 32;

    fn id_bytes(&self) -> Vec<u8> {
        self.id().to_vec()
    }

    fn in_pop_data(pop: &PopData) -> &[Self] {
        &pop.vtbs
    }
}

impl PopPayload for Atv {
    const NAME: &'static str = "atv";
    const ID_WIDTH: usize = 32;

    fn id_bytes(&self) -> Vec<u8> {
        self.id().to_vec()
    }

    fn in_pop_data(pop: &PopData) -> &[Self] {
        &pop.atvs
    }
}
