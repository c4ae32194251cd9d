//! Definition of Pharos messages

use crate::types::BlockInfo;
use crate::queries::pop::{PopStateQuery, PopStateQueryResponse};

/// Own-chain block message.
///
/// `raw` is the CBOR-encoded [`crate::entities::Block`]; the announced
/// hash in `info` is verified against the header by the consumer.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct BlockAvailableMessage {
    /// Block info
    pub info: BlockInfo,

    /// Raw data
    pub raw: Vec<u8>,
}

/// Own-chain rollback message: the chain was reorganized back to the
/// given height; everything above it is no longer on the active chain.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChainRollbackMessage {
    pub to_height: u64,
}

/// State query wrapper
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum StateQuery {
    Pop(PopStateQuery),
}

/// State query response wrapper
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum StateQueryResponse {
    Pop(PopStateQueryResponse),
}

// === Global message enum ===
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Message {
    None(()),                                  // Just so we have a simple default

    // Generic messages, get of jail free cards
    String(String),                            // Simple string
    JSON(serde_json::Value),                   // JSON object

    // Own-chain messages
    BlockAvailable(BlockAvailableMessage),     // Own-chain block available
    ChainRollback(ChainRollbackMessage),       // Own chain rolled back

    // Query messages
    StateQuery(StateQuery),                    // State query request
    StateQueryResponse(StateQueryResponse),    // State query response
}

impl Default for Message {
    fn default() -> Self {
        Self::None(())
    }
}

// Casts from specific messages
impl From<BlockAvailableMessage> for Message {
    fn from(msg: BlockAvailableMessage) -> Self {
        Message::BlockAvailable(msg)
    }
}

impl From<ChainRollbackMessage> for Message {
    fn from(msg: ChainRollbackMessage) -> Self {
        Message::ChainRollback(msg)
    }
}

impl From<StateQuery> for Message {
    fn from(msg: StateQuery) -> Self {
        Message::StateQuery(msg)
    }
}

impl From<StateQueryResponse> for Message {
    fn from(msg: StateQueryResponse) -> Self {
        Message::StateQueryResponse(msg)
    }
}
