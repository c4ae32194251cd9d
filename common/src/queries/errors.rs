use serde::{Deserialize, Serialize};

/// Common error type for all state query responses.
///
/// Caller errors (`InvalidRequest`), negative results (`NotFound`) and
/// once-existed-but-gone data (`DataUnavailable`) are distinguished so
/// transports can map them faithfully; `InternalError` marks collaborator
/// state corruption and is the only variant logged as a system fault.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum QueryError {
    /// The requested resource was not found
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Invalid request parameters
    #[error("{message}")]
    InvalidRequest { message: String },

    /// The chain has no blocks yet
    #[error("chain {chain} is not bootstrapped")]
    NotBootstrapped { chain: String },

    /// The data once existed but cannot be produced (pruned or missing)
    #[error("{message}")]
    DataUnavailable { message: String },

    /// An error occurred while processing the query
    #[error("{message}")]
    QueryFailed { message: String },

    /// Collaborator state corruption detected
    #[error("internal consistency violation: {message}")]
    InternalError { message: String },
}

impl QueryError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn not_bootstrapped(chain: impl Into<String>) -> Self {
        Self::NotBootstrapped {
            chain: chain.into(),
        }
    }

    pub fn data_unavailable(message: impl Into<String>) -> Self {
        Self::DataUnavailable {
            message: message.into(),
        }
    }

    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for QueryError {
    fn from(error: anyhow::Error) -> Self {
        Self::query_failed(error.to_string())
    }
}
