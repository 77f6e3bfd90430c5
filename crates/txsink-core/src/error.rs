//! Error types for the txsink indexing and search pipeline.

use thiserror::Error;

/// Errors that can occur while indexing finalized blocks or searching them.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    #[error("block at height {height} for chain '{chain_id}' not found")]
    NotFound { height: i64, chain_id: String },

    #[error("height bound '{value}' is not convertible to an integer")]
    RangeConversion { value: String },

    #[error("{operation} is not supported via the {sink} event sink")]
    Unsupported { operation: String, sink: String },

    #[error("invalid query: {reason}")]
    Query { reason: String },

    #[error("storage error in {step}: {reason}")]
    Storage { step: &'static str, reason: String },

    #[error("module '{name}' is already registered")]
    DuplicateModule { name: String },

    #[error("no module indexer named '{name}'")]
    UnknownModule { name: String },
}

impl IndexerError {
    pub fn decode(what: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            what,
            reason: reason.to_string(),
        }
    }

    pub fn encode(what: &'static str, reason: impl ToString) -> Self {
        Self::Encode {
            what,
            reason: reason.to_string(),
        }
    }

    /// Annotate a store-level error with the step that produced it.
    pub fn storage(step: &'static str, reason: impl ToString) -> Self {
        Self::Storage {
            step,
            reason: reason.to_string(),
        }
    }

    pub fn query(reason: impl Into<String>) -> Self {
        Self::Query {
            reason: reason.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>, sink: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            sink: sink.into(),
        }
    }

    /// Returns `true` if the referenced block row was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the capability is not implemented by the callee.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}
