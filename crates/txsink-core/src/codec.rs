//! Transaction and message codec shared by the module indexers.
//!
//! Binary payloads (raw transactions, persisted message lists, persisted tx
//! results) use Borsh; fees are persisted as JSON. Message types must be
//! registered in the [`InterfaceRegistry`] before they can be decoded or
//! re-encoded, the same way a node only accepts messages it knows about.

use std::collections::BTreeSet;
use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IndexerError;
use crate::types::TxResult;

pub const MSG_SEND_TYPE_URL: &str = "/cosmos.bank.v1beta1.MsgSend";
pub const MSG_INSTANTIATE_CONTRACT_TYPE_URL: &str = "/cosmwasm.wasm.v1.MsgInstantiateContract";
pub const MSG_EXECUTE_CONTRACT_TYPE_URL: &str = "/cosmwasm.wasm.v1.MsgExecuteContract";

// ─── Transaction types ────────────────────────────────────────────────────────

/// A type-tagged, already-encoded message.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Any {
    pub type_url: String,
    pub value: Vec<u8>,
}

impl Any {
    pub fn new(type_url: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            type_url: type_url.into(),
            value: value.into(),
        }
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct Fee {
    pub amount: Vec<Coin>,
    pub gas_limit: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payer: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub granter: String,
}

#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct TxBody {
    pub messages: Vec<Any>,
    pub memo: String,
}

#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct AuthInfo {
    pub fee: Fee,
}

/// A decoded transaction.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct Tx {
    pub body: TxBody,
    pub auth_info: AuthInfo,
    pub signatures: Vec<Vec<u8>>,
}

// ─── Interface registry ───────────────────────────────────────────────────────

/// The set of message `type_url`s the codec accepts.
#[derive(Debug, Clone, Default)]
pub struct InterfaceRegistry {
    type_urls: BTreeSet<String>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message type. Registering twice is a no-op.
    pub fn register(&mut self, type_url: impl Into<String>) -> &mut Self {
        self.type_urls.insert(type_url.into());
        self
    }

    pub fn contains(&self, type_url: &str) -> bool {
        self.type_urls.contains(type_url)
    }

    pub fn type_urls(&self) -> impl Iterator<Item = &str> {
        self.type_urls.iter().map(String::as_str)
    }
}

// ─── EncodingConfig ───────────────────────────────────────────────────────────

/// Codec configuration shared by every module indexer of a node.
///
/// Cheap to clone; the registry is shared.
#[derive(Debug, Clone)]
pub struct EncodingConfig {
    registry: Arc<InterfaceRegistry>,
}

impl Default for EncodingConfig {
    /// Bank and CosmWasm message types.
    fn default() -> Self {
        let mut registry = InterfaceRegistry::new();
        registry
            .register(MSG_SEND_TYPE_URL)
            .register(MSG_INSTANTIATE_CONTRACT_TYPE_URL)
            .register(MSG_EXECUTE_CONTRACT_TYPE_URL);
        Self::new(registry)
    }
}

impl EncodingConfig {
    pub fn new(registry: InterfaceRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &InterfaceRegistry {
        &self.registry
    }

    /// Decode raw transaction bytes as found in a finalized block.
    pub fn decode_tx(&self, raw: &[u8]) -> Result<Tx, IndexerError> {
        let tx: Tx = borsh::from_slice(raw).map_err(|e| IndexerError::decode("tx", e))?;
        self.ensure_registered(&tx.body.messages)
            .map_err(|url| IndexerError::decode("tx", format!("unregistered message type {url}")))?;
        Ok(tx)
    }

    pub fn encode_tx(&self, tx: &Tx) -> Result<Vec<u8>, IndexerError> {
        borsh::to_vec(tx).map_err(|e| IndexerError::encode("tx", e))
    }

    /// Persisted binary form of a message list.
    pub fn marshal_msgs(&self, msgs: &[Any]) -> Result<Vec<u8>, IndexerError> {
        self.ensure_registered(msgs).map_err(|url| {
            IndexerError::encode("messages", format!("unregistered message type {url}"))
        })?;
        borsh::to_vec(msgs).map_err(|e| IndexerError::encode("messages", e))
    }

    pub fn unmarshal_msgs(&self, bz: &[u8]) -> Result<Vec<Any>, IndexerError> {
        let msgs: Vec<Any> =
            borsh::from_slice(bz).map_err(|e| IndexerError::decode("messages", e))?;
        self.ensure_registered(&msgs).map_err(|url| {
            IndexerError::decode("messages", format!("unregistered message type {url}"))
        })?;
        Ok(msgs)
    }

    pub fn marshal_fee_json(&self, fee: &Fee) -> Result<String, IndexerError> {
        serde_json::to_string(fee).map_err(|e| IndexerError::encode("fee", e))
    }

    pub fn unmarshal_fee_json(&self, json: &str) -> Result<Fee, IndexerError> {
        serde_json::from_str(json).map_err(|e| IndexerError::decode("fee", e))
    }

    pub fn marshal_tx_result(&self, result: &TxResult) -> Result<Vec<u8>, IndexerError> {
        borsh::to_vec(result).map_err(|e| IndexerError::encode("tx result", e))
    }

    pub fn unmarshal_tx_result(&self, bz: &[u8]) -> Result<TxResult, IndexerError> {
        borsh::from_slice(bz).map_err(|e| IndexerError::decode("tx result", e))
    }

    fn ensure_registered<'a>(&self, msgs: &'a [Any]) -> Result<(), &'a str> {
        match msgs.iter().find(|m| !self.registry.contains(&m.type_url)) {
            Some(m) => Err(&m.type_url),
            None => Ok(()),
        }
    }
}

/// Hash of a raw transaction as indexed: uppercase hex SHA-256.
pub fn tx_hash(raw: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(raw))
}
