//! Chain client boundary
//!
//! One signing identity talking to one JSON-RPC endpoint. The tree contract
//! is opaque: callers name a method with typed arguments, get back a receipt
//! whose logs are decoded by [`events`].

pub mod events;
pub mod memory;

use crate::tree::{Address, NodeId, NodeRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use events::{decode_log, find_event, ChainEvent, EventKind};
pub use memory::{MemoryChain, ReceiptFault};

/// Phrasings JSON-RPC nodes use when a nonce has already been consumed or is in use.
const NONCE_CONFLICT_MARKERS: &[&str] = &[
    "nonce too low",
    "nonce has already been used",
    "invalid nonce",
    "replacement transaction underpriced",
    "already known",
];

const REVERT_MARKER: &str = "execution reverted";

/// Errors from chain client operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChainError {
    #[error("nonce conflict: {0}")]
    NonceConflict(String),
    #[error("transaction reverted: {reason}")]
    Reverted {
        reason: String,
        transaction_hash: Option<String>,
    },
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl ChainError {
    /// Classify a raw JSON-RPC error message.
    pub fn from_rpc_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if NONCE_CONFLICT_MARKERS.iter().any(|m| lower.contains(m)) {
            return Self::NonceConflict(message);
        }
        if let Some(idx) = lower.find(REVERT_MARKER) {
            let reason = message
                .get(idx + REVERT_MARKER.len()..)
                .unwrap_or("")
                .trim_start_matches(':')
                .trim()
                .to_string();
            return Self::Reverted {
                reason: if reason.is_empty() {
                    "no reason given".to_string()
                } else {
                    reason
                },
                transaction_hash: None,
            };
        }
        Self::Rpc(message)
    }

    /// True when retrying with a freshly queried nonce may succeed.
    pub fn is_nonce_conflict(&self) -> bool {
        match self {
            Self::NonceConflict(_) => true,
            Self::Rpc(msg) => {
                let lower = msg.to_lowercase();
                NONCE_CONFLICT_MARKERS.iter().any(|m| lower.contains(m))
            }
            _ => false,
        }
    }

    /// Human-readable revert reason, when the failure was a revert.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Reverted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// A mutating call on the tree contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum ContractCall {
    /// Create a node without a token. `store_ref` is set for store-backed content,
    /// `content` always carries the literal text.
    #[serde(rename_all = "camelCase")]
    AddNode {
        parent_id: NodeId,
        content: String,
        store_ref: Option<String>,
        model_id: String,
        author: Option<Address>,
    },
    /// Create a node and mint its NFT and fungible token.
    #[serde(rename_all = "camelCase")]
    AddNodeWithToken {
        parent_id: NodeId,
        content: String,
        model_id: String,
        author: Option<Address>,
        token_supply: u64,
        nft_contract: Address,
    },
    /// Replace a node's content in place.
    #[serde(rename_all = "camelCase")]
    UpdateNodeContent {
        node_id: NodeId,
        content: String,
        store_ref: Option<String>,
    },
}

impl ContractCall {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::AddNode { .. } => "addNode",
            Self::AddNodeWithToken { .. } => "addNodeWithToken",
            Self::UpdateNodeContent { .. } => "updateNodeContent",
        }
    }
}

/// A read-only query on the tree contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum ContractQuery {
    #[serde(rename_all = "camelCase")]
    GetNode { node_id: NodeId },
    #[serde(rename_all = "camelCase")]
    TokenBalance { node_id: NodeId },
    RootId,
}

/// A raw event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    /// `topics[0]` is the event signature.
    pub topics: Vec<String>,
    pub data: Vec<u8>,
}

/// A confirmed transaction receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: u64,
    /// `true` when the transaction executed without reverting.
    pub status: bool,
    pub gas_used: u64,
    pub gas_price: u128,
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Total fee paid, in the chain's smallest unit.
    pub fn cost(&self) -> u128 {
        u128::from(self.gas_used).saturating_mul(self.gas_price)
    }
}

/// Client for one signer on one chain endpoint.
///
/// Abstracts over transport (JSON-RPC, in-process) so orchestrators
/// don't depend on how the chain is reached.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the signing identity.
    fn signer(&self) -> &Address;

    /// Sign and submit a mutating call, waiting for its receipt.
    ///
    /// With `nonce: None` the client picks the nonce itself.
    async fn call(
        &self,
        contract: &Address,
        call: &ContractCall,
        nonce: Option<u64>,
    ) -> Result<Receipt, ChainError>;

    /// Evaluate a read-only query.
    async fn read(&self, contract: &Address, query: &ContractQuery)
        -> Result<serde_json::Value, ChainError>;

    /// The chain's view of the signer's next nonce, pending transactions included.
    async fn pending_nonce(&self) -> Result<u64, ChainError>;
}

/// Read one node record.
pub async fn read_node(
    chain: &dyn ChainClient,
    contract: &Address,
    node_id: &NodeId,
) -> Result<NodeRecord, ChainError> {
    let value = chain
        .read(
            contract,
            &ContractQuery::GetNode {
                node_id: node_id.clone(),
            },
        )
        .await?;
    if value.is_null() {
        return Err(ChainError::NotFound(format!("node {}", node_id)));
    }
    serde_json::from_value(value).map_err(|e| ChainError::Decode(e.to_string()))
}

/// Read the fungible token balance held for a node.
pub async fn read_token_balance(
    chain: &dyn ChainClient,
    contract: &Address,
    node_id: &NodeId,
) -> Result<u64, ChainError> {
    let value = chain
        .read(
            contract,
            &ContractQuery::TokenBalance {
                node_id: node_id.clone(),
            },
        )
        .await?;
    value
        .as_u64()
        .ok_or_else(|| ChainError::Decode(format!("balance is not an integer: {}", value)))
}

/// Read the tree's root node id.
pub async fn read_root_id(chain: &dyn ChainClient, contract: &Address) -> Result<NodeId, ChainError> {
    let value = chain.read(contract, &ContractQuery::RootId).await?;
    serde_json::from_value(value).map_err(|e| ChainError::Decode(e.to_string()))
}
