//! Loom tree data model
//!
//! A tree is one on-chain contract instance holding a branching set of text
//! nodes. Node identifiers are assigned by the chain; the only identifier
//! known ahead of time is the root-parent sentinel.

use serde::{Deserialize, Serialize};

/// Width of the chain's node identifier (bytes32, hex encoded).
const NODE_ID_HEX_LEN: usize = 64;

/// Chain-assigned node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an identifier string as returned by the chain.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into().to_lowercase())
    }

    /// The "no parent" value carried by the root node.
    pub fn root_parent() -> Self {
        Self(format!("0x{}", "0".repeat(NODE_ID_HEX_LEN)))
    }

    pub fn is_root_parent(&self) -> bool {
        self.0
            .strip_prefix("0x")
            .map(|hex| !hex.is_empty() && hex.bytes().all(|b| b == b'0'))
            .unwrap_or(false)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

/// An account or contract address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A tree: its node contract and, when tokens are enabled, its NFT contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeRef {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft_address: Option<Address>,
}

impl TreeRef {
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            nft_address: None,
        }
    }

    pub fn with_nft(mut self, nft_address: impl Into<Address>) -> Self {
        self.nft_address = Some(nft_address.into());
        self
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Where a new node's content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Literal text in contract storage, no token.
    #[default]
    Lightweight,
    /// NFT plus fungible token minted for the node; content wrapped in token metadata.
    TokenBearing,
    /// Content pinned to the content store; the contract keeps the reference.
    StoreBacked,
}

impl Placement {
    pub fn mints_token(&self) -> bool {
        matches!(self, Self::TokenBearing)
    }
}

/// Token details attached to a token-bearing node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetails {
    pub token_id: String,
    pub token_bound_account_address: Address,
    pub token_contract_address: Address,
}

/// A node as stored by the tree contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub parent_id: NodeId,
    /// Raw stored content: literal text, a store reference, or token metadata.
    pub content: String,
    pub author: Address,
    pub timestamp: i64,
    pub has_token: bool,
    #[serde(default)]
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenDetails>,
}

impl NodeRecord {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_root_parent()
    }
}

/// Metadata envelope stored as content of token-bearing nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub name: String,
    pub description: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

/// Wrap node text in the token metadata envelope.
pub fn wrap_token_content(text: &str, model_id: &str) -> String {
    let metadata = TokenMetadata {
        name: "Loom node".to_string(),
        description: "A node in a collaborative loom tree".to_string(),
        content: text.to_string(),
        model_id: if model_id.is_empty() {
            None
        } else {
            Some(model_id.to_string())
        },
    };
    serde_json::to_string(&metadata).unwrap_or_else(|_| text.to_string())
}

/// Extract node text from stored content.
///
/// Content that does not parse as a token metadata envelope is returned as is.
pub fn unwrap_token_content(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('{') {
        return raw.to_string();
    }
    match serde_json::from_str::<TokenMetadata>(trimmed) {
        Ok(metadata) => metadata.content,
        Err(_) => raw.to_string(),
    }
}

/// A confirmed node as reported to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub node_id: NodeId,
    pub parent_id: NodeId,
    pub content: String,
    pub author: Address,
    pub timestamp: i64,
    pub tree_address: Address,
    pub has_token: bool,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_bound_account_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_contract_address: Option<Address>,
}

impl NodeView {
    pub fn with_token(mut self, token: TokenDetails) -> Self {
        self.has_token = true;
        self.token_id = Some(token.token_id);
        self.token_bound_account_address = Some(token.token_bound_account_address);
        self.token_contract_address = Some(token.token_contract_address);
        self
    }
}
