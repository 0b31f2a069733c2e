//! Create-node submission shared by every orchestrator
//!
//! Builds the contract call for the requested placement, pushes it through the
//! transaction queue and turns the receipt into a confirmed [`NodeView`]. A
//! node exists for the caller only once its creation event has been parsed.

use super::{LoomServices, OrchestratorError};
use crate::chain::events::{find_node_created, find_node_token, NODE_CREATED_SIGNATURE};
use crate::chain::{ChainError, ContractCall, Receipt};
use crate::store::PinMetadata;
use crate::tree::{wrap_token_content, Address, NodeId, NodeView, Placement, TokenDetails, TreeRef};
use tracing::{debug, info};

/// A node waiting to be placed on chain.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraft {
    pub parent_id: NodeId,
    pub text: String,
    pub model_id: String,
    pub placement: Placement,
    /// Attributed author; the signer when unset.
    pub author: Option<Address>,
    /// Fungible supply minted for token-bearing placement.
    pub token_supply: u64,
}

/// A node confirmed on chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedNode {
    pub view: NodeView,
    pub transaction_hash: String,
}

/// Supply for hand-written text: one unit per word, at least one.
pub fn token_supply_for_text(text: &str) -> u64 {
    (text.split_whitespace().count() as u64).max(1)
}

/// Submit `draft` under `tree` and wait for its confirmed creation event.
pub async fn place_node(
    services: &LoomServices,
    tree: &TreeRef,
    draft: NodeDraft,
) -> Result<PlacedNode, OrchestratorError> {
    let call = match draft.placement {
        Placement::Lightweight => ContractCall::AddNode {
            parent_id: draft.parent_id.clone(),
            content: draft.text.clone(),
            store_ref: None,
            model_id: draft.model_id.clone(),
            author: draft.author.clone(),
        },
        Placement::StoreBacked => {
            let metadata = PinMetadata::named("loom-node")
                .with_value("tree", tree.address.as_str())
                .with_value("parent", draft.parent_id.as_str())
                .with_value("model", draft.model_id.as_str());
            let pinned = services.store.pin(&draft.text, &metadata).await?;
            debug!(reference = %pinned.reference, size = pinned.size_bytes, "pinned node content");
            ContractCall::AddNode {
                parent_id: draft.parent_id.clone(),
                content: draft.text.clone(),
                store_ref: Some(pinned.reference),
                model_id: draft.model_id.clone(),
                author: draft.author.clone(),
            }
        }
        Placement::TokenBearing => {
            let nft_contract = tree.nft_address.clone().ok_or_else(|| {
                OrchestratorError::InvalidRequest(format!(
                    "tree {} has no NFT contract for token-bearing nodes",
                    tree.address
                ))
            })?;
            ContractCall::AddNodeWithToken {
                parent_id: draft.parent_id.clone(),
                content: wrap_token_content(&draft.text, &draft.model_id),
                model_id: draft.model_id.clone(),
                author: draft.author.clone(),
                token_supply: draft.token_supply.max(1),
                nft_contract,
            }
        }
    };

    let receipt = services.queue.submit_call(&tree.address, call).await?;
    ensure_succeeded(&receipt)?;
    info!(
        tx = %receipt.transaction_hash,
        block = receipt.block_number,
        gas_used = receipt.gas_used,
        cost = %receipt.cost(),
        "create-node transaction confirmed"
    );

    let created = find_node_created(&tree.address, &receipt.logs).ok_or_else(|| {
        OrchestratorError::EventMissing {
            transaction_hash: receipt.transaction_hash.clone(),
            event: NODE_CREATED_SIGNATURE,
        }
    })?;

    let mut view = NodeView {
        node_id: created.node_id,
        parent_id: created.parent_id,
        content: draft.text,
        author: created.author,
        timestamp: created.timestamp,
        tree_address: tree.address.clone(),
        has_token: false,
        model_id: draft.model_id,
        token_id: None,
        token_bound_account_address: None,
        token_contract_address: None,
    };

    if draft.placement.mints_token() {
        let nft = tree.nft_address.as_ref().unwrap_or(&tree.address);
        let token = find_node_token(nft, &receipt.logs, &view.node_id).ok_or_else(|| {
            OrchestratorError::EventMissing {
                transaction_hash: receipt.transaction_hash.clone(),
                event: "NodeTokenCreated",
            }
        })?;
        view = view.with_token(TokenDetails {
            token_id: token.token_id,
            token_bound_account_address: token.token_bound_account,
            token_contract_address: token.token_contract,
        });
    }

    Ok(PlacedNode {
        view,
        transaction_hash: receipt.transaction_hash,
    })
}

/// Reject receipts whose status reports a revert.
pub(crate) fn ensure_succeeded(receipt: &Receipt) -> Result<(), OrchestratorError> {
    if receipt.status {
        return Ok(());
    }
    Err(OrchestratorError::Chain(ChainError::Reverted {
        reason: "transaction status 0".to_string(),
        transaction_hash: Some(receipt.transaction_hash.clone()),
    }))
}
