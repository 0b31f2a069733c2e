//! In-place node edits with optional split
//!
//! An update rewrites one node's content. It may also fork a new node from a
//! split point, either as a child of the edited node or as its sibling. Only
//! one update per node runs at a time; a second request for the same node is
//! rejected while the first is in flight.

use super::context::resolve_text;
use super::placement::{ensure_succeeded, place_node, token_supply_for_text, NodeDraft};
use super::{pause, LoomServices, OrchestratorError};
use crate::broadcast::{BalanceUpdate, LoomEvent, NodeUpdate};
use crate::chain::events::find_node_updated;
use crate::chain::{read_node, read_token_balance, ContractCall, Receipt};
use crate::store::PinMetadata;
use crate::tree::{wrap_token_content, Address, NodeId, NodeRecord, Placement, TreeRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a split node attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRelation {
    /// Under the edited node.
    Child,
    /// Under the edited node's parent.
    Sibling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    pub relation: SplitRelation,
    /// Text of the new node, usually the remainder after the split point.
    pub content: String,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub tree: TreeRef,
    pub node_id: NodeId,
    pub content: String,
    /// Model credited for the new content; the node's recorded model when absent.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Author of a split node; the signer when absent.
    #[serde(default)]
    pub author: Option<Address>,
    #[serde(default)]
    pub split: Option<SplitRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitOutcome {
    pub node_id: NodeId,
    pub content: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub node_id: NodeId,
    pub transaction_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitOutcome>,
}

pub struct NodeUpdater {
    services: Arc<LoomServices>,
}

impl NodeUpdater {
    pub fn new(services: Arc<LoomServices>) -> Self {
        Self { services }
    }

    /// Update one node, exactly once per request.
    pub async fn update_node(&self, request: UpdateRequest) -> Result<UpdateOutcome, OrchestratorError> {
        validate(&request)?;
        let services = &self.services;

        let _guard = services
            .edit_lock
            .try_acquire(&request.node_id)
            .ok_or_else(|| OrchestratorError::UpdateInProgress(request.node_id.clone()))?;

        let record = read_node(services.chain.as_ref(), &request.tree.address, &request.node_id).await?;
        if matches!(request.split.as_ref().map(|s| s.relation), Some(SplitRelation::Sibling)) && record.is_root() {
            return Err(OrchestratorError::InvalidRequest(
                "the root node cannot have a sibling".into(),
            ));
        }

        let receipt = self.write_content(&request, &record).await?;
        let transaction_hash = receipt.transaction_hash.clone();
        let timestamp = match find_node_updated(&request.tree.address, &receipt.logs, &request.node_id) {
            Some(event) => event.timestamp,
            None => {
                warn!(node = %request.node_id, tx = %transaction_hash, "update receipt has no NodeUpdated event, using local time");
                chrono::Utc::now().timestamp()
            }
        };
        info!(node = %request.node_id, tx = %transaction_hash, "node content updated");

        services.emit(LoomEvent::NodeUpdated(NodeUpdate {
            node_id: request.node_id.clone(),
            content: request.content.clone(),
            tree_address: request.tree.address.clone(),
            model_id: request
                .model_id
                .clone()
                .unwrap_or_else(|| record.model_id.clone()),
            timestamp,
            transaction_ref: transaction_hash.clone(),
        }));

        let split = match &request.split {
            Some(split) => self.create_split(&request, &record, split).await?,
            None => None,
        };

        self.refresh_balance(&request.tree, &request.node_id).await;

        Ok(UpdateOutcome {
            node_id: request.node_id,
            transaction_hash,
            split,
        })
    }

    /// Submit the content update. Store-backed nodes get their new content
    /// pinned first; the call always carries the literal text as well.
    async fn write_content(
        &self,
        request: &UpdateRequest,
        record: &NodeRecord,
    ) -> Result<Receipt, OrchestratorError> {
        let services = &self.services;
        let store_ref = if services.store.is_reference(&record.content) {
            let metadata = PinMetadata::named("loom-node")
                .with_value("tree", request.tree.address.as_str())
                .with_value("node", request.node_id.as_str());
            let pinned = services.store.pin(&request.content, &metadata).await?;
            debug!(node = %request.node_id, reference = %pinned.reference, "re-pinned store-backed content");
            Some(pinned.reference)
        } else {
            None
        };

        let content = if record.has_token {
            wrap_token_content(&request.content, &record.model_id)
        } else {
            request.content.clone()
        };

        let call = ContractCall::UpdateNodeContent {
            node_id: request.node_id.clone(),
            content,
            store_ref,
        };
        let receipt = services.queue.submit_call(&request.tree.address, call).await?;
        ensure_succeeded(&receipt)?;
        Ok(receipt)
    }

    async fn create_split(
        &self,
        request: &UpdateRequest,
        record: &NodeRecord,
        split: &SplitRequest,
    ) -> Result<Option<SplitOutcome>, OrchestratorError> {
        let services = &self.services;
        pause(services.config.update.split_settle()).await;

        let parent_id = match split.relation {
            SplitRelation::Child => request.node_id.clone(),
            SplitRelation::Sibling => record.parent_id.clone(),
        };
        let draft = NodeDraft {
            parent_id,
            text: split.content.clone(),
            model_id: split.model_id.clone().unwrap_or_default(),
            placement: split.placement,
            author: request.author.clone(),
            token_supply: token_supply_for_text(&split.content),
        };

        match place_node(services, &request.tree, draft).await {
            Ok(placed) => {
                info!(node = %placed.view.node_id, relation = ?split.relation, "split node created");
                let outcome = SplitOutcome {
                    node_id: placed.view.node_id.clone(),
                    content: placed.view.content.clone(),
                    transaction_hash: placed.transaction_hash.clone(),
                };
                services.emit(LoomEvent::NodeCreated(placed.view));
                Ok(Some(outcome))
            }
            Err(OrchestratorError::EventMissing {
                transaction_hash,
                event,
            }) => {
                warn!(tx = %transaction_hash, event, "split transaction confirmed without a creation event");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Best effort: failures are logged and never affect the update's result.
    async fn refresh_balance(&self, tree: &TreeRef, node_id: &NodeId) {
        let chain = self.services.chain.as_ref();
        let record = match read_node(chain, &tree.address, node_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(node = %node_id, error = %e, "could not re-read node after update");
                return;
            }
        };
        if !record.has_token {
            return;
        }
        match read_token_balance(chain, &tree.address, node_id).await {
            Ok(balance) => self.services.emit(LoomEvent::TokenBalanceUpdated(BalanceUpdate {
                node_id: node_id.clone(),
                tree_address: tree.address.clone(),
                balance,
                timestamp: chrono::Utc::now().timestamp(),
            })),
            Err(e) => warn!(node = %node_id, error = %e, "token balance refresh failed"),
        }
    }

    /// Current readable text of a node.
    pub async fn current_text(&self, tree: &TreeRef, node_id: &NodeId) -> Result<String, OrchestratorError> {
        let record = read_node(self.services.chain.as_ref(), &tree.address, node_id).await?;
        resolve_text(&self.services, &record.content).await
    }
}

fn validate(request: &UpdateRequest) -> Result<(), OrchestratorError> {
    if request.content.trim().is_empty() {
        return Err(OrchestratorError::InvalidRequest("content is required".into()));
    }
    if let Some(split) = &request.split {
        if split.content.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest("split content is required".into()));
        }
        if split.placement.mints_token() && request.tree.nft_address.is_none() {
            return Err(OrchestratorError::InvalidRequest(format!(
                "tree {} has no NFT contract for token-bearing nodes",
                request.tree.address
            )));
        }
    }
    Ok(())
}
