//! Tree import
//!
//! Replays another tree's nodes onto a fresh tree. Every node gets a new
//! chain-assigned id, so nodes are placed parent-first and each confirmed node
//! records its old→new id for its children to resolve against.

use super::placement::{place_node, token_supply_for_text, NodeDraft};
use super::{pause, LoomServices, OrchestratorError};
use crate::broadcast::{ImportSummary, LoomEvent};
use crate::chain::read_root_id;
use crate::tree::{unwrap_token_content, Address, NodeId, Placement, TreeRef};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// A node from the source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportNode {
    pub node_id: NodeId,
    pub parent_id: NodeId,
    pub content: String,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    /// The destination tree.
    pub tree: TreeRef,
    /// Root of the destination tree; read from the chain when absent.
    #[serde(default)]
    pub new_root_id: Option<NodeId>,
    pub old_root_id: NodeId,
    pub nodes: Vec<ImportNode>,
    /// Author recorded on every imported node; the signer when absent.
    #[serde(default)]
    pub author_override: Option<Address>,
    #[serde(default)]
    pub placement: Placement,
}

/// Dependency-ordered nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOrder {
    pub ordered: Vec<ImportNode>,
    /// Nodes appended at the end because their parent never became available.
    pub unresolved: usize,
}

impl ImportOrder {
    pub fn is_complete(&self) -> bool {
        self.unresolved == 0
    }
}

/// Outcome of an import run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub summary: ImportSummary,
    /// Old id → new id, the old root included.
    pub id_map: HashMap<NodeId, NodeId>,
    pub unresolved: usize,
}

/// Order `nodes` so every node follows its parent.
///
/// A node is ready once its parent is the root-parent sentinel, `old_root`,
/// or a node already placed. Ready nodes keep their relative input order.
/// Nodes still waiting when no pass makes progress are appended in input
/// order and counted in `unresolved`; nothing is dropped.
pub fn order_for_import(nodes: &[ImportNode], old_root: &NodeId) -> ImportOrder {
    let mut settled: HashSet<&NodeId> = HashSet::new();
    settled.insert(old_root);
    let mut remaining: Vec<&ImportNode> = nodes.iter().collect();
    let mut ordered: Vec<ImportNode> = Vec::with_capacity(nodes.len());

    loop {
        let before = remaining.len();
        let mut waiting = Vec::with_capacity(before);
        for node in remaining {
            if node.parent_id.is_root_parent() || settled.contains(&node.parent_id) {
                settled.insert(&node.node_id);
                ordered.push(node.clone());
            } else {
                waiting.push(node);
            }
        }
        remaining = waiting;
        if remaining.is_empty() || remaining.len() == before {
            break;
        }
    }

    let unresolved = remaining.len();
    if unresolved > 0 {
        warn!(
            unresolved,
            first = %remaining[0].node_id,
            "import order has nodes with unresolvable parents, appending them as-is"
        );
        ordered.extend(remaining.into_iter().cloned());
    }
    ImportOrder { ordered, unresolved }
}

pub struct TreeImporter {
    services: Arc<LoomServices>,
}

impl TreeImporter {
    pub fn new(services: Arc<LoomServices>) -> Self {
        Self { services }
    }

    /// Import `request.nodes` under the destination tree's root.
    ///
    /// Individual failures are counted; the run always walks the whole list.
    pub async fn import(&self, request: ImportRequest) -> Result<ImportReport, OrchestratorError> {
        let services = &self.services;
        if request.placement.mints_token() && request.tree.nft_address.is_none() {
            return Err(OrchestratorError::InvalidRequest(format!(
                "tree {} has no NFT contract for token-bearing nodes",
                request.tree.address
            )));
        }
        let new_root = match request.new_root_id.clone() {
            Some(id) => id,
            None => read_root_id(services.chain.as_ref(), &request.tree.address).await?,
        };

        let nodes: Vec<ImportNode> = request
            .nodes
            .into_iter()
            .filter(|n| n.node_id != request.old_root_id)
            .collect();
        if nodes.is_empty() {
            return Err(OrchestratorError::InvalidRequest("no nodes to import".into()));
        }

        let order = order_for_import(&nodes, &request.old_root_id);
        let total_nodes = order.ordered.len();
        let mut id_map: HashMap<NodeId, NodeId> = HashMap::new();
        id_map.insert(request.old_root_id.clone(), new_root);

        let spacing = services.config.import.submission_spacing();
        let mut success_count = 0;
        for (i, node) in order.ordered.into_iter().enumerate() {
            if i > 0 {
                pause(spacing).await;
            }
            let old_id = node.node_id.clone();
            match self.place(&request.tree, &request.author_override, request.placement, &id_map, node).await {
                Ok(new_id) => {
                    success_count += 1;
                    id_map.insert(old_id, new_id);
                }
                Err(e) => {
                    warn!(
                        node = %old_id,
                        error = %e,
                        revert_reason = e.revert_reason().unwrap_or("-"),
                        "failed to import node"
                    );
                }
            }
        }

        let summary = ImportSummary {
            success: success_count > 0,
            success_count,
            failed_count: total_nodes - success_count,
            total_nodes,
        };
        info!(
            tree = %request.tree.address,
            imported = success_count,
            failed = summary.failed_count,
            "import finished"
        );
        services.emit(LoomEvent::ImportComplete(summary.clone()));
        Ok(ImportReport {
            summary,
            id_map,
            unresolved: order.unresolved,
        })
    }

    async fn place(
        &self,
        tree: &TreeRef,
        author: &Option<Address>,
        placement: Placement,
        id_map: &HashMap<NodeId, NodeId>,
        node: ImportNode,
    ) -> Result<NodeId, OrchestratorError> {
        let parent_id = id_map
            .get(&node.parent_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::MissingParentMapping(node.parent_id.clone()))?;
        let text = unwrap_token_content(&node.content);
        let draft = NodeDraft {
            parent_id,
            token_supply: token_supply_for_text(&text),
            text,
            model_id: node.model_id.unwrap_or_default(),
            placement,
            author: author.clone(),
        };
        let placed = place_node(&self.services, tree, draft).await?;
        let new_id = placed.view.node_id.clone();
        self.services.emit(LoomEvent::NodeCreated(placed.view));
        Ok(new_id)
    }
}
