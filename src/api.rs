//! Transport-independent API layer.
//!
//! `LoomApi` is the single entry point for all consumer-facing operations.
//! Transports (socket servers, HTTP, direct embedding) call `LoomApi`
//! methods and get the final result back directly; the event sink carries the
//! same outcomes to every other observer.

use std::sync::Arc;

use crate::broadcast::{EventSink, GenerationSummary, LoomEvent};
use crate::chain::{read_node, read_token_balance, ChainClient};
use crate::config::LoomConfig;
use crate::orchestrator::{
    place_node, resolve_text, token_supply_for_text, GenerateRequest, ImportReport, ImportRequest,
    LoomServices, NodeCreator, NodeDraft, NodeUpdater, OrchestratorError, PlacedNode, TreeImporter,
    UpdateOutcome, UpdateRequest,
};
use crate::provider::GenerationProvider;
use crate::store::ContentStore;
use crate::tree::{Address, NodeId, NodeView, Placement, TreeRef};

/// A hand-written node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualNodeRequest {
    pub tree: TreeRef,
    pub parent_id: NodeId,
    pub content: String,
    #[serde(default)]
    pub author: Option<Address>,
    #[serde(default)]
    pub placement: Placement,
}

/// Single entry point for all consumer-facing operations.
#[derive(Clone)]
pub struct LoomApi {
    services: Arc<LoomServices>,
    creator: Arc<NodeCreator>,
    updater: Arc<NodeUpdater>,
    importer: Arc<TreeImporter>,
}

impl LoomApi {
    /// Wire the orchestrators around one signer's chain client.
    pub fn new(
        chain: Arc<dyn ChainClient>,
        provider: Arc<dyn GenerationProvider>,
        store: Arc<dyn ContentStore>,
        sink: Arc<dyn EventSink>,
        config: LoomConfig,
    ) -> Self {
        Self::from_services(Arc::new(LoomServices::new(chain, provider, store, sink, config)))
    }

    pub fn from_services(services: Arc<LoomServices>) -> Self {
        Self {
            creator: Arc::new(NodeCreator::new(services.clone())),
            updater: Arc::new(NodeUpdater::new(services.clone())),
            importer: Arc::new(TreeImporter::new(services.clone())),
            services,
        }
    }

    pub fn services(&self) -> &Arc<LoomServices> {
        &self.services
    }

    // --- Write ---

    /// Generate continuations under a parent node.
    pub async fn generate_children(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationSummary, OrchestratorError> {
        self.creator.generate_children(request).await
    }

    /// Edit a node, optionally splitting off a child or sibling.
    pub async fn update_node(&self, request: UpdateRequest) -> Result<UpdateOutcome, OrchestratorError> {
        self.updater.update_node(request).await
    }

    /// Replay another tree's nodes onto `request.tree`.
    pub async fn import_tree(&self, request: ImportRequest) -> Result<ImportReport, OrchestratorError> {
        self.importer.import(request).await
    }

    /// Add a hand-written node. It carries no model id.
    pub async fn add_node(&self, request: ManualNodeRequest) -> Result<PlacedNode, OrchestratorError> {
        if request.content.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest("content is required".into()));
        }
        let draft = NodeDraft {
            parent_id: request.parent_id,
            token_supply: token_supply_for_text(&request.content),
            text: request.content,
            model_id: String::new(),
            placement: request.placement,
            author: request.author,
        };
        let placed = place_node(&self.services, &request.tree, draft).await?;
        self.services.emit(LoomEvent::NodeCreated(placed.view.clone()));
        Ok(placed)
    }

    // --- Reads ---

    /// A node with its content resolved to readable text.
    pub async fn get_node(&self, tree: &TreeRef, node_id: &NodeId) -> Result<NodeView, OrchestratorError> {
        let record = read_node(self.services.chain.as_ref(), &tree.address, node_id).await?;
        let content = resolve_text(&self.services, &record.content).await?;
        let view = NodeView {
            node_id: record.node_id,
            parent_id: record.parent_id,
            content,
            author: record.author,
            timestamp: record.timestamp,
            tree_address: tree.address.clone(),
            has_token: record.has_token,
            model_id: record.model_id,
            token_id: None,
            token_bound_account_address: None,
            token_contract_address: None,
        };
        Ok(match record.token {
            Some(token) => view.with_token(token),
            None => view,
        })
    }

    /// Token balance held for a node.
    pub async fn token_balance(&self, tree: &TreeRef, node_id: &NodeId) -> Result<u64, OrchestratorError> {
        Ok(read_token_balance(self.services.chain.as_ref(), &tree.address, node_id).await?)
    }
}
