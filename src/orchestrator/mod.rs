//! Node orchestration
//!
//! Drives multi-step node operations across the generation provider, the
//! content store and the chain. All chain mutations go through the shared
//! [`TransactionQueue`]; all outcomes are pushed to the [`EventSink`].
//!
//! - [`NodeCreator`]: generate N continuations under a parent
//! - [`NodeUpdater`]: edit a node's content, optionally splitting off a new node
//! - [`TreeImporter`]: replay another tree's nodes parent-first

mod context;
mod create;
mod import;
mod placement;
mod update;

pub use context::{resolve_context, resolve_text};
pub use create::{GenerateRequest, NodeCreator};
pub use import::{order_for_import, ImportNode, ImportOrder, ImportReport, ImportRequest, TreeImporter};
pub use placement::{place_node, token_supply_for_text, NodeDraft, PlacedNode};
pub use update::{NodeUpdater, SplitOutcome, SplitRelation, SplitRequest, UpdateOutcome, UpdateRequest};

use crate::broadcast::{EventSink, LoomEvent};
use crate::chain::{ChainClient, ChainError};
use crate::config::LoomConfig;
use crate::lock::EditLock;
use crate::provider::GenerationProvider;
use crate::queue::{QueueError, TransactionQueue};
use crate::store::{ContentStore, StoreError};
use crate::tree::NodeId;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from orchestrated operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("update already in progress for node {0}")]
    UpdateInProgress(NodeId),
    #[error("no new id for parent {0}")]
    MissingParentMapping(NodeId),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("transaction failed: {0}")]
    Queue(#[from] QueueError),
    #[error("content store error: {0}")]
    Store(#[from] StoreError),
    #[error("transaction {transaction_hash} emitted no {event} event")]
    EventMissing {
        transaction_hash: String,
        event: &'static str,
    },
}

impl OrchestratorError {
    /// True for failures detected before any chain mutation was attempted.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::UpdateInProgress(_) | Self::MissingParentMapping(_)
        )
    }

    /// Revert reason from the chain, when the failure was a revert.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Chain(e) => e.revert_reason(),
            Self::Queue(e) => e.chain_error().revert_reason(),
            _ => None,
        }
    }
}

/// Shared dependencies of the orchestrators, one set per signing identity.
pub struct LoomServices {
    pub chain: Arc<dyn ChainClient>,
    pub queue: Arc<TransactionQueue>,
    pub provider: Arc<dyn GenerationProvider>,
    pub store: Arc<dyn ContentStore>,
    pub sink: Arc<dyn EventSink>,
    pub edit_lock: Arc<EditLock>,
    pub config: LoomConfig,
}

impl LoomServices {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        provider: Arc<dyn GenerationProvider>,
        store: Arc<dyn ContentStore>,
        sink: Arc<dyn EventSink>,
        config: LoomConfig,
    ) -> Self {
        let queue = Arc::new(TransactionQueue::new(chain.clone(), config.queue.clone()));
        Self {
            chain,
            queue,
            provider,
            store,
            sink,
            edit_lock: Arc::new(EditLock::new()),
            config,
        }
    }

    pub(crate) fn emit(&self, event: LoomEvent) {
        self.sink.emit(event);
    }
}

/// Sleep for `delay`, skipping the timer entirely when it is zero.
pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
