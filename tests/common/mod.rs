//! Shared fixtures for the loomchain integration tests
//!
//! Every fixture runs against the in-process chain, content store and
//! provider, wired through the public `LoomApi`.

#![allow(dead_code)]

use loomchain::{
    GenerateRequest, GenerationParams, ImportNode, LoomApi, LoomConfig, MemoryChain, MemoryContentStore,
    MockProvider, NodeId, Placement, RecordingSink, TreeRef,
};
use std::sync::Arc;

pub struct Fixture {
    pub chain: Arc<MemoryChain>,
    pub store: Arc<MemoryContentStore>,
    pub provider: Arc<MockProvider>,
    pub sink: Arc<RecordingSink>,
    pub api: LoomApi,
}

impl Fixture {
    pub fn new(provider: MockProvider) -> Self {
        Self::with(MemoryChain::new("0xsigner"), provider, LoomConfig::default())
    }

    pub fn with(chain: MemoryChain, provider: MockProvider, config: LoomConfig) -> Self {
        let chain = Arc::new(chain);
        let store = Arc::new(MemoryContentStore::new());
        let provider = Arc::new(provider);
        let sink = Arc::new(RecordingSink::new());
        let api = LoomApi::new(chain.clone(), provider.clone(), store.clone(), sink.clone(), config);
        Self {
            chain,
            store,
            provider,
            sink,
            api,
        }
    }
}

/// Defaults with every fixed delay removed. Retry backoff is kept.
pub fn no_spacing() -> LoomConfig {
    let mut config = LoomConfig::default();
    config.creation.submission_spacing_ms = 0;
    config.import.submission_spacing_ms = 0;
    config.update.split_settle_ms = 0;
    config
}

pub fn generate(tree: &TreeRef, parent: &NodeId, count: usize, model: &str) -> GenerateRequest {
    GenerateRequest {
        tree: tree.clone(),
        parent_id: parent.clone(),
        parent_content: None,
        count,
        requester: None,
        model_id: model.to_string(),
        params: GenerationParams::default(),
        placement: Placement::Lightweight,
    }
}

pub fn import_node(id: &str, parent: &str, content: &str) -> ImportNode {
    ImportNode {
        node_id: NodeId::from_string(id),
        parent_id: NodeId::from_string(parent),
        content: content.to_string(),
        model_id: None,
    }
}

/// True when `nonces` is exactly 0..n in order.
pub fn consecutive_from_zero(nonces: &[u64]) -> bool {
    nonces.iter().enumerate().all(|(i, n)| *n == i as u64)
}
