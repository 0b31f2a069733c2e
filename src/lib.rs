//! Loomchain: transaction ordering and event reconciliation for loom trees
//!
//! A loom tree is a branching narrative stored on chain: every node is a
//! passage, children are alternative continuations, and continuations can be
//! generated by a language model. This crate sits between concurrent client
//! requests, a text generation provider, and the single account that signs
//! every chain write.
//!
//! # Core Concepts
//!
//! - **Transaction queue**: serializes a signer's writes and assigns nonces
//! - **Orchestrators**: generate, update, and import nodes, tolerating per-item failure
//! - **Event sink**: pushes every confirmed change to observers
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use loomchain::{BroadcastSink, LoomApi, LoomConfig, MemoryChain, MemoryContentStore, MockProvider};
//!
//! let api = LoomApi::new(
//!     Arc::new(MemoryChain::new("0xsigner")),
//!     Arc::new(MockProvider::always("and then...", 3)),
//!     Arc::new(MemoryContentStore::new()),
//!     Arc::new(BroadcastSink::default()),
//!     LoomConfig::default(),
//! );
//! // Api is ready for use
//! # let _ = api;
//! ```

pub mod api;
pub mod broadcast;
pub mod chain;
pub mod config;
pub mod lock;
pub mod orchestrator;
pub mod provider;
pub mod queue;
pub mod store;
pub mod tree;

pub use api::{LoomApi, ManualNodeRequest};
pub use broadcast::{
    BalanceUpdate, BroadcastSink, EventSink, GenerationSummary, ImportSummary, LoomEvent, NodeUpdate,
    RecordingSink,
};
pub use chain::{ChainClient, ChainError, ContractCall, ContractQuery, Log, MemoryChain, Receipt, ReceiptFault};
pub use config::{ConfigError, LoomConfig};
pub use lock::{EditGuard, EditLock};
pub use orchestrator::{
    order_for_import, GenerateRequest, ImportNode, ImportOrder, ImportReport, ImportRequest, LoomServices,
    OrchestratorError, SplitRelation, SplitRequest, UpdateOutcome, UpdateRequest,
};
pub use provider::{Generation, GenerationParams, GenerationProvider, MockProvider, ProviderError};
pub use queue::{NonceCursor, QueueError, TransactionQueue};
pub use store::{ContentStore, MemoryContentStore, PinMetadata, StoreError};
pub use tree::{Address, NodeId, NodeRecord, NodeView, Placement, TreeRef};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
