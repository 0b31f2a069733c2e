//! In-process chain for tests and local simulation
//!
//! Behaves like a single-signer JSON-RPC node in the ways the orchestration
//! layer cares about: strict nonce ordering, reverted transactions consuming
//! their nonce, receipts with event logs, and optionally lagging pending-nonce
//! reads. Failures can be injected for the next calls.

use super::events::{ChainEvent, NodeCreatedArgs, NodeTokenCreatedArgs, NodeUpdatedArgs};
use super::{ChainClient, ChainError, ContractCall, ContractQuery, Receipt};
use crate::tree::{Address, NodeId, NodeRecord, TokenDetails, TreeRef};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

const GAS_PRICE: u128 = 1_000_000_000;

#[derive(Debug, Default)]
struct TreeState {
    nft: Option<Address>,
    root: Option<NodeId>,
    nodes: HashMap<NodeId, NodeRecord>,
    balances: HashMap<NodeId, u64>,
    minted: u64,
}

#[derive(Debug, Default)]
struct ChainState {
    next_nonce: u64,
    block: u64,
    stale_reads: usize,
    injected: VecDeque<ChainError>,
    trees: HashMap<Address, TreeState>,
    used_nonces: Vec<u64>,
    calls: Vec<ContractCall>,
    /// Keyed by mined-transaction index.
    receipt_faults: HashMap<usize, ReceiptFault>,
}

/// A way a mined transaction's receipt can disappoint its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptFault {
    /// The call executes but its receipt carries no logs.
    DropLogs,
    /// The call consumes its nonce, changes nothing, and reports status 0.
    StatusFailed,
}

/// An in-memory chain with one signer.
#[derive(Debug)]
pub struct MemoryChain {
    signer: Address,
    latency: Duration,
    state: Mutex<ChainState>,
}

impl MemoryChain {
    pub fn new(signer: impl Into<Address>) -> Self {
        Self {
            signer: signer.into(),
            latency: Duration::ZERO,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// Delay every `call()` by `latency` before it executes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deploy a tree with a root node; with `tokens` an NFT contract is paired with it.
    pub fn create_tree(&self, root_content: &str, tokens: bool) -> (TreeRef, NodeId) {
        let mut state = self.state();
        let index = state.trees.len();
        let address = Address::new(format!("0x{:040x}", 0x7e3e_0000u64 + index as u64));
        let nft = tokens.then(|| Address::new(format!("0x{:040x}", 0xaf7_0000u64 + index as u64)));

        let root_id = derive_node_id(&address, &NodeId::root_parent(), root_content, 0);
        state.block += 1;
        let timestamp = chrono::Utc::now().timestamp();
        let mut tree = TreeState {
            nft: nft.clone(),
            root: Some(root_id.clone()),
            ..Default::default()
        };
        tree.nodes.insert(
            root_id.clone(),
            NodeRecord {
                node_id: root_id.clone(),
                parent_id: NodeId::root_parent(),
                content: root_content.to_string(),
                author: self.signer.clone(),
                timestamp,
                has_token: false,
                model_id: String::new(),
                token: None,
            },
        );
        state.trees.insert(address.clone(), tree);

        let mut tree_ref = TreeRef::new(address);
        tree_ref.nft_address = nft;
        (tree_ref, root_id)
    }

    /// Fail the next `call()` with `error`. Injected failures queue up in order.
    pub fn fail_next(&self, error: ChainError) {
        self.state().injected.push_back(error);
    }

    /// Tamper with the receipt of the transaction mined `skip` mined
    /// transactions from now (`0` is the next one).
    pub fn tamper_receipt(&self, skip: usize, fault: ReceiptFault) {
        let mut state = self.state();
        let index = state.used_nonces.len() + skip;
        state.receipt_faults.insert(index, fault);
    }

    /// Report a pending nonce one behind the truth for the next `reads` queries.
    pub fn lag_nonce_reads(&self, reads: usize) {
        self.state().stale_reads = reads;
    }

    /// Nonces of every transaction that was mined, in mining order.
    pub fn used_nonces(&self) -> Vec<u64> {
        self.state().used_nonces.clone()
    }

    /// Every call that reached execution, mined or reverted.
    pub fn calls(&self) -> Vec<ContractCall> {
        self.state().calls.clone()
    }

    pub fn node(&self, tree: &Address, node_id: &NodeId) -> Option<NodeRecord> {
        self.state()
            .trees
            .get(tree)
            .and_then(|t| t.nodes.get(node_id).cloned())
    }

    pub fn node_count(&self, tree: &Address) -> usize {
        self.state().trees.get(tree).map(|t| t.nodes.len()).unwrap_or(0)
    }

    /// Directly set a node's raw stored content.
    pub fn set_content(&self, tree: &Address, node_id: &NodeId, content: &str) {
        if let Some(node) = self
            .state()
            .trees
            .get_mut(tree)
            .and_then(|t| t.nodes.get_mut(node_id))
        {
            node.content = content.to_string();
        }
    }

    fn execute(
        &self,
        state: &mut ChainState,
        contract: &Address,
        call: &ContractCall,
        nonce: u64,
    ) -> Result<Vec<ChainEvent>, String> {
        let signer = self.signer.clone();
        let timestamp = chrono::Utc::now().timestamp();
        let tree = state
            .trees
            .get_mut(contract)
            .ok_or_else(|| format!("no tree contract at {}", contract))?;

        match call {
            ContractCall::AddNode {
                parent_id,
                content,
                store_ref,
                model_id,
                author,
            } => {
                if !tree.nodes.contains_key(parent_id) {
                    return Err("Parent node does not exist".to_string());
                }
                let stored = store_ref.clone().unwrap_or_else(|| content.clone());
                let record = new_record(contract, parent_id, stored, author, &signer, model_id, nonce, timestamp);
                let event = created_event(&record);
                tree.nodes.insert(record.node_id.clone(), record);
                Ok(vec![event])
            }
            ContractCall::AddNodeWithToken {
                parent_id,
                content,
                model_id,
                author,
                token_supply,
                nft_contract,
            } => {
                if tree.nft.as_ref() != Some(nft_contract) {
                    return Err("NFT contract mismatch".to_string());
                }
                if !tree.nodes.contains_key(parent_id) {
                    return Err("Parent node does not exist".to_string());
                }
                let mut record =
                    new_record(contract, parent_id, content.clone(), author, &signer, model_id, nonce, timestamp);
                tree.minted += 1;
                let token = TokenDetails {
                    token_id: tree.minted.to_string(),
                    token_bound_account_address: Address::new(format!("0x{:040x}", 0xb0_0000 + tree.minted)),
                    token_contract_address: Address::new(format!("0x{:040x}", 0xe2_0000 + tree.minted)),
                };
                record.has_token = true;
                record.token = Some(token.clone());
                let events = vec![
                    created_event(&record),
                    ChainEvent::NodeTokenCreated(NodeTokenCreatedArgs {
                        node_id: record.node_id.clone(),
                        token_id: token.token_id,
                        token_bound_account: token.token_bound_account_address,
                        token_contract: token.token_contract_address,
                    }),
                ];
                tree.balances.insert(record.node_id.clone(), *token_supply);
                tree.nodes.insert(record.node_id.clone(), record);
                Ok(events)
            }
            ContractCall::UpdateNodeContent {
                node_id,
                content,
                store_ref,
            } => {
                let node = tree
                    .nodes
                    .get_mut(node_id)
                    .ok_or_else(|| "Node does not exist".to_string())?;
                node.content = store_ref.clone().unwrap_or_else(|| content.clone());
                Ok(vec![ChainEvent::NodeUpdated(NodeUpdatedArgs {
                    node_id: node_id.clone(),
                    author: signer,
                    timestamp,
                })])
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn new_record(
    contract: &Address,
    parent_id: &NodeId,
    content: String,
    author: &Option<Address>,
    signer: &Address,
    model_id: &str,
    nonce: u64,
    timestamp: i64,
) -> NodeRecord {
    NodeRecord {
        node_id: derive_node_id(contract, parent_id, &content, nonce + 1),
        parent_id: parent_id.clone(),
        content,
        author: author.clone().unwrap_or_else(|| signer.clone()),
        timestamp,
        has_token: false,
        model_id: model_id.to_string(),
        token: None,
    }
}

fn created_event(record: &NodeRecord) -> ChainEvent {
    ChainEvent::NodeCreated(NodeCreatedArgs {
        node_id: record.node_id.clone(),
        parent_id: record.parent_id.clone(),
        author: record.author.clone(),
        timestamp: record.timestamp,
    })
}

/// Ids are derived from content and position, like the contract does.
fn derive_node_id(contract: &Address, parent: &NodeId, content: &str, salt: u64) -> NodeId {
    let seed = format!("{}:{}:{}:{}", contract, parent, salt, content);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes());
    NodeId::from_string(format!("0x{:0>64}", id.simple().to_string()))
}

fn gas_for(call: &ContractCall) -> u64 {
    match call {
        ContractCall::AddNode { .. } => 180_000,
        ContractCall::AddNodeWithToken { .. } => 1_450_000,
        ContractCall::UpdateNodeContent { .. } => 65_000,
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    fn signer(&self) -> &Address {
        &self.signer
    }

    async fn call(
        &self,
        contract: &Address,
        call: &ContractCall,
        nonce: Option<u64>,
    ) -> Result<Receipt, ChainError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state();
        if let Some(error) = state.injected.pop_front() {
            return Err(error);
        }

        let nonce = nonce.unwrap_or(state.next_nonce);
        if nonce < state.next_nonce {
            return Err(ChainError::NonceConflict(format!(
                "nonce too low: next nonce {}, tx nonce {}",
                state.next_nonce, nonce
            )));
        }
        if nonce > state.next_nonce {
            return Err(ChainError::NonceConflict(format!(
                "invalid nonce: next nonce {}, tx nonce {}",
                state.next_nonce, nonce
            )));
        }

        let mined = state.used_nonces.len();
        let fault = state.receipt_faults.remove(&mined);
        state.next_nonce += 1;
        state.block += 1;
        state.used_nonces.push(nonce);
        state.calls.push(call.clone());
        let transaction_hash = format!("0x{}", Uuid::new_v4().simple());
        let block_number = state.block;

        if fault == Some(ReceiptFault::StatusFailed) {
            return Ok(Receipt {
                transaction_hash,
                block_number,
                status: false,
                gas_used: gas_for(call),
                gas_price: GAS_PRICE,
                logs: vec![],
            });
        }

        match self.execute(&mut state, contract, call, nonce) {
            Ok(events) => Ok(Receipt {
                transaction_hash,
                block_number,
                status: true,
                gas_used: gas_for(call),
                gas_price: GAS_PRICE,
                logs: events
                    .iter()
                    .filter(|_| fault != Some(ReceiptFault::DropLogs))
                    .map(|event| {
                        let emitter = match (event, call) {
                            (ChainEvent::NodeTokenCreated(_), ContractCall::AddNodeWithToken { nft_contract, .. }) => {
                                nft_contract
                            }
                            _ => contract,
                        };
                        event.to_log(emitter)
                    })
                    .collect(),
            }),
            Err(reason) => Err(ChainError::Reverted {
                reason,
                transaction_hash: Some(transaction_hash),
            }),
        }
    }

    async fn read(
        &self,
        contract: &Address,
        query: &ContractQuery,
    ) -> Result<serde_json::Value, ChainError> {
        let state = self.state();
        let tree = state
            .trees
            .get(contract)
            .ok_or_else(|| ChainError::Rpc(format!("no tree contract at {}", contract)))?;
        let value = match query {
            ContractQuery::GetNode { node_id } => match tree.nodes.get(node_id) {
                Some(record) => serde_json::to_value(record).map_err(|e| ChainError::Decode(e.to_string()))?,
                None => serde_json::Value::Null,
            },
            ContractQuery::TokenBalance { node_id } => {
                serde_json::Value::from(tree.balances.get(node_id).copied().unwrap_or(0))
            }
            ContractQuery::RootId => serde_json::to_value(&tree.root).map_err(|e| ChainError::Decode(e.to_string()))?,
        };
        Ok(value)
    }

    async fn pending_nonce(&self) -> Result<u64, ChainError> {
        let mut state = self.state();
        if state.stale_reads > 0 {
            state.stale_reads -= 1;
            return Ok(state.next_nonce.saturating_sub(1));
        }
        Ok(state.next_nonce)
    }
}
