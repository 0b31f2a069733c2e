//! Receipt log decoding
//!
//! Each known event has a fixed signature carried in `topics[0]` and a JSON
//! argument payload in `data`. Decoding is a pure function from one raw log to
//! an event, `None` on any mismatch.

use super::Log;
use crate::tree::{Address, NodeId};
use serde::{Deserialize, Serialize};

pub const NODE_CREATED_SIGNATURE: &str = "NodeCreated(bytes32,bytes32,address,uint256)";
pub const NODE_UPDATED_SIGNATURE: &str = "NodeUpdated(bytes32,address,uint256)";
pub const NODE_TOKEN_CREATED_SIGNATURE: &str = "NodeTokenCreated(bytes32,uint256,address,address)";

/// The events the tree contracts emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NodeCreated,
    NodeUpdated,
    NodeTokenCreated,
}

impl EventKind {
    pub fn signature(&self) -> &'static str {
        match self {
            Self::NodeCreated => NODE_CREATED_SIGNATURE,
            Self::NodeUpdated => NODE_UPDATED_SIGNATURE,
            Self::NodeTokenCreated => NODE_TOKEN_CREATED_SIGNATURE,
        }
    }

    fn from_signature(signature: &str) -> Option<Self> {
        [Self::NodeCreated, Self::NodeUpdated, Self::NodeTokenCreated]
            .into_iter()
            .find(|kind| kind.signature() == signature)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCreatedArgs {
    pub node_id: NodeId,
    pub parent_id: NodeId,
    pub author: Address,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdatedArgs {
    pub node_id: NodeId,
    pub author: Address,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTokenCreatedArgs {
    pub node_id: NodeId,
    pub token_id: String,
    pub token_bound_account: Address,
    pub token_contract: Address,
}

/// A decoded contract event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEvent {
    NodeCreated(NodeCreatedArgs),
    NodeUpdated(NodeUpdatedArgs),
    NodeTokenCreated(NodeTokenCreatedArgs),
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NodeCreated(_) => EventKind::NodeCreated,
            Self::NodeUpdated(_) => EventKind::NodeUpdated,
            Self::NodeTokenCreated(_) => EventKind::NodeTokenCreated,
        }
    }

    /// Encode as a raw log emitted by `contract`.
    pub fn to_log(&self, contract: &Address) -> Log {
        let data = match self {
            Self::NodeCreated(args) => serde_json::to_vec(args),
            Self::NodeUpdated(args) => serde_json::to_vec(args),
            Self::NodeTokenCreated(args) => serde_json::to_vec(args),
        }
        .unwrap_or_default();
        Log {
            address: contract.clone(),
            topics: vec![self.kind().signature().to_string()],
            data,
        }
    }
}

/// Decode one log against the known event schemas.
pub fn decode_log(log: &Log) -> Option<ChainEvent> {
    let kind = EventKind::from_signature(log.topics.first()?)?;
    match kind {
        EventKind::NodeCreated => serde_json::from_slice(&log.data).ok().map(ChainEvent::NodeCreated),
        EventKind::NodeUpdated => serde_json::from_slice(&log.data).ok().map(ChainEvent::NodeUpdated),
        EventKind::NodeTokenCreated => serde_json::from_slice(&log.data)
            .ok()
            .map(ChainEvent::NodeTokenCreated),
    }
}

/// First log emitted by `contract` that decodes as `kind`.
pub fn find_event(contract: &Address, logs: &[Log], kind: EventKind) -> Option<ChainEvent> {
    logs.iter()
        .filter(|log| &log.address == contract)
        .filter_map(decode_log)
        .find(|event| event.kind() == kind)
}

/// The node-created event for `contract`, if the receipt carries one.
pub fn find_node_created(contract: &Address, logs: &[Log]) -> Option<NodeCreatedArgs> {
    match find_event(contract, logs, EventKind::NodeCreated)? {
        ChainEvent::NodeCreated(args) => Some(args),
        _ => None,
    }
}

/// The node-updated event for `node_id` emitted by `contract`.
pub fn find_node_updated(contract: &Address, logs: &[Log], node_id: &NodeId) -> Option<NodeUpdatedArgs> {
    logs.iter()
        .filter(|log| &log.address == contract)
        .filter_map(decode_log)
        .find_map(|event| match event {
            ChainEvent::NodeUpdated(args) if &args.node_id == node_id => Some(args),
            _ => None,
        })
}

/// The token-minted event for `node_id` emitted by `contract`.
pub fn find_node_token(contract: &Address, logs: &[Log], node_id: &NodeId) -> Option<NodeTokenCreatedArgs> {
    logs.iter()
        .filter(|log| &log.address == contract)
        .filter_map(decode_log)
        .find_map(|event| match event {
            ChainEvent::NodeTokenCreated(args) if &args.node_id == node_id => Some(args),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(node: &str) -> ChainEvent {
        ChainEvent::NodeCreated(NodeCreatedArgs {
            node_id: NodeId::from_string(node),
            parent_id: NodeId::root_parent(),
            author: Address::new("0xa"),
            timestamp: 1,
        })
    }

    #[test]
    fn decodes_known_event() {
        let log = created("0x1").to_log(&Address::new("0xtree"));
        assert_eq!(decode_log(&log), Some(created("0x1")));
    }

    #[test]
    fn unknown_signature_decodes_to_none() {
        let log = Log {
            address: Address::new("0xtree"),
            topics: vec!["Transfer(address,address,uint256)".into()],
            data: b"{}".to_vec(),
        };
        assert_eq!(decode_log(&log), None);
    }

    #[test]
    fn malformed_payload_decodes_to_none() {
        let log = Log {
            address: Address::new("0xtree"),
            topics: vec![NODE_CREATED_SIGNATURE.into()],
            data: b"not json".to_vec(),
        };
        assert_eq!(decode_log(&log), None);

        let no_topics = Log {
            address: Address::new("0xtree"),
            topics: vec![],
            data: vec![],
        };
        assert_eq!(decode_log(&no_topics), None);
    }

    #[test]
    fn find_event_skips_other_contracts_and_kinds() {
        let tree = Address::new("0xtree");
        let other = Address::new("0xother");
        let update = ChainEvent::NodeUpdated(NodeUpdatedArgs {
            node_id: NodeId::from_string("0x9"),
            author: Address::new("0xa"),
            timestamp: 1,
        });
        let logs = vec![
            created("0x7").to_log(&other),
            update.to_log(&tree),
            created("0x8").to_log(&tree),
            created("0x9").to_log(&tree),
        ];

        let found = find_node_created(&tree, &logs).unwrap();
        assert_eq!(found.node_id, NodeId::from_string("0x8"));
        assert!(find_event(&other, &logs, EventKind::NodeUpdated).is_none());

        let updated = find_node_updated(&tree, &logs, &NodeId::from_string("0x9")).unwrap();
        assert_eq!(updated.timestamp, 1);
        assert!(find_node_updated(&tree, &logs, &NodeId::from_string("0x8")).is_none());
    }

    #[test]
    fn token_event_matches_by_node() {
        let nft = Address::new("0xnft");
        let token = |node: &str, id: &str| {
            ChainEvent::NodeTokenCreated(NodeTokenCreatedArgs {
                node_id: NodeId::from_string(node),
                token_id: id.into(),
                token_bound_account: Address::new("0xtba"),
                token_contract: Address::new("0xerc20"),
            })
            .to_log(&nft)
        };
        let logs = vec![token("0x1", "1"), token("0x2", "2")];
        let found = find_node_token(&nft, &logs, &NodeId::from_string("0x2")).unwrap();
        assert_eq!(found.token_id, "2");
        assert!(find_node_token(&nft, &logs, &NodeId::from_string("0x3")).is_none());
    }
}
