//! Broadcast events and sinks
//!
//! Orchestrators push state changes into an [`EventSink`]. Emission is
//! fire-and-forget: no acknowledgment, no delivery guarantee, and a sink with
//! no observers silently drops the event.

use crate::tree::{Address, NodeId, NodeView};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Summary of one generation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub success: bool,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_requested: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// Summary of one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub success: bool,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_nodes: usize,
}

/// An in-place content update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub node_id: NodeId,
    pub content: String,
    pub tree_address: Address,
    pub model_id: String,
    pub timestamp: i64,
    pub transaction_ref: String,
}

/// A refreshed token balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdate {
    pub node_id: NodeId,
    pub tree_address: Address,
    pub balance: u64,
    pub timestamp: i64,
}

/// A state change pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum LoomEvent {
    NodeCreated(NodeView),
    NodeUpdated(NodeUpdate),
    GenerationComplete(GenerationSummary),
    ImportComplete(ImportSummary),
    TokenBalanceUpdated(BalanceUpdate),
}

impl LoomEvent {
    /// The event name observers subscribe to.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeCreated(_) => "nodeCreated",
            Self::NodeUpdated(_) => "nodeUpdated",
            Self::GenerationComplete(_) => "generationComplete",
            Self::ImportComplete(_) => "importComplete",
            Self::TokenBalanceUpdated(_) => "tokenBalanceUpdated",
        }
    }
}

/// The interface through which orchestrators publish state changes.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LoomEvent);
}

/// Fans events out to every current subscriber over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<LoomEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoomEvent> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: LoomEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }
}

/// Keeps every emitted event, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LoomEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LoomEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn created(&self) -> Vec<NodeView> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LoomEvent::NodeCreated(view) => Some(view),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name() == name).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: LoomEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> LoomEvent {
        LoomEvent::ImportComplete(ImportSummary {
            success: true,
            success_count: 1,
            failed_count: 0,
            total_nodes: 1,
        })
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_event() {
        let sink = BroadcastSink::new(8);
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();
        assert_eq!(sink.observer_count(), 2);

        sink.emit(summary());
        assert_eq!(a.recv().await.unwrap(), summary());
        assert_eq!(b.recv().await.unwrap(), summary());
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let sink = BroadcastSink::default();
        sink.emit(summary());
        assert_eq!(sink.observer_count(), 0);
    }

    #[test]
    fn events_serialize_with_name_and_payload() {
        let json = serde_json::to_value(summary()).unwrap();
        assert_eq!(json["event"], "importComplete");
        assert_eq!(json["payload"]["totalNodes"], 1);
        assert_eq!(summary().name(), "importComplete");
    }

    #[test]
    fn warnings_are_omitted_when_absent() {
        let event = LoomEvent::GenerationComplete(GenerationSummary {
            success: true,
            success_count: 2,
            failed_count: 0,
            total_requested: 2,
            message: "ok".into(),
            warnings: None,
        });
        let json = serde_json::to_value(event).unwrap();
        assert!(json["payload"].get("warnings").is_none());
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(summary());
        sink.emit(LoomEvent::TokenBalanceUpdated(BalanceUpdate {
            node_id: NodeId::from_string("0x1"),
            tree_address: Address::new("0xt"),
            balance: 3,
            timestamp: 0,
        }));
        let names: Vec<_> = sink.events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["importComplete", "tokenBalanceUpdated"]);
        assert_eq!(sink.count("importComplete"), 1);
    }
}
