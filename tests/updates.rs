//! Node edits: per-node mutual exclusion, splits, and store-backed content.

mod common;

use common::{no_spacing, Fixture};
use loomchain::{
    ContractCall, LoomEvent, ManualNodeRequest, MemoryChain, MockProvider, NodeId, OrchestratorError,
    Placement, SplitRelation, SplitRequest, TreeRef, UpdateRequest,
};
use std::time::Duration;

fn edit(tree: &TreeRef, node: &NodeId, content: &str) -> UpdateRequest {
    UpdateRequest {
        tree: tree.clone(),
        node_id: node.clone(),
        content: content.to_string(),
        model_id: None,
        author: None,
        split: None,
    }
}

async fn add(f: &Fixture, tree: &TreeRef, parent: &NodeId, text: &str, placement: Placement) -> NodeId {
    f.api
        .add_node(ManualNodeRequest {
            tree: tree.clone(),
            parent_id: parent.clone(),
            content: text.to_string(),
            author: None,
            placement,
        })
        .await
        .unwrap()
        .view
        .node_id
}

fn content_updates(chain: &MemoryChain) -> usize {
    chain
        .calls()
        .iter()
        .filter(|c| matches!(c, ContractCall::UpdateNodeContent { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn overlapping_updates_of_one_node_submit_once() {
    let f = Fixture::with(
        MemoryChain::new("0xsigner").with_latency(Duration::from_millis(50)),
        MockProvider::always("x", 1),
        no_spacing(),
    );
    let (tree, root) = f.chain.create_tree("root", false);
    let node = add(&f, &tree, &root, "draft", Placement::Lightweight).await;

    let (a, b) = tokio::join!(
        f.api.update_node(edit(&tree, &node, "first edit")),
        f.api.update_node(edit(&tree, &node, "second edit")),
    );

    let (ok, rejected) = match (a, b) {
        (Ok(ok), Err(e)) | (Err(e), Ok(ok)) => (ok, e),
        other => panic!("expected exactly one rejection, got {:?}", other),
    };
    assert_eq!(ok.node_id, node);
    assert!(matches!(rejected, OrchestratorError::UpdateInProgress(ref id) if *id == node));
    assert!(rejected.to_string().contains("in progress"));
    assert_eq!(content_updates(&f.chain), 1);
    assert_eq!(f.sink.count("nodeUpdated"), 1);

    // The lock is released once the first update resolves.
    f.api.update_node(edit(&tree, &node, "third edit")).await.unwrap();
    assert_eq!(content_updates(&f.chain), 2);
}

#[tokio::test(start_paused = true)]
async fn different_nodes_update_concurrently() {
    let f = Fixture::with(
        MemoryChain::new("0xsigner").with_latency(Duration::from_millis(50)),
        MockProvider::always("x", 1),
        no_spacing(),
    );
    let (tree, root) = f.chain.create_tree("root", false);
    let left = add(&f, &tree, &root, "left", Placement::Lightweight).await;
    let right = add(&f, &tree, &root, "right", Placement::Lightweight).await;

    let (a, b) = tokio::join!(
        f.api.update_node(edit(&tree, &left, "left, edited")),
        f.api.update_node(edit(&tree, &right, "right, edited")),
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(content_updates(&f.chain), 2);
    assert!(!f.api.services().edit_lock.is_locked(&left));
}

#[tokio::test]
async fn store_backed_text_round_trips() {
    let f = Fixture::with(MemoryChain::new("0xsigner"), MockProvider::always("x", 1), no_spacing());
    let (tree, root) = f.chain.create_tree("root", false);
    let text = "A long passage kept off chain.\nWith a second line.";

    let node = add(&f, &tree, &root, text, Placement::StoreBacked).await;

    let raw = f.chain.node(&tree.address, &node).unwrap().content;
    assert!(loomchain::store::is_reference(&raw));
    assert_eq!(f.store.len(), 1);
    assert_eq!(f.api.get_node(&tree, &node).await.unwrap().content, text);

    f.api.update_node(edit(&tree, &node, "Rewritten passage.")).await.unwrap();

    let raw = f.chain.node(&tree.address, &node).unwrap().content;
    assert!(loomchain::store::is_reference(&raw));
    assert_eq!(f.api.get_node(&tree, &node).await.unwrap().content, "Rewritten passage.");
}

#[tokio::test(start_paused = true)]
async fn child_split_hangs_off_the_edited_node() {
    let f = Fixture::new(MockProvider::always("x", 1));
    let (tree, root) = f.chain.create_tree("root", false);
    let node = add(&f, &tree, &root, "Before the split. After the split.", Placement::Lightweight).await;

    let mut request = edit(&tree, &node, "Before the split.");
    request.split = Some(SplitRequest {
        relation: SplitRelation::Child,
        content: "After the split.".into(),
        placement: Placement::Lightweight,
        model_id: None,
    });
    let outcome = f.api.update_node(request).await.unwrap();

    let split = outcome.split.unwrap();
    let record = f.chain.node(&tree.address, &split.node_id).unwrap();
    assert_eq!(record.parent_id, node);
    assert_eq!(record.content, "After the split.");

    // Update first, then the split node.
    let names: Vec<&str> = f.sink.events().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["nodeCreated", "nodeUpdated", "nodeCreated"]);
}

#[tokio::test(start_paused = true)]
async fn token_node_update_refreshes_balance() {
    let f = Fixture::with(MemoryChain::new("0xsigner"), MockProvider::always("x", 1), no_spacing());
    let (tree, root) = f.chain.create_tree("root", true);
    let node = add(&f, &tree, &root, "four words of text", Placement::TokenBearing).await;

    f.api.update_node(edit(&tree, &node, "now five words of text")).await.unwrap();

    let balance = f.sink.events().into_iter().find_map(|e| match e {
        LoomEvent::TokenBalanceUpdated(update) => Some(update),
        _ => None,
    });
    let balance = balance.unwrap();
    assert_eq!(balance.node_id, node);
    assert_eq!(balance.balance, 4);
    assert_eq!(f.api.get_node(&tree, &node).await.unwrap().content, "now five words of text");
}

#[tokio::test]
async fn missing_node_rejects_without_submission() {
    let f = Fixture::with(MemoryChain::new("0xsigner"), MockProvider::always("x", 1), no_spacing());
    let (tree, _) = f.chain.create_tree("root", false);

    let result = f.api.update_node(edit(&tree, &NodeId::from_string("0xdead"), "text")).await;

    assert!(result.is_err());
    assert_eq!(content_updates(&f.chain), 0);
    assert!(!f.api.services().edit_lock.is_locked(&NodeId::from_string("0xdead")));
}
