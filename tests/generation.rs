//! Child generation through the public API: batch accounting, broadcast
//! ordering, and nonce discipline when several orchestrations overlap.

mod common;

use common::{consecutive_from_zero, generate, import_node, no_spacing, Fixture};
use loomchain::{
    BroadcastSink, GenerationSummary, ImportRequest, LoomApi, LoomConfig, LoomEvent, ManualNodeRequest,
    MemoryChain, MemoryContentStore, MockProvider, Placement, ProviderError, UpdateRequest,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn three_requests_one_blank() {
    let f = Fixture::new(
        MockProvider::scripted()
            .with_response("The door opened onto salt flats.", 9)
            .with_response("", 0)
            .with_response("Nobody answered the bell.", 5),
    );
    let (tree, parent) = f.chain.create_tree("P", false);

    let summary = f.api.generate_children(generate(&tree, &parent, 3, "M")).await.unwrap();

    assert_eq!(
        summary,
        GenerationSummary {
            success: true,
            success_count: 2,
            failed_count: 1,
            total_requested: 3,
            message: "Generated 2 of 3 requested nodes".to_string(),
            warnings: Some(vec!["1 generation failed or returned empty responses".to_string()]),
        }
    );

    let created = f.sink.created();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|v| v.parent_id == parent && v.model_id == "M"));
    assert_eq!(f.chain.node_count(&tree.address), 3);

    // Completion is always the last event of the batch.
    let events = f.sink.events();
    assert!(matches!(events.last(), Some(LoomEvent::GenerationComplete(s)) if *s == summary));
}

#[tokio::test(start_paused = true)]
async fn batch_accounting_matches_surviving_generations() {
    // (requested, non-empty) pairs
    for (n, k) in [(1usize, 1usize), (4, 4), (4, 1), (5, 3), (2, 0)] {
        let mut provider = MockProvider::scripted();
        for i in 0..n {
            provider = if i < k {
                provider.with_response(format!("continuation {}", i), 4)
            } else if i % 2 == 0 {
                provider.with_response("  \n", 0)
            } else {
                provider.with_failure(ProviderError::GenerationFailed("overloaded".into()))
            };
        }
        let f = Fixture::with(MemoryChain::new("0xsigner"), provider, no_spacing());
        let (tree, root) = f.chain.create_tree("root", false);

        let summary = f.api.generate_children(generate(&tree, &root, n, "m")).await.unwrap();

        assert_eq!(summary.success_count, k, "n={} k={}", n, k);
        assert_eq!(summary.failed_count, n - k);
        assert_eq!(summary.success, k > 0);
        assert_eq!(summary.warnings.is_some(), 0 < k && k < n);
        assert_eq!(f.sink.created().len(), k);
        assert_eq!(f.sink.count("generationComplete"), 1);
    }
}

#[tokio::test]
async fn subscribers_see_nodes_before_completion() {
    let chain = Arc::new(MemoryChain::new("0xsigner"));
    let sink = Arc::new(BroadcastSink::new(16));
    let mut rx = sink.subscribe();
    let api = LoomApi::new(
        chain.clone(),
        Arc::new(MockProvider::always("onward", 2)),
        Arc::new(MemoryContentStore::new()),
        sink,
        no_spacing(),
    );
    let (tree, root) = chain.create_tree("root", false);

    api.generate_children(generate(&tree, &root, 2, "m")).await.unwrap();

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    assert_eq!(names, vec!["nodeCreated", "nodeCreated", "generationComplete"]);
}

#[tokio::test(start_paused = true)]
async fn overlapping_orchestrations_use_consecutive_nonces() {
    let f = Fixture::with(
        MemoryChain::new("0xsigner").with_latency(Duration::from_millis(25)),
        MockProvider::always("branch", 3),
        no_spacing(),
    );
    let (tree, root) = f.chain.create_tree("shared root", false);
    let (import_tree, _) = f.chain.create_tree("import target", false);

    let editable = f
        .api
        .add_node(ManualNodeRequest {
            tree: tree.clone(),
            parent_id: root.clone(),
            content: "edit me".into(),
            author: None,
            placement: Placement::Lightweight,
        })
        .await
        .unwrap();
    f.chain.lag_nonce_reads(4);

    let manual = |text: &str| ManualNodeRequest {
        tree: tree.clone(),
        parent_id: root.clone(),
        content: text.to_string(),
        author: None,
        placement: Placement::Lightweight,
    };
    let (generated, imported, first, second, updated) = tokio::join!(
        f.api.generate_children(generate(&tree, &root, 4, "m")),
        f.api.import_tree(ImportRequest {
            tree: import_tree.clone(),
            new_root_id: None,
            old_root_id: "old-root".into(),
            nodes: vec![
                import_node("a", "old-root", "one"),
                import_node("b", "a", "two"),
                import_node("c", "a", "three"),
            ],
            author_override: None,
            placement: Placement::Lightweight,
        }),
        f.api.add_node(manual("left")),
        f.api.add_node(manual("right")),
        f.api.update_node(UpdateRequest {
            tree: tree.clone(),
            node_id: editable.view.node_id.clone(),
            content: "edited".into(),
            model_id: None,
            author: None,
            split: None,
        }),
    );

    assert_eq!(generated.unwrap().success_count, 4);
    assert_eq!(imported.unwrap().summary.success_count, 3);
    assert!(first.is_ok() && second.is_ok() && updated.is_ok());

    let nonces = f.chain.used_nonces();
    assert_eq!(nonces.len(), 11);
    assert!(consecutive_from_zero(&nonces), "nonces: {:?}", nonces);
}

#[tokio::test]
async fn rejected_request_broadcasts_nothing() {
    let f = Fixture::with(MemoryChain::new("0xsigner"), MockProvider::always("x", 1), LoomConfig::default());
    let (tree, root) = f.chain.create_tree("root", false);

    let err = f.api.generate_children(generate(&tree, &root, 0, "m")).await.unwrap_err();

    assert!(err.is_precondition());
    assert!(f.sink.events().is_empty());
    assert!(f.provider.requests().is_empty());
}
