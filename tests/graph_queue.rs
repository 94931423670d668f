// tests/graph_queue.rs

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dagexec::errors::DagexecError;
use dagexec::graph::{Graph, GraphQueue};
use dagexec::manifest::{Manifest, UniqueId};
use dagexec_test_utils::builders::{ManifestBuilder, NodeBuilder};
use dagexec_test_utils::init_tracing;

fn two_model_setup() -> (Arc<Manifest>, Graph, HashSet<UniqueId>) {
    let (manifest, graph) = ManifestBuilder::new()
        .with_node(NodeBuilder::model("test_pkg", "upstream_model"))
        .with_node(
            NodeBuilder::model("test_pkg", "downstream_model")
                .depends_on("model.test_pkg.upstream_model"),
        )
        .build_with_graph();
    let selected = manifest.unique_ids().cloned().collect();
    (Arc::new(manifest), graph, selected)
}

#[test]
fn preserve_edges_keeps_induced_edges_only() {
    init_tracing();
    // a -> b -> c; selecting {a, c} keeps no edges because a -> c is not an
    // edge of the original graph.
    let mut graph = Graph::new();
    graph.add_edge("model.p.a", "model.p.b");
    graph.add_edge("model.p.b", "model.p.c");
    let manifest = Arc::new(
        ManifestBuilder::new()
            .with_node(NodeBuilder::model("p", "a"))
            .with_node(NodeBuilder::model("p", "b"))
            .with_node(NodeBuilder::model("p", "c"))
            .build(),
    );
    let selected: HashSet<UniqueId> = ["model.p.a", "model.p.c"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let queue = GraphQueue::new(&graph, manifest, &selected, true).unwrap();
    let ready = queue.ready_snapshot().unwrap();
    assert_eq!(ready.len(), 2, "both endpoints are immediately ready");
}

#[test]
fn initial_ready_set_respects_dependencies() {
    init_tracing();
    let (manifest, graph, selected) = two_model_setup();
    let queue = GraphQueue::new(&graph, manifest, &selected, true).unwrap();

    assert_eq!(
        queue.ready_snapshot().unwrap(),
        vec![(0, "model.test_pkg.upstream_model".to_string())]
    );

    let first = queue.get(Some(Duration::from_secs(1))).unwrap();
    assert_eq!(first, "model.test_pkg.upstream_model");
    queue.mark_done(&first).unwrap();

    let second = queue.get(Some(Duration::from_secs(1))).unwrap();
    assert_eq!(second, "model.test_pkg.downstream_model");
    queue.mark_done(&second).unwrap();
    assert!(queue.empty().unwrap());
}

#[test]
fn without_edges_everything_is_ready_at_once() {
    init_tracing();
    let (manifest, graph, selected) = two_model_setup();
    let queue = GraphQueue::new(&graph, manifest, &selected, false).unwrap();

    let ready = queue.ready_snapshot().unwrap();
    assert_eq!(ready.len(), 2);
    assert!(ready.iter().all(|(priority, _)| *priority == 0));
    assert_eq!(
        queue.queued_snapshot().unwrap().into_iter().collect::<HashSet<_>>(),
        selected
    );
}

#[test]
fn empty_is_stable_without_intervening_operations() {
    let (manifest, graph, selected) = two_model_setup();
    let queue = GraphQueue::new(&graph, manifest, &selected, true).unwrap();
    assert!(!queue.empty().unwrap());
    assert!(!queue.empty().unwrap());
    assert_eq!(queue.remaining().unwrap(), 2);
}

#[test]
fn dispatch_order_is_deterministic_for_equal_priorities() {
    init_tracing();
    // Five independent nodes: pops must follow graph insertion order.
    let mut graph = Graph::new();
    let mut builder = ManifestBuilder::new();
    for name in ["e", "d", "c", "b", "a"] {
        graph.add_node(format!("model.p.{name}"));
        builder = builder.with_node(NodeBuilder::model("p", name));
    }
    let manifest = Arc::new(builder.build());
    let selected: HashSet<UniqueId> = graph.nodes();

    let queue = GraphQueue::new(&graph, manifest, &selected, true).unwrap();
    let mut popped = Vec::new();
    while let Ok(id) = queue.get(Some(Duration::from_millis(10))) {
        queue.mark_done(&id).unwrap();
        popped.push(id);
    }
    assert_eq!(
        popped,
        vec![
            "model.p.e".to_string(),
            "model.p.d".to_string(),
            "model.p.c".to_string(),
            "model.p.b".to_string(),
            "model.p.a".to_string(),
        ]
    );
}

#[test]
fn concurrent_workers_never_share_a_node() {
    init_tracing();
    // A wide graph drained by four threads; every node must be returned
    // exactly once.
    let mut graph = Graph::new();
    let mut builder = ManifestBuilder::new();
    for i in 0..50 {
        let name = format!("n{i}");
        graph.add_node(format!("model.p.{name}"));
        builder = builder.with_node(NodeBuilder::model("p", &name));
    }
    let manifest = Arc::new(builder.build());
    let selected = graph.nodes();
    let queue = Arc::new(GraphQueue::new(&graph, manifest, &selected, false).unwrap());

    let seen = std::sync::Mutex::new(Vec::new());
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            let seen = &seen;
            scope.spawn(move || loop {
                match queue.get(Some(Duration::from_millis(200))) {
                    Ok(id) => {
                        seen.lock().unwrap().push(id.clone());
                        queue.mark_done(&id).unwrap();
                    }
                    Err(DagexecError::QueueExhausted) => break,
                    Err(e) => panic!("unexpected queue error: {e}"),
                }
            });
        }
    });

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 50);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 50);
}

#[test]
fn exhausted_queue_is_distinct_from_timeout() {
    let (manifest, graph, selected) = two_model_setup();
    let queue = GraphQueue::new(&graph, manifest, &selected, true).unwrap();

    let first = queue.get(None).unwrap();
    // Nothing else can become ready while upstream is in progress.
    assert!(matches!(
        queue.get(Some(Duration::from_millis(10))),
        Err(DagexecError::QueueTimeout(_))
    ));
    queue.mark_done(&first).unwrap();
    let second = queue.get(None).unwrap();
    queue.mark_done(&second).unwrap();

    assert!(matches!(
        queue.get(Some(Duration::from_millis(10))),
        Err(DagexecError::QueueExhausted)
    ));
}

#[test]
fn selection_subset_prunes_the_graph() {
    init_tracing();
    let (manifest, graph, _) = two_model_setup();
    let selected: HashSet<UniqueId> =
        ["model.test_pkg.downstream_model".to_string()].into_iter().collect();
    let queue = GraphQueue::new(&graph, manifest, &selected, true).unwrap();

    // With upstream pruned away, downstream has no unresolved prerequisites.
    assert_eq!(
        queue.ready_snapshot().unwrap(),
        vec![(0, "model.test_pkg.downstream_model".to_string())]
    );
    assert_eq!(queue.remaining().unwrap(), 1);
}
