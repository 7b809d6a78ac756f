mod support;

use std::sync::Arc;

use kindling_core::bootstrap::{init_nodes, wait_nodes_running};
use kindling_core::error::Error;
use kindling_core::node::{NodeRole, NodeStatus};
use kindling_core::ssh::{CommanderFactory, RemoteCommand};

use support::{node, MemoryInventory, MockFactory};

#[tokio::test(start_paused = true)]
async fn init_failure_on_one_node_does_not_stop_the_others() {
    let factory = MockFactory::new();
    factory.fail_node("demo-worker-1");
    let nodes = vec![
        node("demo-master-1", NodeRole::Master, "10.0.0.1"),
        node("demo-worker-1", NodeRole::Worker, "10.0.0.2"),
        node("demo-worker-2", NodeRole::Worker, "10.0.0.3"),
    ];

    let dyn_factory: Arc<dyn CommanderFactory> = factory.clone();
    let err = init_nodes(dyn_factory, &nodes, |_node| {
        vec![RemoteCommand::new("swapoff -a")]
    })
    .await
    .unwrap_err();

    let Error::Aggregate(agg) = err else {
        panic!("expected aggregate, got {err}");
    };
    assert_eq!(agg.len(), 1);
    assert!(agg.errors()[0].to_string().contains("demo-worker-1"));

    // the healthy nodes still ran their sequence
    assert_eq!(factory.log.commands_for("demo-master-1").len(), 1);
    assert_eq!(factory.log.commands_for("demo-worker-2").len(), 1);
    assert!(factory.log.commands_for("demo-worker-1").is_empty());
}

#[tokio::test(start_paused = true)]
async fn init_runs_full_sequence_per_node() {
    let factory = MockFactory::new();
    let nodes = vec![node("demo-master-1", NodeRole::Master, "10.0.0.1")];

    let dyn_factory: Arc<dyn CommanderFactory> = factory.clone();
    init_nodes(dyn_factory, &nodes, |_node| {
        vec![
            RemoteCommand::new("first"),
            RemoteCommand::new("second").enabled_if(false),
            RemoteCommand::new("third"),
        ]
    })
    .await
    .unwrap();

    assert_eq!(
        factory.log.commands_for("demo-master-1"),
        ["first", "third"]
    );
}

#[tokio::test]
async fn wait_returns_once_all_nodes_run() {
    let inventory = MemoryInventory::new(vec![
        node("demo-master-1", NodeRole::Master, "10.0.0.1"),
        node("demo-worker-1", NodeRole::Worker, "10.0.0.2"),
    ]);

    let nodes = wait_nodes_running(&*inventory, "demo", 2).await.unwrap();
    assert_eq!(nodes.len(), 2);
}

#[tokio::test]
async fn wait_rejects_a_zero_node_cluster_without_polling() {
    let inventory = MemoryInventory::new(vec![]);

    // fails straight away instead of burning the whole timeout
    let err = wait_nodes_running(&*inventory, "demo", 0).await.unwrap_err();
    assert!(matches!(err, Error::NodesNotRunning(_)));
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_when_a_node_never_runs() {
    let mut stopped = node("demo-master-1", NodeRole::Master, "10.0.0.1");
    stopped.status = NodeStatus {
        running: false,
        ip_address: String::new(),
    };
    let inventory = MemoryInventory::new(vec![stopped]);

    let err = wait_nodes_running(&*inventory, "demo", 1).await.unwrap_err();
    assert!(matches!(err, Error::NodesNotRunning(_)));
}
