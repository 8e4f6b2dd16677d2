mod common;

use {
    clustermate::{
        DeletePolicy, EntryAccessor, FailureCause, KeySpace, Node, OperationCoordinator, OperationLimits,
        RawKey, ReadPolicy, RoutingTable, ServerNode, StoreClientConfig, Utf8KeyConverter,
    },
    common::{Reply, ScriptedAccessor, address, full_node, full_state},
    std::{sync::Arc, time::Duration},
    tokio::time::Instant,
    tokio_util::sync::CancellationToken,
};

fn read_limits() -> OperationLimits {
    OperationLimits::for_reads(&StoreClientConfig::default())
}

/// Nodes in routing order, the ones flagged `true` disabled.
fn routed(ports: &[(u16, bool)]) -> Vec<Arc<ServerNode>> {
    let ks = KeySpace::default();
    let table = RoutingTable::new(ks, Utf8KeyConverter);
    for (port, disabled) in ports {
        let state = full_state(*port).with_disabled(*disabled);
        table.update_direct_state(&state.address, &state, 1, 1, 1);
    }
    table.get_nodes_for_hash(ks.hash(42)).as_slice().to_vec()
}

#[tokio::test(start_paused = true)]
async fn read_skips_missing_and_failed_nodes() {
    let accessor = ScriptedAccessor::new("content")
        .script(1, [Reply::Hang])
        .script(2, [Reply::Missing])
        .script(3, [Reply::Found]);
    let nodes = vec![full_node(1), full_node(2), full_node(3)];
    let coordinator = OperationCoordinator::default();

    let result = coordinator
        .run(&nodes, &read_limits(), ReadPolicy::new(), |node, ctx| {
            accessor.try_get(node, ctx, RawKey::new("key"), None)
        })
        .await;

    assert!(result.succeeded());
    assert!(!result.failed());
    assert_eq!(result.server().unwrap().address(), &address(3));
    assert_eq!(&result.found().unwrap().value()[..], b"content");
    assert_eq!(result.candidates(), 3);

    assert_eq!(result.fail_count(), 1);
    let failure = result.first_fail().unwrap();
    assert_eq!(failure.address(), &address(1));
    assert_eq!(failure.first_call_failure().cause(), &FailureCause::Timeout);
    assert!(failure.is_retriable());

    assert_eq!(result.missing_count(), 1);
    assert_eq!(result.missing()[0].address(), &address(2));
}

#[tokio::test(start_paused = true)]
async fn delete_stops_once_optimal() {
    let accessor = ScriptedAccessor::new("")
        .script(1, [Reply::Found])
        .script(2, [Reply::Server(500)])
        .script(3, [Reply::Hang, Reply::Found]);
    let nodes = vec![full_node(1), full_node(2), full_node(3)];
    let config = StoreClientConfig::builder()
        .with_delete_thresholds(1, 2, 3)
        .with_retry_rounds(3, 1)
        .build()
        .unwrap();
    let coordinator = OperationCoordinator::default();

    let result = coordinator
        .run(
            &nodes,
            &OperationLimits::for_deletes(&config),
            DeletePolicy::new(1, 2, 3),
            |node, ctx| accessor.try_delete(node, ctx, RawKey::new("key")),
        )
        .await;

    assert!(result.succeeded());
    let outcome = result.outcome();
    assert_eq!(outcome.ok_count(), 2);
    assert!(outcome.is_optimal());
    let succeeded: Vec<_> = outcome.succeeded_nodes().iter().map(|n| n.address().port()).collect();
    assert_eq!(succeeded, vec![1, 3]);

    assert_eq!(result.fail_count(), 1);
    let failure = result.first_fail().unwrap();
    assert_eq!(failure.address(), &address(2));
    assert_eq!(failure.first_call_failure().status(), Some(500));
    assert!(!failure.is_retriable());

    // One retry of node 3 was enough.
    assert_eq!(accessor.calls().len(), 4);
    assert_eq!(accessor.calls_to(3), 2);
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_attempts() {
    let accessor = ScriptedAccessor::new("content");
    let accessor = (1..=4).fold(accessor, |acc, port| acc.script(port, [Reply::Hang]));
    let nodes: Vec<_> = (1..=4).map(full_node).collect();
    let limits = OperationLimits {
        operation_timeout: Duration::from_secs(5),
        call_timeout: Duration::from_secs(3),
        ..read_limits()
    };
    let coordinator = OperationCoordinator::default();

    let start = Instant::now();
    let result = coordinator
        .run(&nodes, &limits, ReadPolicy::new(), |node, ctx| {
            accessor.try_head(node, ctx, RawKey::new("key"))
        })
        .await;
    let elapsed = start.elapsed();

    assert!(result.failed());
    assert!(elapsed <= limits.operation_timeout, "took {elapsed:?}");

    let last_valid = start + limits.operation_timeout - limits.minimum_timeout;
    let calls = accessor.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| call.at < last_valid));

    // Second call only got what was left of the budget.
    let second = &result.failures()[1];
    assert_eq!(second.first_call_failure().duration(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn disabled_nodes_are_last_resort() {
    let accessor = ScriptedAccessor::new("content")
        .script(1, [Reply::Found])
        .script(2, [Reply::Transport]);
    let nodes = routed(&[(1, true), (2, false)]);
    assert_eq!(nodes[0].address(), &address(2));
    let coordinator = OperationCoordinator::default();

    let result = coordinator
        .run(&nodes, &read_limits(), ReadPolicy::new(), |node, ctx| {
            accessor.try_head(node, ctx, RawKey::new("key"))
        })
        .await;

    assert_eq!(result.server().unwrap().address(), &address(1));
    assert_eq!(*result.found().unwrap().value(), 7);

    // Enabled node failed in the primary and the retry round, before the
    // disabled node was tried.
    let ports: Vec<_> = accessor.calls().iter().map(|c| c.port).collect();
    assert_eq!(ports, vec![2, 2, 1]);
    assert_eq!(result.fail_count(), 1);
    assert_eq!(result.first_fail().unwrap().failure_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn extra_retry_rounds_are_bounded() {
    let accessor = ScriptedAccessor::new("content").script(1, [Reply::Transport]);
    let nodes = vec![full_node(1)];
    let limits = OperationLimits {
        max_retry_rounds: 2,
        ..read_limits()
    };
    let coordinator = OperationCoordinator::default();

    let start = Instant::now();
    let result = coordinator
        .run(&nodes, &limits, ReadPolicy::new(), |node, ctx| {
            accessor.try_head(node, ctx, RawKey::new("key"))
        })
        .await;

    assert!(result.failed());
    // Primary, retry and two extra rounds.
    assert_eq!(accessor.calls_to(1), 4);
    assert_eq!(result.first_fail().unwrap().failure_count(), 4);

    // Quick rounds are separated by the retry delay.
    let calls = accessor.calls();
    for pair in calls.windows(2) {
        assert_eq!(pair[1].at - pair[0].at, limits.retry_delay);
    }
    assert_eq!(start.elapsed(), limits.retry_delay * 3);
}

#[tokio::test(start_paused = true)]
async fn without_retries_every_node_is_tried_once() {
    let accessor = ScriptedAccessor::new("content")
        .script(1, [Reply::Transport])
        .script(2, [Reply::Transport]);
    let nodes = routed(&[(1, false), (2, true)]);
    let limits = OperationLimits {
        allow_retries: false,
        ..read_limits()
    };
    let coordinator = OperationCoordinator::default();

    let start = Instant::now();
    let result = coordinator
        .run(&nodes, &limits, ReadPolicy::new(), |node, ctx| {
            accessor.try_get(node, ctx, RawKey::new("key"), None)
        })
        .await;

    assert!(result.failed());
    assert_eq!(result.fail_count(), 2);
    assert!(result.failures().iter().all(|f| f.failure_count() == 1));
    let ports: Vec<_> = accessor.calls().iter().map(|c| c.port).collect();
    assert_eq!(ports, vec![1, 2]);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_calls() {
    let accessor = ScriptedAccessor::new("content")
        .script(1, [Reply::Hang])
        .script(2, [Reply::Found]);
    let nodes = vec![full_node(1), full_node(2)];
    let stop = CancellationToken::new();
    let coordinator = OperationCoordinator::new(stop.clone());

    let limits = read_limits();
    let operation = coordinator.run(&nodes, &limits, ReadPolicy::new(), |node, ctx| {
        accessor.try_get(node, ctx, RawKey::new("key"), None)
    });
    let interrupt = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.cancel();
    };
    let (result, ()) = tokio::join!(operation, interrupt);

    assert!(result.failed());
    assert_eq!(accessor.calls().len(), 1);
    let failure = result.first_fail().unwrap().first_call_failure();
    assert_eq!(failure.cause(), &FailureCause::Interrupted);
    assert_eq!(failure.duration(), Duration::from_millis(100));
}

#[tokio::test]
async fn too_few_candidates() {
    let accessor = ScriptedAccessor::new("").script(1, [Reply::Found]);
    let nodes = vec![full_node(1)];
    let coordinator = OperationCoordinator::default();

    let result = coordinator
        .run(
            &nodes,
            &read_limits(),
            DeletePolicy::new(2, 2, 3),
            |node, ctx| accessor.try_delete(node, ctx, RawKey::new("key")),
        )
        .await;

    assert!(!result.succeeded());
    assert!(!result.failed());
    assert_eq!(result.candidates(), 1);
    assert!(accessor.calls().is_empty());
}

fn delete_limits() -> OperationLimits {
    OperationLimits::for_deletes(&StoreClientConfig::default())
}

#[tokio::test(start_paused = true)]
async fn delete_primary_round_ends_at_first_disabled_node() {
    let accessor = ScriptedAccessor::new("")
        .script(1, [Reply::Found])
        .script(2, [Reply::Found])
        .script(3, [Reply::Found]);
    // Put an enabled node after the disabled one.
    let sorted = routed(&[(1, false), (2, false), (3, true)]);
    let nodes = vec![Arc::clone(&sorted[0]), Arc::clone(&sorted[2]), Arc::clone(&sorted[1])];
    assert!(nodes[1].is_disabled());
    let coordinator = OperationCoordinator::default();

    let result = coordinator
        .run(&nodes, &delete_limits(), DeletePolicy::new(2, 2, 3), |node, ctx| {
            accessor.try_delete(node, ctx, RawKey::new("key"))
        })
        .await;

    // Node 2 is left for the disabled sweep, which stops at minimal.
    let ports: Vec<_> = accessor.calls().iter().map(|c| c.port).collect();
    assert_eq!(ports, vec![1, 3]);
    assert!(result.succeeded());
    assert_eq!(result.outcome().ok_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn delete_skips_disabled_nodes_once_minimal() {
    let accessor = ScriptedAccessor::new("")
        .script(1, [Reply::Found])
        .script(2, [Reply::Server(500)])
        .script(3, [Reply::Found]);
    let nodes = routed(&[(1, false), (2, false), (3, true)]);
    let coordinator = OperationCoordinator::default();

    let result = coordinator
        .run(&nodes, &delete_limits(), DeletePolicy::new(1, 2, 3), |node, ctx| {
            accessor.try_delete(node, ctx, RawKey::new("key"))
        })
        .await;

    let ports: Vec<_> = accessor.calls().iter().map(|c| c.port).collect();
    assert_eq!(ports, vec![1, 2]);
    assert!(result.succeeded());
    assert!(!result.outcome().is_optimal());
    assert_eq!(result.outcome().ok_count(), 1);
    assert_eq!(result.fail_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_skips_extra_rounds_once_minimal() {
    let accessor = ScriptedAccessor::new("")
        .script(1, [Reply::Found])
        .script(2, [Reply::Transport]);
    let nodes = vec![full_node(1), full_node(2)];
    let limits = delete_limits();
    let coordinator = OperationCoordinator::default();

    let start = Instant::now();
    let result = coordinator
        .run(&nodes, &limits, DeletePolicy::new(1, 2, 2), |node, ctx| {
            accessor.try_delete(node, ctx, RawKey::new("key"))
        })
        .await;

    // Primary and one retry round; no extra rounds, nor delays for them.
    assert_eq!(accessor.calls_to(2), 2);
    assert_eq!(start.elapsed(), limits.retry_delay);
    assert!(result.succeeded());
    assert_eq!(result.outcome().ok_count(), 1);
    assert_eq!(result.first_fail().unwrap().failure_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn deadline_checked_in_retry_round() {
    let accessor = ScriptedAccessor::new("content")
        .script(1, [Reply::Hang])
        .script(2, [Reply::Hang]);
    let nodes = vec![full_node(1), full_node(2)];
    let limits = OperationLimits {
        operation_timeout: Duration::from_secs(8),
        call_timeout: Duration::from_secs(3),
        ..read_limits()
    };
    let coordinator = OperationCoordinator::default();

    let start = Instant::now();
    let result = coordinator
        .run(&nodes, &limits, ReadPolicy::new(), |node, ctx| {
            accessor.try_head(node, ctx, RawKey::new("key"))
        })
        .await;

    // Node 1 is retried with what is left; node 2 is not, the deadline
    // having passed in between.
    let calls: Vec<_> = accessor.calls().iter().map(|c| (c.port, c.at - start)).collect();
    assert_eq!(
        calls,
        vec![
            (1, Duration::ZERO),
            (2, Duration::from_secs(3)),
            (1, Duration::from_secs(6)),
        ]
    );
    assert_eq!(start.elapsed(), limits.operation_timeout);
    assert!(result.failed());
    assert_eq!(result.failures()[0].failure_count(), 2);
    assert_eq!(
        result.failures()[0].last_call_failure().duration(),
        Duration::from_secs(2)
    );
    assert_eq!(result.failures()[1].failure_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_checked_in_extra_rounds() {
    let accessor = ScriptedAccessor::new("content").script(1, [Reply::Hang]);
    let nodes = vec![full_node(1)];
    let limits = OperationLimits {
        operation_timeout: Duration::from_secs(10),
        call_timeout: Duration::from_secs(3),
        max_retry_rounds: 5,
        ..read_limits()
    };
    let coordinator = OperationCoordinator::default();

    let start = Instant::now();
    let result = coordinator
        .run(&nodes, &limits, ReadPolicy::new(), |node, ctx| {
            accessor.try_head(node, ctx, RawKey::new("key"))
        })
        .await;

    // Slow rounds follow each other without delay; the last attempt only
    // gets the remaining second, and the remaining rounds are dropped.
    let at: Vec<_> = accessor.calls().iter().map(|c| (c.at - start).as_secs()).collect();
    assert_eq!(at, vec![0, 3, 6, 9]);
    assert_eq!(start.elapsed(), limits.operation_timeout);
    let failure = result.first_fail().unwrap();
    assert_eq!(failure.failure_count(), 4);
    assert_eq!(failure.last_call_failure().duration(), Duration::from_secs(1));
}
