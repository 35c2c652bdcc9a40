// tests/property_graph.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use opgraph::{ExecutionOptions, OperationExecutionManager, OperationStatus};
use opgraph_test_utils::builders::OperationBuilder;
use opgraph_test_utils::fake_runner::{ExecutionLog, TestRunner};

/// A random DAG as (dependency lists, weights, parallelism). Acyclicity is
/// guaranteed by only allowing operation N to depend on operations 0..N-1.
fn dag_strategy(max_ops: usize) -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<u64>, usize)> {
    (2..=max_ops).prop_flat_map(|num_ops| {
        let deps = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_ops),
            num_ops,
        );
        let weights = proptest::collection::vec(1u64..5, num_ops);
        (deps, weights, 1usize..=4).prop_map(move |(raw_deps, weights, parallelism)| {
            let deps = raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    // Sanitize: only deps with index < i, deduplicated.
                    let mut valid = BTreeSet::new();
                    for dep in potential {
                        if i > 0 {
                            valid.insert(dep % i);
                        }
                    }
                    valid.into_iter().collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();
            (deps, weights, parallelism)
        })
    })
}

fn build_graph(
    deps: &[Vec<usize>],
    weights: &[u64],
    log: &Arc<ExecutionLog>,
) -> Vec<Arc<opgraph::Operation>> {
    let mut operations = Vec::with_capacity(deps.len());
    for (i, dependency_indices) in deps.iter().enumerate() {
        let name = format!("op{i}");
        let log = Arc::clone(log);
        let runner_name = name.clone();
        let runner = TestRunner::from_fn(&name, move |_context| {
            let log = Arc::clone(&log);
            let name = runner_name.clone();
            Box::pin(async move {
                log.record_start(&name);
                tokio::task::yield_now().await;
                log.record_finish(&name);
                Ok(OperationStatus::Success)
            })
        });

        let mut builder = OperationBuilder::new(&name).weight(weights[i]).runner(runner);
        for &dep in dependency_indices {
            builder = builder.depends_on(&operations[dep]);
        }
        operations.push(builder.build());
    }
    operations
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn critical_path_lengths_bound_weights((deps, weights, _parallelism) in dag_strategy(10)) {
        let log = ExecutionLog::new();
        let operations = build_graph(&deps, &weights, &log);

        // Construction memoizes every critical path length.
        let _manager = OperationExecutionManager::new(operations.iter().cloned())
            .expect("generated graphs are acyclic");

        for operation in &operations {
            let length = operation.critical_path_length().expect("memoized at construction");
            prop_assert!(length >= operation.weight());
            if operation.consumers().is_empty() {
                prop_assert_eq!(length, operation.weight());
            }
            for consumer in operation.consumers() {
                let consumer_length = consumer.critical_path_length().expect("memoized");
                prop_assert!(length >= operation.weight() + consumer_length);
            }
        }
    }

    #[test]
    fn execution_settles_everything_in_dependency_order(
        (deps, weights, parallelism) in dag_strategy(10)
    ) {
        let log = ExecutionLog::new();
        let operations = build_graph(&deps, &weights, &log);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        let status = runtime.block_on(async {
            let manager = OperationExecutionManager::new(operations.iter().cloned())
                .expect("generated graphs are acyclic");
            manager.execute(&ExecutionOptions::new(parallelism)).await
        });

        prop_assert_eq!(status, OperationStatus::Success);

        let started = log.started();
        prop_assert_eq!(started.len(), operations.len());
        prop_assert!(log.max_concurrent() <= parallelism);

        for operation in &operations {
            prop_assert_eq!(operation.status(), Some(OperationStatus::Success));
            let position = started
                .iter()
                .position(|name| name == operation.name())
                .expect("every operation started");
            for dependency in operation.dependencies() {
                let dependency_position = started
                    .iter()
                    .position(|name| name == dependency.name())
                    .expect("every dependency started");
                prop_assert!(dependency_position < position);
            }
        }
    }
}
