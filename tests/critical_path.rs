// tests/critical_path.rs

use std::sync::Arc;

use opgraph::graph::{calculate_critical_path_lengths, calculate_shortest_path};
use opgraph::{GraphError, Operation, OperationExecutionManager};
use opgraph_test_utils::builders::OperationBuilder;
use opgraph_test_utils::init_tracing;

#[test]
fn chain_lengths_accumulate_towards_the_root() {
    init_tracing();

    let a = Operation::new("a");
    let b = OperationBuilder::new("b").depends_on(&a).build();
    let c = OperationBuilder::new("c").depends_on(&b).build();

    calculate_critical_path_lengths(&[Arc::clone(&a), Arc::clone(&b), Arc::clone(&c)])
        .expect("acyclic chain");

    assert_eq!(a.critical_path_length(), Some(3));
    assert_eq!(b.critical_path_length(), Some(2));
    assert_eq!(c.critical_path_length(), Some(1));
}

#[test]
fn diamond_takes_the_heavier_branch() {
    init_tracing();

    let a = Operation::new("a");
    let heavy = OperationBuilder::new("heavy").weight(3).depends_on(&a).build();
    let light = OperationBuilder::new("light").depends_on(&a).build();
    let d = OperationBuilder::new("d")
        .depends_on(&heavy)
        .depends_on(&light)
        .build();

    let operations = [Arc::clone(&a), Arc::clone(&heavy), Arc::clone(&light), Arc::clone(&d)];
    calculate_critical_path_lengths(&operations).expect("acyclic diamond");

    assert_eq!(d.critical_path_length(), Some(1));
    assert_eq!(heavy.critical_path_length(), Some(4));
    assert_eq!(light.critical_path_length(), Some(2));
    assert_eq!(a.critical_path_length(), Some(5));
}

#[test]
fn cycle_is_rejected_with_the_cyclic_path() {
    init_tracing();

    let a = Operation::new("a");
    let b = OperationBuilder::new("b").depends_on(&a).build();
    a.add_dependency(&b);

    let error = OperationExecutionManager::new([Arc::clone(&a), Arc::clone(&b)])
        .err()
        .expect("cycle must be rejected");

    let GraphError::Cycle { path } = error else {
        panic!("expected a cycle error, got {error:?}");
    };
    assert!(path.len() >= 3);
    assert_eq!(path.first(), path.last());
    assert!(format!("{}", GraphError::Cycle { path })
        .starts_with("a cyclic dependency was encountered: "));
}

#[test]
fn missing_dependency_is_rejected() {
    init_tracing();

    let a = Operation::new("a");
    let b = OperationBuilder::new("b").depends_on(&a).build();

    // `a` is absent from the set, so `b` can never become runnable.
    let error = OperationExecutionManager::new([b]).err().expect("must fail");
    assert_eq!(
        error,
        GraphError::MissingDependency {
            consumer: "b".to_string(),
            dependency: "a".to_string(),
        }
    );
}

#[test]
fn deleting_a_dependency_detaches_both_adjacency_sides() {
    init_tracing();

    let a = Operation::new("a");
    let b = OperationBuilder::new("b").depends_on(&a).build();

    assert_eq!(b.dependency_count(), 1);
    assert_eq!(a.consumers().len(), 1);

    b.delete_dependency(&a);

    assert_eq!(b.dependency_count(), 0);
    assert!(b.dependencies().is_empty());
    assert!(a.consumers().is_empty());

    // Both are roots now; each critical path is just its own weight.
    calculate_critical_path_lengths(&[Arc::clone(&a), Arc::clone(&b)])
        .expect("acyclic after edge removal");
    assert_eq!(a.critical_path_length(), Some(1));
    assert_eq!(b.critical_path_length(), Some(1));
}

#[test]
fn shortest_path_walks_consumer_edges() {
    init_tracing();

    let a = Operation::new("a");
    let b = OperationBuilder::new("b").depends_on(&a).build();
    let c = OperationBuilder::new("c").depends_on(&b).build();
    // Direct edge a -> c as well; the shortest path must skip b.
    c.add_dependency(&a);

    assert_eq!(calculate_shortest_path(&a, &c), vec!["a", "c"]);
    assert_eq!(calculate_shortest_path(&a, &b), vec!["a", "b"]);
}
