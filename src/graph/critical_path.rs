// src/graph/critical_path.rs

//! Critical path computation over the consumer direction of the graph.
//!
//! The critical path length of a node is the longest weighted chain from the
//! node to any node with no consumers. It is used as the scheduling priority:
//! among simultaneously runnable operations, the one with the most work
//! transitively depending on it goes first, which minimises the remaining
//! critical path and therefore overall wall-clock time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::errors::GraphError;
use crate::graph::operation::Operation;

/// Compute (and memoize) the critical path length of every operation.
///
/// Values already memoized on a node are reused, so repeated manager
/// construction over the same graph is cheap and stable.
pub fn calculate_critical_path_lengths(operations: &[Arc<Operation>]) -> Result<(), GraphError> {
    for operation in operations {
        let mut visiting = HashSet::new();
        calculate_critical_path_length(operation, &mut visiting)?;
    }
    Ok(())
}

/// Depth-first, memoized critical path length of a single operation.
///
/// `visiting` is the explicit recursion-stack set used for cycle detection;
/// revisiting a member means the consumer graph has a cycle, which is
/// reported with the minimal cyclic path.
pub fn calculate_critical_path_length(
    operation: &Arc<Operation>,
    visiting: &mut HashSet<String>,
) -> Result<u64, GraphError> {
    if let Some(length) = operation.critical_path_length() {
        return Ok(length);
    }

    if !visiting.insert(operation.name().to_string()) {
        let path = calculate_shortest_path(operation, operation);
        return Err(GraphError::Cycle { path });
    }

    let mut longest_consumer_chain = 0;
    for consumer in operation.consumers() {
        longest_consumer_chain =
            longest_consumer_chain.max(calculate_critical_path_length(&consumer, visiting)?);
    }

    visiting.remove(operation.name());

    // A node with no consumers scores its own weight.
    let length = operation.weight() + longest_consumer_chain;
    operation.memoize_critical_path_length(length);
    Ok(length)
}

/// Shortest path (by edge count) from `from` to `to` along consumer edges,
/// inclusive of both endpoints. Used to produce the minimal cycle in error
/// messages; with `from == to` it finds the shortest cycle through the node.
pub fn calculate_shortest_path(from: &Arc<Operation>, to: &Arc<Operation>) -> Vec<String> {
    let mut parents: HashMap<String, String> = HashMap::new();
    let mut queue: VecDeque<Arc<Operation>> = VecDeque::new();

    // Seed with the starting node's consumers so that a cycle back to `from`
    // itself is discoverable.
    for consumer in from.consumers() {
        if !parents.contains_key(consumer.name()) {
            parents.insert(consumer.name().to_string(), from.name().to_string());
            queue.push_back(consumer);
        }
    }

    while let Some(node) = queue.pop_front() {
        if node.name() == to.name() {
            // Walk the parent map back to the origin. The walk always takes
            // at least one step so that a cycle (`from == to`) is rendered as
            // "from -> ... -> from" rather than collapsing to a single node.
            let mut path = vec![node.name().to_string()];
            let mut cursor = node.name().to_string();
            loop {
                let Some(parent) = parents.get(&cursor) else {
                    break;
                };
                path.push(parent.clone());
                if parent == from.name() {
                    break;
                }
                cursor = parent.clone();
            }
            path.reverse();
            return path;
        }

        for consumer in node.consumers() {
            if !parents.contains_key(consumer.name()) {
                parents.insert(consumer.name().to_string(), node.name().to_string());
                queue.push_back(consumer);
            }
        }
    }

    // No path; should not happen when called for a detected cycle.
    vec![from.name().to_string()]
}
