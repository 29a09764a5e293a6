//! Plan graph optimization.
//!
//! Two passes run to a fixed point: transitive reduction, and squashing of
//! empty stage boundary pairs.

use tracing::debug;

use crate::error::GraphError;

use super::dag::Dag;
use super::operation::{Boundary, Operation, OperationConfig};

/// Optimizes a plan graph in place. Returns the number of removed edges and
/// vertices. Running it on an optimized graph changes nothing.
///
/// # Errors
///
/// Returns a graph error only if the graph invariants were already broken.
pub fn optimize(dag: &mut Dag<Operation>) -> Result<usize, GraphError> {
    let mut total = 0;
    loop {
        let changes = dag.transitive_reduction() + squash_meta_nodes(dag)?;
        if changes == 0 {
            break;
        }
        total += changes;
    }

    debug!("Plan optimized: {total} edges/vertices removed");
    Ok(total)
}

/// Removes every start/end boundary pair connected only to each other and
/// wires each predecessor of the start to each successor of the end.
///
/// # Errors
///
/// Returns a graph error only if the graph invariants were already broken.
pub fn squash_meta_nodes(dag: &mut Dag<Operation>) -> Result<usize, GraphError> {
    let mut removed = 0;

    loop {
        let Some((start, end)) = find_empty_pair(dag) else {
            break;
        };

        let predecessors = dag.predecessors(&start);
        let successors = dag.successors(&end);
        for p in &predecessors {
            for s in &successors {
                dag.add_edge(p, s)?;
            }
        }

        dag.remove_vertex(&start);
        dag.remove_vertex(&end);
        removed += 2;
    }

    Ok(removed)
}

fn find_empty_pair(dag: &Dag<Operation>) -> Option<(String, String)> {
    dag.vertices().find_map(|op| {
        let OperationConfig::Noop {
            stage,
            weight,
            boundary: Boundary::Start,
        } = op.config
        else {
            return None;
        };

        let start = op.id();
        let end = Operation::boundary(stage, weight, Boundary::End).id();

        let start_successors = dag.successors(&start);
        let squashable = start_successors.len() == 1
            && start_successors[0] == end
            && dag.predecessors(&end).len() == 1;
        squashable.then_some((start, end))
    })
}
