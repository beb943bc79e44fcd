//! Next-node selection
//!
//! Every candidate gets a status record before it is evaluated, so a run
//! records one entry per node it reached even when the node is skipped.
//! `node_run[i]` always belongs to `nodes[i]`.

use weft_core::domain::{NodeStatus, NodeStatusSpec, PipelineRun};

use crate::resolver::Scope;

/// Index of the node to execute this cycle, or `None` when every node has
/// been attempted.
///
/// An open last entry is resumed as-is. Otherwise candidates are appended
/// from the first unattempted index and skipped while a dependency has not
/// finished or the `when` guard rejects them.
pub(crate) fn select_node(run: &mut PipelineRun) -> Option<usize> {
    if let Some(last) = run.last_node() {
        if last.status.is_open() {
            return Some(run.status.node_run.len() - 1);
        }
    }

    for index in run.status.node_run.len()..run.pipeline.spec.nodes.len() {
        let name = run.pipeline.spec.nodes[index].name.clone();
        run.status.node_run.push(NodeStatusSpec::open(name));

        match skip_reason(run, index) {
            Some(reason) => {
                if let Some(entry) = run.last_node_mut() {
                    entry.skip(reason);
                }
            }
            None => return Some(index),
        }
    }

    None
}

fn skip_reason(run: &PipelineRun, index: usize) -> Option<String> {
    let node = &run.pipeline.spec.nodes[index];

    let unfinished = node.spec.dependencies.iter().find(|dep| {
        run.node_status(dep)
            .is_none_or(|status| status.status != NodeStatus::Finish)
    });
    if let Some(dep) = unfinished {
        return Some(format!("dependency {dep} not finished"));
    }

    Scope::new(run).skip_reason(&node.spec.when)
}
