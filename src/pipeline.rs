// src/pipeline.rs

//! Node registration.
//!
//! A pipeline binary registers each node with an explicit ID, its
//! dependencies and a closure holding the node logic:
//!
//! ```no_run
//! use rundag::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::builder()
//!     .node("ingest.run", &[], || Ok(()))
//!     .node("tables.run", &["ingest.run"], || Ok(()))
//!     .build()?;
//! # Ok::<(), rundag::errors::RundagError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dag::{DagGraph, NodeId};
use crate::errors::Result;
use crate::exec::NodeJob;

/// Node logic. Errors and panics are contained by the engine.
pub type NodeFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Validated graph plus the logic of every node in it.
pub struct Pipeline {
    graph: DagGraph,
    funcs: HashMap<NodeId, NodeFn>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn node_fn(&self, id: &str) -> Option<&NodeFn> {
        self.funcs.get(id)
    }

    /// Job handed to a runner for node `id`.
    pub fn job(&self, id: &str) -> Option<NodeJob> {
        self.funcs.get(id).map(|func| NodeJob {
            id: id.to_string(),
            func: Arc::clone(func),
        })
    }
}

/// Collects node registrations; [`PipelineBuilder::build`] validates the graph.
#[derive(Default)]
pub struct PipelineBuilder {
    nodes: Vec<(NodeId, Vec<NodeId>, NodeFn)>,
}

impl PipelineBuilder {
    /// Register a node. Registration order is the tie-break order.
    pub fn node<F>(mut self, id: &str, deps: &[&str], func: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.nodes.push((
            id.to_string(),
            deps.iter().map(|d| d.to_string()).collect(),
            Arc::new(func),
        ));
        self
    }

    /// Validate the graph (duplicates, unknown deps, cycles).
    pub fn build(self) -> Result<Pipeline> {
        let graph = DagGraph::new(
            self.nodes
                .iter()
                .map(|(id, deps, _)| (id.clone(), deps.clone())),
        )?;
        let funcs = self
            .nodes
            .into_iter()
            .map(|(id, _, func)| (id, func))
            .collect();

        Ok(Pipeline { graph, funcs })
    }
}
