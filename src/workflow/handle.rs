//! Shared, swappable reference to the active status graph.

use super::graph::StatusGraph;
use super::validator::{ValidationMode, ValidationReport};
use crate::config::WorkflowConfig;
use crate::error::EngineError;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// Handle to the active workflow, passed explicitly to every component.
///
/// Readers take a snapshot with [`WorkflowHandle::load`]; a replacement only
/// lands after it validates, so a bad reload leaves the current graph in
/// place.
#[derive(Clone)]
pub struct WorkflowHandle {
    graph: Arc<ArcSwap<StatusGraph>>,
    mode: ValidationMode,
}

impl WorkflowHandle {
    pub fn new(graph: StatusGraph, mode: ValidationMode) -> Self {
        Self {
            graph: Arc::new(ArcSwap::from_pointee(graph)),
            mode,
        }
    }

    /// Validate `config` and wrap the resulting graph.
    pub fn from_config(
        config: WorkflowConfig,
        mode: ValidationMode,
    ) -> Result<(Self, ValidationReport), EngineError> {
        let (graph, report) = StatusGraph::from_config(config, mode)?;
        Ok((Self::new(graph, mode), report))
    }

    /// Handle over the built-in default workflow.
    pub fn builtin() -> Result<Self, EngineError> {
        Self::from_config(WorkflowConfig::default(), ValidationMode::Normal).map(|(h, _)| h)
    }

    /// Snapshot of the current graph.
    pub fn load(&self) -> Arc<StatusGraph> {
        self.graph.load_full()
    }

    /// Validate and swap in a new workflow definition.
    pub fn reload(&self, config: WorkflowConfig) -> Result<ValidationReport, EngineError> {
        let (graph, report) = StatusGraph::from_config(config, self.mode)?;
        self.graph.store(Arc::new(graph));
        info!("Workflow reloaded");
        Ok(report)
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }
}

impl std::fmt::Debug for WorkflowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHandle")
            .field("mode", &self.mode)
            .field("statuses", &self.load().statuses().count())
            .finish()
    }
}
