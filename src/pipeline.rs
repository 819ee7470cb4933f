//! The per-routine pipeline and the parallel driver.
//!
//! One routine flows through lift → naturalize → SSA construction → value
//! propagation → SSA destruction, mutating a single owned graph. Routines
//! are independent, so the batch driver fans them out across the `rayon`
//! pool and collects the graphs in a [`DashMap`] keyed by routine name.

use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use tracing::debug;

use crate::flow::FlowGraph;
use crate::lift::{lift, naturalize, LiftVerifier, Routine, StrictVerifier};
use crate::ssa::{construct, destruct, propagate};
use crate::Result;

/// Stage toggles and the injected stack-shape verifier.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Merge fallthrough blocks and reorder components after lifting
    pub naturalize: bool,
    /// Run SSA construction, propagation, and destruction
    pub ssa: bool,
    /// Stack-shape verifier consulted by the lifter
    pub verifier: Arc<dyn LiftVerifier>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            naturalize: true,
            ssa: true,
            verifier: Arc::new(StrictVerifier),
        }
    }
}

/// Drives routines through the full middle-end.
#[derive(Debug, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a pipeline with the given configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    /// Processes one routine into its final graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) or
    /// [`Error::UnsupportedInstruction`](crate::Error::UnsupportedInstruction)
    /// for input the lifter rejects, and
    /// [`Error::Internal`](crate::Error::Internal) when a later stage finds
    /// the graph inconsistent.
    pub fn run(&self, routine: &Routine) -> Result<FlowGraph> {
        let mut cfg = lift(routine, self.config.verifier.as_ref())?;
        if self.config.naturalize {
            naturalize(&mut cfg)?;
        }
        if self.config.ssa {
            construct(&mut cfg)?;
            propagate(&mut cfg);
            destruct(&mut cfg)?;
        }
        debug!(
            routine = %routine.name,
            blocks = cfg.block_count(),
            "pipeline finished"
        );
        Ok(cfg)
    }

    /// Processes a batch of routines in parallel.
    ///
    /// The first failing routine aborts the batch.
    ///
    /// # Errors
    ///
    /// Propagates the error of any routine as [`run`](Self::run) does.
    pub fn run_all(&self, routines: &[Routine]) -> Result<DashMap<String, FlowGraph>> {
        let results = DashMap::with_capacity(routines.len());
        routines.par_iter().try_for_each(|routine| {
            let graph = self.run(routine)?;
            results.insert(routine.name.clone(), graph);
            Ok(())
        })?;
        Ok(results)
    }
}
