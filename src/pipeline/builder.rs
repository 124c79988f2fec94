//! Pipeline graph builder
//!
//! Instantiates a `TopologyPlan` on an engine. The build is all-or-nothing:
//! a rollback guard removes every stage already created if any later stage
//! or link fails.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::error::{BuildError, EngineError};
use crate::pipeline::engine::{LinkSpec, PipelineEngine, Port, StageId, StageKind};
use crate::pipeline::topology::{StageRole, TopologyPlan};

// ============================================================================
// Built graph
// ============================================================================

/// Stage handles and links of a built session graph
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineGraph {
    stages: BTreeMap<StageRole, StageId>,
    /// Creation order, for teardown in reverse
    order: Vec<StageId>,
    links: Vec<LinkSpec>,
    degraded: bool,
}

impl PipelineGraph {
    /// Handle of the stage playing `role`, if present
    pub fn stage(&self, role: StageRole) -> Option<StageId> {
        self.stages.get(&role).copied()
    }

    pub fn contains(&self, role: StageRole) -> bool {
        self.stages.contains_key(&role)
    }

    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    /// Links ending at the stage playing `role`
    pub fn links_into(&self, role: StageRole) -> Vec<LinkSpec> {
        match self.stage(role) {
            Some(id) => self
                .links
                .iter()
                .filter(|link| link.to.stage == id)
                .copied()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether the pitch/tempo stage was replaced by a pass-through
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn stage_count(&self) -> usize {
        self.order.len()
    }

    /// Tear the graph down as a unit
    pub fn release<E: PipelineEngine + ?Sized>(self, engine: &mut E) {
        for stage in self.order.into_iter().rev() {
            if let Err(e) = engine.remove_stage(stage) {
                warn!("[PIPELINE] failed to remove stage {}: {}", stage, e);
            }
        }
    }
}

// ============================================================================
// Rollback guard
// ============================================================================

/// Removes created stages on drop unless committed
struct Rollback<'a, E: PipelineEngine + ?Sized> {
    engine: &'a mut E,
    created: Vec<StageId>,
    committed: bool,
}

impl<'a, E: PipelineEngine + ?Sized> Rollback<'a, E> {
    fn new(engine: &'a mut E) -> Self {
        Self {
            engine,
            created: Vec::new(),
            committed: false,
        }
    }

    fn create(&mut self, kind: StageKind) -> Result<StageId, EngineError> {
        let id = self.engine.create_stage(kind)?;
        self.created.push(id);
        Ok(id)
    }

    fn link(&mut self, link: LinkSpec) -> Result<(), EngineError> {
        self.engine.link(link)
    }

    fn commit(mut self) -> Vec<StageId> {
        self.committed = true;
        std::mem::take(&mut self.created)
    }
}

impl<E: PipelineEngine + ?Sized> Drop for Rollback<'_, E> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for stage in self.created.drain(..).rev() {
            if let Err(e) = self.engine.remove_stage(stage) {
                warn!("[PIPELINE] rollback could not remove {}: {}", stage, e);
            }
        }
    }
}

// ============================================================================
// Build
// ============================================================================

/// Create every stage and link of `plan` on `engine`
///
/// An unavailable pitch/tempo stage is replaced by a pass-through and the
/// graph is marked degraded. Any other failure releases what was created.
///
/// # Errors
/// `BuildError` naming the role whose stage or link failed.
pub fn build_graph<E: PipelineEngine + ?Sized>(
    engine: &mut E,
    plan: &TopologyPlan,
) -> Result<PipelineGraph, BuildError> {
    let mut guard = Rollback::new(engine);
    let mut stages = BTreeMap::new();
    let mut degraded = false;

    for planned in &plan.stages {
        let id = match guard.create(planned.kind.clone()) {
            Ok(id) => id,
            Err(EngineError::StageUnavailable { stage })
                if planned.role == StageRole::PitchTempo =>
            {
                warn!(
                    "No {} stage available, continuing without pitch/tempo control",
                    stage
                );
                degraded = true;
                guard
                    .create(StageKind::PassThrough)
                    .map_err(|source| BuildError::Stage {
                        role: planned.role,
                        source,
                    })?
            }
            Err(source) => {
                return Err(BuildError::Stage {
                    role: planned.role,
                    source,
                })
            }
        };
        debug!("[PIPELINE] {} -> {} ({:?})", planned.role, id, planned.kind);
        stages.insert(planned.role, id);
    }

    let mut links = Vec::with_capacity(plan.links.len());
    for planned in &plan.links {
        let link_error = |source| BuildError::Link {
            from: planned.from,
            to: planned.to,
            source,
        };
        let (Some(from), Some(to)) = (stages.get(&planned.from), stages.get(&planned.to)) else {
            return Err(link_error(EngineError::IncompatibleLink {
                reason: "endpoint stage is not part of the graph".to_string(),
            }));
        };
        let spec = LinkSpec {
            format: planned.format,
            from: Port::new(*from, planned.from_port),
            to: Port::new(*to, planned.to_port),
        };
        guard.link(spec).map_err(link_error)?;
        debug!(
            "[PIPELINE] link {}:{} -> {}:{} [{}]",
            planned.from, planned.from_port, planned.to, planned.to_port, planned.format
        );
        links.push(spec);
    }

    let order = guard.commit();
    Ok(PipelineGraph {
        stages,
        order,
        links,
        degraded,
    })
}
