//! Pipeline Module
//!
//! Everything between the source and the output device:
//! - The engine boundary trait and typed parameters
//! - The declarative topology table
//! - The all-or-nothing graph builder
//! - The in-process reference engine

pub mod builder;
pub mod engine;
pub mod local;
pub mod topology;

pub use builder::{build_graph, PipelineGraph};
pub use engine::{
    LinkSpec, PipelineEngine, Port, StageId, StageKind, StageParameter, StageTrigger, StopReason,
    TransportCallbacks,
};
pub use local::LocalEngine;
pub use topology::{PlannedLink, PlannedStage, SessionLayout, StageRole, TopologyPlan};
