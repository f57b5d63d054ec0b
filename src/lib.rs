//! yaps - per-chromosome genomic pipeline DAG construction

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow_graph;
pub mod natural;
pub mod pipelines;
pub mod region;
pub mod resource;
pub mod runner;
pub mod stage;
pub mod task;

pub use builder::{Combination, StageDef, StageGraphBuilder, TaskSlot};
pub use config::{PipelineConfig, PipelineKind, PipelineSettings};
pub use engine::{ExecutionEngine, PlanRecorder, RunOptions};
pub use error::{FixSuggestion, YapsError};
pub use flow_graph::FlowGraph;
pub use natural::NaturalKey;
pub use region::{ChromosomeIndex, Region};
pub use resource::{ContainerProfile, ResourceContext, ResourceSpec};
pub use runner::{Pipeline, RunFlags};
pub use stage::{Stage, StageName};
pub use task::{Task, TaskHandle, TaskSpec};
