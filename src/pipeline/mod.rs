//! Sequential multi-agent pipelines
//!
//! A [`PipelineDefinition`] lists the steps for one task type, an
//! [`ExecutionContext`] carries outputs from step to step during one run,
//! and the [`PipelineExecutor`] drives a run to a terminal task status.

pub mod context;
pub mod definition;
pub mod executor;

pub use context::{ExecutionContext, StepOutput};
pub use definition::{OutputShape, PipelineDefinition, PipelineRegistry, ResultAssembly, StepSpec};
pub use executor::{PipelineExecutor, RetryPolicy, RunOutcome};
