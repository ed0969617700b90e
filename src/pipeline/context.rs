//! Per-run execution context
//!
//! Holds the original payload and the outputs of completed steps. It lives in
//! memory for exactly one pipeline run and is never persisted.

use super::definition::{ResultAssembly, StepSpec};
use crate::task::TaskType;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Output of one completed step
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub step: String,
    pub capability: String,
    /// Description the step declared for its output
    pub produces: String,
    pub output: Value,
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    task_id: Uuid,
    task_type: TaskType,
    payload: Value,
    outputs: Vec<StepOutput>,
}

impl ExecutionContext {
    pub fn new(task_id: Uuid, task_type: TaskType, payload: Value) -> Self {
        Self {
            task_id,
            task_type,
            payload,
            outputs: Vec::new(),
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// The original submission payload
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Outputs of completed steps, in execution order
    pub fn outputs(&self) -> &[StepOutput] {
        &self.outputs
    }

    /// Output of the immediately preceding step, if any
    pub fn last_output(&self) -> Option<&StepOutput> {
        self.outputs.last()
    }

    pub fn output_of(&self, step: &str) -> Option<&Value> {
        self.outputs
            .iter()
            .find(|o| o.step == step)
            .map(|o| &o.output)
    }

    /// Append the output of a completed step
    pub fn record(&mut self, step: &StepSpec, output: Value) {
        self.outputs.push(StepOutput {
            step: step.name.clone(),
            capability: step.agent_capability.clone(),
            produces: step.produces.clone(),
            output,
        });
    }

    /// Consume the context and build the final task result
    pub fn into_result(self, assembly: ResultAssembly) -> Value {
        match assembly {
            ResultAssembly::LastStep => self
                .outputs
                .into_iter()
                .last()
                .map(|o| o.output)
                .unwrap_or(Value::Null),
            ResultAssembly::AllSteps => {
                let combined: Map<String, Value> = self
                    .outputs
                    .into_iter()
                    .map(|o| (o.step, o.output))
                    .collect();
                Value::Object(combined)
            }
        }
    }
}
