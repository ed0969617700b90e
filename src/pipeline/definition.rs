//! Pipeline definitions: the ordered steps that fulfil one task type

use crate::agents::roles;
use crate::task::TaskType;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Structural shape a step's output must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// Free-form text, must be non-empty
    Text,
    /// JSON list of entries ranked by score
    RankedList,
}

/// One step of a pipeline, bound to a single agent capability
#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    pub name: String,
    /// Role name of the agent that performs the step
    pub agent_capability: String,
    /// What the step must do
    pub instructions: String,
    /// Description of the output, handed to the next step as context
    pub produces: String,
    pub output: OutputShape,
}

impl StepSpec {
    pub fn new(
        name: impl Into<String>,
        agent_capability: impl Into<String>,
        instructions: impl Into<String>,
        produces: impl Into<String>,
        output: OutputShape,
    ) -> Self {
        Self {
            name: name.into(),
            agent_capability: agent_capability.into(),
            instructions: instructions.into(),
            produces: produces.into(),
            output,
        }
    }
}

/// How the final task result is built from step outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultAssembly {
    /// The last step's output is the result
    #[default]
    LastStep,
    /// An object mapping every step name to its output
    AllSteps,
}

/// Strictly sequential pipeline for one task type
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
    pub task_type: TaskType,
    pub steps: Vec<StepSpec>,
    pub assembly: ResultAssembly,
}

impl PipelineDefinition {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            steps: Vec::new(),
            assembly: ResultAssembly::default(),
        }
    }

    /// Append a step
    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_assembly(mut self, assembly: ResultAssembly) -> Self {
        self.assembly = assembly;
        self
    }

    /// A pipeline needs at least one step and unique step names
    pub fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err(format!("pipeline for {} has no steps", self.task_type));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(format!(
                    "pipeline for {} repeats step name '{}'",
                    self.task_type, step.name
                ));
            }
            if step.agent_capability.trim().is_empty() {
                return Err(format!("step '{}' has no agent capability", step.name));
            }
        }
        Ok(())
    }

    /// Research candidate niches, then validate and rank them
    pub fn niche_analysis() -> Self {
        Self::new(TaskType::AnalyzeNiche)
            .step(StepSpec::new(
                "research_niches",
                roles::RESEARCHER,
                "From the user's passions and skills, list 5 to 7 potential market niches \
                 for digital products (courses, e-books, mentoring). If an initial idea was \
                 given, include it and assess it too. For each niche briefly cover current \
                 trend (growing, stable, declining), main audience, the audience's key \
                 problems or desires, and 1-2 notable competitors.",
                "A list of 5-7 candidate niches, each with name, trend, main audience, \
                 key problems/desires and notable competitors",
                OutputShape::Text,
            ))
            .step(StepSpec::new(
                "validate_niches",
                roles::VALIDATOR,
                "Using the researcher's niche list, evaluate demand and monetization \
                 potential for a beginner digital entrepreneur, considering ease of entry \
                 and competition intensity. Give each niche a viability score from 0 to 100 \
                 and a one or two sentence justification, ordered from most to least \
                 promising.",
                "Niches ranked by viability score (0-100) with a short justification each",
                OutputShape::RankedList,
            ))
    }
}

/// Lookup of pipeline definitions by task type
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    definitions: HashMap<TaskType, Arc<PipelineDefinition>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing every built-in pipeline
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for definition in [PipelineDefinition::niche_analysis()] {
            if let Err(e) = registry.register(definition) {
                tracing::error!("Skipping invalid built-in pipeline: {}", e);
            }
        }
        registry
    }

    /// Register a definition, replacing any previous one for the same task type
    pub fn register(&mut self, definition: PipelineDefinition) -> Result<(), String> {
        definition.validate()?;
        self.definitions
            .insert(definition.task_type, Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<PipelineDefinition>> {
        self.definitions.get(&task_type).cloned()
    }

    pub fn contains(&self, task_type: TaskType) -> bool {
        self.definitions.contains_key(&task_type)
    }
}
