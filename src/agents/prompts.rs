//! Prompt assembly for LLM-backed agents

use super::llm_agents::AgentRole;
use super::ranking::RankedList;
use crate::llm::Message;
use crate::pipeline::{ExecutionContext, OutputShape, StepSpec};
use serde_json::Value;

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn system_prompt(role: &AgentRole, step: &StepSpec) -> String {
    let mut prompt = format!(
        "You are a {}.\n\nGoal: {}\n\n{}",
        role.title, role.goal, role.backstory
    );

    if step.output == OutputShape::RankedList {
        let schema = RankedList::json_schema()
            .map(|s| s.to_string())
            .unwrap_or_default();
        prompt.push_str(
            "\n\nRespond with JSON only, no prose and no markdown. The JSON must be an \
             object with an \"entries\" array; each entry has \"name\", an integer \
             \"score\" from 0 to 100 and a short \"justification\".",
        );
        if !schema.is_empty() {
            prompt.push_str("\nSchema: ");
            prompt.push_str(&schema);
        }
    }
    prompt
}

fn user_prompt(step: &StepSpec, ctx: &ExecutionContext) -> String {
    let mut prompt = format!(
        "Task:\n{}\n\nExpected output:\n{}\n\nInput:\n{}",
        step.instructions,
        step.produces,
        render_value(ctx.payload())
    );

    if !ctx.outputs().is_empty() {
        prompt.push_str("\n\nContext from previous steps:");
        for output in ctx.outputs() {
            prompt.push_str(&format!(
                "\n\n### {} ({}): {}\n{}",
                output.step,
                output.capability,
                output.produces,
                render_value(&output.output)
            ));
        }
    }
    prompt
}

/// System and user messages for one step invocation
pub fn build_messages(role: &AgentRole, step: &StepSpec, ctx: &ExecutionContext) -> Vec<Message> {
    vec![
        Message::system(system_prompt(role, step)),
        Message::user(user_prompt(step, ctx)),
    ]
}
