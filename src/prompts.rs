//! Prompt templates for the reasoning, planning and critique calls.

use crate::planner::Plan;
use crate::run_state::HistoryEntry;
use crate::tools::ToolRegistry;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that solves tasks step by step using the tools available to you.";

/// The reason→act prompt: task, tool list, and the scratch transcript so far.
pub fn react_prompt(task: &str, tools: &ToolRegistry, scratch: &str) -> String {
    let tool_descriptions = if tools.is_empty() {
        "(none)".to_string()
    } else {
        tools.describe()
    };
    format!(
        "\nTask: {task}\n\n\
         Available Tools:\n{tool_descriptions}\n\n\
         Follow this format:\n\
         Thought: [your reasoning about what to do next]\n\
         Action: [tool name to use]\n\
         Action Input: [parameters as JSON]\n\
         Observation: [tool result will appear here]\n\n\
         When you have enough information:\n\
         Thought: I can now answer the original question\n\
         Final Answer: [your response to the user]\n\n\
         Current History:\n{scratch}\n\n\
         Begin!\n"
    )
}

const PLAN_FORMAT: &str = r#"Output valid JSON with format: {"steps": [{"id": 1, "description": "...", "tool": "...", "dependencies": []}]}"#;

pub fn plan_prompt(task: &str, tools: &ToolRegistry) -> String {
    format!(
        "Decompose the following task into steps. Task: {task}\n\
         Each step should be specific and actionable, name the tool to use if any, \
         and list the ids of steps it depends on.\n\
         Available Tools:\n{}\n{PLAN_FORMAT}",
        tools.describe()
    )
}

pub fn replan_prompt(current: &Plan, execution_summary: &str, feedback: &str) -> String {
    format!(
        "\nExecution Update:\n{execution_summary}\n\n\
         Feedback:\n{feedback}\n\n\
         Current Plan:\n{}\n\n\
         Please update the plan to address the feedback or failure. \
         Remove completed steps and add necessary new steps.\n{PLAN_FORMAT}\n",
        current.numbered()
    )
}

pub fn critique_prompt(task: &str, recent: &[HistoryEntry]) -> String {
    let history_text = recent
        .iter()
        .map(HistoryEntry::summary)
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "\nYou are a critical reviewer for an AI agent.\n\
         Task: {task}\n\n\
         Recent Activity:\n{history_text}\n\n\
         Analyze the agent's performance.\n\
         1. Are the actions aligned with the task?\n\
         2. Are there any errors or repetitive behaviors?\n\
         3. What should the agent do next?\n\n\
         Output JSON format:\n\
         {{\n    \"is_progressing\": boolean,\n    \"critique\": \"string explanation\",\n    \"suggestion\": \"string suggestion for next step\"\n}}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;

    #[test]
    fn react_prompt_lists_tools_and_scratch() {
        let tools = ToolRegistry::new().with(FnTool::new("calculator", "Adds numbers"));
        let prompt = react_prompt("What is 2+2?", &tools, "\nThought: hmm");
        assert!(prompt.contains("Task: What is 2+2?"));
        assert!(prompt.contains("- calculator: Adds numbers"));
        assert!(prompt.contains("Current History:\n\nThought: hmm"));
        assert!(prompt.contains("Final Answer:"));
    }

    #[test]
    fn critique_prompt_asks_for_json() {
        let prompt = critique_prompt("t", &[]);
        assert!(prompt.contains("\"is_progressing\": boolean"));
    }
}
