//! Parser for the free-text ReAct exchange format.
//!
//! The oracle answers in loosely labelled text:
//!
//! ```text
//! Thought: I should add the numbers
//! Action: calculator
//! Action Input: {"a": 2, "b": 2}
//! ```
//!
//! or, once it is done:
//!
//! ```text
//! Thought: I know the answer
//! Final Answer: 4
//! ```
//!
//! Parsing is total: missing labels produce empty or absent fields and
//! undecodable JSON produces `None`, never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

static THOUGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Thought:[ \t]*(.*?)(?:\s*\b(?:Action Input|Action|Observation|Final Answer):|\z)")
        .expect("thought pattern")
});

static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*Action:[ \t]*(.*)$").expect("action pattern"));

/// Same label written inline after the thought, on the thought's line.
static INLINE_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\bAction:[ \t]*(.*?)(?:[ \t]+Action Input:.*)?$").expect("inline action pattern")
});

static ACTION_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*Action Input:[ \t]*").expect("action input pattern"));

static INLINE_ACTION_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bAction Input:[ \t]*").expect("inline action input pattern"));

static NEXT_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:Observation|Thought|Final Answer|Action):").expect("label pattern")
});

static FINAL_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Final Answer:\s*(.*)").expect("final answer pattern"));

/// One parsed oracle turn. Ephemeral: the loop records its fields as
/// separate history events and then drops it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub thought:      String,
    pub action:       Option<String>,
    pub action_input: Option<HashMap<String, Value>>,
    pub final_answer: Option<String>,
    pub is_complete:  bool,
}

impl ReasoningStep {
    /// Parameters to dispatch with. An action whose input could not be
    /// decoded is called with an empty mapping.
    pub fn params(&self) -> HashMap<String, Value> {
        self.action_input.clone().unwrap_or_default()
    }
}

/// Parse raw oracle text into a [`ReasoningStep`].
pub fn parse(raw: &str) -> ReasoningStep {
    let thought = THOUGHT
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let action = first_capture(&ACTION, raw).or_else(|| first_capture(&INLINE_ACTION, raw));

    let action_input = ACTION_INPUT.find(raw).or_else(|| INLINE_ACTION_INPUT.find(raw)).and_then(|label| {
        let rest = &raw[label.end()..];
        let segment = match NEXT_LABEL.find(rest) {
            Some(next) => &rest[..next.start()],
            None => rest,
        };
        decode_params(segment)
    });

    let final_answer = FINAL_ANSWER
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    ReasoningStep {
        thought,
        action,
        action_input,
        is_complete: final_answer.is_some(),
        final_answer,
    }
}

fn first_capture(pattern: &Regex, raw: &str) -> Option<String> {
    pattern
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|a| !a.is_empty())
}

fn decode_params(segment: &str) -> Option<HashMap<String, Value>> {
    let value = serde_json::from_str::<Value>(segment.trim())
        .ok()
        .filter(Value::is_object)
        .or_else(|| first_json_object(segment))?;
    match value {
        Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}

/// Permissive JSON extraction shared by the planner and the reflector.
///
/// Tries the whole text first, then the first brace-balanced `{...}`
/// substring that decodes.
pub fn extract_json(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .or_else(|| first_json_object(text))
}

fn first_json_object(text: &str) -> Option<Value> {
    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        match balanced_end(&text[start..]) {
            Some(len) => {
                if let Ok(value) = serde_json::from_str::<Value>(&text[start..start + len]) {
                    return Some(value);
                }
                from = start + 1;
            }
            None => return None,
        }
    }
    None
}

/// Byte length of the brace-balanced object starting at `text[0] == '{'`.
/// Braces inside JSON strings are ignored.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_action_step() {
        let raw = "Thought: I need to add 2 and 2.\nAction: calculator\nAction Input: {\"a\": 2, \"b\": 2}";
        let step = parse(raw);

        assert_eq!(step.thought, "I need to add 2 and 2.");
        assert_eq!(step.action.as_deref(), Some("calculator"));
        let input = step.action_input.expect("input decoded");
        assert_eq!(input.get("a"), Some(&json!(2)));
        assert_eq!(input.get("b"), Some(&json!(2)));
        assert!(!step.is_complete);
        assert!(step.final_answer.is_none());
    }

    #[test]
    fn final_answer_takes_trailing_text() {
        let raw = "Thought: done\nFinal Answer: The answer is 4\nand that is all.";
        let step = parse(raw);

        assert!(step.is_complete);
        assert_eq!(step.final_answer.as_deref(), Some("The answer is 4\nand that is all."));
        assert_eq!(step.thought, "done");
    }

    #[test]
    fn final_answer_label_anywhere_completes() {
        let step = parse("some preamble Final Answer: 42");
        assert!(step.is_complete);
        assert_eq!(step.final_answer.as_deref(), Some("42"));
    }

    #[test]
    fn free_text_is_not_an_error() {
        let step = parse("I am not following the format at all.");
        assert_eq!(step, ReasoningStep::default());
    }

    #[test]
    fn thought_runs_to_end_of_text() {
        let step = parse("Thought: still thinking\nabout this");
        assert_eq!(step.thought, "still thinking\nabout this");
        assert!(step.action.is_none());
    }

    #[test]
    fn trailing_garbage_after_object_is_tolerated() {
        let raw = "Action: search\nAction Input: {\"query\": \"rust {lang}\"} -- that should do it }";
        let step = parse(raw);
        let input = step.action_input.expect("fallback scan decodes the object");
        assert_eq!(input.get("query"), Some(&json!("rust {lang}")));
    }

    #[test]
    fn multi_line_input_stops_at_next_label() {
        let raw = "Action: write\nAction Input: {\n  \"path\": \"a.txt\",\n  \"body\": \"hi\"\n}\nObservation: ok";
        let input = parse(raw).action_input.expect("multi-line object");
        assert_eq!(input.len(), 2);
        assert_eq!(input.get("path"), Some(&json!("a.txt")));
    }

    #[test]
    fn undecodable_input_is_absent_and_params_default_empty() {
        let step = parse("Action: search\nAction Input: not json at all");
        assert_eq!(step.action.as_deref(), Some("search"));
        assert!(step.action_input.is_none());
        assert!(step.params().is_empty());
    }

    #[test]
    fn empty_action_value_is_absent() {
        let step = parse("Thought: hmm\nAction:   \nAction Input: {}");
        assert!(step.action.is_none());
    }

    #[test]
    fn step_can_carry_action_and_final_answer() {
        let raw = "Thought: t\nAction: calc\nAction Input: {}\nFinal Answer: 7";
        let step = parse(raw);
        assert_eq!(step.action.as_deref(), Some("calc"));
        assert!(step.is_complete);
    }

    #[test]
    fn empty_thought_does_not_swallow_the_action() {
        let step = parse("Thought:\nAction: calculator\nAction Input: {}");
        assert_eq!(step.thought, "");
        assert_eq!(step.action.as_deref(), Some("calculator"));
        assert_eq!(step.action_input, Some(HashMap::new()));
    }

    #[test]
    fn action_on_the_thought_line_is_found() {
        let step = parse("Thought: add them. Action: calculator\nAction Input: {\"a\": 1}");
        assert_eq!(step.thought, "add them.");
        assert_eq!(step.action.as_deref(), Some("calculator"));
        assert_eq!(step.params().get("a"), Some(&json!(1)));
    }

    #[test]
    fn fully_inline_step_splits_action_from_input() {
        let step = parse("Thought: t Action: search Action Input: {\"query\": \"rust\"}");
        assert_eq!(step.action.as_deref(), Some("search"));
        assert_eq!(step.params().get("query"), Some(&json!("rust")));
    }

    #[test]
    fn extract_json_prefers_whole_text() {
        assert_eq!(extract_json(" {\"steps\": []} "), Some(json!({"steps": []})));
    }

    #[test]
    fn extract_json_finds_fenced_object() {
        let text = "Here is the plan:\n```json\n{\"steps\": [{\"id\": 1}]}\n```\nGood luck!";
        assert_eq!(extract_json(text), Some(json!({"steps": [{"id": 1}]})));
    }

    #[test]
    fn extract_json_skips_undecodable_candidates() {
        let text = "{not json} then {\"ok\": true}";
        assert_eq!(extract_json(text), Some(json!({"ok": true})));
    }

    #[test]
    fn extract_json_none_on_garbage() {
        assert_eq!(extract_json("no braces here"), None);
        assert_eq!(extract_json("{ unterminated"), None);
    }
}
