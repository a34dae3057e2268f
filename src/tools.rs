use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Tool parameters as decoded from the `Action Input` line.
pub type ToolParams = HashMap<String, Value>;

/// A synchronous tool body: takes JSON params, returns output or error text.
pub type ToolFn = Arc<dyn Fn(&ToolParams) -> Result<String, String> + Send + Sync>;

/// Capability interface every tool implements.
///
/// `invoke` reports failure as `Err(String)`; it never needs to panic.
/// The dispatcher retries [`Tool::execute`], which turns both branches into a
/// [`ToolResult`]. Override `execute` to report a result directly.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Clear description of what the tool does and when to use it
    fn description(&self) -> &str;

    /// JSON Schema for the input parameters
    fn parameters(&self) -> Value;

    /// Sensitive tools run only after an approval decision.
    fn requires_approval(&self) -> bool {
        false
    }

    async fn invoke(&self, params: &ToolParams) -> Result<String, String>;

    /// Invoke and capture the outcome with timing.
    async fn execute(&self, params: &ToolParams) -> ToolResult {
        let start = Instant::now();
        let result = self.invoke(params).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(output) => ToolResult::success(self.name(), output, duration_ms),
            Err(error) => ToolResult::failure(self.name(), error, duration_ms),
        }
    }
}

/// Outcome of one tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name:   String,
    pub success:     bool,
    pub output:      Option<String>,
    pub error:       Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, output: String, duration_ms: u64) -> Self {
        Self { tool_name: tool_name.into(), success: true, output: Some(output), error: None, duration_ms }
    }

    pub fn failure(tool_name: impl Into<String>, error: String, duration_ms: u64) -> Self {
        Self { tool_name: tool_name.into(), success: false, output: None, error: Some(error), duration_ms }
    }
}

/// Builder-style tool wrapping a closure.
///
/// ```
/// use reactsm::FnTool;
/// let tool = FnTool::new("echo", "Echo the text back")
///     .param("text", "string", "Text to echo")
///     .call(|args| Ok(args["text"].as_str().unwrap_or("").to_string()));
/// ```
pub struct FnTool {
    name:              String,
    description:       String,
    schema:            Value,
    requires_approval: bool,
    func:              Option<ToolFn>,
}

impl FnTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name:              name.into(),
            description:       description.into(),
            schema:            serde_json::json!({ "type": "object", "properties": {}, "required": [] }),
            requires_approval: false,
            func:              None,
        }
    }

    /// Add a required parameter to the schema.
    pub fn param(mut self, name: &str, ty: &str, description: &str) -> Self {
        if let Some(props) = self.schema.get_mut("properties").and_then(Value::as_object_mut) {
            props.insert(name.to_string(), serde_json::json!({ "type": ty, "description": description }));
        }
        if let Some(required) = self.schema.get_mut("required").and_then(Value::as_array_mut) {
            required.push(Value::String(name.to_string()));
        }
        self
    }

    /// Replace the whole JSON schema.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Mark the tool as sensitive.
    pub fn requires_approval(mut self, yes: bool) -> Self {
        self.requires_approval = yes;
        self
    }

    pub fn call<F>(mut self, f: F) -> Self
    where
        F: Fn(&ToolParams) -> Result<String, String> + Send + Sync + 'static,
    {
        self.func = Some(Arc::new(f));
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.schema.clone()
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    async fn invoke(&self, params: &ToolParams) -> Result<String, String> {
        match &self.func {
            Some(f) => f(params),
            None => Err(format!("Tool '{}' has no implementation", self.name)),
        }
    }
}

/// Immutable name → tool mapping, built once per run and shared behind `Arc`.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations under the same name replace earlier ones.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tools sorted by name, for stable prompts.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// One `- name: description (Params: schema)` line per tool.
    pub fn describe(&self) -> String {
        self.tools()
            .iter()
            .map(|t| format!("- {}: {} (Params: {})", t.name(), t.description(), t.parameters()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
