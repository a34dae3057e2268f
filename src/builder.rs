use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use crate::checkpoint::CheckpointStore;
use crate::dispatch::ToolDispatcher;
use crate::engine::AgentEngine;
use crate::episodic::EpisodicMemory;
use crate::error::AgentError;
use crate::human::{ApprovalCallback, ApprovalRequest};
use crate::llm::LlmCaller;
use crate::memory::AgentMemory;
use crate::planner::Planner;
use crate::reflector::Reflector;
use crate::retry::RetryPolicy;
use crate::states::{
    AgentContext, AgentState, IdleState, PlanningState, ReasoningState, ReflectingState,
    ReplanningState, ActingState, ObservingState, DoneState, ErrorState,
};
use crate::tools::{Tool, ToolRegistry};
use crate::transitions::build_transition_table;
use crate::types::AgentConfig;

/// Fluent constructor for [`AgentEngine`].
///
/// ```no_run
/// # use std::sync::Arc;
/// # use reactsm::{AgentBuilder, FnTool, MockLlmCaller};
/// # async fn demo() -> Result<(), reactsm::AgentError> {
/// let mut agent = AgentBuilder::new("What is 2+2?")
///     .llm(Arc::new(MockLlmCaller::replies(["Final Answer: 4"])))
///     .tool(FnTool::new("calculator", "Adds two numbers"))
///     .max_iterations(5)
///     .build()?;
/// let answer = agent.run().await?;
/// # Ok(()) }
/// ```
pub struct AgentBuilder {
    memory:           AgentMemory,
    tools:            ToolRegistry,
    llm:              Option<Arc<dyn LlmCaller>>,
    approval:         Option<ApprovalCallback>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    episodic:         Option<Arc<dyn EpisodicMemory>>,
}

impl AgentBuilder {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            memory:           AgentMemory::new(task),
            tools:            ToolRegistry::new(),
            llm:              None,
            approval:         None,
            checkpoint_store: None,
            episodic:         None,
        }
    }

    pub fn system_prompt(mut self, p: impl Into<String>) -> Self {
        self.memory.system_prompt = p.into(); self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmCaller>) -> Self {
        self.llm = Some(llm); self
    }

    /// Replace the whole configuration. Later field setters still apply.
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.memory.config = config; self
    }

    pub fn max_iterations(mut self, n: usize) -> Self {
        self.memory.config.max_iterations = n; self
    }

    pub fn adaptive_planning(mut self, on: bool) -> Self {
        self.memory.config.adaptive_planning = on; self
    }

    pub fn reflect_every(mut self, n: usize) -> Self {
        self.memory.config.reflect_every = n; self
    }

    pub fn oracle_retry(mut self, policy: RetryPolicy) -> Self {
        self.memory.config.oracle_retry = policy; self
    }

    pub fn tool_retry(mut self, policy: RetryPolicy) -> Self {
        self.memory.config.tool_retry = policy; self
    }

    pub fn approval_timeout(mut self, timeout: Duration) -> Self {
        self.memory.config.approval_timeout_ms = Some(timeout.as_millis() as u64); self
    }

    pub fn max_scratch_chars(mut self, n: usize) -> Self {
        self.memory.config.max_scratch_chars = Some(n); self
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.register(Arc::new(tool)); self
    }

    pub fn add_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool); self
    }

    /// Decide sensitive tool calls synchronously.
    pub fn on_approval<F>(mut self, f: F) -> Self
    where
        F: Fn(ApprovalRequest) -> bool + Send + Sync + 'static,
    {
        self.approval = Some(ApprovalCallback::from_fn(f)); self
    }

    /// Decide sensitive tool calls asynchronously.
    pub fn on_approval_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ApprovalRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        self.approval = Some(ApprovalCallback::from_async(f)); self
    }

    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store); self
    }

    pub fn episodic_memory(mut self, memory: Arc<dyn EpisodicMemory>) -> Self {
        self.episodic = Some(memory); self
    }

    /// Builds the AgentEngine with all default state handlers.
    pub fn build(self) -> Result<AgentEngine, AgentError> {
        self.build_with_handlers(HashMap::new())
    }

    /// Builds with custom state handlers, for advanced users extending the library.
    /// Any entry in `extra_handlers` replaces the default handler for that state name.
    pub fn build_with_handlers(
        self,
        extra_handlers: HashMap<&'static str, Box<dyn AgentState>>,
    ) -> Result<AgentEngine, AgentError> {
        let llm = self.llm
            .ok_or_else(|| AgentError::BuildError("LLM caller is required".to_string()))?;
        let config = &self.memory.config;
        if config.max_iterations == 0 {
            return Err(AgentError::BuildError("max_iterations must be at least 1".to_string()));
        }

        let ctx = AgentContext {
            llm:        llm.clone(),
            tools:      Arc::new(self.tools),
            planner:    Planner::new(llm.clone(), config.oracle_retry),
            reflector:  Reflector::new(llm, config.oracle_retry, config.reflection_window),
            dispatcher: ToolDispatcher::new(config.tool_retry)
                .with_approval(self.approval)
                .with_approval_timeout(config.approval_timeout()),
        };

        let mut handlers = default_handlers();
        // Merge in any custom overrides, replacing defaults of the same name.
        for (key, handler) in extra_handlers {
            handlers.insert(key.to_string(), handler);
        }

        Ok(AgentEngine::new(self.memory, ctx, build_transition_table(), handlers)
            .with_checkpoint_store(self.checkpoint_store)
            .with_episodic_memory(self.episodic))
    }
}

fn default_handlers() -> HashMap<String, Box<dyn AgentState>> {
    let defaults: Vec<Box<dyn AgentState>> = vec![
        Box::new(IdleState),
        Box::new(PlanningState),
        Box::new(ReasoningState),
        Box::new(ReflectingState),
        Box::new(ReplanningState),
        Box::new(ActingState),
        Box::new(ObservingState),
        Box::new(DoneState),
        Box::new(ErrorState),
    ];
    defaults.into_iter().map(|h| (h.name().to_string(), h)).collect()
}
