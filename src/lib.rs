pub mod types;
pub mod memory;
pub mod events;
pub mod transitions;
pub mod parser;
pub mod retry;
pub mod tools;
pub mod human;
pub mod dispatch;
pub mod planner;
pub mod reflector;
pub mod prompts;
pub mod run_state;
pub mod checkpoint;
pub mod episodic;
pub mod engine;
pub mod trace;
pub mod error;
pub mod builder;
pub mod states;
pub mod llm;

// Convenience re-exports at crate root
pub use builder::AgentBuilder;
pub use engine::AgentEngine;
pub use memory::AgentMemory;
pub use types::{State, ToolCall, AgentConfig, AgentOutput};
pub use events::Event;
pub use parser::{parse, extract_json, ReasoningStep};
pub use retry::{RetryPolicy, RetryOutcome};
pub use tools::{Tool, FnTool, ToolRegistry, ToolResult, ToolParams};
pub use human::{ApprovalCallback, ApprovalRequest};
pub use dispatch::{ToolDispatcher, DispatchOutcome, DenialReason, ObservationKind};
pub use planner::{Plan, PlanStep, Planner};
pub use reflector::{Critique, Reflector};
pub use run_state::{RunState, RunStatus, HistoryEntry, HistoryEvent, FailureReason};
pub use checkpoint::{CheckpointStore, CheckpointSummary, MemoryCheckpointStore, SqliteCheckpointStore};
pub use episodic::{Episode, EpisodicMemory, InMemoryEpisodicMemory, SqliteEpisodicMemory};
pub use llm::{LlmCaller, LlmResponse, Message, MockLlmCaller, TokenUsage};
#[cfg(feature = "openai")]
pub use llm::OpenAiCaller;
pub use trace::{TraceEntry, Trace};
pub use error::AgentError;
