use thiserror::Error;
use crate::types::State;
use crate::events::Event;
use crate::run_state::RunStatus;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The oracle kept failing until its retry budget ran out.
    #[error("Oracle failed after {attempts} attempt(s): {last_error}")]
    OracleExhausted { attempts: u32, last_error: String },

    /// Every iteration was used without producing a final answer.
    #[error("Iteration budget exhausted after {0} iteration(s) without a final answer")]
    IterationBudgetExhausted(usize),

    #[error("Agent failed: {0}")]
    AgentFailed(String),

    #[error("Invalid transition: {from} + {event} not in transition table")]
    InvalidTransition { from: State, event: Event },

    #[error("Invalid run status transition: {from:?} -> {to:?}")]
    InvalidStatusTransition { from: RunStatus, to: RunStatus },

    #[error("No handler registered for state: {0}")]
    NoHandlerForState(String),

    #[error("Safety cap exceeded after {0} state steps")]
    SafetyCapExceeded(usize),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Memory error: {0}")]
    MemoryError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Build error: {0}")]
    BuildError(String),
}

impl From<rusqlite::Error> for AgentError {
    fn from(err: rusqlite::Error) -> Self {
        AgentError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Persistence(format!("serialization: {}", err))
    }
}
