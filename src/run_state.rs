use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use crate::error::AgentError;
use crate::planner::Plan;
use crate::reflector::Critique;

/// Lifecycle of one run: `Pending → Running → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending   => "pending",
            RunStatus::Running   => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed    => "failed",
        }
    }

    fn can_become(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(RunStatus::Pending),
            "running"   => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed"    => Ok(RunStatus::Failed),
            other       => Err(AgentError::Persistence(format!("unknown run status '{}'", other))),
        }
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The oracle's retry budget ran out.
    OracleFailure { attempts: u32, last_error: String },
    IterationBudgetExhausted { max_iterations: usize },
    /// A state handler hit an inconsistent blackboard.
    Internal { message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FailureReason::OracleFailure { attempts, last_error } => {
                write!(f, "oracle failed after {} attempt(s): {}", attempts, last_error)
            }
            FailureReason::IterationBudgetExhausted { max_iterations } => {
                write!(f, "iteration budget exhausted ({} iterations)", max_iterations)
            }
            FailureReason::Internal { message } => f.write_str(message),
        }
    }
}

impl From<FailureReason> for AgentError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::OracleFailure { attempts, last_error } => {
                AgentError::OracleExhausted { attempts, last_error }
            }
            FailureReason::IterationBudgetExhausted { max_iterations } => {
                AgentError::IterationBudgetExhausted(max_iterations)
            }
            FailureReason::Internal { message } => AgentError::AgentFailed(message),
        }
    }
}

/// Tag-specific payload of a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum HistoryEvent {
    System(String),
    Thought(String),
    Action {
        tool:  String,
        input: Option<HashMap<String, Value>>,
    },
    Observation(String),
    Reflection(Critique),
    Plan(Plan),
    PlanUpdate(Plan),
}

impl HistoryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEvent::System(_)      => "system",
            HistoryEvent::Thought(_)     => "thought",
            HistoryEvent::Action { .. }  => "action",
            HistoryEvent::Observation(_) => "observation",
            HistoryEvent::Reflection(_)  => "reflection",
            HistoryEvent::Plan(_)        => "plan",
            HistoryEvent::PlanUpdate(_)  => "plan_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event:     HistoryEvent,
}

impl HistoryEntry {
    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }

    /// One-line rendering for prompts.
    pub fn summary(&self) -> String {
        match &self.event {
            HistoryEvent::System(s) | HistoryEvent::Thought(s) | HistoryEvent::Observation(s) => {
                format!("{}: {}", self.kind(), s)
            }
            HistoryEvent::Action { tool, input } => {
                let input = input
                    .as_ref()
                    .and_then(|i| serde_json::to_string(i).ok())
                    .unwrap_or_else(|| "{}".to_string());
                format!("action: {} {}", tool, input)
            }
            HistoryEvent::Reflection(c) => {
                format!("reflection: {} (suggestion: {})", c.critique, c.suggestion)
            }
            HistoryEvent::Plan(p) | HistoryEvent::PlanUpdate(p) => {
                format!("{}: {} step(s)", self.kind(), p.steps.len())
            }
        }
    }
}

/// Status and history of one run. History is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub task:       String,
    status:         RunStatus,
    history:        Vec<HistoryEntry>,
    pub start_time: DateTime<Utc>,
    end_time:       Option<DateTime<Utc>>,
    #[serde(default)]
    answer:         Option<String>,
    #[serde(default)]
    failure:        Option<FailureReason>,
}

impl RunState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task:       task.into(),
            status:     RunStatus::Pending,
            history:    Vec::new(),
            start_time: Utc::now(),
            end_time:   None,
            answer:     None,
            failure:    None,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn record(&mut self, event: HistoryEvent) {
        self.history.push(HistoryEntry { timestamp: Utc::now(), event });
    }

    /// Most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Event kinds in order, e.g. `["thought", "action", "observation"]`.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.history.iter().map(HistoryEntry::kind).collect()
    }

    pub fn start(&mut self) -> Result<(), AgentError> {
        self.transition(RunStatus::Running)?;
        self.start_time = Utc::now();
        Ok(())
    }

    pub fn complete(&mut self, answer: impl Into<String>) -> Result<(), AgentError> {
        self.transition(RunStatus::Completed)?;
        self.answer = Some(answer.into());
        self.end_time = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, reason: FailureReason) -> Result<(), AgentError> {
        self.transition(RunStatus::Failed)?;
        self.failure = Some(reason);
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// Wall-clock duration in seconds, up to now for unfinished runs.
    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    fn transition(&mut self, to: RunStatus) -> Result<(), AgentError> {
        if !self.status.can_become(to) {
            return Err(AgentError::InvalidStatusTransition { from: self.status, to });
        }
        tracing::debug!(from = %self.status, to = %to, "run status");
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_moves_forward_only() {
        let mut run = RunState::new("t");
        assert!(matches!(run.complete("x"), Err(AgentError::InvalidStatusTransition { .. })));
        run.start().unwrap();
        run.complete("4").unwrap();
        assert_eq!(run.answer(), Some("4"));
        assert!(run.status().is_terminal());
        assert!(run.end_time().is_some());
        assert!(run.start().is_err());
        assert!(run.fail(FailureReason::IterationBudgetExhausted { max_iterations: 1 }).is_err());
        assert_eq!(run.status(), RunStatus::Completed);
    }

    #[test]
    fn failure_reason_is_kept() {
        let mut run = RunState::new("t");
        run.start().unwrap();
        run.fail(FailureReason::OracleFailure { attempts: 3, last_error: "boom".into() }).unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.failure().unwrap().to_string().contains("boom"));
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut run = RunState::new("t");
        for i in 0..7 {
            run.record(HistoryEvent::Thought(i.to_string()));
        }
        let tail: Vec<String> = run.recent(5).iter().map(|e| e.summary()).collect();
        assert_eq!(tail.first().map(String::as_str), Some("thought: 2"));
        assert_eq!(tail.len(), 5);
        assert_eq!(run.recent(50).len(), 7);
    }

    #[test]
    fn history_entry_serializes_with_event_tag() {
        let mut run = RunState::new("t");
        run.record(HistoryEvent::Action { tool: "calc".into(), input: None });
        let json = serde_json::to_value(&run.history()[0]).unwrap();
        assert_eq!(json["event"], "action");
        assert_eq!(json["data"]["tool"], "calc");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn status_parses_from_str() {
        assert_eq!("failed".parse::<RunStatus>().unwrap(), RunStatus::Failed);
        assert!("bogus".parse::<RunStatus>().is_err());
    }
}
