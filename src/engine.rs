use std::collections::HashMap;
use std::sync::Arc;
use crate::checkpoint::{CheckpointStore, CheckpointSummary};
use crate::episodic::{Episode, EpisodicMemory};
use crate::error::AgentError;
use crate::events::Event;
use crate::memory::AgentMemory;
use crate::run_state::{RunState, RunStatus};
use crate::states::{AgentContext, AgentState, OutputTx};
use crate::trace::Trace;
use crate::transitions::TransitionTable;
use crate::types::{AgentOutput, State};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

pub struct AgentEngine {
    pub memory:       AgentMemory,
    ctx:              AgentContext,
    state:            State,
    transitions:      TransitionTable,
    handlers:         HashMap<String, Box<dyn AgentState>>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    episodic:         Option<Arc<dyn EpisodicMemory>>,
    begun:            bool,
    finished:         bool,
}

impl AgentEngine {
    /// Creates a new engine. Prefer using AgentBuilder for ergonomic construction.
    pub fn new(
        memory:      AgentMemory,
        ctx:         AgentContext,
        transitions: TransitionTable,
        handlers:    HashMap<String, Box<dyn AgentState>>,
    ) -> Self {
        Self {
            memory,
            ctx,
            state: State::idle(),
            transitions,
            handlers,
            checkpoint_store: None,
            episodic: None,
            begun: false,
            finished: false,
        }
    }

    pub fn with_checkpoint_store(mut self, store: Option<Arc<dyn CheckpointStore>>) -> Self {
        self.checkpoint_store = store;
        self
    }

    pub fn with_episodic_memory(mut self, memory: Option<Arc<dyn EpisodicMemory>>) -> Self {
        self.episodic = memory;
        self
    }

    /// Upper bound on state steps for one run: each iteration takes at most
    /// five states, plus Idle, Planning and the terminal state.
    fn safety_cap(&self) -> usize {
        (self.memory.config.max_iterations + 1) * 6 + 2
    }

    /// Run the agent to completion.
    /// Returns Ok(final_answer), or the failure that ended the run.
    /// Calling it again after the run ended returns the same outcome
    /// without iterating.
    pub async fn run(&mut self) -> Result<String, AgentError> {
        let safety_cap = self.safety_cap();
        let mut steps = 0;

        self.begin().await;
        while !self.state.is_terminal() {
            steps += 1;
            if steps > safety_cap {
                return Err(AgentError::SafetyCapExceeded(steps));
            }
            self.step(None).await?;
        }
        self.finish().await;

        self.outcome()
    }

    /// Executes a single state transition. Entering a terminal state also
    /// runs that state's handler, which finalizes the run record.
    /// A no-op once the run has ended.
    pub async fn step(&mut self, output_tx: OutputTx<'_>) -> Result<(), AgentError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        tracing::info!(state = %self.state, iteration = self.memory.iteration, "agent step");

        let event = self.dispatch(output_tx).await?;
        tracing::debug!(state = %self.state, event = %event, "state produced event");

        // Look up transition
        let key = (self.state.clone(), event.clone());
        let next_state = self.transitions.get(&key)
            .cloned()
            .ok_or_else(|| AgentError::InvalidTransition {
                from:  self.state.clone(),
                event: event.clone(),
            })?;

        tracing::info!(from = %self.state, event = %event, to = %next_state, "transition");
        self.state = next_state;

        if self.state.is_terminal() {
            self.dispatch(output_tx).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, output_tx: OutputTx<'_>) -> Result<Event, AgentError> {
        let handler = self.handlers.get(self.state.as_str())
            .ok_or_else(|| AgentError::NoHandlerForState(self.state.to_string()))?;
        Ok(handler.handle(&mut self.memory, &self.ctx, output_tx).await)
    }

    /// Run the agent and return a stream of AgentOutput events.
    /// The stream ends once the run reaches Done or Error.
    pub fn run_streaming(&mut self) -> BoxStream<'_, AgentOutput> {
        let (tx, rx) = mpsc::unbounded_channel();
        let safety_cap = self.safety_cap();

        stream::unfold(Some((self, rx, tx, 0usize)), move |st| async move {
            let (engine, mut rx, tx, mut steps) = st?;
            loop {
                // 1. Drain anything the last step produced.
                if let Ok(msg) = rx.try_recv() {
                    return Some((msg, Some((engine, rx, tx, steps))));
                }

                // 2. Terminal: settle collaborators once, then end.
                if engine.state.is_terminal() {
                    engine.finish().await;
                    return None;
                }

                // 3. Execute one step of the engine.
                engine.begin().await;
                steps += 1;
                if steps > safety_cap {
                    return Some((AgentOutput::Error(AgentError::SafetyCapExceeded(steps).to_string()), None));
                }
                if let Err(e) = engine.step(Some(&tx)).await {
                    return Some((AgentOutput::Error(e.to_string()), None));
                }
            }
        })
        .boxed()
    }

    /// Collaborator hook at run start.
    async fn begin(&mut self) {
        if self.begun {
            return;
        }
        self.begun = true;
        if let Some(memory) = &self.episodic {
            if let Err(e) = memory.remember(&self.memory.task, "user").await {
                tracing::warn!(error = %e, "episodic memory unavailable");
            }
        }
    }

    /// Collaborator hook at run end.
    async fn finish(&mut self) {
        if self.finished || !self.state.is_terminal() {
            return;
        }
        self.finished = true;
        let Some(memory) = &self.episodic else { return };

        let run = &self.memory.run_state;
        let success = run.status() == RunStatus::Completed;
        if success {
            if let Some(answer) = run.answer() {
                if let Err(e) = memory.remember(answer, "assistant").await {
                    tracing::warn!(error = %e, "episodic memory unavailable");
                }
            }
        }

        let episode = Episode {
            task:          run.task.clone(),
            steps:         run.history().to_vec(),
            success,
            final_answer:  run.answer().map(str::to_string),
            duration_secs: run.duration_secs(),
        };
        match memory.add_episode(episode).await {
            Ok(id) => tracing::debug!(episode = %id, success, "episode recorded"),
            Err(e) => tracing::warn!(error = %e, "could not record episode"),
        }
    }

    fn outcome(&self) -> Result<String, AgentError> {
        if self.state == State::done() {
            Ok(self.memory.final_answer.clone().unwrap_or_default())
        } else if self.state == State::error() {
            Err(self.memory.failure.clone()
                .map(AgentError::from)
                .unwrap_or_else(|| AgentError::AgentFailed("Unknown error".to_string())))
        } else {
            Err(AgentError::AgentFailed(format!("Terminated in state: {}", self.state)))
        }
    }

    /// Snapshot the run record into the configured store.
    pub async fn checkpoint(&self, label: Option<&str>) -> Result<String, AgentError> {
        let store = self.store()?;
        let id = store.save(&self.memory.run_state, label).await?;
        tracing::info!(checkpoint = %id, "checkpoint saved");
        Ok(id)
    }

    /// Replace the run record with a stored one and resume from it. A
    /// restored Completed or Failed run stays ended: `run()` returns its
    /// outcome without iterating.
    pub async fn restore(&mut self, checkpoint_id: &str) -> Result<(), AgentError> {
        let run_state = self.store()?
            .load(checkpoint_id)
            .await?
            .ok_or_else(|| AgentError::Persistence(format!("checkpoint '{}' not found", checkpoint_id)))?;

        let status = run_state.status();
        self.memory.resume_from(run_state);
        self.state = match status {
            RunStatus::Pending   => State::idle(),
            RunStatus::Running if self.memory.current_step.is_some() => State::acting(),
            RunStatus::Running   => State::reasoning(),
            RunStatus::Completed => State::done(),
            RunStatus::Failed    => State::error(),
        };
        self.begun = status != RunStatus::Pending;
        self.finished = status.is_terminal();
        self.memory.log("Engine", "RESTORED", &format!("checkpoint={} status={}", checkpoint_id, status));
        Ok(())
    }

    pub async fn list_checkpoints(&self, task_filter: Option<&str>, limit: usize) -> Result<Vec<CheckpointSummary>, AgentError> {
        self.store()?.list(task_filter, limit).await
    }

    fn store(&self) -> Result<&Arc<dyn CheckpointStore>, AgentError> {
        self.checkpoint_store
            .as_ref()
            .ok_or_else(|| AgentError::Persistence("no checkpoint store configured".to_string()))
    }

    /// Returns a reference to the full execution trace.
    pub fn trace(&self) -> &Trace {
        &self.memory.trace
    }

    /// Returns the current state (useful for inspection after run).
    pub fn current_state(&self) -> &State {
        &self.state
    }

    pub fn run_state(&self) -> &RunState {
        &self.memory.run_state
    }
}
