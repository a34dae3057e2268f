use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use crate::error::AgentError;
use crate::run_state::{RunState, RunStatus};

/// A point-in-time snapshot of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub label:         Option<String>,
    pub timestamp:     DateTime<Utc>,
    pub state:         RunState,
}

impl Checkpoint {
    pub fn new(state: &RunState, label: Option<&str>) -> Self {
        let uuid = uuid::Uuid::new_v4();
        let checkpoint_id = match label {
            Some(l) if !l.is_empty() => format!("{}-{}", l, uuid),
            _ => uuid.to_string(),
        };
        Self {
            checkpoint_id,
            label:     label.map(str::to_string),
            timestamp: Utc::now(),
            state:     state.clone(),
        }
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            checkpoint_id: self.checkpoint_id.clone(),
            task:          self.state.task.clone(),
            status:        self.state.status(),
            label:         self.label.clone(),
            timestamp:     self.timestamp,
        }
    }
}

/// Listing row; the full state is fetched with [`CheckpointStore::load`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub checkpoint_id: String,
    pub task:          String,
    pub status:        RunStatus,
    pub label:         Option<String>,
    pub timestamp:     DateTime<Utc>,
}

/// Persistence collaborator. Implementations serialize writers internally.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Save a snapshot and return its id.
    async fn save(&self, state: &RunState, label: Option<&str>) -> Result<String, AgentError>;

    async fn load(&self, checkpoint_id: &str) -> Result<Option<RunState>, AgentError>;

    /// Newest first. `task_filter` matches any task containing it.
    async fn list(&self, task_filter: Option<&str>, limit: usize) -> Result<Vec<CheckpointSummary>, AgentError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A simple in-memory store for testing and short-lived sessions.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<Vec<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, state: &RunState, label: Option<&str>) -> Result<String, AgentError> {
        let checkpoint = Checkpoint::new(state, label);
        let id = checkpoint.checkpoint_id.clone();
        lock(&self.checkpoints).push(checkpoint);
        Ok(id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<RunState>, AgentError> {
        Ok(lock(&self.checkpoints)
            .iter()
            .find(|c| c.checkpoint_id == checkpoint_id)
            .map(|c| c.state.clone()))
    }

    async fn list(&self, task_filter: Option<&str>, limit: usize) -> Result<Vec<CheckpointSummary>, AgentError> {
        Ok(lock(&self.checkpoints)
            .iter()
            .rev()
            .filter(|c| task_filter.map_or(true, |f| c.state.task.contains(f)))
            .take(limit)
            .map(Checkpoint::summary)
            .collect())
    }
}

/// A checkpoint store backed by a SQLite database.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, AgentError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                checkpoint_id TEXT PRIMARY KEY,
                task          TEXT NOT NULL,
                status        TEXT NOT NULL,
                label         TEXT,
                state         TEXT NOT NULL,
                timestamp     TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, state: &RunState, label: Option<&str>) -> Result<String, AgentError> {
        let checkpoint = Checkpoint::new(state, label);
        let state_json = serde_json::to_string(&checkpoint.state)?;

        lock(&self.conn).execute(
            "INSERT INTO checkpoints (checkpoint_id, task, status, label, state, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                checkpoint.checkpoint_id,
                checkpoint.state.task,
                checkpoint.state.status().as_str(),
                checkpoint.label,
                state_json,
                checkpoint.timestamp.to_rfc3339()
            ],
        )?;
        tracing::debug!(id = %checkpoint.checkpoint_id, "checkpoint saved");
        Ok(checkpoint.checkpoint_id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<RunState>, AgentError> {
        let state_json: Option<String> = lock(&self.conn)
            .query_row(
                "SELECT state FROM checkpoints WHERE checkpoint_id = ?1",
                params![checkpoint_id],
                |row| row.get(0),
            )
            .optional()?;

        match state_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, task_filter: Option<&str>, limit: usize) -> Result<Vec<CheckpointSummary>, AgentError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT checkpoint_id, task, status, label, timestamp
             FROM checkpoints
             WHERE ?1 IS NULL OR task LIKE '%' || ?1 || '%'
             ORDER BY rowid DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![task_filter, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (checkpoint_id, task, status, label, timestamp) = row?;
            summaries.push(CheckpointSummary {
                checkpoint_id,
                task,
                status:    status.parse()?,
                label,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| AgentError::Persistence(e.to_string()))?
                    .with_timezone(&Utc),
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(task: &str) -> RunState {
        let mut state = RunState::new(task);
        state.start().unwrap();
        state
    }

    #[tokio::test]
    async fn memory_store_lists_newest_first() {
        let store = MemoryCheckpointStore::new();
        let first = store.save(&run("alpha task"), Some("a")).await.unwrap();
        let second = store.save(&run("beta task"), None).await.unwrap();
        let third = store.save(&run("alpha again"), Some("c")).await.unwrap();

        let all = store.list(None, 10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|s| s.checkpoint_id.clone()).collect();
        assert_eq!(ids, vec![third.clone(), second, first.clone()]);

        let alpha = store.list(Some("alpha"), 1).await.unwrap();
        assert_eq!(alpha.len(), 1);
        assert_eq!(alpha[0].checkpoint_id, third);
        assert!(first.starts_with("a-"));
    }

    #[tokio::test]
    async fn sqlite_store_round_trips_state() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let state = run("persist me");
        let id = store.save(&state, Some("mid")).await.unwrap();

        let loaded = store.load(&id).await.unwrap().expect("checkpoint exists");
        assert_eq!(loaded, state);
        assert!(store.load("missing").await.unwrap().is_none());

        let listed = store.list(Some("persist"), 5).await.unwrap();
        assert_eq!(listed[0].status, RunStatus::Running);
        assert_eq!(listed[0].label.as_deref(), Some("mid"));
    }
}
