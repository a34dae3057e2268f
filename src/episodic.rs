use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use crate::error::AgentError;
use crate::llm::Message;
use crate::run_state::HistoryEntry;

/// One finished run, kept for later recall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub task:          String,
    pub steps:         Vec<HistoryEntry>,
    pub success:       bool,
    pub final_answer:  Option<String>,
    pub duration_secs: f64,
}

/// Memory collaborator consulted at run start and end only.
#[async_trait]
pub trait EpisodicMemory: Send + Sync {
    /// Store one conversational message.
    async fn remember(&self, content: &str, role: &str) -> Result<(), AgentError>;

    /// Store a finished run and return its id.
    async fn add_episode(&self, episode: Episode) -> Result<String, AgentError>;

    /// Up to `k` episodes whose task contains `query`, newest first.
    async fn recall(&self, query: &str, k: usize) -> Result<Vec<Episode>, AgentError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sliding window of recent messages plus an episode list.
pub struct InMemoryEpisodicMemory {
    max_messages: usize,
    messages:     Mutex<VecDeque<Message>>,
    episodes:     Mutex<Vec<Episode>>,
}

impl Default for InMemoryEpisodicMemory {
    fn default() -> Self {
        Self::new(50)
    }
}

impl InMemoryEpisodicMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
            messages:     Mutex::new(VecDeque::new()),
            episodes:     Mutex::new(Vec::new()),
        }
    }

    /// The last `k` messages, oldest first.
    pub fn recent_messages(&self, k: usize) -> Vec<Message> {
        let messages = lock(&self.messages);
        let skip = messages.len().saturating_sub(k);
        messages.iter().skip(skip).cloned().collect()
    }

    pub fn episodes(&self) -> Vec<Episode> {
        lock(&self.episodes).clone()
    }
}

#[async_trait]
impl EpisodicMemory for InMemoryEpisodicMemory {
    async fn remember(&self, content: &str, role: &str) -> Result<(), AgentError> {
        let mut messages = lock(&self.messages);
        if messages.len() == self.max_messages {
            messages.pop_front();
        }
        messages.push_back(Message { role: role.to_string(), content: content.to_string() });
        Ok(())
    }

    async fn add_episode(&self, episode: Episode) -> Result<String, AgentError> {
        let mut episodes = lock(&self.episodes);
        episodes.push(episode);
        Ok(episodes.len().to_string())
    }

    async fn recall(&self, query: &str, k: usize) -> Result<Vec<Episode>, AgentError> {
        Ok(lock(&self.episodes)
            .iter()
            .rev()
            .filter(|e| e.task.contains(query))
            .take(k)
            .cloned()
            .collect())
    }
}

/// Episodes and messages in SQLite, recalled by keyword.
pub struct SqliteEpisodicMemory {
    conn: Mutex<Connection>,
}

impl SqliteEpisodicMemory {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, AgentError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS episodes (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                task         TEXT NOT NULL,
                steps        TEXT NOT NULL,
                success      INTEGER NOT NULL,
                final_answer TEXT,
                duration     REAL NOT NULL,
                timestamp    DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS messages (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                role      TEXT NOT NULL,
                content   TEXT NOT NULL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

#[async_trait]
impl EpisodicMemory for SqliteEpisodicMemory {
    async fn remember(&self, content: &str, role: &str) -> Result<(), AgentError> {
        lock(&self.conn).execute(
            "INSERT INTO messages (role, content) VALUES (?1, ?2)",
            params![role, content],
        )?;
        Ok(())
    }

    async fn add_episode(&self, episode: Episode) -> Result<String, AgentError> {
        let steps = serde_json::to_string(&episode.steps)?;
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT INTO episodes (task, steps, success, final_answer, duration) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![episode.task, steps, episode.success, episode.final_answer, episode.duration_secs],
        )?;
        Ok(conn.last_insert_rowid().to_string())
    }

    async fn recall(&self, query: &str, k: usize) -> Result<Vec<Episode>, AgentError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT task, steps, success, final_answer, duration
             FROM episodes
             WHERE task LIKE '%' || ?1 || '%'
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![query, k as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;

        let mut episodes = Vec::new();
        for row in rows {
            let (task, steps, success, final_answer, duration_secs) = row?;
            episodes.push(Episode {
                task,
                steps: serde_json::from_str(&steps)?,
                success,
                final_answer,
                duration_secs,
            });
        }
        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(task: &str, success: bool) -> Episode {
        Episode {
            task:          task.to_string(),
            steps:         Vec::new(),
            success,
            final_answer:  success.then(|| "done".to_string()),
            duration_secs: 0.5,
        }
    }

    #[tokio::test]
    async fn message_window_slides() {
        let memory = InMemoryEpisodicMemory::new(2);
        for i in 0..3 {
            memory.remember(&format!("m{}", i), "user").await.unwrap();
        }
        let recent: Vec<String> = memory.recent_messages(10).into_iter().map(|m| m.content).collect();
        assert_eq!(recent, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn sqlite_recall_matches_keyword_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let memory = SqliteEpisodicMemory::open(dir.path().join("memory.db")).unwrap();
        memory.add_episode(episode("sum two numbers", true)).await.unwrap();
        memory.add_episode(episode("write a poem", false)).await.unwrap();
        let last = memory.add_episode(episode("sum three numbers", false)).await.unwrap();
        memory.remember("hello", "user").await.unwrap();

        let found = memory.recall("sum", 5).await.unwrap();
        assert_eq!(last, "3");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].task, "sum three numbers");
        assert!(found[1].success);
        assert_eq!(found[1].final_answer.as_deref(), Some("done"));
    }
}
