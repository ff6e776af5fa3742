//! Task storage behind a repository interface.
//!
//! The default implementation is an in-memory table: task history does not
//! survive a restart, which callers treat as a stateless-retry contract. A
//! durable store can be swapped in behind the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::protocol::{Task, TaskState};

/// Storage interface for task records.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert or replace a task. Duplicate ids are not an error; the last
    /// write wins.
    async fn upsert(&self, task: Task);

    /// Fetch a task by id.
    async fn get(&self, id: &str) -> Option<Task>;

    /// Transition a `working` task to `cancelled`.
    ///
    /// Returns the updated record, or `None` if the task is unknown. A task
    /// in any other state is returned unchanged: terminal records are
    /// immutable and this transition is advisory only.
    async fn cancel(&self, id: &str) -> Option<Task>;
}

/// Default in-memory task table.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn upsert(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    async fn cancel(&self, id: &str) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(id)?;
        if task.status.state == TaskState::Working {
            task.status.state = TaskState::Cancelled;
        }
        Some(task.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    fn working_task(id: &str) -> Task {
        Task::working(id, None, Message::user("hi"))
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let repo = InMemoryTaskRepository::new();
        repo.upsert(working_task("t-1")).await;

        let fetched = repo.get("t-1").await.unwrap();
        assert_eq!(fetched.id, "t-1");
        assert_eq!(fetched.status.state, TaskState::Working);
        assert!(repo.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_last_write_wins() {
        let repo = InMemoryTaskRepository::new();
        repo.upsert(working_task("t-1")).await;

        let mut second = working_task("t-1");
        second.complete("response", "second output");
        repo.upsert(second).await;

        let fetched = repo.get("t-1").await.unwrap();
        assert_eq!(fetched.status.state, TaskState::Completed);
        assert_eq!(fetched.artifacts[0].first_text(), Some("second output"));
    }

    #[tokio::test]
    async fn test_cancel_working_task() {
        let repo = InMemoryTaskRepository::new();
        repo.upsert(working_task("t-1")).await;

        let cancelled = repo.cancel("t-1").await.unwrap();
        assert_eq!(cancelled.status.state, TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_is_noop_on_terminal_task() {
        let repo = InMemoryTaskRepository::new();
        let mut task = working_task("t-1");
        task.complete("response", "done");
        repo.upsert(task).await;

        let result = repo.cancel("t-1").await.unwrap();
        assert_eq!(result.status.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let repo = InMemoryTaskRepository::new();
        assert!(repo.cancel("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_same_id_resolve() {
        use std::sync::Arc;

        let repo = Arc::new(InMemoryTaskRepository::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let mut task = working_task("shared");
                task.complete("response", format!("writer-{}", i));
                repo.upsert(task).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // one of the writers won; the record is well-formed either way
        let task = repo.get("shared").await.unwrap();
        assert_eq!(task.status.state, TaskState::Completed);
        assert!(task.artifacts[0]
            .first_text()
            .unwrap()
            .starts_with("writer-"));
    }
}
