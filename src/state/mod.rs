//! Durable local state for the orchestration engine.
//!
//! Two files live under the state directory: `quota.json` with the daily
//! run counter, and one append-only `runs/YYYY-MM-DD.jsonl` log per day.
//! All access is full read-modify-write under a single in-process lock;
//! this assumes exactly one engine process per state directory and is not
//! safe for concurrent writers.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::StateError;

/// Daily quota counter, persisted write-through after every debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaState {
    pub daily_count: u32,
    pub last_reset_date: NaiveDate,
}

impl QuotaState {
    /// Fresh state for `today` with no runs recorded.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            daily_count: 0,
            last_reset_date: today,
        }
    }

    /// The count that applies on `today`, accounting for date rollover.
    pub fn effective_count(&self, today: NaiveDate) -> u32 {
        if today > self.last_reset_date {
            0
        } else {
            self.daily_count
        }
    }

    /// Applies rollover and debits one run.
    pub fn debit(&mut self, today: NaiveDate) {
        if today > self.last_reset_date {
            self.daily_count = 0;
            self.last_reset_date = today;
        }
        self.daily_count += 1;
    }
}

/// Single-writer JSON state store.
pub struct StateStore {
    dir: PathBuf,
    // one lock serializes quota and run-log writes; both files are updated
    // together on a terminal transition
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// State directory root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn quota_path(&self) -> PathBuf {
        self.dir.join("quota.json")
    }

    fn run_log_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join("runs").join(format!("{}.jsonl", date))
    }

    async fn ensure_dirs(&self) -> Result<(), StateError> {
        let runs = self.dir.join("runs");
        fs::create_dir_all(&runs).await.map_err(|e| {
            StateError::DirectoryCreationFailed(format!("{}: {}", runs.display(), e))
        })
    }

    /// Reads the quota state, defaulting to a fresh counter when the file
    /// does not exist yet. A corrupt file is treated as fresh state rather
    /// than blocking every future run.
    pub async fn load_quota(&self) -> Result<QuotaState, StateError> {
        let _guard = self.lock.lock().await;
        self.read_quota_unlocked().await
    }

    async fn read_quota_unlocked(&self) -> Result<QuotaState, StateError> {
        let path = self.quota_path();
        match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => Ok(state),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt quota file, resetting");
                    Ok(QuotaState::new(Local::now().date_naive()))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(QuotaState::new(Local::now().date_naive()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_quota_unlocked(&self, state: &QuotaState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state)?;
        let mut file = fs::File::create(self.quota_path()).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn append_run_unlocked<T: Serialize>(
        &self,
        date: NaiveDate,
        record: &T,
    ) -> Result<(), StateError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.run_log_path(date))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Debits one run from the quota and persists immediately.
    ///
    /// Write-through: a crash right after this call cannot lose the debit.
    pub async fn debit_quota(&self, today: NaiveDate) -> Result<QuotaState, StateError> {
        let _guard = self.lock.lock().await;
        let mut state = self.read_quota_unlocked().await?;
        state.debit(today);
        self.ensure_dirs().await?;
        self.write_quota_unlocked(&state).await?;
        Ok(state)
    }

    /// Appends one record to the per-day run log.
    pub async fn append_run<T: Serialize>(
        &self,
        date: NaiveDate,
        record: &T,
    ) -> Result<(), StateError> {
        let _guard = self.lock.lock().await;
        self.ensure_dirs().await?;
        self.append_run_unlocked(date, record).await
    }

    /// Records one terminal run: debits the quota, then appends the run to
    /// the day's log, under one lock acquisition.
    ///
    /// The quota is written first. A crash between the two writes then
    /// leaves a debit without a log line, which only wastes one run; the
    /// reverse order would allow a double-spend after restart.
    pub async fn record_run<T: Serialize>(
        &self,
        date: NaiveDate,
        record: &T,
    ) -> Result<QuotaState, StateError> {
        let _guard = self.lock.lock().await;
        self.ensure_dirs().await?;
        let mut state = self.read_quota_unlocked().await?;
        state.debit(date);
        self.write_quota_unlocked(&state).await?;
        self.append_run_unlocked(date, record).await?;
        Ok(state)
    }

    /// Loads the run log for one day. Unparseable lines are skipped.
    pub async fn runs_for<T: DeserializeOwned>(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<T>, StateError> {
        let _guard = self.lock.lock().await;
        let path = self.run_log_path(date);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_effective_count_rollover() {
        let state = QuotaState {
            daily_count: 3,
            last_reset_date: date("2026-08-29"),
        };
        assert_eq!(state.effective_count(date("2026-08-29")), 3);
        assert_eq!(state.effective_count(date("2026-08-30")), 0);
    }

    #[test]
    fn test_debit_resets_on_new_day() {
        let mut state = QuotaState {
            daily_count: 3,
            last_reset_date: date("2026-08-29"),
        };
        state.debit(date("2026-08-30"));
        assert_eq!(state.daily_count, 1);
        assert_eq!(state.last_reset_date, date("2026-08-30"));

        state.debit(date("2026-08-30"));
        assert_eq!(state.daily_count, 2);
    }

    #[tokio::test]
    async fn test_quota_write_through() {
        let dir = tempfile::tempdir().unwrap();
        let today = date("2026-08-30");

        let store = StateStore::new(dir.path());
        assert_eq!(store.load_quota().await.unwrap().effective_count(today), 0);
        store.debit_quota(today).await.unwrap();
        store.debit_quota(today).await.unwrap();

        // a second store over the same directory sees the persisted debits
        let reopened = StateStore::new(dir.path());
        let state = reopened.load_quota().await.unwrap();
        assert_eq!(state.effective_count(today), 2);
    }

    #[tokio::test]
    async fn test_corrupt_quota_resets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("quota.json"), "{not json").unwrap();

        let store = StateStore::new(dir.path());
        let state = store.load_quota().await.unwrap();
        assert_eq!(state.daily_count, 0);
    }

    #[tokio::test]
    async fn test_record_run_debits_quota_and_logs() {
        #[derive(Serialize, Deserialize)]
        struct Rec {
            topic: String,
        }

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let today = date("2026-08-30");

        let state = store
            .record_run(
                today,
                &Rec {
                    topic: "a".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(state.effective_count(today), 1);

        // both writes are visible to a fresh store over the same directory
        let reopened = StateStore::new(dir.path());
        assert_eq!(
            reopened.load_quota().await.unwrap().effective_count(today),
            1
        );
        let runs: Vec<Rec> = reopened.runs_for(today).await.unwrap();
        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn test_run_log_append_and_read() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Rec {
            topic: String,
        }

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let today = date("2026-08-30");

        store
            .append_run(
                today,
                &Rec {
                    topic: "a".to_string(),
                },
            )
            .await
            .unwrap();
        store
            .append_run(
                today,
                &Rec {
                    topic: "b".to_string(),
                },
            )
            .await
            .unwrap();

        let runs: Vec<Rec> = store.runs_for(today).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].topic, "b");

        // other days are empty, not an error
        let other: Vec<Rec> = store.runs_for(date("2026-08-29")).await.unwrap();
        assert!(other.is_empty());
    }
}
