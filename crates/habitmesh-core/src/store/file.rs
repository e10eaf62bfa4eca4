use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::{validate_user_id, StoreError, StreakStore, UserLedger};

/// On-disk store: `<root>/users/<user_id>/ledger.json`.
///
/// A transaction holds an exclusive advisory lock on the user's
/// `ledger.lock` for its whole duration, which serializes writers across
/// threads and processes. Commits go through a temp file and a rename, so a
/// reader never observes a half-written ledger.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("users"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join("users").join(user_id)
    }

    pub fn ledger_path(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join("ledger.json")
    }

    fn lock_path(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join("ledger.lock")
    }

    fn open_lock(&self, user_id: &str) -> Result<File, StoreError> {
        fs::create_dir_all(self.user_dir(user_id))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path(user_id))?;
        Ok(file)
    }

    fn load(&self, user_id: &str) -> Result<UserLedger, StoreError> {
        let path = self.ledger_path(user_id);
        if !path.exists() {
            return Ok(UserLedger::new(user_id));
        }
        let raw = fs::read_to_string(&path)?;
        let ledger = UserLedger::from_json(&raw)?;
        if ledger.user_id != user_id {
            return Err(StoreError::UserMismatch {
                expected: user_id.to_string(),
                found: ledger.user_id,
            });
        }
        Ok(ledger)
    }

    fn commit(&self, user_id: &str, ledger: &UserLedger) -> Result<(), StoreError> {
        let path = self.ledger_path(user_id);
        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, ledger)?;
        writeln!(file)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        debug!(user_id, path = %path.display(), "committed ledger");
        Ok(())
    }
}

impl StreakStore for FileStore {
    type Tx = UserLedger;

    fn transaction<T, E, F>(&self, user_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<T, E>,
        E: From<StoreError>,
    {
        validate_user_id(user_id)?;
        let lock = self.open_lock(user_id)?;
        // Held until `lock` drops at the end of this call.
        FileExt::lock_exclusive(&lock).map_err(StoreError::from)?;

        let mut ledger = self.load(user_id)?;
        match f(&mut ledger) {
            Ok(out) => {
                self.commit(user_id, &ledger)?;
                Ok(out)
            }
            Err(err) => {
                debug!(user_id, "transaction rolled back");
                Err(err)
            }
        }
    }

    fn read<T, E, F>(&self, user_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self::Tx) -> Result<T, E>,
        E: From<StoreError>,
    {
        validate_user_id(user_id)?;
        if !self.user_dir(user_id).exists() {
            return f(&UserLedger::new(user_id));
        }
        let lock = self.open_lock(user_id)?;
        FileExt::lock_shared(&lock).map_err(StoreError::from)?;
        let ledger = self.load(user_id)?;
        f(&ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateStreak;
    use crate::store::AggregateStreakStore;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn commit_persists_across_instances() {
        let temp = TempDir::new().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open");
        store
            .transaction("alice", |tx| -> Result<(), StoreError> {
                tx.store_aggregate("alice", AggregateStreak::with_counts(2, 5))
            })
            .expect("commit");

        let reopened = FileStore::open(temp.path()).expect("reopen");
        let aggregate = reopened
            .read("alice", |tx| tx.fetch_aggregate("alice"))
            .expect("read");
        assert_eq!(aggregate.current_streak, 2);
        assert_eq!(aggregate.longest_streak, 5);
        assert!(store.ledger_path("alice").exists());
    }

    #[test]
    fn failed_transaction_does_not_touch_disk() {
        let temp = TempDir::new().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open");
        let result: Result<(), StoreError> = store.transaction("bob", |tx| {
            let mut aggregate = tx.fetch_aggregate("bob")?;
            aggregate.advance_on(NaiveDate::from_ymd_opt(2026, 10, 19).expect("date"));
            tx.store_aggregate("bob", aggregate)?;
            Err(StoreError::Backend("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(!store.ledger_path("bob").exists());
    }

    #[test]
    fn read_of_unknown_user_creates_nothing() {
        let temp = TempDir::new().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open");
        let aggregate = store
            .read("carol", |tx| tx.fetch_aggregate("carol"))
            .expect("read");
        assert_eq!(aggregate, AggregateStreak::default());
        assert!(!store.user_dir("carol").exists());
    }

    #[test]
    fn malformed_schedule_on_disk_surfaces_as_typed_error() {
        let temp = TempDir::new().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open");
        fs::create_dir_all(store.user_dir("dave")).expect("user dir");
        fs::write(
            store.ledger_path("dave"),
            r#"{"user_id":"dave","habits":[{"id":"habit-x","user_id":"dave","name":"Run","weekly_schedule":{"mon":true},"created_at":"2026-10-01T00:00:00Z"}]}"#,
        )
        .expect("seed");
        let err = store
            .read("dave", |tx| tx.fetch_aggregate("dave"))
            .expect_err("malformed");
        assert!(matches!(err, StoreError::MalformedSchedule { ref habit_id, .. } if habit_id == "habit-x"));
    }
}
