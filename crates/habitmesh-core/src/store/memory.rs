use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::{validate_user_id, StoreError, StreakStore, UserLedger};

/// In-process store. Each user has its own mutex, so users never contend
/// with each other; a transaction mutates a clone and swaps it in on success.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, Arc<Mutex<UserLedger>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a user's state wholesale. Intended for seeding.
    pub fn seed(&self, ledger: UserLedger) -> Result<(), StoreError> {
        validate_user_id(&ledger.user_id)?;
        let slot = self.slot(&ledger.user_id);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = ledger;
        Ok(())
    }

    pub fn snapshot(&self, user_id: &str) -> Option<UserLedger> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = users.get(user_id)?.clone();
        drop(users);
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.clone())
    }

    fn slot(&self, user_id: &str) -> Arc<Mutex<UserLedger>> {
        // The committed ledger is only ever replaced whole, so a poisoned lock
        // still guards a consistent value.
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserLedger::new(user_id))))
            .clone()
    }
}

impl StreakStore for MemoryStore {
    type Tx = UserLedger;

    fn transaction<T, E, F>(&self, user_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<T, E>,
        E: From<StoreError>,
    {
        validate_user_id(user_id)?;
        let slot = self.slot(user_id);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let mut working = guard.clone();
        let out = f(&mut working)?;
        *guard = working;
        Ok(out)
    }

    fn read<T, E, F>(&self, user_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self::Tx) -> Result<T, E>,
        E: From<StoreError>,
    {
        validate_user_id(user_id)?;
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = users.get(user_id).cloned() else {
            drop(users);
            return f(&UserLedger::new(user_id));
        };
        drop(users);
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&*guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateStreak;
    use crate::store::AggregateStreakStore;
    use chrono::NaiveDate;

    #[test]
    fn failed_transaction_leaves_state_untouched() {
        let store = MemoryStore::new();
        let result: Result<(), StoreError> = store.transaction("u1", |tx| {
            let mut aggregate = tx.fetch_aggregate("u1")?;
            aggregate.advance_on(NaiveDate::from_ymd_opt(2026, 10, 19).expect("date"));
            tx.store_aggregate("u1", aggregate)?;
            Err(StoreError::Backend("simulated crash".to_string()))
        });
        assert!(result.is_err());
        let snapshot = store.snapshot("u1").expect("slot created");
        assert_eq!(snapshot.aggregate, AggregateStreak::default());
    }

    #[test]
    fn successful_transaction_commits() {
        let store = MemoryStore::new();
        store
            .transaction("u1", |tx| -> Result<(), StoreError> {
                let mut aggregate = tx.fetch_aggregate("u1")?;
                aggregate.advance_on(NaiveDate::from_ymd_opt(2026, 10, 19).expect("date"));
                tx.store_aggregate("u1", aggregate)
            })
            .expect("commit");
        let current = store
            .read("u1", |tx| tx.fetch_aggregate("u1"))
            .expect("read");
        assert_eq!(current.current_streak, 1);
    }

    #[test]
    fn read_of_unknown_user_registers_nothing() {
        let store = MemoryStore::new();
        let aggregate = store
            .read("ghost", |tx| tx.fetch_aggregate("ghost"))
            .expect("read");
        assert_eq!(aggregate, AggregateStreak::default());
        assert!(store.snapshot("ghost").is_none());
    }

    #[test]
    fn rejects_invalid_user_ids() {
        let store = MemoryStore::new();
        let err = store
            .read("../etc", |tx| tx.fetch_aggregate("../etc"))
            .expect_err("invalid");
        assert!(matches!(err, StoreError::InvalidUserId(_)));
    }
}
