//! In-memory store backend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use super::{Result, Statement, Store, StoreError};

#[derive(Default)]
struct MemoryState {
    pending: Vec<Statement>,
    committed: Vec<Statement>,
    commits: usize,
    /// First bound parameter -> scalar returned by `query_scalar`.
    scalars: HashMap<String, i64>,
    /// Statements whose SQL or parameters contain one of these fail.
    fail_on: Vec<String>,
    reject_commits: bool,
    disconnected: bool,
}

/// In-memory store. Clones share state, so a test can keep a handle while
/// the cycle owns another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    echo: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every executed statement at info level.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Answer `query_scalar` with `value` when its first parameter is `key`.
    pub fn with_scalar(self, key: impl Into<String>, value: i64) -> Self {
        self.state.lock().scalars.insert(key.into(), value);
        self
    }

    /// Reject any statement mentioning `fragment`.
    pub fn fail_on(&self, fragment: impl Into<String>) {
        self.state.lock().fail_on.push(fragment.into());
    }

    /// Make `commit` fail with a statement-level error while `reject` holds.
    pub fn reject_commits(&self, reject: bool) {
        self.state.lock().reject_commits = reject;
    }

    /// Simulate a dropped connection.
    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }

    /// Statements executed but not yet committed.
    pub fn pending(&self) -> Vec<Statement> {
        self.state.lock().pending.clone()
    }

    pub fn committed(&self) -> Vec<Statement> {
        self.state.lock().committed.clone()
    }

    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    fn check_connected(state: &MemoryState) -> Result<()> {
        if state.disconnected {
            return Err(StoreError::Connection("connection closed".into()));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let mut state = self.state.lock();
        Self::check_connected(&state)?;

        let rejected = state.fail_on.iter().any(|fragment| {
            statement.sql().contains(fragment.as_str())
                || statement.params().iter().any(|p| p.contains(fragment.as_str()))
        });
        if rejected {
            return Err(StoreError::Backend(format!("statement rejected: {statement}")));
        }

        if self.echo {
            info!(%statement, "dry run");
        }
        state.pending.push(statement.clone());
        Ok(1)
    }

    fn query_scalar(&mut self, statement: &Statement) -> Result<Option<i64>> {
        let state = self.state.lock();
        Self::check_connected(&state)?;
        Ok(statement
            .params()
            .first()
            .and_then(|key| state.scalars.get(key))
            .copied())
    }

    fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_connected(&state)?;
        if state.reject_commits {
            return Err(StoreError::Backend("commit rejected: deadlock".into()));
        }
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_connected(&state)?;
        state.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_moves_pending() {
        let mut store = MemoryStore::new();
        let handle = store.clone();

        store.execute(&Statement::new("INSERT 1")).unwrap();
        assert_eq!(handle.pending().len(), 1);
        assert!(handle.committed().is_empty());

        store.commit().unwrap();
        assert!(handle.pending().is_empty());
        assert_eq!(handle.committed().len(), 1);
        assert_eq!(handle.commits(), 1);
    }

    #[test]
    fn test_fail_on_and_disconnect() {
        let mut store = MemoryStore::new();
        store.fail_on("broken");

        let err = store.execute(&Statement::new("INSERT").bind("broken")).unwrap_err();
        assert!(!err.is_fatal());

        store.disconnect();
        let err = store.commit().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rejected_commit_then_rollback() {
        let mut store = MemoryStore::new();
        store.reject_commits(true);
        store.execute(&Statement::new("INSERT 1")).unwrap();

        let err = store.commit().unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(store.pending().len(), 1);

        store.rollback().unwrap();
        assert!(store.pending().is_empty());
        assert!(store.committed().is_empty());
    }

    #[test]
    fn test_scalar_lookup() {
        let mut store = MemoryStore::new().with_scalar("line-3", 42);
        let found = store.query_scalar(&Statement::new("SELECT").bind("line-3")).unwrap();
        let missing = store.query_scalar(&Statement::new("SELECT").bind("line-9")).unwrap();
        assert_eq!(found, Some(42));
        assert_eq!(missing, None);
    }
}
