//! Per-run leases
//!
//! Serializes concurrent `advance` calls on the same run id. Duplicate
//! deliveries still happen, they just run one after the other, and each
//! one sees the snapshot the previous one persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Table = Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>;

/// Lock table keyed by run id
#[derive(Debug, Clone, Default)]
pub struct RunLeases {
    table: Table,
}

impl RunLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no one else holds `run_id`, then holds it until the
    /// returned lease is dropped.
    pub async fn acquire(&self, run_id: i64) -> RunLease {
        let lock = {
            let mut table = lock_table(&self.table);
            Arc::clone(table.entry(run_id).or_default())
        };
        let guard = lock.lock_owned().await;
        RunLease {
            run_id,
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    /// Number of run ids currently held or waited on
    pub fn active(&self) -> usize {
        lock_table(&self.table).len()
    }
}

/// Exclusive hold on one run id
#[derive(Debug)]
pub struct RunLease {
    run_id: i64,
    table: Table,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RunLease {
    pub fn run_id(&self) -> i64 {
        self.run_id
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        if let Some(guard) = self.guard.take() {
            drop(guard);
        }
        // One reference left means only the table holds it: no waiter.
        if table
            .get(&self.run_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.run_id);
        }
    }
}

fn lock_table(table: &Table) -> std::sync::MutexGuard<'_, HashMap<i64, Arc<AsyncMutex<()>>>> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_run_is_exclusive() {
        let leases = RunLeases::new();
        let first = leases.acquire(1).await;

        let waiter = {
            let leases = leases.clone();
            tokio::spawn(async move { leases.acquire(1).await.run_id() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(leases.active(), 0);
    }

    #[tokio::test]
    async fn test_different_runs_do_not_block() {
        let leases = RunLeases::new();
        let _a = leases.acquire(1).await;
        let b = tokio::time::timeout(Duration::from_millis(100), leases.acquire(2)).await;
        assert!(b.is_ok());
        assert_eq!(leases.active(), 2);
    }

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let leases = RunLeases::new();
        drop(leases.acquire(5).await);
        assert_eq!(leases.active(), 0);
    }
}
