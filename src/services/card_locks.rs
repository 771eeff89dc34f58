use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::TrackingError;

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

fn table(locks: &LockTable) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drops the entry of `card_name` once nobody holds or awaits it.
///
/// Clones are only taken under the table lock, so a strong count of one
/// means the table owns the last reference.
fn prune(locks: &LockTable, card_name: &str) {
    let mut locks = table(locks);
    if locks
        .get(card_name)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        locks.remove(card_name);
    }
}

/// Per-card mutual exclusion.
///
/// Every card name maps to its own async mutex; there is no lock shared
/// between cards. Acquisition gives up after `timeout` with `Busy`.
/// Entries live only while a guard or a waiter needs them.
#[derive(Debug)]
pub struct CardLocks {
    locks: LockTable,
    timeout: Duration,
}

/// Held for the duration of a move or cancel on one card
#[derive(Debug)]
pub struct CardGuard {
    locks: LockTable,
    card_name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CardGuard {
    fn drop(&mut self) {
        // Release first so the guard's reference no longer counts
        drop(self.guard.take());
        prune(&self.locks, &self.card_name);
    }
}

impl CardLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    fn lock_for(&self, card_name: &str) -> Arc<AsyncMutex<()>> {
        table(&self.locks)
            .entry(card_name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Number of cards currently locked or awaited
    pub fn len(&self) -> usize {
        table(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn acquire(&self, card_name: &str) -> Result<CardGuard, TrackingError> {
        let lock = self.lock_for(card_name);
        // Bound first so the timed-out future and its reference are gone before pruning
        let acquired = tokio::time::timeout(self.timeout, lock.lock_owned()).await;

        match acquired {
            Ok(guard) => Ok(CardGuard {
                locks: self.locks.clone(),
                card_name: card_name.to_string(),
                guard: Some(guard),
            }),
            Err(_) => {
                prune(&self.locks, card_name);
                tracing::warn!(
                    card = %card_name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Timed out waiting for card lock"
                );
                Err(TrackingError::Busy(format!("Card {}", card_name)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_card_times_out_while_held() {
        let locks = CardLocks::new(Duration::from_millis(20));
        let _held = locks.acquire("A23").await.unwrap();

        let err = locks.acquire("A23").await.unwrap_err();
        assert!(matches!(err, TrackingError::Busy(ref card) if card == "Card A23"));
    }

    #[tokio::test]
    async fn test_other_cards_are_independent() {
        let locks = CardLocks::new(Duration::from_millis(20));
        let _held = locks.acquire("A23").await.unwrap();

        assert!(locks.acquire("B66").await.is_ok());
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_is_released_on_drop() {
        let locks = CardLocks::new(Duration::from_millis(20));
        drop(locks.acquire("A23").await.unwrap());
        assert!(locks.acquire("A23").await.is_ok());
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = CardLocks::new(Duration::from_millis(20));
        for i in 0..10_000 {
            drop(locks.acquire(&format!("unknown-{}", i)).await.unwrap());
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_waiter_leaves_no_entry() {
        let locks = CardLocks::new(Duration::from_millis(20));
        let held = locks.acquire("A23").await.unwrap();
        assert!(locks.acquire("A23").await.is_err());
        assert_eq!(locks.len(), 1);

        drop(held);
        assert!(locks.is_empty());
    }
}
