use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::{next_timestamp, CancelCommit, MoveCommit};
use crate::error::TrackingError;
use crate::models::status::{sort_geo, sort_offload};
use crate::models::{
    Card, CardDetails, GeoStatus, NewCard, OffloadStatus, Operation, OperationFilter,
    OperationState,
};

#[derive(Debug)]
struct CardEntry {
    card: Card,
    // Operation ids of this card, ascending
    history: Vec<i64>,
    last_created_at: Option<DateTime<Utc>>,
}

/// Process-local store.
///
/// Each card sits behind its own mutex; a commit holds it for the whole
/// check-mutate-append sequence, so two cards never wait on each other
/// beyond the brief map accesses.
#[derive(Debug, Default)]
pub struct MemoryStore {
    geo_statuses: RwLock<Vec<GeoStatus>>,
    offload_statuses: RwLock<Vec<OffloadStatus>>,
    cards: RwLock<HashMap<String, Arc<Mutex<CardEntry>>>>,
    operations: RwLock<BTreeMap<i64, Operation>>,
    last_operation_id: AtomicI64,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn list_geo_statuses(&self) -> Vec<GeoStatus> {
        read(&self.geo_statuses).clone()
    }

    pub fn list_offload_statuses(&self) -> Vec<OffloadStatus> {
        read(&self.offload_statuses).clone()
    }

    pub fn insert_geo_status(&self, status: GeoStatus) -> Result<GeoStatus, TrackingError> {
        let mut statuses = write(&self.geo_statuses);
        if statuses.iter().any(|s| s.status_name == status.status_name) {
            return Err(TrackingError::AlreadyExists(format!(
                "Geo status {}",
                status.status_name
            )));
        }
        statuses.push(status.clone());
        sort_geo(&mut statuses);
        Ok(status)
    }

    pub fn insert_offload_status(
        &self,
        status: OffloadStatus,
    ) -> Result<OffloadStatus, TrackingError> {
        let mut statuses = write(&self.offload_statuses);
        if statuses.iter().any(|s| s.status_name == status.status_name) {
            return Err(TrackingError::AlreadyExists(format!(
                "Offload status {}",
                status.status_name
            )));
        }
        statuses.push(status.clone());
        sort_offload(&mut statuses);
        Ok(status)
    }

    pub fn insert_card(&self, data: NewCard) -> Result<Card, TrackingError> {
        let mut cards = write(&self.cards);
        if cards.contains_key(&data.card_name) {
            return Err(TrackingError::AlreadyExists(format!("Card {}", data.card_name)));
        }

        let card = data.into_card();
        cards.insert(
            card.card_name.clone(),
            Arc::new(Mutex::new(CardEntry {
                card: card.clone(),
                history: Vec::new(),
                last_created_at: None,
            })),
        );
        Ok(card)
    }

    fn entry(&self, card_name: &str) -> Result<Arc<Mutex<CardEntry>>, TrackingError> {
        read(&self.cards)
            .get(card_name)
            .cloned()
            .ok_or_else(|| TrackingError::NotFound(format!("Card {}", card_name)))
    }

    fn snapshot(&self) -> Vec<Card> {
        let entries: Vec<_> = read(&self.cards).values().cloned().collect();
        let mut cards: Vec<Card> = entries.iter().map(|e| lock(e).card.clone()).collect();
        cards.sort_by(|a, b| a.card_name.cmp(&b.card_name));
        cards
    }

    pub fn get_card(&self, card_name: &str) -> Option<Card> {
        self.entry(card_name).ok().map(|e| lock(&e).card.clone())
    }

    pub fn find_cards_by_status(&self, geo_status: &str, include_quarantined: bool) -> Vec<Card> {
        self.snapshot()
            .into_iter()
            .filter(|c| c.geo_status == geo_status && (include_quarantined || !c.quarantine))
            .collect()
    }

    pub fn list_movable_cards(&self) -> Vec<Card> {
        self.snapshot().into_iter().filter(|c| !c.quarantine).collect()
    }

    pub fn search_cards(&self, prefix: &str, limit: i64) -> Vec<Card> {
        self.snapshot()
            .into_iter()
            .filter(|c| c.card_name.starts_with(prefix))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect()
    }

    pub fn set_quarantine(&self, card_name: &str, quarantine: bool) -> Result<Card, TrackingError> {
        let entry = self.entry(card_name)?;
        let mut entry = lock(&entry);
        entry.card.quarantine = quarantine;
        Ok(entry.card.clone())
    }

    pub fn update_card_details(
        &self,
        card_name: &str,
        details: &CardDetails,
    ) -> Result<Card, TrackingError> {
        let entry = self.entry(card_name)?;
        let mut entry = lock(&entry);
        details.apply_to(&mut entry.card);
        Ok(entry.card.clone())
    }

    pub fn get_operation(&self, id: i64) -> Option<Operation> {
        read(&self.operations).get(&id).cloned()
    }

    pub fn list_operations(&self, filter: &OperationFilter, limit: i64) -> Vec<Operation> {
        read(&self.operations)
            .values()
            .rev()
            .filter(|op| filter.matches(op))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect()
    }

    pub fn operations_since(&self, after_id: i64, offload_status: &str) -> Vec<Operation> {
        read(&self.operations)
            .range(after_id.saturating_add(1)..)
            .map(|(_, op)| op)
            .filter(|op| op.offload_status.as_deref() == Some(offload_status))
            .cloned()
            .collect()
    }

    pub fn commit_move(&self, commit: &MoveCommit) -> Result<Operation, TrackingError> {
        let entry = self.entry(&commit.card_name)?;
        let mut entry = lock(&entry);

        if entry.card.geo_status != commit.expected_source {
            return Err(TrackingError::InvalidTransition {
                card: commit.card_name.clone(),
                expected: commit.expected_source.clone(),
                actual: entry.card.geo_status.clone(),
            });
        }

        let created_at = next_timestamp(commit.at, entry.last_created_at);

        // Ids are taken and published under the log lock, so readers never
        // see a higher id before a lower one
        let mut operations = write(&self.operations);
        let operation = Operation {
            id: self.last_operation_id.fetch_add(1, Ordering::SeqCst) + 1,
            card_name: commit.card_name.clone(),
            source_geo: entry.card.geo_status.clone(),
            target_geo: commit.target_geo.clone(),
            prior_offload_status: entry.card.offload_status.clone(),
            offload_status: commit.offload_status.clone(),
            username: commit.actor.clone(),
            created_at,
            state: OperationState::Active,
            cancelled_by: None,
            cancelled_at: None,
        };

        // Nothing below can fail, so the card and the log change together
        entry.card.geo_status = commit.target_geo.clone();
        if let Some(offload) = &commit.offload_status {
            entry.card.offload_status = Some(offload.clone());
        }
        entry.card.usage_count += 1;
        entry.card.last_operation_at = Some(created_at);
        entry.history.push(operation.id);
        entry.last_created_at = Some(created_at);
        operations.insert(operation.id, operation.clone());

        Ok(operation)
    }

    pub fn commit_cancel(&self, commit: &CancelCommit) -> Result<Operation, TrackingError> {
        let card_name = self
            .get_operation(commit.operation_id)
            .map(|op| op.card_name)
            .ok_or_else(|| TrackingError::NotFound(format!("Operation {}", commit.operation_id)))?;

        let entry = self.entry(&card_name)?;
        let mut entry = lock(&entry);

        let (operation, previous_at) = {
            let operations = read(&self.operations);
            let operation = operations
                .get(&commit.operation_id)
                .cloned()
                .ok_or_else(|| {
                    TrackingError::NotFound(format!("Operation {}", commit.operation_id))
                })?;

            if !operation.is_active() {
                return Err(TrackingError::AlreadyCancelled(operation.id));
            }

            let mut active = entry
                .history
                .iter()
                .rev()
                .filter_map(|id| operations.get(id))
                .filter(|op| op.is_active());

            if active.next().map(|op| op.id) != Some(operation.id) {
                return Err(TrackingError::NotReversible {
                    id: operation.id,
                    card: card_name,
                });
            }

            (operation, active.next().map(|op| op.created_at))
        };

        entry.card.geo_status = operation.source_geo.clone();
        if operation.changes_offload() {
            entry.card.offload_status = operation.prior_offload_status.clone();
        }
        entry.card.usage_count = (entry.card.usage_count - 1).max(0);
        entry.card.last_operation_at = previous_at;

        let mut operations = write(&self.operations);
        let stored = operations
            .get_mut(&operation.id)
            .ok_or_else(|| TrackingError::NotFound(format!("Operation {}", operation.id)))?;
        stored.state = OperationState::Cancelled;
        stored.cancelled_by = Some(commit.actor.clone());
        stored.cancelled_at = Some(commit.at);

        Ok(stored.clone())
    }
}
