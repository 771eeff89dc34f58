//! Persistence seam of the tracking engine.
//!
//! Both backends expose the same operations. `commit_move` and `commit_cancel`
//! are the transactional units: the card mutation and the log change become
//! visible together or not at all.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::TrackingError;
use crate::models::{
    Card, CardDetails, GeoStatus, NewCard, OffloadStatus, Operation, OperationFilter,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A move validated by the tracking service, ready to be committed
#[derive(Debug, Clone)]
pub struct MoveCommit {
    pub card_name: String,
    // Geo status the service observed; re-checked inside the commit
    pub expected_source: String,
    pub target_geo: String,
    // Some(..) replaces the card's offload status, None keeps it
    pub offload_status: Option<String>,
    pub actor: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CancelCommit {
    pub operation_id: i64,
    pub actor: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub enum Store {
    Memory(Arc<MemoryStore>),
    Postgres(PgStore),
}

impl Store {
    pub fn memory() -> Self {
        Store::Memory(Arc::new(MemoryStore::default()))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Postgres(_) => "postgres",
        }
    }

    pub async fn ping(&self) -> Result<(), TrackingError> {
        match self {
            Store::Memory(_) => Ok(()),
            Store::Postgres(pg) => pg.ping().await,
        }
    }

    pub async fn list_geo_statuses(&self) -> Result<Vec<GeoStatus>, TrackingError> {
        match self {
            Store::Memory(m) => Ok(m.list_geo_statuses()),
            Store::Postgres(pg) => pg.list_geo_statuses().await,
        }
    }

    pub async fn list_offload_statuses(&self) -> Result<Vec<OffloadStatus>, TrackingError> {
        match self {
            Store::Memory(m) => Ok(m.list_offload_statuses()),
            Store::Postgres(pg) => pg.list_offload_statuses().await,
        }
    }

    pub async fn insert_geo_status(&self, status: GeoStatus) -> Result<GeoStatus, TrackingError> {
        match self {
            Store::Memory(m) => m.insert_geo_status(status),
            Store::Postgres(pg) => pg.insert_geo_status(status).await,
        }
    }

    pub async fn insert_offload_status(
        &self,
        status: OffloadStatus,
    ) -> Result<OffloadStatus, TrackingError> {
        match self {
            Store::Memory(m) => m.insert_offload_status(status),
            Store::Postgres(pg) => pg.insert_offload_status(status).await,
        }
    }

    pub async fn insert_card(&self, card: NewCard) -> Result<Card, TrackingError> {
        match self {
            Store::Memory(m) => m.insert_card(card),
            Store::Postgres(pg) => pg.insert_card(card).await,
        }
    }

    pub async fn get_card(&self, card_name: &str) -> Result<Option<Card>, TrackingError> {
        match self {
            Store::Memory(m) => Ok(m.get_card(card_name)),
            Store::Postgres(pg) => pg.get_card(card_name).await,
        }
    }

    pub async fn find_cards_by_status(
        &self,
        geo_status: &str,
        include_quarantined: bool,
    ) -> Result<Vec<Card>, TrackingError> {
        match self {
            Store::Memory(m) => Ok(m.find_cards_by_status(geo_status, include_quarantined)),
            Store::Postgres(pg) => pg.find_cards_by_status(geo_status, include_quarantined).await,
        }
    }

    pub async fn list_movable_cards(&self) -> Result<Vec<Card>, TrackingError> {
        match self {
            Store::Memory(m) => Ok(m.list_movable_cards()),
            Store::Postgres(pg) => pg.list_movable_cards().await,
        }
    }

    pub async fn search_cards(&self, prefix: &str, limit: i64) -> Result<Vec<Card>, TrackingError> {
        match self {
            Store::Memory(m) => Ok(m.search_cards(prefix, limit)),
            Store::Postgres(pg) => pg.search_cards(prefix, limit).await,
        }
    }

    pub async fn set_quarantine(
        &self,
        card_name: &str,
        quarantine: bool,
    ) -> Result<Card, TrackingError> {
        match self {
            Store::Memory(m) => m.set_quarantine(card_name, quarantine),
            Store::Postgres(pg) => pg.set_quarantine(card_name, quarantine).await,
        }
    }

    pub async fn update_card_details(
        &self,
        card_name: &str,
        details: &CardDetails,
    ) -> Result<Card, TrackingError> {
        match self {
            Store::Memory(m) => m.update_card_details(card_name, details),
            Store::Postgres(pg) => pg.update_card_details(card_name, details).await,
        }
    }

    pub async fn get_operation(&self, id: i64) -> Result<Option<Operation>, TrackingError> {
        match self {
            Store::Memory(m) => Ok(m.get_operation(id)),
            Store::Postgres(pg) => pg.get_operation(id).await,
        }
    }

    pub async fn list_operations(
        &self,
        filter: &OperationFilter,
        limit: i64,
    ) -> Result<Vec<Operation>, TrackingError> {
        match self {
            Store::Memory(m) => Ok(m.list_operations(filter, limit)),
            Store::Postgres(pg) => pg.list_operations(filter, limit).await,
        }
    }

    pub async fn operations_since(
        &self,
        after_id: i64,
        offload_status: &str,
    ) -> Result<Vec<Operation>, TrackingError> {
        match self {
            Store::Memory(m) => Ok(m.operations_since(after_id, offload_status)),
            Store::Postgres(pg) => pg.operations_since(after_id, offload_status).await,
        }
    }

    pub async fn commit_move(&self, commit: &MoveCommit) -> Result<Operation, TrackingError> {
        match self {
            Store::Memory(m) => m.commit_move(commit),
            Store::Postgres(pg) => pg.commit_move(commit).await,
        }
    }

    pub async fn commit_cancel(&self, commit: &CancelCommit) -> Result<Operation, TrackingError> {
        match self {
            Store::Memory(m) => m.commit_cancel(commit),
            Store::Postgres(pg) => pg.commit_cancel(commit).await,
        }
    }
}

/// Timestamp for a card's next operation: strictly after its previous one.
pub fn next_timestamp(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    // Postgres keeps microseconds
    let now = now.trunc_subsecs(6);
    match previous {
        Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_timestamp_moves_forward_on_clock_skew() {
        let prev = Utc::now();
        let earlier = prev - chrono::Duration::seconds(5);
        let next = next_timestamp(earlier, Some(prev.trunc_subsecs(6)));
        assert!(next > prev.trunc_subsecs(6));
    }

    #[test]
    fn test_next_timestamp_keeps_current_time() {
        let now = Utc::now();
        let prev = now - chrono::Duration::seconds(5);
        assert_eq!(next_timestamp(now, Some(prev)), now.trunc_subsecs(6));
        assert_eq!(next_timestamp(now, None), now.trunc_subsecs(6));
    }
}
