use std::time::Duration;

use chrono::Utc;

use crate::error::TrackingError;
use crate::models::{Card, CardDetails, NewCard, Operation, OperationFilter};
use crate::services::card_locks::CardLocks;
use crate::services::registry::StatusRegistry;
use crate::store::{CancelCommit, MoveCommit, Store};

const MAX_OPERATIONS_LIMIT: i64 = 500;

/// A request to move a card
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub card_name: String,
    // Status the caller believes the card is at; advisory, re-checked
    pub source: Option<String>,
    // None keeps the current geo status (offload-only change)
    pub target: Option<String>,
    pub offload_status: Option<String>,
    pub actor: String,
}

/// Orchestrates moves and cancellations.
///
/// Both run under the card's lock and commit through the store's
/// transactional units, so the card state always matches the latest
/// active operation in the log.
pub struct TrackingService {
    store: Store,
    registry: StatusRegistry,
    locks: CardLocks,
    operations_limit: i64,
}

impl TrackingService {
    pub fn new(store: Store, lock_timeout: Duration, operations_limit: i64) -> Self {
        Self {
            registry: StatusRegistry::new(store.clone()),
            store,
            locks: CardLocks::new(lock_timeout),
            operations_limit: operations_limit.clamp(1, MAX_OPERATIONS_LIMIT),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    /// Moves a card to a new geo status and/or offload status
    pub async fn move_card(&self, request: MoveRequest) -> Result<Operation, TrackingError> {
        // Moves are refused until the registry holds statuses
        let geo_statuses = self.registry.list_geo_statuses().await?;

        let _guard = self.locks.acquire(&request.card_name).await?;

        let card = self.load_card(&request.card_name).await?;

        let target = request
            .target
            .clone()
            .unwrap_or_else(|| card.geo_status.clone());
        if !geo_statuses.iter().any(|s| s.status_name == target) {
            return Err(TrackingError::InvalidStatus(target));
        }
        if let Some(offload) = &request.offload_status {
            self.registry.ensure_offload_status(offload).await?;
        }

        if card.quarantine {
            return Err(TrackingError::Quarantined(card.card_name));
        }

        if let Some(source) = &request.source {
            if *source != card.geo_status {
                return Err(TrackingError::InvalidTransition {
                    card: card.card_name,
                    expected: source.clone(),
                    actual: card.geo_status,
                });
            }
        }

        // Re-sending the current offload status is not a change
        let offload_change = request
            .offload_status
            .filter(|o| card.offload_status.as_deref() != Some(o.as_str()));

        if target == card.geo_status && offload_change.is_none() {
            return Err(TrackingError::NoOp {
                card: card.card_name,
                status: target,
            });
        }

        let commit = MoveCommit {
            card_name: card.card_name,
            expected_source: card.geo_status,
            target_geo: target,
            offload_status: offload_change,
            actor: request.actor,
            at: Utc::now(),
        };
        let operation = self.store.commit_move(&commit).await?;

        tracing::info!(
            card = %operation.card_name,
            operation_id = operation.id,
            source = %operation.source_geo,
            target = %operation.target_geo,
            offload_status = ?operation.offload_status,
            actor = %operation.username,
            "Card moved"
        );

        Ok(operation)
    }

    /// Cancels the latest active operation of a card, restoring its previous state
    pub async fn cancel(&self, operation_id: i64, actor: &str) -> Result<Operation, TrackingError> {
        let operation = self
            .store
            .get_operation(operation_id)
            .await?
            .ok_or_else(|| TrackingError::NotFound(format!("Operation {}", operation_id)))?;

        if !operation.is_active() {
            return Err(TrackingError::AlreadyCancelled(operation_id));
        }

        let _guard = self.locks.acquire(&operation.card_name).await?;

        // State and ordering checks are repeated inside the commit
        let cancelled = self
            .store
            .commit_cancel(&CancelCommit {
                operation_id,
                actor: actor.to_string(),
                at: Utc::now(),
            })
            .await?;

        tracing::info!(
            card = %cancelled.card_name,
            operation_id = cancelled.id,
            restored = %cancelled.source_geo,
            actor = %actor,
            "Operation cancelled"
        );

        Ok(cancelled)
    }

    /// Provisions a new card at a registered geo status
    pub async fn register_card(&self, mut data: NewCard) -> Result<Card, TrackingError> {
        data.card_name = data.card_name.trim().to_string();
        if data.card_name.is_empty() {
            return Err(TrackingError::Validation("Card name is required".to_string()));
        }

        self.registry.ensure_geo_status(&data.geo_status).await?;
        if let Some(offload) = &data.offload_status {
            self.registry.ensure_offload_status(offload).await?;
        }

        let _guard = self.locks.acquire(&data.card_name).await?;
        let card = self.store.insert_card(data).await?;

        tracing::info!(card = %card.card_name, status = %card.geo_status, "Card registered");

        Ok(card)
    }

    pub async fn set_quarantine(
        &self,
        card_name: &str,
        quarantine: bool,
        actor: &str,
    ) -> Result<Card, TrackingError> {
        let _guard = self.locks.acquire(card_name).await?;
        let card = self.store.set_quarantine(card_name, quarantine).await?;

        tracing::info!(card = %card_name, quarantine, actor = %actor, "Card quarantine updated");

        Ok(card)
    }

    /// Edits capacity, brand and type; location changes go through moves
    pub async fn update_card_details(
        &self,
        card_name: &str,
        mut details: CardDetails,
        actor: &str,
    ) -> Result<Card, TrackingError> {
        if details.capacity.is_some_and(|c| c < 0) {
            return Err(TrackingError::Validation(
                "Capacity cannot be negative".to_string(),
            ));
        }
        details.brand = trimmed(details.brand);
        details.card_type = trimmed(details.card_type);

        let _guard = self.locks.acquire(card_name).await?;
        let card = self.store.update_card_details(card_name, &details).await?;

        tracing::info!(
            card = %card_name,
            capacity = ?card.capacity,
            brand = ?card.brand,
            card_type = ?card.card_type,
            actor = %actor,
            "Card details updated"
        );

        Ok(card)
    }

    pub async fn load_card(&self, card_name: &str) -> Result<Card, TrackingError> {
        self.store
            .get_card(card_name)
            .await?
            .ok_or_else(|| TrackingError::NotFound(format!("Card {}", card_name)))
    }

    /// Non-quarantined cards currently at `geo_status`
    pub async fn movable_cards_at(&self, geo_status: &str) -> Result<Vec<Card>, TrackingError> {
        self.store.find_cards_by_status(geo_status, false).await
    }

    /// Operation history, newest first
    pub async fn operations(&self, filter: &OperationFilter) -> Result<Vec<Operation>, TrackingError> {
        let limit = filter
            .limit
            .unwrap_or(self.operations_limit)
            .clamp(1, MAX_OPERATIONS_LIMIT);
        self.store.list_operations(filter, limit).await
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
