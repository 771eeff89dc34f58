use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::TrackingError;
use crate::models::{GeoStatus, NewCard, OffloadStatus};
use crate::services::tracker::TrackingService;

/// Reference data and cards provisioned at startup
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub geo_statuses: Vec<GeoStatus>,
    #[serde(default)]
    pub offload_statuses: Vec<OffloadStatus>,
    #[serde(default)]
    pub cards: Vec<NewCard>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedStats {
    pub created: usize,
    pub existing: usize,
}

impl SeedData {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))
    }

    /// Applies the seed; entries that already exist are left untouched
    pub async fn apply(self, tracker: &TrackingService) -> Result<SeedStats, TrackingError> {
        let mut stats = SeedStats::default();
        let registry = tracker.registry();

        for status in self.geo_statuses {
            tally(&mut stats, registry.add_geo_status(status).await)?;
        }
        for status in self.offload_statuses {
            tally(&mut stats, registry.add_offload_status(status).await)?;
        }
        for card in self.cards {
            tally(&mut stats, tracker.register_card(card).await)?;
        }

        tracing::info!(created = stats.created, existing = stats.existing, "Seed applied");

        Ok(stats)
    }
}

fn tally<T>(stats: &mut SeedStats, result: Result<T, TrackingError>) -> Result<(), TrackingError> {
    match result {
        Ok(_) => stats.created += 1,
        Err(TrackingError::AlreadyExists(_)) => stats.existing += 1,
        Err(e) => return Err(e),
    }
    Ok(())
}
