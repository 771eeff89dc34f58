use crate::error::TrackingError;
use crate::models::{GeoStatus, OffloadStatus};
use crate::store::Store;

/// Read access to the configured geo and offload statuses
#[derive(Clone)]
pub struct StatusRegistry {
    store: Store,
}

impl StatusRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Geo statuses in registry order, `NotConfigured` when none exist
    pub async fn list_geo_statuses(&self) -> Result<Vec<GeoStatus>, TrackingError> {
        let statuses = self.store.list_geo_statuses().await?;
        if statuses.is_empty() {
            return Err(TrackingError::NotConfigured("geo statuses"));
        }
        Ok(statuses)
    }

    pub async fn list_offload_statuses(&self) -> Result<Vec<OffloadStatus>, TrackingError> {
        let statuses = self.store.list_offload_statuses().await?;
        if statuses.is_empty() {
            return Err(TrackingError::NotConfigured("offload statuses"));
        }
        Ok(statuses)
    }

    pub async fn add_geo_status(&self, mut status: GeoStatus) -> Result<GeoStatus, TrackingError> {
        status.status_name = normalize_name(&status.status_name)?;
        let status = self.store.insert_geo_status(status).await?;
        tracing::info!(status = %status.status_name, "Geo status registered");
        Ok(status)
    }

    pub async fn add_offload_status(
        &self,
        mut status: OffloadStatus,
    ) -> Result<OffloadStatus, TrackingError> {
        status.status_name = normalize_name(&status.status_name)?;
        let status = self.store.insert_offload_status(status).await?;
        tracing::info!(status = %status.status_name, "Offload status registered");
        Ok(status)
    }

    pub async fn ensure_geo_status(&self, name: &str) -> Result<(), TrackingError> {
        let statuses = self.list_geo_statuses().await?;
        if statuses.iter().any(|s| s.status_name == name) {
            Ok(())
        } else {
            Err(TrackingError::InvalidStatus(name.to_string()))
        }
    }

    pub async fn ensure_offload_status(&self, name: &str) -> Result<(), TrackingError> {
        let statuses = self.list_offload_statuses().await?;
        if statuses.iter().any(|s| s.status_name == name) {
            Ok(())
        } else {
            Err(TrackingError::InvalidStatus(name.to_string()))
        }
    }
}

fn normalize_name(name: &str) -> Result<String, TrackingError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TrackingError::InvalidStatus("(blank)".to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_not_configured() {
        let registry = StatusRegistry::new(Store::memory());
        let err = registry.list_geo_statuses().await.unwrap_err();
        assert!(matches!(err, TrackingError::NotConfigured(_)));
        let err = registry.list_offload_statuses().await.unwrap_err();
        assert!(matches!(err, TrackingError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_add_trims_and_rejects_duplicates() {
        let registry = StatusRegistry::new(Store::memory());
        let added = registry
            .add_geo_status(GeoStatus::new("  POST-PROD ", 1))
            .await
            .unwrap();
        assert_eq!(added.status_name, "POST-PROD");

        let err = registry
            .add_geo_status(GeoStatus::new("POST-PROD", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_blank_name_is_invalid() {
        let registry = StatusRegistry::new(Store::memory());
        let err = registry
            .add_offload_status(OffloadStatus::new("   ", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn test_ensure_unknown_status() {
        let registry = StatusRegistry::new(Store::memory());
        registry
            .add_geo_status(GeoStatus::new("POST-PROD", 1))
            .await
            .unwrap();
        assert!(registry.ensure_geo_status("POST-PROD").await.is_ok());
        let err = registry.ensure_geo_status("MARS").await.unwrap_err();
        assert!(matches!(err, TrackingError::InvalidStatus(ref s) if s == "MARS"));
    }
}
