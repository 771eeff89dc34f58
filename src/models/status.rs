use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A geographic or processing location a card can occupy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct GeoStatus {
    pub status_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

/// Secondary status attribute, independent of the geo status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OffloadStatus {
    pub status_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

impl GeoStatus {
    pub fn new(status_name: impl Into<String>, sort_order: i32) -> Self {
        Self {
            status_name: status_name.into(),
            description: None,
            sort_order,
        }
    }

    /// Lists geo statuses in registry order
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT status_name, description, sort_order
            FROM geo_statuses
            ORDER BY sort_order, status_name
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Inserts a geo status, returning `None` when the name is taken
    pub async fn insert(pool: &PgPool, status: &Self) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO geo_statuses (status_name, description, sort_order)
            VALUES ($1, $2, $3)
            ON CONFLICT (status_name) DO NOTHING
            RETURNING status_name, description, sort_order
            "#,
        )
        .bind(&status.status_name)
        .bind(&status.description)
        .bind(status.sort_order)
        .fetch_optional(pool)
        .await
    }
}

impl OffloadStatus {
    pub fn new(status_name: impl Into<String>, sort_order: i32) -> Self {
        Self {
            status_name: status_name.into(),
            description: None,
            sort_order,
        }
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT status_name, description, sort_order
            FROM offload_statuses
            ORDER BY sort_order, status_name
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn insert(pool: &PgPool, status: &Self) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO offload_statuses (status_name, description, sort_order)
            VALUES ($1, $2, $3)
            ON CONFLICT (status_name) DO NOTHING
            RETURNING status_name, description, sort_order
            "#,
        )
        .bind(&status.status_name)
        .bind(&status.description)
        .bind(status.sort_order)
        .fetch_optional(pool)
        .await
    }
}

/// Sorts statuses the way the registry presents them
pub fn sort_geo(statuses: &mut [GeoStatus]) {
    statuses.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.status_name.cmp(&b.status_name))
    });
}

pub fn sort_offload(statuses: &mut [OffloadStatus]) {
    statuses.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.status_name.cmp(&b.status_name))
    });
}
