use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "operation_state", rename_all = "lowercase")]
pub enum OperationState {
    Active,
    Cancelled,
}

/// One recorded card move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Operation {
    pub id: i64,
    pub card_name: String,
    pub source_geo: String,
    #[serde(rename = "statut_geo")]
    pub target_geo: String,
    pub prior_offload_status: Option<String>,
    // None when the move left the offload status untouched
    pub offload_status: Option<String>,
    pub username: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub state: OperationState,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Operation {
    pub fn is_active(&self) -> bool {
        self.state == OperationState::Active
    }

    pub fn changes_offload(&self) -> bool {
        self.offload_status.is_some()
    }
}

/// Data for a new operation row
#[derive(Debug, Clone)]
pub struct NewOperation<'a> {
    pub card_name: &'a str,
    pub source_geo: &'a str,
    pub target_geo: &'a str,
    pub prior_offload_status: Option<&'a str>,
    pub offload_status: Option<&'a str>,
    pub username: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Selection for history listings, newest first
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationFilter {
    pub username: Option<String>,
    #[serde(rename = "card")]
    pub card_name: Option<String>,
    pub offload_status: Option<String>,
    pub limit: Option<i64>,
}

impl OperationFilter {
    pub fn matches(&self, op: &Operation) -> bool {
        self.username.as_deref().map_or(true, |u| op.username == u)
            && self.card_name.as_deref().map_or(true, |c| op.card_name == c)
            && self
                .offload_status
                .as_deref()
                .map_or(true, |s| op.offload_status.as_deref() == Some(s))
    }
}

impl Operation {
    pub async fn insert(
        conn: &mut PgConnection,
        data: NewOperation<'_>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO operations (card_name, source_geo, target_geo, prior_offload_status,
                                    offload_status, username, created_at, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(data.card_name)
        .bind(data.source_geo)
        .bind(data.target_geo)
        .bind(data.prior_offload_status)
        .bind(data.offload_status)
        .bind(data.username)
        .bind(data.created_at)
        .bind(OperationState::Active)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM operations WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn lock_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM operations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Latest active operation of a card, optionally skipping one id
    pub async fn latest_active(
        conn: &mut PgConnection,
        card_name: &str,
        excluding: Option<i64>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM operations
            WHERE card_name = $1 AND state = 'active' AND ($2::BIGINT IS NULL OR id <> $2)
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(card_name)
        .bind(excluding)
        .fetch_optional(conn)
        .await
    }

    /// Timestamp of the newest operation of a card, cancelled ones included
    pub async fn last_timestamp(
        conn: &mut PgConnection,
        card_name: &str,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(created_at) FROM operations WHERE card_name = $1",
        )
        .bind(card_name)
        .fetch_one(conn)
        .await
    }

    pub async fn mark_cancelled(
        conn: &mut PgConnection,
        id: i64,
        cancelled_by: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE operations
            SET state = $2, cancelled_by = $3, cancelled_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(OperationState::Cancelled)
        .bind(cancelled_by)
        .bind(cancelled_at)
        .fetch_one(conn)
        .await
    }

    pub async fn list(
        pool: &PgPool,
        filter: &OperationFilter,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM operations WHERE TRUE");

        if let Some(username) = &filter.username {
            query.push(" AND username = ").push_bind(username);
        }
        if let Some(card_name) = &filter.card_name {
            query.push(" AND card_name = ").push_bind(card_name);
        }
        if let Some(offload_status) = &filter.offload_status {
            query.push(" AND offload_status = ").push_bind(offload_status);
        }
        query.push(" ORDER BY id DESC LIMIT ").push_bind(limit);

        query.build_query_as::<Self>().fetch_all(pool).await
    }

    /// Operations after `after_id` that set the given offload status, oldest first
    pub async fn list_since(
        pool: &PgPool,
        after_id: i64,
        offload_status: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM operations
            WHERE id > $1 AND offload_status = $2
            ORDER BY id ASC
            "#,
        )
        .bind(after_id)
        .bind(offload_status)
        .fetch_all(pool)
        .await
    }
}
