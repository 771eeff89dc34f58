use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Card {
    pub card_name: String,
    #[serde(rename = "statut_geo")]
    pub geo_status: String,
    pub offload_status: Option<String>,
    pub quarantine: bool,
    #[serde(rename = "usage")]
    pub usage_count: i32,
    pub capacity: Option<i32>,
    pub brand: Option<String>,
    pub card_type: Option<String>,
    pub card_birth: Option<DateTime<Utc>>,
    pub last_operation_at: Option<DateTime<Utc>>,
}

/// Provisioning data for a new card
#[derive(Debug, Clone, Deserialize)]
pub struct NewCard {
    pub card_name: String,
    #[serde(rename = "statut_geo")]
    pub geo_status: String,
    #[serde(default)]
    pub offload_status: Option<String>,
    #[serde(default)]
    pub quarantine: bool,
    #[serde(default)]
    pub capacity: Option<i32>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub card_birth: Option<DateTime<Utc>>,
}

/// Descriptive fields an admin may edit after provisioning.
///
/// Location and offload status only change through moves.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CardDetails {
    #[serde(default)]
    pub capacity: Option<i32>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub card_type: Option<String>,
}

impl CardDetails {
    pub fn apply_to(&self, card: &mut Card) {
        card.capacity = self.capacity;
        card.brand = self.brand.clone();
        card.card_type = self.card_type.clone();
    }
}

impl NewCard {
    pub fn new(card_name: impl Into<String>, geo_status: impl Into<String>) -> Self {
        Self {
            card_name: card_name.into(),
            geo_status: geo_status.into(),
            offload_status: None,
            quarantine: false,
            capacity: None,
            brand: None,
            card_type: None,
            card_birth: None,
        }
    }

    pub fn into_card(self) -> Card {
        Card {
            card_name: self.card_name,
            geo_status: self.geo_status,
            offload_status: self.offload_status,
            quarantine: self.quarantine,
            usage_count: 0,
            capacity: self.capacity,
            brand: self.brand,
            card_type: self.card_type,
            card_birth: self.card_birth,
            last_operation_at: None,
        }
    }
}

impl Card {
    /// Inserts a card, returning `None` when the name is taken
    pub async fn insert(pool: &PgPool, data: &NewCard) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO cards (card_name, geo_status, offload_status, quarantine,
                               capacity, brand, card_type, card_birth)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (card_name) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&data.card_name)
        .bind(&data.geo_status)
        .bind(&data.offload_status)
        .bind(data.quarantine)
        .bind(data.capacity)
        .bind(&data.brand)
        .bind(&data.card_type)
        .bind(data.card_birth)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_name(pool: &PgPool, card_name: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM cards WHERE card_name = $1")
            .bind(card_name)
            .fetch_optional(pool)
            .await
    }

    /// Loads a card and locks its row until the transaction ends
    pub async fn lock_by_name(
        conn: &mut PgConnection,
        card_name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM cards WHERE card_name = $1 FOR UPDATE")
            .bind(card_name)
            .fetch_optional(conn)
            .await
    }

    pub async fn list_by_status(
        pool: &PgPool,
        geo_status: &str,
        include_quarantined: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM cards
            WHERE geo_status = $1 AND ($2 OR NOT quarantine)
            ORDER BY card_name
            "#,
        )
        .bind(geo_status)
        .bind(include_quarantined)
        .fetch_all(pool)
        .await
    }

    pub async fn list_movable(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM cards WHERE NOT quarantine ORDER BY card_name")
            .fetch_all(pool)
            .await
    }

    /// Finds cards whose name starts with `prefix`
    pub async fn search_prefix(
        pool: &PgPool,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");

        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM cards
            WHERE card_name LIKE $1 || '%'
            ORDER BY card_name
            LIMIT $2
            "#,
        )
        .bind(escaped)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Writes the status fields after a move or a cancel
    pub async fn write_transition(
        conn: &mut PgConnection,
        card_name: &str,
        geo_status: &str,
        offload_status: Option<&str>,
        usage_count: i32,
        last_operation_at: Option<DateTime<Utc>>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE cards
            SET geo_status = $2,
                offload_status = $3,
                usage_count = $4,
                last_operation_at = $5
            WHERE card_name = $1
            RETURNING *
            "#,
        )
        .bind(card_name)
        .bind(geo_status)
        .bind(offload_status)
        .bind(usage_count)
        .bind(last_operation_at)
        .fetch_one(conn)
        .await
    }

    pub async fn write_details(
        conn: &mut PgConnection,
        card_name: &str,
        details: &CardDetails,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE cards
            SET capacity = $2,
                brand = $3,
                card_type = $4
            WHERE card_name = $1
            RETURNING *
            "#,
        )
        .bind(card_name)
        .bind(details.capacity)
        .bind(&details.brand)
        .bind(&details.card_type)
        .fetch_one(conn)
        .await
    }

    pub async fn write_quarantine(
        conn: &mut PgConnection,
        card_name: &str,
        quarantine: bool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "UPDATE cards SET quarantine = $2 WHERE card_name = $1 RETURNING *",
        )
        .bind(card_name)
        .bind(quarantine)
        .fetch_one(conn)
        .await
    }
}
