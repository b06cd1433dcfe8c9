//! # Address Repository
//!
//! The address-book surface checkout needs: create, default-or-first, and
//! lookup by user + id. Soft-deleted rows are invisible to all of them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use stockroom_core::validation::validate_text;
use stockroom_core::Address;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

const ADDRESS_COLUMNS: &str = "id, user_id, recipient_name, recipient_phone, province, city, \
     district, detail, is_default, deleted_at, created_at, updated_at";

/// Input for a new address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAddress {
    pub recipient_name: String,
    pub recipient_phone: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Repository for address database operations.
#[derive(Debug, Clone)]
pub struct AddressRepository {
    pool: SqlitePool,
}

impl AddressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AddressRepository { pool }
    }

    /// Adds an address. A new default clears the user's previous default.
    pub async fn create(&self, user_id: i64, new: NewAddress) -> DbResult<Address> {
        validate_text("recipient_name", &new.recipient_name, 64)?;
        validate_text("recipient_phone", &new.recipient_phone, 32)?;

        let now = Utc::now();
        let address = Address {
            id: Uuid::new_v4().to_string(),
            user_id,
            recipient_name: new.recipient_name.trim().to_string(),
            recipient_phone: new.recipient_phone.trim().to_string(),
            province: new.province,
            city: new.city,
            district: new.district,
            detail: new.detail,
            is_default: new.is_default,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %address.id, user_id, "Creating address");

        let mut tx = self.pool.begin().await?;

        if address.is_default {
            sqlx::query(
                "UPDATE addresses SET is_default = 0, updated_at = ?2 \
                 WHERE user_id = ?1 AND is_default = 1",
            )
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO addresses (
                id, user_id, recipient_name, recipient_phone,
                province, city, district, detail, is_default,
                deleted_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?11)
            "#,
        )
        .bind(&address.id)
        .bind(address.user_id)
        .bind(&address.recipient_name)
        .bind(&address.recipient_phone)
        .bind(&address.province)
        .bind(&address.city)
        .bind(&address.district)
        .bind(&address.detail)
        .bind(address.is_default)
        .bind(address.created_at)
        .bind(address.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(address)
    }

    /// The user's default address, or failing that the first one they added.
    pub async fn default_or_first(&self, user_id: i64) -> DbResult<Option<Address>> {
        let sql = format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses \
             WHERE user_id = ?1 AND deleted_at IS NULL \
             ORDER BY is_default DESC, created_at ASC, rowid ASC LIMIT 1"
        );
        let address = sqlx::query_as::<_, Address>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(address)
    }

    /// An address only if it belongs to `user_id`.
    pub async fn get_for_user(&self, user_id: i64, id: &str) -> DbResult<Option<Address>> {
        let sql = format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses \
             WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL"
        );
        let address = sqlx::query_as::<_, Address>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(address)
    }
}
