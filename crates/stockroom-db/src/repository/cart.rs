//! # Cart Repository
//!
//! Cart rows per user. One row per (user, product); adding a product that
//! is already in the cart adds to its quantity.
//!
//! Checkout reads rows with [`CartRepository::get_for_user`] and removes
//! them with [`delete_for_user`] inside its own transaction, so the rows
//! disappear only when the order commits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use stockroom_core::validation::validate_quantity;
use stockroom_core::{CartItem, CoreError};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const CART_COLUMNS: &str = "id, user_id, product_id, quantity, selected, created_at, updated_at";

/// Cart row joined with the live catalog, for display.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartEntry {
    pub id: String,
    pub product_id: String,
    pub shop_id: i64,
    pub product_name: String,
    pub specification: String,
    pub unit: String,
    pub sale_price_cents: i64,
    pub stock: i64,
    pub quantity: i64,
    pub selected: bool,
    pub updated_at: DateTime<Utc>,
}

/// Repository for cart database operations.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Adds `quantity` of a product, merging into an existing row.
    pub async fn add(&self, user_id: i64, product_id: &str, quantity: i64) -> DbResult<CartItem> {
        validate_quantity(quantity)?;

        let active: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM products WHERE id = ?1 AND is_active = 1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        if active.is_none() {
            return Err(CoreError::ProductNotFound(product_id.to_string()).into());
        }

        debug!(user_id, product_id = %product_id, quantity, "Adding to cart");

        let now = Utc::now();
        let sql = format!(
            "INSERT INTO cart_items (id, user_id, product_id, quantity, selected, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5) \
             ON CONFLICT (user_id, product_id) DO UPDATE \
             SET quantity = quantity + excluded.quantity, updated_at = excluded.updated_at \
             RETURNING {CART_COLUMNS}"
        );
        let item = sqlx::query_as::<_, CartItem>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(user_id)
            .bind(product_id)
            .bind(quantity)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(item)
    }

    /// Sets the quantity of one of the user's rows.
    pub async fn update_quantity(&self, user_id: i64, id: &str, quantity: i64) -> DbResult<()> {
        validate_quantity(quantity)?;

        let result = sqlx::query(
            "UPDATE cart_items SET quantity = ?3, updated_at = ?4 WHERE id = ?1 AND user_id = ?2",
        )
        .bind(id)
        .bind(user_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::CartItemNotFound(id.to_string()).into());
        }
        Ok(())
    }

    /// Removes some of the user's rows. Returns how many were removed.
    pub async fn remove(&self, user_id: i64, ids: &[String]) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        delete_for_user(&mut conn, user_id, ids).await
    }

    /// Lists the user's cart with live product data, optionally for one shop.
    pub async fn list_for_user(&self, user_id: i64, shop_id: Option<i64>) -> DbResult<Vec<CartEntry>> {
        let entries = sqlx::query_as::<_, CartEntry>(
            r#"
            SELECT c.id, c.product_id, p.shop_id, p.name AS product_name,
                   p.specification, p.unit, p.sale_price_cents, p.stock,
                   c.quantity, c.selected, c.updated_at
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = ?1 AND (?2 IS NULL OR p.shop_id = ?2)
            ORDER BY c.updated_at DESC, c.rowid DESC
            "#,
        )
        .bind(user_id)
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Loads the user's rows among `ids`, in the order of `ids`.
    ///
    /// Fails with `CartItemNotFound` naming the first id that is missing or
    /// belongs to someone else.
    pub async fn get_for_user(&self, user_id: i64, ids: &[String]) -> DbResult<Vec<CartItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = "
        ));
        builder.push_bind(user_id);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let mut rows = builder
            .build_query_as::<CartItem>()
            .fetch_all(&self.pool)
            .await?;

        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            let position = rows
                .iter()
                .position(|row| &row.id == id)
                .ok_or_else(|| CoreError::CartItemNotFound(id.clone()))?;
            ordered.push(rows.swap_remove(position));
        }
        Ok(ordered)
    }
}

/// Deletes the user's rows among `ids` on the given connection.
pub async fn delete_for_user(conn: &mut SqliteConnection, user_id: i64, ids: &[String]) -> DbResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("DELETE FROM cart_items WHERE user_id = ");
    builder.push_bind(user_id);
    builder.push(" AND id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Fails unless every id in `ids` was deleted.
pub(crate) fn ensure_all_deleted(deleted: u64, ids: &[String]) -> DbResult<()> {
    if deleted != ids.len() as u64 {
        return Err(DbError::TransactionFailed(format!(
            "cart changed during checkout: removed {deleted} of {} rows",
            ids.len()
        )));
    }
    Ok(())
}
