//! # Product Repository
//!
//! Catalog reads and administrative edits, plus the stock statements the
//! ledger runs inside its transactions.
//!
//! ## Who May Write What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  column                    writer                                       │
//! │  ───────────────────────   ───────────────────────────────────────────  │
//! │  name, spec, unit, price   update_details() (administrative edit)       │
//! │  stock                     decrement_stock / increment_stock (ledger tx)│
//! │  cost, product_cost        set_product_cost (ledger tx, inbound only)   │
//! │  shipping_cost             create() only                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Race-free Decrement
//! ```text
//! UPDATE products SET stock = stock - ?q
//! WHERE id = ? AND shop_id = ? AND is_active = 1 AND stock >= ?q
//! RETURNING stock, cost ...
//!
//!   1 row  → decremented; RETURNING carries the live cost basis
//!   0 rows → product missing/inactive/other shop, or not enough stock
//! ```
//! Check and write are one statement, so two transactions can never both
//! pass the check against the same stale value.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use stockroom_core::validation::{
    validate_optional_text, validate_price_cents, validate_product_name, Page,
};
use stockroom_core::{CostBasis, Money, Product};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const PRODUCT_COLUMNS: &str = "id, shop_id, name, specification, unit, sale_price_cents, \
     cost_cents, shipping_cost_cents, product_cost_cents, stock, is_active, created_at, updated_at";

/// Input for a new catalog entry. Stock always starts at zero and only the
/// ledger moves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub shop_id: i64,
    pub name: String,
    #[serde(default)]
    pub specification: String,
    #[serde(default)]
    pub unit: String,
    pub sale_price_cents: i64,
    #[serde(default)]
    pub product_cost_cents: i64,
    #[serde(default)]
    pub shipping_cost_cents: i64,
}

/// Administrative edit. Never touches stock or cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: String,
    pub specification: String,
    pub unit: String,
    pub sale_price_cents: i64,
}

/// What a stock statement sees of the product row, after the change.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StockRow {
    pub id: String,
    pub name: String,
    pub specification: String,
    pub unit: String,
    pub sale_price_cents: i64,
    pub cost_cents: i64,
    pub shipping_cost_cents: i64,
    pub product_cost_cents: i64,
    pub stock: i64,
}

impl StockRow {
    pub fn cost_basis(&self) -> CostBasis {
        CostBasis {
            cost: Money::from_cents(self.cost_cents),
            shipping_cost: Money::from_cents(self.shipping_cost_cents),
            product_cost: Money::from_cents(self.product_cost_cents),
        }
    }

    #[inline]
    pub fn sale_price(&self) -> Money {
        Money::from_cents(self.sale_price_cents)
    }
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a catalog entry with zero stock.
    pub async fn create(&self, new: NewProduct) -> DbResult<Product> {
        validate_product_name(&new.name)?;
        validate_price_cents("sale_price", new.sale_price_cents)?;
        validate_price_cents("product_cost", new.product_cost_cents)?;
        validate_price_cents("shipping_cost", new.shipping_cost_cents)?;

        let now = Utc::now();
        let basis = CostBasis::from_components(
            Money::from_cents(new.product_cost_cents),
            Money::from_cents(new.shipping_cost_cents),
        );
        let product = Product {
            id: generate_product_id(),
            shop_id: new.shop_id,
            name: new.name.trim().to_string(),
            specification: new.specification,
            unit: new.unit,
            sale_price_cents: new.sale_price_cents,
            cost_cents: basis.cost.cents(),
            shipping_cost_cents: basis.shipping_cost.cents(),
            product_cost_cents: basis.product_cost.cents(),
            stock: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %product.id, shop_id = product.shop_id, "Creating product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, shop_id, name, specification, unit,
                sale_price_cents, cost_cents, shipping_cost_cents, product_cost_cents,
                stock, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&product.id)
        .bind(product.shop_id)
        .bind(&product.name)
        .bind(&product.specification)
        .bind(&product.unit)
        .bind(product.sale_price_cents)
        .bind(product.cost_cents)
        .bind(product.shipping_cost_cents)
        .bind(product.product_cost_cents)
        .bind(product.stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by ID (active or not).
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Gets active products by ID. Unknown or inactive ids are skipped.
    pub async fn get_by_ids(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 AND id IN ("
        ));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let products = builder
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Lists a shop's active products, by name.
    pub async fn list_by_shop(&self, shop_id: i64, page: Page) -> DbResult<(Vec<Product>, i64)> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE shop_id = ?1 AND is_active = 1 \
             ORDER BY name, id LIMIT ?2 OFFSET ?3"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(shop_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE shop_id = ?1 AND is_active = 1")
                .bind(shop_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((products, total))
    }

    /// Administrative edit of name/spec/unit/price within a shop.
    pub async fn update_details(&self, id: &str, shop_id: i64, update: &ProductUpdate) -> DbResult<()> {
        validate_product_name(&update.name)?;
        validate_optional_text("unit", &update.unit, 32)?;
        validate_price_cents("sale_price", update.sale_price_cents)?;

        debug!(id = %id, "Updating product details");

        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = ?3, specification = ?4, unit = ?5, sale_price_cents = ?6, updated_at = ?7
            WHERE id = ?1 AND shop_id = ?2
            "#,
        )
        .bind(id)
        .bind(shop_id)
        .bind(update.name.trim())
        .bind(&update.specification)
        .bind(&update.unit)
        .bind(update.sale_price_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Ledger rows keep referencing it; it just can't move stock anymore.
    pub async fn deactivate(&self, id: &str, shop_id: i64) -> DbResult<()> {
        debug!(id = %id, "Deactivating product");

        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?3 WHERE id = ?1 AND shop_id = ?2",
        )
        .bind(id)
        .bind(shop_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }
}

// =============================================================================
// Transactional statements
// =============================================================================

const STOCK_RETURNING: &str = "RETURNING id, name, specification, unit, sale_price_cents, \
     cost_cents, shipping_cost_cents, product_cost_cents, stock";

/// Takes `quantity` units off the shelf if, and only if, that many are there.
///
/// Returns `None` when the row is missing, inactive, in another shop, or short.
pub async fn decrement_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    shop_id: i64,
    quantity: i64,
) -> DbResult<Option<StockRow>> {
    let sql = format!(
        "UPDATE products SET stock = stock - ?3, updated_at = ?4 \
         WHERE id = ?1 AND shop_id = ?2 AND is_active = 1 AND stock >= ?3 {STOCK_RETURNING}"
    );
    let row = sqlx::query_as::<_, StockRow>(&sql)
        .bind(product_id)
        .bind(shop_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Puts `quantity` units on the shelf. `None` when the row is missing,
/// inactive or in another shop.
pub async fn increment_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    shop_id: i64,
    quantity: i64,
) -> DbResult<Option<StockRow>> {
    let sql = format!(
        "UPDATE products SET stock = stock + ?3, updated_at = ?4 \
         WHERE id = ?1 AND shop_id = ?2 AND is_active = 1 {STOCK_RETURNING}"
    );
    let row = sqlx::query_as::<_, StockRow>(&sql)
        .bind(product_id)
        .bind(shop_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Restocks goods coming back from a cancelled order. Unlike
/// [`increment_stock`] this also accepts a deactivated product, since the
/// goods were sold while it was active.
pub async fn return_to_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    shop_id: i64,
    quantity: i64,
) -> DbResult<Option<StockRow>> {
    let sql = format!(
        "UPDATE products SET stock = stock + ?3, updated_at = ?4 \
         WHERE id = ?1 AND shop_id = ?2 {STOCK_RETURNING}"
    );
    let row = sqlx::query_as::<_, StockRow>(&sql)
        .bind(product_id)
        .bind(shop_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Writes a new purchase cost and recomputes `cost` from the stored
/// shipping cost.
///
/// `expected_product_cost` guards against a concurrent change between the
/// read and this write; a miss is reported as a failed transaction.
pub async fn set_product_cost(
    conn: &mut SqliteConnection,
    product_id: &str,
    expected_product_cost: i64,
    new_product_cost: i64,
) -> DbResult<CostBasis> {
    let row: Option<(i64, i64, i64)> = sqlx::query_as(
        r#"
        UPDATE products
        SET product_cost_cents = ?3,
            cost_cents = ?3 + shipping_cost_cents,
            updated_at = ?4
        WHERE id = ?1 AND product_cost_cents = ?2
        RETURNING cost_cents, shipping_cost_cents, product_cost_cents
        "#,
    )
    .bind(product_id)
    .bind(expected_product_cost)
    .bind(new_product_cost)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some((cost, shipping_cost, product_cost)) => Ok(CostBasis {
            cost: Money::from_cents(cost),
            shipping_cost: Money::from_cents(shipping_cost),
            product_cost: Money::from_cents(product_cost),
        }),
        None => Err(DbError::TransactionFailed(format!(
            "cost basis of product {product_id} changed concurrently"
        ))),
    }
}

/// Reads name and stock for diagnosing a failed conditional decrement.
pub async fn stock_state(
    conn: &mut SqliteConnection,
    product_id: &str,
    shop_id: i64,
) -> DbResult<Option<(String, i64)>> {
    let row: Option<(String, i64)> = sqlx::query_as(
        "SELECT name, stock FROM products WHERE id = ?1 AND shop_id = ?2 AND is_active = 1",
    )
    .bind(product_id)
    .bind(shop_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn paint(shop_id: i64) -> NewProduct {
        NewProduct {
            shop_id,
            name: "Wall paint".into(),
            specification: "5L".into(),
            unit: "bucket".into(),
            sale_price_cents: 900,
            product_cost_cents: 500,
            shipping_cost_cents: 40,
        }
    }

    #[tokio::test]
    async fn test_create_starts_with_zero_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().create(paint(1)).await.unwrap();

        assert_eq!(product.stock, 0);
        assert_eq!(product.cost_cents, 540);

        let loaded = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Wall paint");
        assert_eq!(loaded.cost_cents, 540);
        assert!(loaded.is_active);
    }

    #[tokio::test]
    async fn test_get_by_ids_skips_inactive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let a = repo.create(paint(1)).await.unwrap();
        let b = repo.create(paint(1)).await.unwrap();
        repo.deactivate(&b.id, 1).await.unwrap();

        let found = repo
            .get_by_ids(&[a.id.clone(), b.id.clone(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }

    #[tokio::test]
    async fn test_update_details_is_shop_scoped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let product = repo.create(paint(1)).await.unwrap();
        let update = ProductUpdate {
            name: "Wall paint (matte)".into(),
            specification: "5L".into(),
            unit: "bucket".into(),
            sale_price_cents: 950,
        };

        assert!(matches!(
            repo.update_details(&product.id, 2, &update).await,
            Err(DbError::NotFound { .. })
        ));
        repo.update_details(&product.id, 1, &update).await.unwrap();

        let loaded = repo.get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(loaded.sale_price_cents, 950);
        assert_eq!(loaded.cost_cents, 540);
    }

    #[tokio::test]
    async fn test_conditional_decrement() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().create(paint(1)).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        increment_stock(&mut conn, &product.id, 1, 5).await.unwrap().unwrap();

        assert!(decrement_stock(&mut conn, &product.id, 1, 6).await.unwrap().is_none());
        assert!(decrement_stock(&mut conn, &product.id, 2, 1).await.unwrap().is_none());

        let row = decrement_stock(&mut conn, &product.id, 1, 5).await.unwrap().unwrap();
        assert_eq!(row.stock, 0);
        assert_eq!(row.cost_cents, 540);
    }

    #[tokio::test]
    async fn test_set_product_cost_recomputes_cost() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().create(paint(1)).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let basis = set_product_cost(&mut conn, &product.id, 500, 600).await.unwrap();
        assert_eq!(basis.cost.cents(), 640);

        // stale expectation
        assert!(matches!(
            set_product_cost(&mut conn, &product.id, 500, 700).await,
            Err(DbError::TransactionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_shop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        repo.create(paint(1)).await.unwrap();
        repo.create(paint(1)).await.unwrap();
        repo.create(paint(2)).await.unwrap();

        let (products, total) = repo.list_by_shop(1, Page::default()).await.unwrap();
        assert_eq!(total, 2);
        assert!(products.iter().all(|p| p.shop_id == 1));
    }
}
