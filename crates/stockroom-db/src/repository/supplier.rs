//! # Supplier Repository
//!
//! Suppliers an inbound operation may reference, per shop.

use chrono::Utc;
use sqlx::SqlitePool;
use stockroom_core::validation::{validate_optional_text, validate_text};
use stockroom_core::Supplier;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

/// Repository for supplier database operations.
#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    /// Registers a supplier for a shop.
    pub async fn create(&self, shop_id: i64, name: &str, contact: &str, phone: &str) -> DbResult<Supplier> {
        validate_text("name", name, 200)?;
        validate_optional_text("contact", contact, 100)?;
        validate_optional_text("phone", phone, 32)?;

        let supplier = Supplier {
            id: Uuid::new_v4().to_string(),
            shop_id,
            name: name.trim().to_string(),
            contact: contact.to_string(),
            phone: phone.to_string(),
            created_at: Utc::now(),
        };

        debug!(id = %supplier.id, shop_id, "Creating supplier");

        sqlx::query(
            "INSERT INTO suppliers (id, shop_id, name, contact, phone, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&supplier.id)
        .bind(supplier.shop_id)
        .bind(&supplier.name)
        .bind(&supplier.contact)
        .bind(&supplier.phone)
        .bind(supplier.created_at)
        .execute(&self.pool)
        .await?;

        Ok(supplier)
    }

    /// Lists a shop's suppliers by name.
    pub async fn list_by_shop(&self, shop_id: i64) -> DbResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as::<_, Supplier>(
            "SELECT id, shop_id, name, contact, phone, created_at \
             FROM suppliers WHERE shop_id = ?1 ORDER BY name, id",
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(suppliers)
    }

    /// Gets a supplier if it belongs to `shop_id`.
    pub async fn get_in_shop(&self, id: &str, shop_id: i64) -> DbResult<Option<Supplier>> {
        let supplier = sqlx::query_as::<_, Supplier>(
            "SELECT id, shop_id, name, contact, phone, created_at \
             FROM suppliers WHERE id = ?1 AND shop_id = ?2",
        )
        .bind(id)
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(supplier)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_suppliers_are_per_shop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.suppliers();

        let acme = repo.create(1, "Acme Coatings", "Wang", "010-1234").await.unwrap();
        repo.create(2, "Other Shop Supplier", "", "").await.unwrap();

        let listed = repo.list_by_shop(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Acme Coatings");

        assert!(repo.get_in_shop(&acme.id, 1).await.unwrap().is_some());
        assert!(repo.get_in_shop(&acme.id, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_supplier_name_required() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.suppliers().create(1, "  ", "", "").await.is_err());
    }
}
