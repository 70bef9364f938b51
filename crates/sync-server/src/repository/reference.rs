//! # Server-Side Reference Repositories
//!
//! Authoritative `Partner`/`Product`/`Unit` collections served verbatim to
//! clients via snapshot and the plain `/partners`, `/products`, `/units`
//! listing routes. These never go through the conflict resolver.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use sync_core::{Partner, Product, Unit};

#[derive(Debug, Clone, sqlx::FromRow)]
struct PartnerRow {
    id: String,
    name: String,
    contact_info: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PartnerRow {
    fn into_partner(self) -> ServerResult<Partner> {
        Ok(Partner {
            id: Uuid::parse_str(&self.id).map_err(|e| ServerError::malformed("id", e.to_string()))?,
            name: self.name,
            contact_info: self.contact_info,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PartnerRepository {
    pool: SqlitePool,
}

impl PartnerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PartnerRepository { pool }
    }

    pub async fn get(&self, id: Uuid) -> ServerResult<Option<Partner>> {
        let row = sqlx::query_as::<_, PartnerRow>(
            "SELECT id, name, contact_info, created_at, updated_at FROM partners WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(PartnerRow::into_partner).transpose()
    }

    pub async fn get_all(&self) -> ServerResult<Vec<Partner>> {
        let rows = sqlx::query_as::<_, PartnerRow>(
            "SELECT id, name, contact_info, created_at, updated_at FROM partners ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PartnerRow::into_partner).collect()
    }

    pub async fn put(&self, partner: &Partner) -> ServerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO partners (id, name, contact_info, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, contact_info = excluded.contact_info,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(partner.id.to_string())
        .bind(&partner.name)
        .bind(&partner.contact_info)
        .bind(partner.created_at)
        .bind(partner.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    sku: Option<String>,
    default_unit_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self) -> ServerResult<Product> {
        Ok(Product {
            id: Uuid::parse_str(&self.id).map_err(|e| ServerError::malformed("id", e.to_string()))?,
            name: self.name,
            sku: self.sku,
            default_unit_id: self
                .default_unit_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| ServerError::malformed("default_unit_id", e.to_string()))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn get(&self, id: Uuid) -> ServerResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, sku, default_unit_id, created_at, updated_at FROM products WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProductRow::into_product).transpose()
    }

    pub async fn get_all(&self) -> ServerResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, sku, default_unit_id, created_at, updated_at FROM products ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProductRow::into_product).collect()
    }

    pub async fn put(&self, product: &Product) -> ServerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, sku, default_unit_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, sku = excluded.sku,
                default_unit_id = excluded.default_unit_id, updated_at = excluded.updated_at
            "#,
        )
        .bind(product.id.to_string())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.default_unit_id.map(|u| u.to_string()))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct UnitRow {
    id: String,
    name: String,
    abbreviation: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UnitRow {
    fn into_unit(self) -> ServerResult<Unit> {
        Ok(Unit {
            id: Uuid::parse_str(&self.id).map_err(|e| ServerError::malformed("id", e.to_string()))?,
            name: self.name,
            abbreviation: self.abbreviation,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UnitRepository {
    pool: SqlitePool,
}

impl UnitRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UnitRepository { pool }
    }

    pub async fn get(&self, id: Uuid) -> ServerResult<Option<Unit>> {
        let row = sqlx::query_as::<_, UnitRow>(
            "SELECT id, name, abbreviation, created_at, updated_at FROM units WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UnitRow::into_unit).transpose()
    }

    pub async fn get_all(&self) -> ServerResult<Vec<Unit>> {
        let rows = sqlx::query_as::<_, UnitRow>(
            "SELECT id, name, abbreviation, created_at, updated_at FROM units ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(UnitRow::into_unit).collect()
    }

    pub async fn put(&self, unit: &Unit) -> ServerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO units (id, name, abbreviation, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, abbreviation = excluded.abbreviation,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(unit.id.to_string())
        .bind(&unit.name)
        .bind(&unit.abbreviation)
        .bind(unit.created_at)
        .bind(unit.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{ServerDatabase, ServerDbConfig};

    async fn db() -> ServerDatabase {
        ServerDatabase::new(ServerDbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn put_and_get_partner_roundtrips() {
        let db = db().await;
        let now = Utc::now();
        let partner = Partner {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            contact_info: Some("acme@example.com".to_string()),
            created_at: now,
            updated_at: now,
        };
        db.partners().put(&partner).await.unwrap();
        let fetched = db.partners().get(partner.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Acme");
    }
}
