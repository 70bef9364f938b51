//! # Reference Repositories
//!
//! `Partner`, `Product`, and `Unit` are read-only reference collections
//! from the client's perspective: they're only ever written by a snapshot
//! or a server-originated log entry, never through the outbox (§3, §4.2).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
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
    fn into_partner(self) -> DbResult<Partner> {
        Ok(Partner {
            id: Uuid::parse_str(&self.id).map_err(|e| DbError::malformed("id", e.to_string()))?,
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

    pub async fn get(&self, id: Uuid) -> DbResult<Option<Partner>> {
        let row = sqlx::query_as::<_, PartnerRow>(
            "SELECT id, name, contact_info, created_at, updated_at FROM partners WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(PartnerRow::into_partner).transpose()
    }

    pub async fn get_all(&self) -> DbResult<Vec<Partner>> {
        let rows = sqlx::query_as::<_, PartnerRow>(
            "SELECT id, name, contact_info, created_at, updated_at FROM partners ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PartnerRow::into_partner).collect()
    }

    pub async fn put(&self, partner: &Partner) -> DbResult<()> {
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

    pub async fn bulk_put(&self, partners: &[Partner]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for p in partners {
            sqlx::query(
                r#"
                INSERT INTO partners (id, name, contact_info, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name, contact_info = excluded.contact_info,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(p.id.to_string())
            .bind(&p.name)
            .bind(&p.contact_info)
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
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
    fn into_product(self) -> DbResult<Product> {
        Ok(Product {
            id: Uuid::parse_str(&self.id).map_err(|e| DbError::malformed("id", e.to_string()))?,
            name: self.name,
            sku: self.sku,
            default_unit_id: self
                .default_unit_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| DbError::malformed("default_unit_id", e.to_string()))?,
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

    pub async fn get(&self, id: Uuid) -> DbResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, sku, default_unit_id, created_at, updated_at FROM products WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProductRow::into_product).transpose()
    }

    pub async fn get_all(&self) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, sku, default_unit_id, created_at, updated_at FROM products ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProductRow::into_product).collect()
    }

    pub async fn put(&self, product: &Product) -> DbResult<()> {
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

    pub async fn bulk_put(&self, products: &[Product]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for p in products {
            sqlx::query(
                r#"
                INSERT INTO products (id, name, sku, default_unit_id, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name, sku = excluded.sku,
                    default_unit_id = excluded.default_unit_id, updated_at = excluded.updated_at
                "#,
            )
            .bind(p.id.to_string())
            .bind(&p.name)
            .bind(&p.sku)
            .bind(p.default_unit_id.map(|u| u.to_string()))
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
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
    fn into_unit(self) -> DbResult<Unit> {
        Ok(Unit {
            id: Uuid::parse_str(&self.id).map_err(|e| DbError::malformed("id", e.to_string()))?,
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

    pub async fn get(&self, id: Uuid) -> DbResult<Option<Unit>> {
        let row = sqlx::query_as::<_, UnitRow>(
            "SELECT id, name, abbreviation, created_at, updated_at FROM units WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UnitRow::into_unit).transpose()
    }

    pub async fn get_all(&self) -> DbResult<Vec<Unit>> {
        let rows = sqlx::query_as::<_, UnitRow>(
            "SELECT id, name, abbreviation, created_at, updated_at FROM units ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(UnitRow::into_unit).collect()
    }

    pub async fn put(&self, unit: &Unit) -> DbResult<()> {
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

    pub async fn bulk_put(&self, units: &[Unit]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for u in units {
            sqlx::query(
                r#"
                INSERT INTO units (id, name, abbreviation, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name, abbreviation = excluded.abbreviation,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(u.id.to_string())
            .bind(&u.name)
            .bind(&u.abbreviation)
            .bind(u.created_at)
            .bind(u.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
