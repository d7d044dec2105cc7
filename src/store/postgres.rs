//! Postgres coupon store

use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use uuid::Uuid;
use crate::domain::aggregates::{Coupon, CouponSnapshot, CouponTerms, UsageRecord};
use crate::domain::engine::{self, IneligibleReason, OrderContext};
use crate::domain::value_objects::{CouponCode, UserId};
use crate::store::CouponStore;
use crate::{CouponError, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, description: String, discount_type: String, discount_value: Decimal,
    max_discount_amount: Decimal, min_order_amount: Decimal,
    valid_from: DateTime<Utc>, valid_until: DateTime<Utc>,
    max_usage: i32, max_usage_per_user: i32, usage_count: i32, is_active: bool,
    categories: Vec<String>, products: Vec<String>, user_types: Vec<String>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RedemptionRow { coupon_id: Uuid, user_id: String, used_at: DateTime<Utc>, order_amount: Decimal, discount_amount: Decimal }

impl CouponRow {
    fn into_coupon(self, usage: Vec<RedemptionRow>) -> Result<Coupon> {
        let count = |v: i32, field: &str| u32::try_from(v).map_err(|_| CouponError::Storage(format!("negative {field} on coupon {}", self.code)));
        let terms = CouponTerms {
            description: self.description.clone(),
            discount_type: self.discount_type.parse().map_err(CouponError::Storage)?,
            discount_value: self.discount_value, max_discount_amount: self.max_discount_amount,
            min_order_amount: self.min_order_amount, valid_from: self.valid_from, valid_until: self.valid_until,
            max_usage: count(self.max_usage, "max_usage")?, max_usage_per_user: count(self.max_usage_per_user, "max_usage_per_user")?,
            categories: self.categories.clone(), products: self.products.clone(), user_types: self.user_types.clone(),
        };
        let used_by = usage.into_iter().map(|r| -> Result<UsageRecord> {
            Ok(UsageRecord {
                user_id: UserId::new(r.user_id).map_err(|e| CouponError::Storage(e.to_string()))?,
                used_at: r.used_at, order_amount: r.order_amount, discount_amount: r.discount_amount,
            })
        }).collect::<Result<Vec<_>>>()?;
        Coupon::restore(CouponSnapshot {
            id: self.id.to_string(),
            code: CouponCode::new(self.code.clone()).map_err(|e| CouponError::Storage(e.to_string()))?,
            terms, is_active: self.is_active, usage_count: count(self.usage_count, "usage_count")?, used_by,
            created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

fn storage(e: sqlx::Error) -> CouponError {
    tracing::error!(error = %e, "coupon storage failure");
    CouponError::Storage(e.to_string())
}

fn parse_id(coupon: &Coupon) -> Result<Uuid> {
    Uuid::parse_str(coupon.id()).map_err(|e| CouponError::Storage(format!("coupon id {}: {e}", coupon.id())))
}

fn to_i32(v: u32) -> Result<i32> {
    i32::try_from(v).map_err(|_| CouponError::InvalidArgument(format!("{v} does not fit the usage columns")))
}

/// Coupons in the `coupons` table, redemptions in `coupon_redemptions`.
#[derive(Debug, Clone)]
pub struct PgCouponStore { pool: PgPool }

impl PgCouponStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    async fn load_usage<'e, E>(executor: E, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<RedemptionRow>>>
    where E: sqlx::PgExecutor<'e> {
        let rows = sqlx::query_as::<_, RedemptionRow>("SELECT coupon_id, user_id, used_at, order_amount, discount_amount FROM coupon_redemptions WHERE coupon_id = ANY($1) ORDER BY id")
            .bind(ids).fetch_all(executor).await.map_err(storage)?;
        let mut by_coupon: HashMap<Uuid, Vec<RedemptionRow>> = HashMap::new();
        for row in rows { by_coupon.entry(row.coupon_id).or_default().push(row); }
        Ok(by_coupon)
    }

    /// Locks the coupon row for the rest of `tx` and loads it with its usage log.
    async fn lock(tx: &mut Transaction<'_, Postgres>, code: &CouponCode) -> Result<Coupon> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1 FOR UPDATE")
            .bind(code.as_str()).fetch_optional(&mut **tx).await.map_err(storage)?.ok_or(CouponError::NotFound)?;
        let mut usage = Self::load_usage(&mut **tx, &[row.id]).await?;
        let id = row.id;
        row.into_coupon(usage.remove(&id).unwrap_or_default())
    }

    async fn write_terms(tx: &mut Transaction<'_, Postgres>, coupon: &Coupon) -> Result<()> {
        let t = coupon.terms();
        sqlx::query("UPDATE coupons SET description = $2, discount_type = $3, discount_value = $4, max_discount_amount = $5, min_order_amount = $6, valid_from = $7, valid_until = $8, max_usage = $9, max_usage_per_user = $10, categories = $11, products = $12, user_types = $13, is_active = $14, updated_at = $15 WHERE id = $1")
            .bind(parse_id(coupon)?).bind(&t.description).bind(t.discount_type.as_str()).bind(t.discount_value)
            .bind(t.max_discount_amount).bind(t.min_order_amount).bind(t.valid_from).bind(t.valid_until)
            .bind(to_i32(t.max_usage)?).bind(to_i32(t.max_usage_per_user)?).bind(&t.categories).bind(&t.products).bind(&t.user_types)
            .bind(coupon.is_active()).bind(coupon.updated_at())
            .execute(&mut **tx).await.map_err(storage)?;
        Ok(())
    }

    async fn modify(&self, code: &CouponCode, f: impl FnOnce(&mut Coupon) -> Result<()> + Send) -> Result<Coupon> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let mut coupon = Self::lock(&mut tx, code).await?;
        f(&mut coupon)?;
        Self::write_terms(&mut tx, &coupon).await?;
        tx.commit().await.map_err(storage)?;
        Ok(coupon)
    }
}

#[async_trait]
impl CouponStore for PgCouponStore {
    async fn insert(&self, coupon: &Coupon) -> Result<()> {
        let t = coupon.terms();
        let result = sqlx::query("INSERT INTO coupons (id, code, description, discount_type, discount_value, max_discount_amount, min_order_amount, valid_from, valid_until, max_usage, max_usage_per_user, usage_count, is_active, categories, products, user_types, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, $13, $14, $15, $16, $17)")
            .bind(parse_id(coupon)?).bind(coupon.code().as_str()).bind(&t.description).bind(t.discount_type.as_str())
            .bind(t.discount_value).bind(t.max_discount_amount).bind(t.min_order_amount).bind(t.valid_from).bind(t.valid_until)
            .bind(to_i32(t.max_usage)?).bind(to_i32(t.max_usage_per_user)?).bind(coupon.is_active())
            .bind(&t.categories).bind(&t.products).bind(&t.user_types).bind(coupon.created_at()).bind(coupon.updated_at())
            .execute(&self.pool).await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(CouponError::DuplicateCode),
            Err(e) => Err(storage(e)),
        }
    }

    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        let Some(row) = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
            .bind(code.as_str()).fetch_optional(&self.pool).await.map_err(storage)? else { return Ok(None) };
        let mut usage = Self::load_usage(&self.pool, &[row.id]).await?;
        let id = row.id;
        row.into_coupon(usage.remove(&id).unwrap_or_default()).map(Some)
    }

    async fn list_active(&self) -> Result<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE is_active ORDER BY code")
            .fetch_all(&self.pool).await.map_err(storage)?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut usage = Self::load_usage(&self.pool, &ids).await?;
        rows.into_iter().map(|row| {
            let id = row.id;
            row.into_coupon(usage.remove(&id).unwrap_or_default())
        }).collect()
    }

    async fn update_terms(&self, code: &CouponCode, terms: CouponTerms) -> Result<Coupon> {
        self.modify(code, |c| c.update_terms(terms)).await
    }

    async fn set_active(&self, code: &CouponCode, active: bool) -> Result<Coupon> {
        self.modify(code, |c| {
            if active { c.activate() } else { c.deactivate() }
            Ok(())
        }).await
    }

    async fn redeem(&self, code: &CouponCode, order: &OrderContext, now: DateTime<Utc>) -> Result<(Coupon, UsageRecord)> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let mut coupon = Self::lock(&mut tx, code).await?;
        let record = engine::redeem(&mut coupon, order, now)?;
        let id = parse_id(&coupon)?;
        let bumped = sqlx::query("UPDATE coupons SET usage_count = usage_count + 1, updated_at = $2 WHERE id = $1 AND usage_count < max_usage")
            .bind(id).bind(now).execute(&mut *tx).await.map_err(storage)?;
        if bumped.rows_affected() == 0 {
            return Err(CouponError::Ineligible(IneligibleReason::Exhausted));
        }
        sqlx::query("INSERT INTO coupon_redemptions (coupon_id, user_id, used_at, order_amount, discount_amount) VALUES ($1, $2, $3, $4, $5)")
            .bind(id).bind(record.user_id.as_str()).bind(record.used_at).bind(record.order_amount).bind(record.discount_amount)
            .execute(&mut *tx).await.map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        Ok((coupon, record))
    }
}
