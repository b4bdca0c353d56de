use async_trait::async_trait;
use common::{Currency, Metadata, OrderId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    OrderKey, OrderPatch, OrderRecord, OrderStatus, PutOutcome, Result, StoreError,
    store::OrderStore,
};

const COLUMNS: &str = "order_id, customer_id, customer_email, amount_total, currency, status, \
     payment_intent_id, subscription_id, amount_paid, payment_confirmed_at, metadata, \
     created_at, updated_at";

/// PostgreSQL-backed order store implementation.
///
/// Every conditional write is a single statement, so the database provides
/// the atomicity. Status guards are expressed as `status = ANY(...)` over the
/// legal predecessors of the target status.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<OrderRecord> {
        let status: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status)
            .ok_or_else(|| StoreError::InvalidRecord(format!("unknown status {status:?}")))?;

        let currency = row
            .try_get::<Option<String>, _>("currency")?
            .map(|c| Currency::parse(&c))
            .transpose()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: Metadata = serde_json::from_value(metadata_json)?;

        Ok(OrderRecord {
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            customer_id: row.try_get("customer_id")?,
            customer_email: row.try_get("customer_email")?,
            amount_total: row.try_get("amount_total")?,
            currency,
            status,
            payment_intent_id: row.try_get("payment_intent_id")?,
            subscription_id: row.try_get("subscription_id")?,
            amount_paid: row.try_get("amount_paid")?,
            payment_confirmed_at: row.try_get("payment_confirmed_at")?,
            metadata,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn key_column(key: &OrderKey) -> (&'static str, &str) {
        match key {
            OrderKey::OrderId(id) => ("order_id", id.as_str()),
            OrderKey::PaymentIntent(pi) => ("payment_intent_id", pi.as_str()),
        }
    }

    /// Applies a guarded patch in one statement.
    ///
    /// When no row comes back the key is probed once more to tell a missing
    /// record apart from a rejected transition.
    async fn patch_where(&self, key: &OrderKey, patch: &OrderPatch) -> Result<Option<OrderRecord>> {
        let (column, value) = Self::key_column(key);
        let allowed: Vec<String> = patch
            .status
            .map(|target| {
                OrderStatus::predecessors(target)
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let sql = format!(
            r#"
            UPDATE orders SET
                status = COALESCE($2, status),
                subscription_id = COALESCE($3, subscription_id),
                amount_paid = COALESCE($4, amount_paid),
                payment_confirmed_at = COALESCE(payment_confirmed_at, $5),
                updated_at = GREATEST(updated_at, $6)
            WHERE {column} = $1 AND ($2::text IS NULL OR status = ANY($7))
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(value)
            .bind(patch.status.map(|s| s.as_str()))
            .bind(patch.subscription_id.as_deref())
            .bind(patch.amount_paid)
            .bind(patch.payment_confirmed_at)
            .bind(patch.updated_at)
            .bind(&allowed)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Self::row_to_record(row).map(Some);
        }

        let probe = format!("SELECT order_id, status FROM orders WHERE {column} = $1 LIMIT 1");
        let existing = sqlx::query(&probe)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        match (existing, patch.status) {
            (Some(row), Some(to)) => {
                let status: String = row.try_get("status")?;
                let from = OrderStatus::parse(&status).ok_or_else(|| {
                    StoreError::InvalidRecord(format!("unknown status {status:?}"))
                })?;
                Err(StoreError::ConditionFailed {
                    order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
                    from,
                    to,
                })
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM orders WHERE order_id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn put(&self, record: OrderRecord) -> Result<PutOutcome> {
        let metadata_json = serde_json::to_value(&record.metadata)?;

        let sql = format!(
            r#"
            INSERT INTO orders ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (order_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                customer_email = EXCLUDED.customer_email,
                amount_total = EXCLUDED.amount_total,
                currency = EXCLUDED.currency,
                payment_intent_id = EXCLUDED.payment_intent_id,
                metadata = EXCLUDED.metadata,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            WHERE orders.status = 'created'
            RETURNING order_id
            "#
        );

        let written = sqlx::query(&sql)
            .bind(record.order_id.as_str())
            .bind(record.customer_id.as_deref())
            .bind(record.customer_email.as_deref())
            .bind(record.amount_total)
            .bind(record.currency.as_ref().map(|c| c.as_str()))
            .bind(record.status.as_str())
            .bind(record.payment_intent_id.as_deref())
            .bind(record.subscription_id.as_deref())
            .bind(record.amount_paid)
            .bind(record.payment_confirmed_at)
            .bind(metadata_json)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(if written.is_some() {
            PutOutcome::Written
        } else {
            PutOutcome::Skipped
        })
    }

    async fn update_if_exists(
        &self,
        key: &OrderKey,
        patch: &OrderPatch,
    ) -> Result<Option<OrderRecord>> {
        self.patch_where(key, patch).await
    }

    async fn upsert(&self, seed: OrderRecord, patch: &OrderPatch) -> Result<OrderRecord> {
        let metadata_json = serde_json::to_value(&seed.metadata)?;

        let sql = format!(
            r#"
            INSERT INTO orders ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING {COLUMNS}
            "#
        );

        let inserted = sqlx::query(&sql)
            .bind(seed.order_id.as_str())
            .bind(seed.customer_id.as_deref())
            .bind(seed.customer_email.as_deref())
            .bind(seed.amount_total)
            .bind(seed.currency.as_ref().map(|c| c.as_str()))
            .bind(seed.status.as_str())
            .bind(seed.payment_intent_id.as_deref())
            .bind(seed.subscription_id.as_deref())
            .bind(seed.amount_paid)
            .bind(seed.payment_confirmed_at)
            .bind(metadata_json)
            .bind(seed.created_at)
            .bind(seed.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            return Self::row_to_record(row);
        }

        let key = OrderKey::OrderId(seed.order_id.clone());
        self.patch_where(&key, patch)
            .await?
            .ok_or(StoreError::NotFound(seed.order_id))
    }
}
