//! Postgres-backed catalog and order stores.
//!
//! Capacity changes are single `UPDATE ... RETURNING` statements. The claim
//! carries its condition in the `WHERE` clause (`space >= $2`), so two
//! concurrent claims against the same row serialise on the row lock and the
//! second one re-evaluates the condition against the committed value.
//!
//! Cancellation credits go through `release_line`, which inserts the line's
//! key into `line_releases` and increments the lesson in one transaction. A
//! concurrent caller inserting the same key waits on the primary key until
//! the first transaction commits or rolls back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError | Scenario |
//! |------------|------------|----------|
//! | Database (any code) | `Unavailable` | statement failed, timeout, constraint |
//! | PoolTimedOut / PoolClosed / Io | `Unavailable` | store unreachable |
//! | ColumnDecode / out-of-range values | `Corrupt` | row cannot be mapped to the domain |

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use lessonbook_catalog::{Quantity, Slot, SlotPatch, SlotQuery};
use lessonbook_core::{OrderId, SlotId};
use lessonbook_orders::{Customer, Order, OrderLine};

use super::{CatalogStore, LineRelease, OrderFilter, OrderStore, ReleaseKey, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS lessons (
        id UUID PRIMARY KEY,
        topic TEXT NOT NULL,
        location TEXT NOT NULL,
        price BIGINT NOT NULL CHECK (price >= 0),
        space BIGINT NOT NULL CHECK (space >= 0),
        image TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        customer_name TEXT NOT NULL,
        customer_phone TEXT NOT NULL,
        total BIGINT NOT NULL CHECK (total >= 0),
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_lines (
        order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        line_no INTEGER NOT NULL,
        lesson_id UUID NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        unit_price BIGINT NOT NULL CHECK (unit_price >= 0),
        PRIMARY KEY (order_id, line_no)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS line_releases (
        order_id UUID NOT NULL,
        line_no INTEGER NOT NULL,
        released_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (order_id, line_no)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS orders_created_at_idx ON orders (created_at DESC)",
];

/// Open a connection pool with bounded acquire and statement timeouts.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    timeout: Duration,
) -> Result<PgPool, StoreError> {
    let options = PgConnectOptions::from_str(database_url)
        .map_err(|e| map_sqlx_error("parse_database_url", e))?
        .options([("statement_timeout", format!("{}ms", timeout.as_millis()))]);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeout)
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Create tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SLOT_COLUMNS: &str = "id, topic, location, price, space, image";

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self), fields(slot_id = %id), err)]
    async fn find_by_id(&self, id: SlotId) -> Result<Option<Slot>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SLOT_COLUMNS} FROM lessons WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_slot", e))?;
        row.as_ref().map(slot_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list(&self, query: &SlotQuery) -> Result<Vec<Slot>, StoreError> {
        let pattern = query.text.as_deref().map(|t| format!("%{}%", escape_like(t)));
        // Sort column and direction come from closed enums, never from input text.
        let sql = format!(
            "SELECT {SLOT_COLUMNS} FROM lessons \
             WHERE ($1::text IS NULL OR topic ILIKE $1 OR location ILIKE $1) \
             ORDER BY {} {}, id ASC \
             LIMIT $2",
            query.sort.column(),
            query.direction.keyword(),
        );
        let rows = sqlx::query(&sql)
            .bind(pattern)
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_slots", e))?;
        rows.iter().map(slot_from_row).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM lessons")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_slots", e))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| StoreError::Corrupt(format!("failed to read count: {e}")))?;
        Ok(total.max(0) as u64)
    }

    #[instrument(skip(self, slot), fields(slot_id = %slot.id), err)]
    async fn insert(&self, slot: Slot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO lessons (id, topic, location, price, space, image)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(slot.id.as_uuid())
        .bind(&slot.topic)
        .bind(&slot.location)
        .bind(to_db_amount("price", slot.price)?)
        .bind(slot.space)
        .bind(&slot.image)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_slot", e))?;
        Ok(())
    }

    #[instrument(skip(self, patch), fields(slot_id = %id), err)]
    async fn update_details(&self, id: SlotId, patch: &SlotPatch) -> Result<Option<Slot>, StoreError> {
        let price = patch.price.map(|p| to_db_amount("price", p)).transpose()?;
        let row = sqlx::query(&format!(
            "UPDATE lessons SET \
                 topic = COALESCE($2, topic), \
                 location = COALESCE($3, location), \
                 price = COALESCE($4, price), \
                 image = COALESCE($5, image) \
             WHERE id = $1 \
             RETURNING {SLOT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(patch.topic.as_deref())
        .bind(patch.location.as_deref())
        .bind(price)
        .bind(patch.image.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_slot", e))?;
        row.as_ref().map(slot_from_row).transpose()
    }

    #[instrument(skip(self), fields(slot_id = %id, quantity = %quantity), err)]
    async fn conditional_decrement(
        &self,
        id: SlotId,
        quantity: Quantity,
    ) -> Result<Option<Slot>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE lessons SET space = space - $2 \
             WHERE id = $1 AND space >= $2 \
             RETURNING {SLOT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(quantity.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_slot", e))?;
        row.as_ref().map(slot_from_row).transpose()
    }

    #[instrument(skip(self), fields(slot_id = %id, quantity = %quantity), err)]
    async fn increment(&self, id: SlotId, quantity: Quantity) -> Result<Option<Slot>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE lessons SET space = space + $2 \
             WHERE id = $1 \
             RETURNING {SLOT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(quantity.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("restore_slot", e))?;
        row.as_ref().map(slot_from_row).transpose()
    }

    #[instrument(
        skip(self),
        fields(order_id = %key.order_id, line_no = key.line_no, slot_id = %id, quantity = %quantity),
        err
    )]
    async fn release_line(
        &self,
        key: ReleaseKey,
        id: SlotId,
        quantity: Quantity,
    ) -> Result<LineRelease, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_release_line", e))?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO line_releases (order_id, line_no)
            VALUES ($1, $2)
            ON CONFLICT (order_id, line_no) DO NOTHING
            "#,
        )
        .bind(key.order_id.as_uuid())
        .bind(key.line_no as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("record_line_release", e))?;

        if recorded.rows_affected() == 0 {
            return Ok(LineRelease::AlreadyReleased);
        }

        let row = sqlx::query(&format!(
            "UPDATE lessons SET space = space + $2 \
             WHERE id = $1 \
             RETURNING {SLOT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(quantity.as_i64())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("release_line", e))?;
        let slot = row.as_ref().map(slot_from_row).transpose()?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_release_line", e))?;

        Ok(match slot {
            Some(slot) => LineRelease::Restored(slot),
            None => LineRelease::SlotMissing,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderLine>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, line_no, lesson_id, quantity, unit_price
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order_lines", e))?;

        let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = get(row, "order_id")?;
            by_order.entry(order_id).or_default().push(line_from_row(row)?);
        }
        Ok(by_order)
    }
}

const ORDER_COLUMNS: &str = "id, customer_name, customer_phone, total, created_at";

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(skip(self, order), fields(order_id = %order.id_typed(), lines = order.lines().len()), err)]
    async fn insert(&self, order: Order) -> Result<OrderId, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_insert_order", e))?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_name, customer_phone, total, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.customer().name.as_str())
        .bind(order.customer().phone.as_str())
        .bind(to_db_amount("total", order.total())?)
        .bind(order.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for line in order.lines() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, lesson_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id_typed().as_uuid())
            .bind(line.line_no as i32)
            .bind(line.slot_id.as_uuid())
            .bind(line.quantity.as_i64())
            .bind(to_db_amount("unit_price", line.unit_price)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_line", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_insert_order", e))?;
        Ok(order.id_typed())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let Some(row) = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_order", e))?
        else {
            return Ok(None);
        };

        let mut lines = self.load_lines(&[*id.as_uuid()]).await?;
        order_from_row(&row, lines.remove(id.as_uuid()).unwrap_or_default()).map(Some)
    }

    #[instrument(skip(self), err)]
    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let pattern = filter
            .name_prefix
            .as_deref()
            .map(|p| format!("{}%", escape_like(p)));
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::text IS NULL OR customer_name ILIKE $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        ))
        .bind(pattern)
        .bind(filter.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let ids = rows
            .iter()
            .map(|r| get::<Uuid>(r, "id"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut lines = self.load_lines(&ids).await?;

        rows.iter()
            .zip(ids.iter())
            .map(|(row, id)| order_from_row(row, lines.remove(id).unwrap_or_default()))
            .collect()
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn delete_by_id(&self, id: OrderId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        Ok(result.rows_affected())
    }
}

// Row mapping

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn slot_from_row(row: &PgRow) -> Result<Slot, StoreError> {
    let price: i64 = get(row, "price")?;
    Ok(Slot {
        id: SlotId::from_uuid(get(row, "id")?),
        topic: get(row, "topic")?,
        location: get(row, "location")?,
        price: from_db_amount("price", price)?,
        space: get(row, "space")?,
        image: get(row, "image")?,
    })
}

fn line_from_row(row: &PgRow) -> Result<OrderLine, StoreError> {
    let line_no: i32 = get(row, "line_no")?;
    let quantity: i64 = get(row, "quantity")?;
    let unit_price: i64 = get(row, "unit_price")?;
    Ok(OrderLine {
        line_no: u32::try_from(line_no)
            .map_err(|_| StoreError::Corrupt(format!("negative line_no {line_no}")))?,
        slot_id: SlotId::from_uuid(get(row, "lesson_id")?),
        quantity: Quantity::new(quantity).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        unit_price: from_db_amount("unit_price", unit_price)?,
    })
}

fn order_from_row(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order, StoreError> {
    let name: String = get(row, "customer_name")?;
    let phone: String = get(row, "customer_phone")?;
    let total: i64 = get(row, "total")?;
    let created_at: DateTime<Utc> = get(row, "created_at")?;
    // Stored as accepted at booking time; not re-validated against current rules.
    Ok(Order::restore(
        OrderId::from_uuid(get(row, "id")?),
        Customer::from_stored(name, phone),
        lines,
        from_db_amount("total", total)?,
        created_at,
    ))
}

fn to_db_amount(field: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} {value} exceeds BIGINT")))
}

fn from_db_amount(field: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {field} {value}")))
}

/// Escape `LIKE` metacharacters so user text matches literally.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Unavailable(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
