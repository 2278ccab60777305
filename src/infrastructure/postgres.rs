//! PostgreSQL implementation of the order store.

use crate::domain::order::{
    NewHistory, NewOrder, NewOrderInvoice, NewOrderPayment, NewSubOrder, ORDER_NAME_PREFIX, Order,
    OrderHistory, OrderInvoice, OrderPayment, OrderPaymentUpdate, OrderUpdate,
    SUB_ORDER_NAME_PREFIX, SubOrder, SubOrderRecord, SubOrderUpdate, next_name,
};
use crate::domain::payment_type::PaymentType;
use crate::domain::ports::{OrderStore, OrderTransaction};
use crate::domain::status::OrderStatus;
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, uuid, order_name, customer_id, customer_name, customer_email, \
    customer_phone, package_id, remaining_outstanding_amount, completed_at, created_at, \
    updated_at, deleted_at";
const SUB_ORDER_COLUMNS: &str = "id, uuid, order_id, sub_order_name, amount, status, is_paid, \
    payment_type, order_date, canceled_at, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, sub_order_id, amount, payment_id, payment_url, status, \
    payment_type, va_number, bank, acquirer, expired_at, paid_at, created_at, updated_at";
const HISTORY_COLUMNS: &str = "id, sub_order_id, status, created_at";
const INVOICE_COLUMNS: &str = "id, sub_order_id, invoice_id, invoice_number, invoice_url, created_at";

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        order_name: row.try_get("order_name")?,
        customer_id: row.try_get("customer_id")?,
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        customer_phone: row.try_get("customer_phone")?,
        package_id: row.try_get("package_id")?,
        remaining_outstanding_amount: row.try_get("remaining_outstanding_amount")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn sub_order_from_row(row: &PgRow) -> Result<SubOrder> {
    let status: i16 = row.try_get("status")?;
    let payment_type: String = row.try_get("payment_type")?;
    Ok(SubOrder {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        order_id: row.try_get("order_id")?,
        sub_order_name: row.try_get("sub_order_name")?,
        amount: row.try_get("amount")?,
        status: OrderStatus::try_from(status)?,
        is_paid: row.try_get("is_paid")?,
        payment_type: payment_type.parse::<PaymentType>()?,
        order_date: row.try_get("order_date")?,
        canceled_at: row.try_get("canceled_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<OrderPayment> {
    Ok(OrderPayment {
        id: row.try_get("id")?,
        sub_order_id: row.try_get("sub_order_id")?,
        amount: row.try_get("amount")?,
        payment_id: row.try_get("payment_id")?,
        payment_url: row.try_get("payment_url")?,
        status: row.try_get("status")?,
        payment_type: row.try_get("payment_type")?,
        va_number: row.try_get("va_number")?,
        bank: row.try_get("bank")?,
        acquirer: row.try_get("acquirer")?,
        expired_at: row.try_get("expired_at")?,
        paid_at: row.try_get("paid_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn history_from_row(row: &PgRow) -> Result<OrderHistory> {
    let status: i16 = row.try_get("status")?;
    Ok(OrderHistory {
        id: row.try_get("id")?,
        sub_order_id: row.try_get("sub_order_id")?,
        status: OrderStatus::try_from(status)?,
        created_at: row.try_get("created_at")?,
    })
}

fn invoice_from_row(row: &PgRow) -> Result<OrderInvoice> {
    Ok(OrderInvoice {
        id: row.try_get("id")?,
        sub_order_id: row.try_get("sub_order_id")?,
        invoice_id: row.try_get("invoice_id")?,
        invoice_number: row.try_get("invoice_number")?,
        invoice_url: row.try_get("invoice_url")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Joins a sub-order with its order and payment.
async fn load_record(conn: &mut PgConnection, sub_order: SubOrder) -> Result<Option<SubOrderRecord>> {
    let Some(order_row) = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(sub_order.order_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let payment = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM order_payments WHERE sub_order_id = $1"
    ))
    .bind(sub_order.id)
    .fetch_optional(&mut *conn)
    .await?
    .as_ref()
    .map(payment_from_row)
    .transpose()?;

    Ok(Some(SubOrderRecord {
        order: order_from_row(&order_row)?,
        sub_order,
        payment,
    }))
}

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "connected to postgres");
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgOrderTransaction { tx }))
    }

    async fn find_order_by_uuid(&self, uuid: Uuid) -> Result<Option<Order>> {
        sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE uuid = $1"
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(order_from_row)
        .transpose()
    }

    async fn find_sub_order_by_uuid(&self, uuid: Uuid) -> Result<Option<SubOrderRecord>> {
        let mut conn = self.pool.acquire().await?;
        let Some(row) = sqlx::query(&format!(
            "SELECT {SUB_ORDER_COLUMNS} FROM sub_orders WHERE uuid = $1"
        ))
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };
        load_record(&mut conn, sub_order_from_row(&row)?).await
    }

    async fn list_sub_orders(&self, page: u32, limit: u32) -> Result<(Vec<SubOrderRecord>, u64)> {
        let mut conn = self.pool.acquire().await?;
        let offset = i64::from(page.max(1) - 1) * i64::from(limit);
        let rows = sqlx::query(&format!(
            "SELECT {SUB_ORDER_COLUMNS} FROM sub_orders ORDER BY id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(record) = load_record(&mut conn, sub_order_from_row(row)?).await? {
                records.push(record);
            }
        }

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM sub_orders")
            .fetch_one(&mut *conn)
            .await?
            .try_get("total")?;
        Ok((records, u64::try_from(total).unwrap_or_default()))
    }

    async fn find_histories(&self, sub_order_id: i64) -> Result<Vec<OrderHistory>> {
        sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM order_histories WHERE sub_order_id = $1 ORDER BY id"
        ))
        .bind(sub_order_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(history_from_row)
        .collect()
    }

    async fn find_invoices(&self, sub_order_id: i64) -> Result<Vec<OrderInvoice>> {
        sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM order_invoices WHERE sub_order_id = $1 ORDER BY id"
        ))
        .bind(sub_order_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(invoice_from_row)
        .collect()
    }
}

/// A database transaction. Dropping it without `commit` rolls back.
pub struct PgOrderTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgOrderTransaction {
    async fn latest_name(&mut self, sql: &str, column: &str) -> Result<Option<String>> {
        sqlx::query(sql)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| row.try_get::<String, _>(column))
            .transpose()
            .map_err(OrderError::from)
    }

    async fn locked_status(&mut self, sub_order_id: i64) -> Result<OrderStatus> {
        let row = sqlx::query("SELECT status FROM sub_orders WHERE id = $1 FOR UPDATE")
            .bind(sub_order_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(OrderError::SubOrderNotFound)?;
        OrderStatus::try_from(row.try_get::<i16, _>("status")?)
    }
}

#[async_trait]
impl OrderTransaction for PgOrderTransaction {
    async fn find_active_order_by_customer_for_update(
        &mut self,
        customer_id: Uuid,
    ) -> Result<Option<Order>> {
        // A row lock alone cannot cover the "no active order yet" case.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(customer_id)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE customer_id = $1 AND completed_at IS NULL AND deleted_at IS NULL \
             ORDER BY id DESC LIMIT 1 FOR UPDATE"
        ))
        .bind(customer_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(order_from_row)
        .transpose()
    }

    async fn find_order_by_uuid_for_update(&mut self, uuid: Uuid) -> Result<Option<Order>> {
        sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE uuid = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(uuid)
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(order_from_row)
        .transpose()
    }

    async fn find_order_by_id_for_update(&mut self, id: i64) -> Result<Option<Order>> {
        sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(order_from_row)
        .transpose()
    }

    async fn create_order(&mut self, order: NewOrder) -> Result<Order> {
        let now = Utc::now();
        let latest = self
            .latest_name("SELECT order_name FROM orders ORDER BY id DESC LIMIT 1", "order_name")
            .await?;
        let order_name = next_name(ORDER_NAME_PREFIX, latest.as_deref(), now.date_naive());

        let row = sqlx::query(&format!(
            "INSERT INTO orders (uuid, order_name, customer_id, customer_name, customer_email, \
             customer_phone, package_id, remaining_outstanding_amount, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(order_name)
        .bind(order.customer_id)
        .bind(order.customer_name)
        .bind(order.customer_email)
        .bind(order.customer_phone)
        .bind(order.package_id)
        .bind(order.remaining_outstanding_amount)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        order_from_row(&row)
    }

    async fn update_order(&mut self, order_id: i64, update: OrderUpdate) -> Result<Order> {
        sqlx::query(&format!(
            "UPDATE orders SET remaining_outstanding_amount = $1, \
             completed_at = COALESCE($2, completed_at), updated_at = $3 \
             WHERE id = $4 AND deleted_at IS NULL RETURNING {ORDER_COLUMNS}"
        ))
        .bind(update.remaining_outstanding_amount)
        .bind(update.completed_at)
        .bind(Utc::now())
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(order_from_row)
        .transpose()?
        .ok_or(OrderError::OrderNotFound)
    }

    async fn delete_order(&mut self, order_id: i64) -> Result<()> {
        let now = Utc::now();
        let row = sqlx::query("SELECT deleted_at FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at")?;
        if deleted_at.is_some() {
            return Ok(());
        }

        sqlx::query("UPDATE orders SET deleted_at = $1, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn find_sub_order_by_uuid_for_update(&mut self, uuid: Uuid) -> Result<Option<SubOrder>> {
        sqlx::query(&format!(
            "SELECT {SUB_ORDER_COLUMNS} FROM sub_orders WHERE uuid = $1 FOR UPDATE"
        ))
        .bind(uuid)
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(sub_order_from_row)
        .transpose()
    }

    async fn find_sub_order_by_payment_id_for_update(
        &mut self,
        payment_id: Uuid,
    ) -> Result<Option<SubOrder>> {
        sqlx::query(
            "SELECT s.id, s.uuid, s.order_id, s.sub_order_name, s.amount, s.status, s.is_paid, \
             s.payment_type, s.order_date, s.canceled_at, s.created_at, s.updated_at \
             FROM sub_orders s JOIN order_payments p ON p.sub_order_id = s.id \
             WHERE p.payment_id = $1 FOR UPDATE OF s",
        )
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(sub_order_from_row)
        .transpose()
    }

    async fn find_sub_order_by_order_and_payment_type(
        &mut self,
        order_id: i64,
        payment_type: PaymentType,
    ) -> Result<Option<SubOrder>> {
        sqlx::query(&format!(
            "SELECT {SUB_ORDER_COLUMNS} FROM sub_orders \
             WHERE order_id = $1 AND payment_type = $2 AND status <> $3 \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(order_id)
        .bind(payment_type.as_str())
        .bind(OrderStatus::Cancelled.code())
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(sub_order_from_row)
        .transpose()
    }

    async fn find_sub_orders_by_order(&mut self, order_id: i64) -> Result<Vec<SubOrder>> {
        sqlx::query(&format!(
            "SELECT {SUB_ORDER_COLUMNS} FROM sub_orders WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?
        .iter()
        .map(sub_order_from_row)
        .collect()
    }

    async fn create_sub_order(&mut self, sub_order: NewSubOrder) -> Result<SubOrder> {
        OrderStatus::Initial.ensure_transition(sub_order.status)?;

        let now = Utc::now();
        let latest = self
            .latest_name(
                "SELECT sub_order_name FROM sub_orders ORDER BY id DESC LIMIT 1",
                "sub_order_name",
            )
            .await?;
        let sub_order_name = next_name(SUB_ORDER_NAME_PREFIX, latest.as_deref(), now.date_naive());

        let row = sqlx::query(&format!(
            "INSERT INTO sub_orders (uuid, order_id, sub_order_name, amount, status, is_paid, \
             payment_type, order_date, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, FALSE, $6, $7, $8, $8) RETURNING {SUB_ORDER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(sub_order.order_id)
        .bind(sub_order_name)
        .bind(sub_order.amount)
        .bind(sub_order.status.code())
        .bind(sub_order.payment_type.as_str())
        .bind(sub_order.order_date)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        sub_order_from_row(&row)
    }

    async fn update_sub_order(
        &mut self,
        current: &SubOrder,
        update: SubOrderUpdate,
    ) -> Result<SubOrder> {
        self.locked_status(current.id)
            .await?
            .ensure_transition(update.status)?;

        let row = sqlx::query(&format!(
            "UPDATE sub_orders SET status = $1, is_paid = COALESCE($2, is_paid), \
             canceled_at = COALESCE($3, canceled_at), updated_at = $4 \
             WHERE id = $5 RETURNING {SUB_ORDER_COLUMNS}"
        ))
        .bind(update.status.code())
        .bind(update.is_paid)
        .bind(update.canceled_at)
        .bind(Utc::now())
        .bind(current.id)
        .fetch_one(&mut *self.tx)
        .await?;
        sub_order_from_row(&row)
    }

    async fn cancel_sub_order(&mut self, current: &SubOrder) -> Result<SubOrder> {
        self.update_sub_order(
            current,
            SubOrderUpdate {
                status: OrderStatus::Cancelled,
                is_paid: None,
                canceled_at: Some(Utc::now()),
            },
        )
        .await
    }

    async fn append_history(&mut self, sub_order_id: i64, status: OrderStatus) -> Result<()> {
        sqlx::query("INSERT INTO order_histories (sub_order_id, status) VALUES ($1, $2)")
            .bind(sub_order_id)
            .bind(status.code())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn bulk_append_history(&mut self, entries: Vec<NewHistory>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let (ids, statuses): (Vec<i64>, Vec<i16>) = entries
            .iter()
            .map(|entry| (entry.sub_order_id, entry.status.code()))
            .unzip();
        sqlx::query(
            "INSERT INTO order_histories (sub_order_id, status) \
             SELECT * FROM UNNEST($1::BIGINT[], $2::SMALLINT[])",
        )
        .bind(ids)
        .bind(statuses)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn create_order_payment(&mut self, payment: NewOrderPayment) -> Result<OrderPayment> {
        let row = sqlx::query(&format!(
            "INSERT INTO order_payments (sub_order_id, amount, payment_id, payment_url, status, \
             expired_at) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment.sub_order_id)
        .bind(payment.amount)
        .bind(payment.payment_id)
        .bind(payment.payment_url)
        .bind(payment.status)
        .bind(payment.expired_at)
        .fetch_one(&mut *self.tx)
        .await?;
        payment_from_row(&row)
    }

    async fn update_order_payment(&mut self, update: OrderPaymentUpdate) -> Result<OrderPayment> {
        let row = sqlx::query(&format!(
            "UPDATE order_payments SET status = COALESCE($1, status), \
             payment_type = COALESCE($2, payment_type), va_number = COALESCE($3, va_number), \
             bank = COALESCE($4, bank), acquirer = COALESCE($5, acquirer), \
             paid_at = COALESCE($6, paid_at), updated_at = $7, \
             payment_url = COALESCE($9, payment_url) \
             WHERE payment_id = $8 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(update.status)
        .bind(update.payment_type)
        .bind(update.va_number)
        .bind(update.bank)
        .bind(update.acquirer)
        .bind(update.paid_at)
        .bind(Utc::now())
        .bind(update.payment_id)
        .bind(update.payment_url)
        .fetch_one(&mut *self.tx)
        .await?;
        payment_from_row(&row)
    }

    async fn find_order_payment_by_payment_id(
        &mut self,
        payment_id: Uuid,
    ) -> Result<Option<OrderPayment>> {
        sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM order_payments WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(payment_from_row)
        .transpose()
    }

    async fn create_order_invoice(&mut self, invoice: NewOrderInvoice) -> Result<OrderInvoice> {
        let row = sqlx::query(&format!(
            "INSERT INTO order_invoices (sub_order_id, invoice_id, invoice_number, invoice_url) \
             VALUES ($1, $2, $3, $4) RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(invoice.sub_order_id)
        .bind(invoice.invoice_id)
        .bind(invoice.invoice_number)
        .bind(invoice.invoice_url)
        .fetch_one(&mut *self.tx)
        .await?;
        invoice_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
