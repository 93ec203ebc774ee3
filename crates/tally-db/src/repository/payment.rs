//! # Payment Repository
//!
//! Payment rows and the idempotency-key lookup that makes recording a
//! payment safe to retry.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::ledger::CounterpartyKind;
use tally_core::money::Currency;
use tally_core::types::{Payment, PaymentMethod, PaymentStatus};
use tally_core::CoreError;

const SELECT_PAYMENT: &str = "SELECT id, counterparty_kind, counterparty_id, amount, currency, payment_method, \
     idempotency_key, status, notes, created_by, created_at \
     FROM payments";

/// Input for a payment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub counterparty_kind: CounterpartyKind,
    pub counterparty_id: i64,
    pub amount: i64,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
}

pub struct PaymentRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PaymentRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PaymentRepository { conn }
    }

    pub async fn find_by_idempotency_key(&mut self, key: &str) -> DbResult<Option<Payment>> {
        let sql = format!("{} WHERE idempotency_key = ?1", SELECT_PAYMENT);
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(payment)
    }

    pub async fn get(&mut self, id: i64) -> DbResult<Payment> {
        let sql = format!("{} WHERE id = ?1", SELECT_PAYMENT);
        sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", id).into())
    }

    pub async fn create(&mut self, payment: &NewPayment) -> DbResult<Payment> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO payments ( \
                counterparty_kind, counterparty_id, amount, currency, payment_method, \
                idempotency_key, status, notes, created_by, created_at \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(payment.counterparty_kind)
        .bind(payment.counterparty_id)
        .bind(payment.amount)
        .bind(payment.currency)
        .bind(payment.payment_method)
        .bind(&payment.idempotency_key)
        .bind(PaymentStatus::Completed)
        .bind(&payment.notes)
        .bind(&payment.created_by)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        let id = result.last_insert_rowid();
        debug!(
            id,
            kind = %payment.counterparty_kind,
            counterparty_id = payment.counterparty_id,
            amount = payment.amount,
            "Payment created"
        );

        Ok(Payment {
            id,
            counterparty_kind: payment.counterparty_kind,
            counterparty_id: payment.counterparty_id,
            amount: payment.amount,
            currency: payment.currency,
            payment_method: payment.payment_method,
            idempotency_key: payment.idempotency_key.clone(),
            status: PaymentStatus::Completed,
            notes: payment.notes.clone(),
            created_by: payment.created_by.clone(),
            created_at: now,
        })
    }

    /// Number of payments sharing a key: 0 or 1.
    pub async fn count_by_idempotency_key(&mut self, key: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE idempotency_key = ?1")
            .bind(key)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}
