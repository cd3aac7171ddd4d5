//! Postgres-backed ledger store.
//!
//! Every unit of work is a `SERIALIZABLE` transaction, so a balance read and the write
//! it guards cannot interleave with another unit touching the same participant. Losing
//! units fail at statement or commit time and surface as [`StoreError::Conflict`].
//!
//! The insertion clock lives in the single-row `ledger_clock` table. Each insert advances
//! it in a separate autocommit statement on the pool, outside the unit, which hands out
//! `seq` and `recorded_at` together. Units touching unrelated participants never read
//! each other's rows. Aborted units leave gaps in `seq`. A store needs at least two pool
//! connections: one held by the unit and one for the clock.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE ledger_clock (
//!     id          BOOLEAN     PRIMARY KEY CHECK (id),
//!     seq         BIGINT      NOT NULL,
//!     recorded_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE ledger_transactions (
//!     seq           BIGINT      NOT NULL UNIQUE,
//!     id            TEXT        PRIMARY KEY,
//!     kind          TEXT        NOT NULL CHECK (kind IN ('RECHARGE', 'TRANSFER', 'REQUEST')),
//!     sender_id     TEXT        NULL,
//!     receiver_id   TEXT        NOT NULL,
//!     amount        NUMERIC     NOT NULL CHECK (amount > 0),
//!     "timestamp"   TIMESTAMPTZ NOT NULL,
//!     recorded_at   TIMESTAMPTZ NOT NULL,
//!     request_state TEXT        NULL CHECK (request_state IN ('PENDING', 'APPROVED', 'REJECTED')),
//!     origin        TEXT        NOT NULL CHECK (origin IN ('ONLINE', 'OFFLINE'))
//! );
//! CREATE INDEX ledger_transactions_sender ON ledger_transactions (sender_id);
//! CREATE INDEX ledger_transactions_receiver ON ledger_transactions (receiver_id);
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | `StoreError` |
//! |------------|-----------------|--------------|
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (deadlock detected) | `40P01` | `Conflict` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed / Io / other | n/a | `Backend` |

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::instrument;

use ledgerpay_core::{Amount, ParticipantId, TransactionId};
use ledgerpay_ledger::{Origin, RequestState, Transaction, TransactionKind};

use super::r#trait::{LedgerStore, LedgerUnit, Page, StoreError};

const MIN_CONNECTIONS: u32 = 2;

/// Advances the insertion clock: one row lock, held for a single autocommit statement.
const TICK_CLOCK: &str = r#"
    INSERT INTO ledger_clock (id, seq, recorded_at)
    VALUES (TRUE, 1, clock_timestamp())
    ON CONFLICT (id) DO UPDATE SET
        seq = ledger_clock.seq + 1,
        recorded_at = GREATEST(ledger_clock.recorded_at, EXCLUDED.recorded_at)
    RETURNING seq, recorded_at
"#;

/// Appends one record. Reads nothing, so concurrent writers take no predicate locks on
/// the log.
const INSERT_TRANSACTION: &str = r#"
    INSERT INTO ledger_transactions (
        seq, id, kind, sender_id, receiver_id, amount,
        "timestamp", recorded_at, request_state, origin
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

fn pool_size(requested: u32) -> u32 {
    requested.max(MIN_CONNECTIONS)
}

const COLUMNS: &str = r#"id, kind, sender_id, receiver_id, amount, "timestamp", recorded_at, request_state, origin"#;

/// Postgres-backed append-only ledger.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool to `database_url`. At least two connections are kept available.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size(max_connections))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(Box::new(PostgresUnit {
            tx,
            pool: Arc::clone(&self.pool),
        }))
    }
}

/// An open `SERIALIZABLE` transaction. sqlx rolls it back on drop.
struct PostgresUnit {
    tx: sqlx::Transaction<'static, Postgres>,
    pool: Arc<PgPool>,
}

impl PostgresUnit {
    /// Advance the insertion clock. Runs on its own pooled connection and commits at
    /// once, so the row lock is held for one statement only.
    #[instrument(skip(self), err)]
    async fn tick(&self) -> Result<(i64, DateTime<Utc>), StoreError> {
        let row = sqlx::query(TICK_CLOCK)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tick_clock", e))?;

        Ok((
            row.try_get("seq").map_err(corrupt)?,
            row.try_get("recorded_at").map_err(corrupt)?,
        ))
    }
}

#[async_trait]
impl LedgerUnit for PostgresUnit {
    #[instrument(skip(self), fields(participant = %participant), err)]
    async fn transactions_for(
        &mut self,
        participant: &ParticipantId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ledger_transactions \
             WHERE sender_id = $1 OR receiver_id = $1 \
             ORDER BY seq ASC"
        ))
        .bind(participant.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("transactions_for", e))?;

        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip(self), fields(transaction_id = %id), err)]
    async fn get(&mut self, id: &TransactionId) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ledger_transactions WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.as_ref().map(decode_row).transpose()
    }

    #[instrument(skip(self, ids), fields(candidates = ids.len()), err)]
    async fn existing_ids(
        &mut self,
        ids: &[TransactionId],
    ) -> Result<HashSet<TransactionId>, StoreError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let candidates: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();

        let rows = sqlx::query("SELECT id FROM ledger_transactions WHERE id = ANY($1)")
            .bind(&candidates)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("existing_ids", e))?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(corrupt)?;
                TransactionId::parse(id).map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .collect()
    }

    #[instrument(skip(self), fields(requester = %requester, payer = %payer), err)]
    async fn has_pending_request(
        &mut self,
        requester: &ParticipantId,
        payer: &ParticipantId,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM ledger_transactions
                WHERE kind = 'REQUEST'
                    AND request_state = 'PENDING'
                    AND sender_id = $1
                    AND receiver_id = $2
            ) AS pending
            "#,
        )
        .bind(requester.as_str())
        .bind(payer.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("has_pending_request", e))?;

        row.try_get("pending").map_err(corrupt)
    }

    #[instrument(skip(self), fields(participant = %participant, limit = page.limit, offset = page.offset), err)]
    async fn list(
        &mut self,
        participant: &ParticipantId,
        page: Page,
    ) -> Result<Vec<Transaction>, StoreError> {
        // LIMIT NULL is "no limit" in Postgres.
        let limit = (page.limit > 0).then_some(page.limit as i64);

        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ledger_transactions \
             WHERE sender_id = $1 OR receiver_id = $1 \
             ORDER BY seq DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(participant.as_str())
        .bind(limit)
        .bind(page.offset as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(decode_row).collect()
    }

    #[instrument(
        skip(self, transaction),
        fields(transaction_id = %transaction.id, kind = transaction.kind.as_str()),
        err
    )]
    async fn insert(&mut self, mut transaction: Transaction) -> Result<Transaction, StoreError> {
        let (seq, recorded_at) = self.tick().await?;
        transaction.recorded_at = recorded_at;
        if !transaction.origin.is_offline() {
            transaction.timestamp = recorded_at;
        }

        sqlx::query(INSERT_TRANSACTION)
            .bind(seq)
            .bind(transaction.id.as_str())
            .bind(transaction.kind.as_str())
            .bind(transaction.sender_id.as_ref().map(|id| id.as_str()))
            .bind(transaction.receiver_id.as_str())
            .bind(transaction.amount.value())
            .bind(transaction.timestamp)
            .bind(transaction.recorded_at)
            .bind(transaction.request_state.map(|state| state.as_str()))
            .bind(origin_str(transaction.origin))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate(transaction.id.clone())
                } else {
                    map_sqlx_error("insert_transaction", e)
                }
            })?;

        Ok(transaction)
    }

    #[instrument(skip(self), fields(transaction_id = %id, state = state.as_str()), err)]
    async fn set_request_state(
        &mut self,
        id: &TransactionId,
        state: RequestState,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_transactions
            SET request_state = $2
            WHERE id = $1 AND kind = 'REQUEST' AND request_state = 'PENDING'
            "#,
        )
        .bind(id.as_str())
        .bind(state.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("set_request_state", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotPending(id.clone()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn origin_str(origin: Origin) -> &'static str {
    match origin {
        Origin::Online => "ONLINE",
        Origin::Offline => "OFFLINE",
    }
}

fn corrupt(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn decode_row(row: &PgRow) -> Result<Transaction, StoreError> {
    let id: String = row.try_get("id").map_err(corrupt)?;
    let kind: String = row.try_get("kind").map_err(corrupt)?;
    let sender_id: Option<String> = row.try_get("sender_id").map_err(corrupt)?;
    let receiver_id: String = row.try_get("receiver_id").map_err(corrupt)?;
    let amount: Decimal = row.try_get("amount").map_err(corrupt)?;
    let timestamp: DateTime<Utc> = row.try_get("timestamp").map_err(corrupt)?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(corrupt)?;
    let request_state: Option<String> = row.try_get("request_state").map_err(corrupt)?;
    let origin: String = row.try_get("origin").map_err(corrupt)?;

    let bad = |what: &str, value: &str| StoreError::Corrupt(format!("row {id}: bad {what} '{value}'"));

    Ok(Transaction {
        kind: TransactionKind::parse(&kind).ok_or_else(|| bad("kind", &kind))?,
        sender_id: sender_id
            .map(|s| ParticipantId::parse(s.as_str()).map_err(|_| bad("sender_id", &s)))
            .transpose()?,
        receiver_id: ParticipantId::parse(receiver_id.as_str())
            .map_err(|_| bad("receiver_id", &receiver_id))?,
        amount: Amount::new(amount).map_err(|_| bad("amount", &amount.to_string()))?,
        timestamp,
        recorded_at,
        request_state: request_state
            .map(|s| RequestState::parse(&s).ok_or_else(|| bad("request_state", &s)))
            .transpose()?,
        origin: match origin.as_str() {
            "ONLINE" => Origin::Online,
            "OFFLINE" => Origin::Offline,
            other => return Err(bad("origin", other)),
        },
        id: TransactionId::parse(id.as_str()).map_err(|_| bad("id", &id))?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
