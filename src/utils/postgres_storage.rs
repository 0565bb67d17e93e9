//! PostgreSQL storage backend
//!
//! Row locks come from `SELECT ... FOR NO KEY UPDATE` inside the open
//! transaction. Missing accounts are reported from explicit "no row"
//! results, or from the named foreign-key constraints on insert.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::config::LedgerConfig;
use crate::traits::*;
use crate::types::*;

/// PostgreSQL-backed ledger storage
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Create a connection pool from the configuration
    pub async fn connect(config: &LedgerConfig) -> LedgerResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| LedgerError::Config("database_url is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "PostgreSQL connection pool established"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("migration failed: {}", e)))
    }

    /// Check database health
    pub async fn health_check(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn account_from_row(row: &PgRow) -> LedgerResult<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        currency: row.try_get("currency")?,
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> LedgerResult<Entry> {
    Ok(Entry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transfer_from_row(row: &PgRow) -> LedgerResult<Transfer> {
    Ok(Transfer {
        id: row.try_get("id")?,
        from_account_id: row.try_get("from_account_id")?,
        to_account_id: row.try_get("to_account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Turn a foreign-key violation on a known constraint into `AccountNotFound`
fn map_insert_error(err: sqlx::Error, constraints: &[(&str, RecordId)]) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            let violated = db_err.constraint().unwrap_or_default();
            if let Some((_, account_id)) = constraints.iter().find(|(name, _)| *name == violated) {
                return LedgerError::AccountNotFound(*account_id);
            }
        }
    }
    LedgerError::from(err)
}

#[async_trait]
impl LedgerStorage for PgStorage {
    type Tx = PgTx;

    async fn begin(&self) -> LedgerResult<PgTx> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }

    async fn create_account(
        &self,
        owner: &str,
        currency: &str,
        balance: i64,
    ) -> LedgerResult<Account> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO accounts (owner, currency, balance)
            VALUES ($1, $2, $3)
            RETURNING id, owner, currency, balance, created_at
            "#,
        )
        .bind(owner)
        .bind(currency)
        .bind(balance)
        .fetch_one(&mut *tx)
        .await?;
        let account = account_from_row(&row)?;

        if balance != 0 {
            sqlx::query("INSERT INTO entries (account_id, amount) VALUES ($1, $2)")
                .bind(account.id)
                .bind(balance)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(account)
    }

    async fn get_account(&self, account_id: RecordId) -> LedgerResult<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner, currency, balance, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner, currency, balance, created_at
            FROM accounts
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    async fn get_transfer(&self, transfer_id: RecordId) -> LedgerResult<Option<Transfer>> {
        let row = sqlx::query(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(transfer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn list_transfers(&self, account_id: Option<RecordId>) -> LedgerResult<Vec<Transfer>> {
        let rows = sqlx::query(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE $1::BIGINT IS NULL OR from_account_id = $1 OR to_account_id = $1
            ORDER BY id
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transfer_from_row).collect()
    }

    async fn list_entries(&self, account_id: Option<RecordId>) -> LedgerResult<Vec<Entry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE $1::BIGINT IS NULL OR account_id = $1
            ORDER BY id
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

/// Transaction handle of [`PgStorage`]
///
/// Dropping it without `commit` makes sqlx roll the transaction back when
/// the connection returns to the pool.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTx for PgTx {
    async fn get_account_for_update(&mut self, account_id: RecordId) -> LedgerResult<Account> {
        let row = sqlx::query(
            r#"
            SELECT id, owner, currency, balance, created_at
            FROM accounts
            WHERE id = $1
            LIMIT 1
            FOR NO KEY UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => account_from_row(&row),
            None => Err(LedgerError::AccountNotFound(account_id)),
        }
    }

    async fn update_account_balance(
        &mut self,
        account_id: RecordId,
        balance: i64,
    ) -> LedgerResult<Account> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2
            WHERE id = $1
            RETURNING id, owner, currency, balance, created_at
            "#,
        )
        .bind(account_id)
        .bind(balance)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => account_from_row(&row),
            None => Err(LedgerError::AccountNotFound(account_id)),
        }
    }

    async fn insert_transfer(
        &mut self,
        from_account_id: RecordId,
        to_account_id: RecordId,
        amount: i64,
    ) -> LedgerResult<Transfer> {
        let row = sqlx::query(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            map_insert_error(
                e,
                &[
                    ("transfers_from_account_fk", from_account_id),
                    ("transfers_to_account_fk", to_account_id),
                ],
            )
        })?;

        transfer_from_row(&row)
    }

    async fn insert_entry(&mut self, account_id: RecordId, amount: i64) -> LedgerResult<Entry> {
        let row = sqlx::query(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_insert_error(e, &[("entries_account_fk", account_id)]))?;

        entry_from_row(&row)
    }

    async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> LedgerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
