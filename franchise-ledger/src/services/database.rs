//! PostgreSQL ledger store.
//!
//! Every balance mutation runs in one transaction that takes a
//! `SELECT ... FOR UPDATE` lock on the entity row before reading the balance,
//! so concurrent writers to the same entity queue up behind each other while
//! writers to other entities proceed untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    EntityRef, Franchise, LedgerEntity, LedgerKind, Movement, MovementFilter, MovementKind,
    NewBankAccount, NewPettyCash, NewStockLine, Reconciliation, StockDirection,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::mutator::MovementDraft;
use crate::services::reconcile;
use crate::services::store::LedgerStore;

const BANK_ACCOUNT_COLUMNS: &str = "account_id, franchise_id, code, bank_name, responsible_id, opening_balance, current_balance, created_utc";
const PETTY_CASH_COLUMNS: &str = "petty_cash_id, franchise_id, code, name, responsible_id, opening_balance, current_balance, created_utc";
const STOCK_COLUMNS: &str =
    "product_id, franchise_id, opening_quantity, current_quantity, created_utc";

const BANK_MOVEMENT_COLUMNS: &str = "movement_id, account_id, kind, reference_number, income, expense, balance_after, observation, created_utc";
const CASH_MOVEMENT_COLUMNS: &str =
    "movement_id, petty_cash_id, kind, income, expense, balance_after, observation, created_utc";
const INVENTORY_MOVEMENT_COLUMNS: &str = "movement_id, product_id, franchise_id, direction, quantity, balance_after, actor_id, observation, created_utc";

#[derive(Debug, FromRow)]
struct BankAccountRow {
    account_id: i64,
    franchise_id: i64,
    code: String,
    bank_name: String,
    responsible_id: i64,
    opening_balance: Decimal,
    current_balance: Decimal,
    created_utc: DateTime<Utc>,
}

impl From<BankAccountRow> for LedgerEntity {
    fn from(row: BankAccountRow) -> Self {
        Self {
            entity: EntityRef::bank_account(row.account_id),
            franchise_id: row.franchise_id,
            code: Some(row.code),
            name: Some(row.bank_name),
            responsible_id: Some(row.responsible_id),
            opening_balance: row.opening_balance,
            current_balance: row.current_balance,
            created_utc: row.created_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct PettyCashRow {
    petty_cash_id: i64,
    franchise_id: i64,
    code: String,
    name: String,
    responsible_id: i64,
    opening_balance: Decimal,
    current_balance: Decimal,
    created_utc: DateTime<Utc>,
}

impl From<PettyCashRow> for LedgerEntity {
    fn from(row: PettyCashRow) -> Self {
        Self {
            entity: EntityRef::petty_cash(row.petty_cash_id),
            franchise_id: row.franchise_id,
            code: Some(row.code),
            name: Some(row.name),
            responsible_id: Some(row.responsible_id),
            opening_balance: row.opening_balance,
            current_balance: row.current_balance,
            created_utc: row.created_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct StockRow {
    product_id: i64,
    franchise_id: i64,
    opening_quantity: i64,
    current_quantity: i64,
    created_utc: DateTime<Utc>,
}

impl From<StockRow> for LedgerEntity {
    fn from(row: StockRow) -> Self {
        Self {
            entity: EntityRef::stock(row.product_id, row.franchise_id),
            franchise_id: row.franchise_id,
            code: None,
            name: None,
            responsible_id: None,
            opening_balance: Decimal::from(row.opening_quantity),
            current_balance: Decimal::from(row.current_quantity),
            created_utc: row.created_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct BankMovementRow {
    movement_id: i64,
    account_id: i64,
    kind: String,
    reference_number: Option<String>,
    income: Decimal,
    expense: Decimal,
    balance_after: Decimal,
    observation: Option<String>,
    created_utc: DateTime<Utc>,
}

impl BankMovementRow {
    fn into_movement(self) -> LedgerResult<Movement> {
        Ok(Movement {
            movement_id: self.movement_id,
            entity: EntityRef::bank_account(self.account_id),
            kind: parse_kind(LedgerKind::BankAccount, &self.kind)?,
            income: self.income,
            expense: self.expense,
            balance_after: self.balance_after,
            observation: self.observation,
            reference_number: self.reference_number,
            actor_id: None,
            created_utc: self.created_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct CashMovementRow {
    movement_id: i64,
    petty_cash_id: i64,
    kind: String,
    income: Decimal,
    expense: Decimal,
    balance_after: Decimal,
    observation: Option<String>,
    created_utc: DateTime<Utc>,
}

impl CashMovementRow {
    fn into_movement(self) -> LedgerResult<Movement> {
        Ok(Movement {
            movement_id: self.movement_id,
            entity: EntityRef::petty_cash(self.petty_cash_id),
            kind: parse_kind(LedgerKind::PettyCash, &self.kind)?,
            income: self.income,
            expense: self.expense,
            balance_after: self.balance_after,
            observation: self.observation,
            reference_number: None,
            actor_id: None,
            created_utc: self.created_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct InventoryMovementRow {
    movement_id: i64,
    product_id: i64,
    franchise_id: i64,
    direction: String,
    quantity: i64,
    balance_after: i64,
    actor_id: i64,
    observation: Option<String>,
    created_utc: DateTime<Utc>,
}

impl InventoryMovementRow {
    fn into_movement(self) -> LedgerResult<Movement> {
        let kind = parse_kind(LedgerKind::Inventory, &self.direction)?;
        let quantity = Decimal::from(self.quantity);
        let (income, expense) = match kind {
            MovementKind::Stock(StockDirection::Entry) => (quantity, Decimal::ZERO),
            _ => (Decimal::ZERO, quantity),
        };
        Ok(Movement {
            movement_id: self.movement_id,
            entity: EntityRef::stock(self.product_id, self.franchise_id),
            kind,
            income,
            expense,
            balance_after: Decimal::from(self.balance_after),
            observation: self.observation,
            reference_number: None,
            actor_id: Some(self.actor_id),
            created_utc: self.created_utc,
        })
    }
}

fn parse_kind(ledger: LedgerKind, value: &str) -> LedgerResult<MovementKind> {
    MovementKind::parse(ledger, value).ok_or_else(|| {
        LedgerError::TransactionFailure(anyhow::anyhow!(
            "Unknown {} movement kind '{}' in store",
            ledger,
            value
        ))
    })
}

fn to_units(value: Decimal) -> LedgerResult<i64> {
    value.to_i64().ok_or_else(|| {
        LedgerError::TransactionFailure(anyhow::anyhow!(
            "Stock quantity {} is not representable",
            value
        ))
    })
}

/// Map insert errors on entity tables to conflicts and missing franchises.
fn open_error(context: &str, franchise_id: i64, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            LedgerError::Conflict(format!("{}: {}", context, db_err.message()))
        }
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            LedgerError::FranchiseNotFound(franchise_id)
        }
        other => LedgerError::store(context, other),
    }
}

/// Database connection pool wrapper implementing [`LedgerStore`].
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    lock_timeout_ms: Option<u64>,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "franchise-ledger"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> LedgerResult<Self> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::store("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self {
            pool,
            lock_timeout_ms: None,
        })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout_ms: None,
        }
    }

    /// Bound how long a writer waits for an entity row lock.
    pub fn with_lock_timeout(mut self, lock_timeout_ms: Option<u64>) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> LedgerResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::store("Migration failed", e))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> LedgerResult<Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::store("Failed to begin transaction", e))?;

        if let Some(ms) = self.lock_timeout_ms {
            sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", ms))
                .execute(&mut *tx)
                .await
                .map_err(|e| LedgerError::store("Failed to set lock timeout", e))?;
        }

        Ok(tx)
    }

    /// Read an entity row, optionally taking the row lock.
    async fn fetch_entity(
        conn: &mut PgConnection,
        entity: &EntityRef,
        for_update: bool,
    ) -> LedgerResult<Option<LedgerEntity>> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let found = match *entity {
            EntityRef::BankAccount { account_id } => {
                let sql = format!(
                    "SELECT {} FROM bank_accounts WHERE account_id = $1{}",
                    BANK_ACCOUNT_COLUMNS, lock
                );
                sqlx::query_as::<_, BankAccountRow>(&sql)
                    .bind(account_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map(|row| row.map(LedgerEntity::from))
            }
            EntityRef::PettyCash { petty_cash_id } => {
                let sql = format!(
                    "SELECT {} FROM petty_cash WHERE petty_cash_id = $1{}",
                    PETTY_CASH_COLUMNS, lock
                );
                sqlx::query_as::<_, PettyCashRow>(&sql)
                    .bind(petty_cash_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map(|row| row.map(LedgerEntity::from))
            }
            EntityRef::Stock {
                product_id,
                franchise_id,
            } => {
                let sql = format!(
                    "SELECT {} FROM product_stock WHERE product_id = $1 AND franchise_id = $2{}",
                    STOCK_COLUMNS, lock
                );
                sqlx::query_as::<_, StockRow>(&sql)
                    .bind(product_id)
                    .bind(franchise_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map(|row| row.map(LedgerEntity::from))
            }
        };
        found.map_err(|e| LedgerError::store("Failed to read ledger entity", e))
    }

    async fn insert_movement(
        conn: &mut PgConnection,
        draft: &MovementDraft,
        balance_after: Decimal,
    ) -> LedgerResult<Movement> {
        // clock_timestamp() rather than now(): the timestamp must be taken after
        // the row lock is granted so time order matches balance order.
        let movement = match draft.entity() {
            EntityRef::BankAccount { account_id } => sqlx::query_as::<_, BankMovementRow>(&format!(
                r#"
                INSERT INTO bank_movements (account_id, kind, reference_number, income, expense, balance_after, observation, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, clock_timestamp())
                RETURNING {}
                "#,
                BANK_MOVEMENT_COLUMNS
            ))
            .bind(account_id)
            .bind(draft.kind().as_str())
            .bind(draft.reference_number())
            .bind(draft.income())
            .bind(draft.expense())
            .bind(balance_after)
            .bind(draft.observation())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| LedgerError::store("Failed to insert bank movement", e))?
            .into_movement()?,
            EntityRef::PettyCash { petty_cash_id } => sqlx::query_as::<_, CashMovementRow>(&format!(
                r#"
                INSERT INTO cash_movements (petty_cash_id, kind, income, expense, balance_after, observation, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, clock_timestamp())
                RETURNING {}
                "#,
                CASH_MOVEMENT_COLUMNS
            ))
            .bind(petty_cash_id)
            .bind(draft.kind().as_str())
            .bind(draft.income())
            .bind(draft.expense())
            .bind(balance_after)
            .bind(draft.observation())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| LedgerError::store("Failed to insert cash movement", e))?
            .into_movement()?,
            EntityRef::Stock {
                product_id,
                franchise_id,
            } => {
                let quantity = to_units(draft.income() + draft.expense())?;
                sqlx::query_as::<_, InventoryMovementRow>(&format!(
                    r#"
                    INSERT INTO inventory_movements (product_id, franchise_id, direction, quantity, balance_after, actor_id, observation, created_utc)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, clock_timestamp())
                    RETURNING {}
                    "#,
                    INVENTORY_MOVEMENT_COLUMNS
                ))
                .bind(product_id)
                .bind(franchise_id)
                .bind(draft.kind().as_str())
                .bind(quantity)
                .bind(to_units(balance_after)?)
                .bind(draft.actor_id())
                .bind(draft.observation())
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| LedgerError::store("Failed to insert inventory movement", e))?
                .into_movement()?
            }
        };
        Ok(movement)
    }

    async fn write_balance(
        conn: &mut PgConnection,
        entity: &EntityRef,
        balance: Decimal,
    ) -> LedgerResult<()> {
        let result = match *entity {
            EntityRef::BankAccount { account_id } => {
                sqlx::query("UPDATE bank_accounts SET current_balance = $2 WHERE account_id = $1")
                    .bind(account_id)
                    .bind(balance)
                    .execute(&mut *conn)
                    .await
            }
            EntityRef::PettyCash { petty_cash_id } => {
                sqlx::query("UPDATE petty_cash SET current_balance = $2 WHERE petty_cash_id = $1")
                    .bind(petty_cash_id)
                    .bind(balance)
                    .execute(&mut *conn)
                    .await
            }
            EntityRef::Stock {
                product_id,
                franchise_id,
            } => {
                sqlx::query(
                    "UPDATE product_stock SET current_quantity = $3 WHERE product_id = $1 AND franchise_id = $2",
                )
                .bind(product_id)
                .bind(franchise_id)
                .bind(to_units(balance)?)
                .execute(&mut *conn)
                .await
            }
        };

        let result = result.map_err(|e| LedgerError::store("Failed to update balance", e))?;
        if result.rows_affected() != 1 {
            return Err(LedgerError::TransactionFailure(anyhow::anyhow!(
                "Balance update for {} touched {} rows",
                entity,
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn fetch_movements(
        conn: &mut PgConnection,
        filter: &MovementFilter,
    ) -> LedgerResult<Vec<Movement>> {
        let (from, until) = match filter.range {
            Some(range) => {
                let (lower, upper) = range.bounds();
                (Some(lower), upper)
            }
            None => (None, None),
        };
        let kind = filter.kind.map(|k| k.as_str());

        match filter.entity {
            EntityRef::BankAccount { account_id } => {
                let rows = sqlx::query_as::<_, BankMovementRow>(&format!(
                    r#"
                    SELECT {}
                    FROM bank_movements
                    WHERE account_id = $1
                      AND ($2::timestamptz IS NULL OR created_utc >= $2)
                      AND ($3::timestamptz IS NULL OR created_utc < $3)
                      AND ($4::varchar IS NULL OR kind = $4)
                    ORDER BY created_utc, movement_id
                    "#,
                    BANK_MOVEMENT_COLUMNS
                ))
                .bind(account_id)
                .bind(from)
                .bind(until)
                .bind(kind)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| LedgerError::store("Failed to list bank movements", e))?;
                rows.into_iter().map(BankMovementRow::into_movement).collect()
            }
            EntityRef::PettyCash { petty_cash_id } => {
                let rows = sqlx::query_as::<_, CashMovementRow>(&format!(
                    r#"
                    SELECT {}
                    FROM cash_movements
                    WHERE petty_cash_id = $1
                      AND ($2::timestamptz IS NULL OR created_utc >= $2)
                      AND ($3::timestamptz IS NULL OR created_utc < $3)
                      AND ($4::varchar IS NULL OR kind = $4)
                    ORDER BY created_utc, movement_id
                    "#,
                    CASH_MOVEMENT_COLUMNS
                ))
                .bind(petty_cash_id)
                .bind(from)
                .bind(until)
                .bind(kind)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| LedgerError::store("Failed to list cash movements", e))?;
                rows.into_iter().map(CashMovementRow::into_movement).collect()
            }
            EntityRef::Stock {
                product_id,
                franchise_id,
            } => {
                let rows = sqlx::query_as::<_, InventoryMovementRow>(&format!(
                    r#"
                    SELECT {}
                    FROM inventory_movements
                    WHERE product_id = $1
                      AND franchise_id = $2
                      AND ($3::timestamptz IS NULL OR created_utc >= $3)
                      AND ($4::timestamptz IS NULL OR created_utc < $4)
                      AND ($5::varchar IS NULL OR direction = $5)
                    ORDER BY created_utc, movement_id
                    "#,
                    INVENTORY_MOVEMENT_COLUMNS
                ))
                .bind(product_id)
                .bind(franchise_id)
                .bind(from)
                .bind(until)
                .bind(kind)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| LedgerError::store("Failed to list inventory movements", e))?;
                rows.into_iter()
                    .map(InventoryMovementRow::into_movement)
                    .collect()
            }
        }
    }
}

#[async_trait]
impl LedgerStore for Database {
    #[instrument(skip(self))]
    async fn register_franchise(&self, name: &str) -> LedgerResult<Franchise> {
        let franchise = sqlx::query_as::<_, Franchise>(
            r#"
            INSERT INTO franchises (name)
            VALUES ($1)
            RETURNING franchise_id, name, created_utc
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                LedgerError::Conflict(format!("Franchise '{}' already exists", name))
            }
            other => LedgerError::store("Failed to register franchise", other),
        })?;

        info!(franchise_id = franchise.franchise_id, "Franchise registered");
        Ok(franchise)
    }

    #[instrument(skip(self, input), fields(franchise_id = input.franchise_id, code = %input.code))]
    async fn open_bank_account(&self, input: &NewBankAccount) -> LedgerResult<LedgerEntity> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_bank_account"])
            .start_timer();

        let row = sqlx::query_as::<_, BankAccountRow>(&format!(
            r#"
            INSERT INTO bank_accounts (franchise_id, code, bank_name, responsible_id, opening_balance, current_balance)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {}
            "#,
            BANK_ACCOUNT_COLUMNS
        ))
        .bind(input.franchise_id)
        .bind(&input.code)
        .bind(&input.bank_name)
        .bind(input.responsible_id)
        .bind(input.opening_balance)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| open_error("Failed to open bank account", input.franchise_id, e))?;

        timer.observe_duration();

        let entity = LedgerEntity::from(row);
        info!(entity = %entity.entity, "Bank account opened");
        Ok(entity)
    }

    #[instrument(skip(self, input), fields(franchise_id = input.franchise_id, code = %input.code))]
    async fn open_petty_cash(&self, input: &NewPettyCash) -> LedgerResult<LedgerEntity> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_petty_cash"])
            .start_timer();

        let row = sqlx::query_as::<_, PettyCashRow>(&format!(
            r#"
            INSERT INTO petty_cash (franchise_id, code, name, responsible_id, opening_balance, current_balance)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {}
            "#,
            PETTY_CASH_COLUMNS
        ))
        .bind(input.franchise_id)
        .bind(&input.code)
        .bind(&input.name)
        .bind(input.responsible_id)
        .bind(input.opening_balance)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| open_error("Failed to open petty cash", input.franchise_id, e))?;

        timer.observe_duration();

        let entity = LedgerEntity::from(row);
        info!(entity = %entity.entity, "Petty cash opened");
        Ok(entity)
    }

    #[instrument(skip(self, input), fields(product_id = input.product_id, franchise_id = input.franchise_id))]
    async fn open_stock(&self, input: &NewStockLine) -> LedgerResult<LedgerEntity> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_stock"])
            .start_timer();

        let row = sqlx::query_as::<_, StockRow>(&format!(
            r#"
            INSERT INTO product_stock (product_id, franchise_id, opening_quantity, current_quantity)
            VALUES ($1, $2, $3, $3)
            RETURNING {}
            "#,
            STOCK_COLUMNS
        ))
        .bind(input.product_id)
        .bind(input.franchise_id)
        .bind(input.opening_quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| open_error("Failed to open stock line", input.franchise_id, e))?;

        timer.observe_duration();

        let entity = LedgerEntity::from(row);
        info!(entity = %entity.entity, "Stock line opened");
        Ok(entity)
    }

    #[instrument(skip(self), fields(entity = %entity))]
    async fn entity(&self, entity: &EntityRef) -> LedgerResult<Option<LedgerEntity>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_entity"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| LedgerError::store("Failed to acquire connection", e))?;
        let found = Self::fetch_entity(&mut conn, entity, false).await?;

        timer.observe_duration();
        Ok(found)
    }

    #[instrument(skip(self, draft), fields(entity = %draft.entity(), kind = %draft.kind()))]
    async fn apply(&self, draft: &MovementDraft) -> LedgerResult<Movement> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_movement"])
            .start_timer();

        let entity = draft.entity();
        let mut tx = self.begin().await?;

        let locked = match Self::fetch_entity(&mut tx, &entity, true).await? {
            Some(locked) => locked,
            None => {
                tx.rollback().await.ok();
                return Err(LedgerError::NotFound(entity));
            }
        };

        let balance_after = match draft.next_balance(locked.current_balance) {
            Ok(balance) => balance,
            Err(e) => {
                tx.rollback().await.ok();
                return Err(e);
            }
        };

        // Any error from here on drops `tx`, which rolls it back.
        let movement = Self::insert_movement(&mut tx, draft, balance_after).await?;
        Self::write_balance(&mut tx, &entity, balance_after).await?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::store("Failed to commit movement", e))?;

        timer.observe_duration();

        info!(
            movement_id = movement.movement_id,
            balance_before = %locked.current_balance,
            balance_after = %balance_after,
            "Movement committed"
        );

        Ok(movement)
    }

    #[instrument(skip(self, filter), fields(entity = %filter.entity))]
    async fn movements(&self, filter: &MovementFilter) -> LedgerResult<Vec<Movement>> {
        if filter.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_movements"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| LedgerError::store("Failed to acquire connection", e))?;
        let movements = Self::fetch_movements(&mut conn, filter).await?;

        timer.observe_duration();
        debug!(count = movements.len(), "Movements fetched");
        Ok(movements)
    }

    #[instrument(skip(self), fields(entity = %entity))]
    async fn reconcile(&self, entity: &EntityRef, repair: bool) -> LedgerResult<Reconciliation> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reconcile"])
            .start_timer();

        let mut tx = self.begin().await?;

        let locked = match Self::fetch_entity(&mut tx, entity, true).await? {
            Some(locked) => locked,
            None => {
                tx.rollback().await.ok();
                return Err(LedgerError::NotFound(*entity));
            }
        };

        let log = Self::fetch_movements(&mut tx, &MovementFilter::for_entity(*entity)).await?;
        let mut report = reconcile::reconcile(
            *entity,
            locked.opening_balance,
            locked.current_balance,
            &log,
        )?;

        if repair && report.cached_balance != report.derived_balance {
            Self::write_balance(&mut tx, entity, report.derived_balance).await?;
            report.repaired = true;
        }

        tx.commit()
            .await
            .map_err(|e| LedgerError::store("Failed to commit reconciliation", e))?;

        timer.observe_duration();
        Ok(report)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> LedgerResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::store("Health check failed", e))?;

        timer.observe_duration();
        Ok(())
    }
}
