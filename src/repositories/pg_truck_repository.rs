//! PostgreSQL truck repository
//!
//! One row per truck in `trucks`; busy dates in `truck_availability`.
//! Every mutation runs in a transaction that is committed on success and
//! rolled back explicitly on failure before the error is returned.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};

use super::{check_key, TruckRepository};
use crate::config::DatabaseConfig;
use crate::models::{Truck, TruckPatch};
use crate::utils::errors::{truck_not_found, StoreError, StoreResult};

const TRUCK_COLUMNS: &str = "plate_number, name, description, note";

pub struct PgTruckRepository {
    pool: PgPool,
}

impl PgTruckRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = config
            .create_pool()
            .await
            .map_err(|e| StoreError::backend("connect", &config.masked_url(), e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables when they are missing
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let mut tx = self.begin("ensure_schema", "schema").await?;
        let result = create_tables(&mut tx).await;
        finish(tx, result, "ensure_schema", "schema").await?;
        info!("Database schema ready");
        Ok(())
    }

    async fn begin(&self, operation: &str, key: &str) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| StoreError::backend(operation, key, e))
    }
}

async fn create_tables(conn: &mut PgConnection) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trucks (
            plate_number VARCHAR(255) PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            note TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::backend("ensure_schema", "trucks", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS truck_availability (
            id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
            plate_number VARCHAR(255) NOT NULL
                REFERENCES trucks(plate_number) ON DELETE CASCADE,
            busy_date DATE NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::backend("ensure_schema", "truck_availability", e))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS truck_availability_busy_date_idx ON truck_availability (busy_date)",
    )
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::backend("ensure_schema", "truck_availability", e))?;

    // one row per truck and day; also covers tables created before the key existed
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS truck_availability_plate_date_key
        ON truck_availability (plate_number, busy_date)
        "#,
    )
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::backend("ensure_schema", "truck_availability", e))?;

    Ok(())
}

/// Commit on success; on failure roll back, then hand the original error back.
async fn finish<T>(
    tx: Transaction<'static, Postgres>,
    result: StoreResult<T>,
    operation: &str,
    key: &str,
) -> StoreResult<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| StoreError::backend(operation, key, e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(operation, key, error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// Turn constraint violations into typed outcomes; anything else is a
/// backend failure.
fn classify(operation: &str, key: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateKey(key.to_string());
        }
        if db_err.is_foreign_key_violation() {
            return truck_not_found(key);
        }
    }
    StoreError::backend(operation, key, err)
}

#[async_trait]
impl TruckRepository for PgTruckRepository {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn create(&self, truck: Truck) -> StoreResult<Truck> {
        truck.validate_required()?;
        let key = truck.plate_number.clone();

        let mut tx = self.begin("create", &key).await?;
        let result = sqlx::query_as::<_, Truck>(&format!(
            "INSERT INTO trucks ({cols}) VALUES ($1, $2, $3, $4) RETURNING {cols}",
            cols = TRUCK_COLUMNS
        ))
        .bind(&truck.plate_number)
        .bind(&truck.name)
        .bind(&truck.description)
        .bind(&truck.note)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify("create", &key, e));

        let created = finish(tx, result, "create", &key).await?;
        debug!(plate_number = %key, "Truck inserted");
        Ok(created)
    }

    async fn list_all(&self) -> StoreResult<Vec<Truck>> {
        sqlx::query_as::<_, Truck>(&format!("SELECT {} FROM trucks", TRUCK_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::backend("list_all", "*", e))
    }

    async fn get(&self, plate_number: &str) -> StoreResult<Truck> {
        check_key(plate_number)?;
        sqlx::query_as::<_, Truck>(&format!(
            "SELECT {} FROM trucks WHERE plate_number = $1",
            TRUCK_COLUMNS
        ))
        .bind(plate_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend("get", plate_number, e))?
        .ok_or_else(|| truck_not_found(plate_number))
    }

    async fn update(&self, plate_number: &str, patch: TruckPatch) -> StoreResult<Truck> {
        check_key(plate_number)?;

        let mut tx = self.begin("update", plate_number).await?;
        let result = sqlx::query_as::<_, Truck>(&format!(
            r#"
            UPDATE trucks
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                note = COALESCE($4, note)
            WHERE plate_number = $1
            RETURNING {}
            "#,
            TRUCK_COLUMNS
        ))
        .bind(plate_number)
        .bind(patch.name)
        .bind(patch.description)
        .bind(patch.note)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::backend("update", plate_number, e))
        .and_then(|row| row.ok_or_else(|| truck_not_found(plate_number)));

        finish(tx, result, "update", plate_number).await
    }

    async fn delete(&self, plate_number: &str) -> StoreResult<()> {
        check_key(plate_number)?;

        let mut tx = self.begin("delete", plate_number).await?;
        let result = sqlx::query("DELETE FROM trucks WHERE plate_number = $1")
            .bind(plate_number)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::backend("delete", plate_number, e))
            .and_then(|done| {
                if done.rows_affected() == 0 {
                    Err(truck_not_found(plate_number))
                } else {
                    Ok(())
                }
            });

        finish(tx, result, "delete", plate_number).await
    }

    async fn get_availability(&self, date: NaiveDate) -> StoreResult<Vec<Truck>> {
        sqlx::query_as::<_, Truck>(
            r#"
            SELECT t.plate_number, t.name, t.description, t.note
            FROM trucks t
            WHERE NOT EXISTS (
                SELECT 1
                FROM truck_availability ta
                WHERE ta.plate_number = t.plate_number
                  AND ta.busy_date = $1
            )
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::backend("get_availability", &date.to_string(), e))
    }

    async fn mark_busy(&self, plate_number: &str, date: NaiveDate) -> StoreResult<()> {
        check_key(plate_number)?;

        let mut tx = self.begin("mark_busy", plate_number).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO truck_availability (plate_number, busy_date)
            VALUES ($1, $2)
            ON CONFLICT (plate_number, busy_date) DO NOTHING
            "#,
        )
        .bind(plate_number)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map(|_| ())
        .map_err(|e| classify("mark_busy", plate_number, e));

        finish(tx, result, "mark_busy", plate_number).await
    }

    async fn clear_busy(&self, plate_number: &str, date: NaiveDate) -> StoreResult<()> {
        check_key(plate_number)?;

        let mut tx = self.begin("clear_busy", plate_number).await?;
        let result = clear_busy_row(&mut tx, plate_number, date).await;
        finish(tx, result, "clear_busy", plate_number).await
    }
}

async fn clear_busy_row(conn: &mut PgConnection, plate_number: &str, date: NaiveDate) -> StoreResult<()> {
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM trucks WHERE plate_number = $1)")
            .bind(plate_number)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| StoreError::backend("clear_busy", plate_number, e))?;
    if !exists {
        return Err(truck_not_found(plate_number));
    }

    let done = sqlx::query(
        "DELETE FROM truck_availability WHERE plate_number = $1 AND busy_date = $2",
    )
    .bind(plate_number)
    .bind(date)
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::backend("clear_busy", plate_number, e))?;

    if done.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!(
            "Truck {} has no busy date on {}",
            plate_number, date
        )));
    }
    Ok(())
}
