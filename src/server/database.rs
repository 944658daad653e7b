use chrono::{NaiveDateTime, Utc};
use sqlx::{query, query_as, FromRow};
use std::sync::Arc;
use tracing::error;

#[cfg(feature = "sqlite")]
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[cfg(feature = "postgres")]
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DatabaseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::license::{LicenseRecord, LicenseType, NewLicense};
use crate::store::LicenseStore;

/// Row shape of the `licenses` table.
#[derive(Debug, Clone, FromRow)]
struct LicenseRow {
    id: i64,
    #[sqlx(rename = "type")]
    license_type: String,
    code: String,
    data: Vec<u8>,
    created_at: NaiveDateTime,
}

impl TryFrom<LicenseRow> for LicenseRecord {
    type Error = LicenseError;

    /// Fails when the `type` column holds text this crate never writes.
    fn try_from(row: LicenseRow) -> Result<Self, Self::Error> {
        let license_type = match row.license_type.as_str() {
            "code" => LicenseType::Code,
            "file" => LicenseType::File,
            other => {
                return Err(LicenseError::StoreError(format!(
                    "unknown license type '{other}' in row {}",
                    row.id
                )))
            }
        };

        Ok(LicenseRecord {
            id: row.id,
            license_type,
            code: row.code,
            data: row.data,
            created_at: row.created_at,
        })
    }
}

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS licenses (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        type        TEXT NOT NULL,
        code        TEXT NOT NULL DEFAULT '',
        data        BLOB NOT NULL,
        created_at  TEXT NOT NULL
    )
"#;

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS licenses (
        id          BIGSERIAL PRIMARY KEY,
        type        TEXT NOT NULL,
        code        TEXT NOT NULL DEFAULT '',
        data        BYTEA NOT NULL,
        created_at  TIMESTAMP NOT NULL
    )
"#;

const SELECT_CURRENT: &str =
    "SELECT id, type, code, data, created_at FROM licenses ORDER BY id DESC LIMIT 1";

fn db_error(op: &str) -> impl FnOnce(sqlx::Error) -> LicenseError + '_ {
    move |e| {
        error!("{op} failed: {e}");
        LicenseError::StoreError(format!("database error: {e}"))
    }
}

/// License store over SQLite or Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Connect using the given database configuration.
    pub async fn connect(db_config: &DatabaseConfig) -> LicenseResult<Arc<Self>> {
        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(db_config.max_connections)
                    .connect(&db_config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::StoreError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(db_config.max_connections)
                    .connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LicenseError::StoreError(format!("failed to connect to PostgreSQL: {e}"))
                    })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Create the `licenses` table if it does not exist.
    pub async fn migrate(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(SQLITE_SCHEMA)
                    .execute(pool)
                    .await
                    .map_err(db_error("SQLite migrate"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(POSTGRES_SCHEMA)
                    .execute(pool)
                    .await
                    .map_err(db_error("Postgres migrate"))?;
            }
        }
        Ok(())
    }

    /// Short name of the backend, for health reporting.
    pub fn db_type(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Returns true if the database answers a trivial query.
    pub async fn ping(&self) -> bool {
        let result = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("SELECT 1").execute(pool).await.map(|_| ()),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query("SELECT 1").execute(pool).await.map(|_| ()),
        };
        result.is_ok()
    }

    /// Number of stored licenses. Never more than one once committed.
    pub async fn count(&self) -> LicenseResult<i64> {
        let count: (i64,) = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as("SELECT COUNT(*) FROM licenses")
                .fetch_one(pool)
                .await
                .map_err(db_error("SQLite count"))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as("SELECT COUNT(*) FROM licenses")
                .fetch_one(pool)
                .await
                .map_err(db_error("Postgres count"))?,
        };
        Ok(count.0)
    }
}

impl LicenseStore for Database {
    async fn get_current(&self) -> LicenseResult<Option<LicenseRecord>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseRow>(SELECT_CURRENT)
                .fetch_optional(pool)
                .await
                .map_err(db_error("SQLite get_current"))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseRow>(SELECT_CURRENT)
                .fetch_optional(pool)
                .await
                .map_err(db_error("Postgres get_current"))?,
        };

        row.map(LicenseRecord::try_from).transpose()
    }

    /// Delete and insert inside one transaction.
    ///
    /// An early return drops the transaction uncommitted, which rolls it back.
    async fn replace(&self, license: NewLicense) -> LicenseResult<()> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool.begin().await.map_err(db_error("SQLite begin"))?;

                query("DELETE FROM licenses")
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("SQLite replace (delete)"))?;

                query("INSERT INTO licenses (type, code, data, created_at) VALUES (?, ?, ?, ?)")
                    .bind(license.license_type.as_str())
                    .bind(&license.code)
                    .bind(&license.data)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("SQLite replace (insert)"))?;

                tx.commit().await.map_err(db_error("SQLite commit"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool.begin().await.map_err(db_error("Postgres begin"))?;

                query("DELETE FROM licenses")
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Postgres replace (delete)"))?;

                query(
                    "INSERT INTO licenses (type, code, data, created_at) VALUES ($1, $2, $3, $4)",
                )
                .bind(license.license_type.as_str())
                .bind(&license.code)
                .bind(&license.data)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Postgres replace (insert)"))?;

                tx.commit().await.map_err(db_error("Postgres commit"))?;
            }
        }

        Ok(())
    }

    async fn delete_current(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool.begin().await.map_err(db_error("SQLite begin"))?;
                query("DELETE FROM licenses")
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("SQLite delete_current"))?;
                tx.commit().await.map_err(db_error("SQLite commit"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool.begin().await.map_err(db_error("Postgres begin"))?;
                query("DELETE FROM licenses")
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Postgres delete_current"))?;
                tx.commit().await.map_err(db_error("Postgres commit"))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(license_type: &str) -> LicenseRow {
        LicenseRow {
            id: 7,
            license_type: license_type.to_string(),
            code: "ABC".to_string(),
            data: b"ABC".to_vec(),
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn row_decodes_known_types() {
        let record = LicenseRecord::try_from(row("file")).unwrap();
        assert_eq!(record.license_type, LicenseType::File);
        assert_eq!(record.id, 7);

        let record = LicenseRecord::try_from(row("code")).unwrap();
        assert_eq!(record.license_type, LicenseType::Code);
    }

    #[test]
    fn unknown_stored_type_is_a_store_error() {
        let err = LicenseRecord::try_from(row("floppy")).unwrap_err();
        assert!(matches!(err, LicenseError::StoreError(ref m) if m.contains("floppy")));
    }
}
