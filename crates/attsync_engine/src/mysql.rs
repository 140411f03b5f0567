//! MySQL cloud sink.

use crate::error::{SinkError, SinkResult};
use crate::sink::BatchSink;
use attsync_core::{AttendanceEvent, CredentialProvider, SinkSettings};
use sqlx::mysql::{MySql, MySqlPool, MySqlPoolOptions};
use sqlx::QueryBuilder;
use std::time::Duration;
use tokio::runtime::Handle;

const COLUMNS: &str = "device_sn, user_id, check_time, check_type, verify_type, work_code, raw_data";

fn map_sqlx(err: sqlx::Error) -> SinkError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SinkError::Unreachable(err.to_string()),
        other => SinkError::Query(other.to_string()),
    }
}

fn valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Writes events with `INSERT IGNORE` into a table keyed on
/// `(device_sn, user_id, check_time)`.
///
/// The sink owns a pool on a tokio runtime. [`BatchSink::write`] blocks on
/// that runtime and must be called from a blocking thread (a plain thread or
/// `spawn_blocking`), never from inside an async task.
#[derive(Debug, Clone)]
pub struct MySqlSink {
    pool: MySqlPool,
    table: String,
    runtime: Handle,
}

impl MySqlSink {
    /// Connects using decrypted credentials. Must run inside a tokio runtime.
    pub async fn connect(
        credentials: &dyn CredentialProvider,
        settings: &SinkSettings,
    ) -> SinkResult<Self> {
        if !valid_table_name(&settings.table) {
            return Err(SinkError::Query(format!(
                "invalid table name {:?}",
                settings.table
            )));
        }

        let creds = credentials
            .decrypt()
            .map_err(|e| SinkError::Credentials(e.to_string()))?;

        let pool = MySqlPoolOptions::new()
            .max_connections(settings.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(&creds.url())
            .await
            .map_err(map_sqlx)?;

        tracing::info!(host = %creds.host, database = %creds.database, table = %settings.table, "connected to sink");

        Ok(Self {
            pool,
            table: settings.table.clone(),
            runtime: Handle::current(),
        })
    }

    /// Destination table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the events table if it does not exist.
    pub async fn ensure_schema(&self) -> SinkResult<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS `{}` (
                id INT AUTO_INCREMENT PRIMARY KEY,
                device_sn VARCHAR(50) NOT NULL,
                user_id VARCHAR(50) NOT NULL,
                check_time DATETIME NOT NULL,
                check_type VARCHAR(10),
                verify_type VARCHAR(10),
                work_code VARCHAR(20),
                raw_data TEXT,
                synced_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_device_sn (device_sn),
                INDEX idx_user_id (user_id),
                INDEX idx_check_time (check_time),
                UNIQUE KEY unique_record (device_sn, user_id, check_time)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.table
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    /// Inserts a batch in one statement.
    pub async fn write_async(&self, events: &[AttendanceEvent]) -> SinkResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<MySql> =
            QueryBuilder::new(format!("INSERT IGNORE INTO `{}` ({COLUMNS}) ", self.table));
        builder.push_values(events, |mut row, event| {
            row.push_bind(event.device_serial.as_str())
                .push_bind(event.subject_id.as_str())
                .push_bind(event.event_time)
                .push_bind(event.event_type.as_code())
                .push_bind(event.verify_method.as_str())
                .push_bind(event.work_code.as_deref())
                .push_bind(event.raw_text());
        });

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() as usize)
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl BatchSink for MySqlSink {
    fn write(&self, events: &[AttendanceEvent]) -> SinkResult<usize> {
        self.runtime.block_on(self.write_async(events))
    }
}
