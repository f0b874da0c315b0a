use async_trait::async_trait;
use libsql::{Row, params};

use super::models::{
    EndpointKey, EndpointOverview, MonitoredEndpoint, StatusCounts, StatusRecord, StatusSummary,
    i64_to_timestamp, timestamp_to_i64,
};
use crate::error::{RegistryError, StoreError};
use crate::monitoring::types::MonitorStatus;
use crate::pool::{LibsqlManager, LibsqlPool};
use crate::validation::EndpointValidator;

/// Source of the monitored endpoint set
#[async_trait]
pub trait Registry: Send + Sync {
    /// All endpoints of all owners
    async fn list(&self) -> Result<Vec<MonitoredEndpoint>, StoreError>;

    /// Endpoints of one owner, newest first
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<MonitoredEndpoint>, StoreError>;

    /// Validate and register an endpoint
    async fn add(&self, endpoint: &MonitoredEndpoint) -> Result<(), RegistryError>;

    /// Delete an endpoint together with its status history.
    /// Returns false when nothing matched.
    async fn remove(&self, key: &EndpointKey) -> Result<bool, StoreError>;
}

/// Append-only log of status transitions
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert one transition record, returning its id
    async fn append(&self, record: &StatusRecord) -> Result<i64, StoreError>;

    /// Status and time of the most recent record, if any
    async fn latest_summary(&self, key: &EndpointKey) -> Result<Option<StatusSummary>, StoreError>;

    /// Most recent records, newest first
    async fn history(&self, key: &EndpointKey, limit: usize) -> Result<Vec<StatusRecord>, StoreError>;

    /// Count an owner's endpoints by latest status
    async fn status_counts(&self, owner: &str) -> Result<StatusCounts, StoreError>;

    /// Current believed status; `Unknown` when the endpoint was never recorded
    async fn last_status(&self, key: &EndpointKey) -> Result<MonitorStatus, StoreError> {
        Ok(self.latest_summary(key).await?.map(|s| s.status).unwrap_or_default())
    }
}

const ENDPOINT_COLUMNS: &str = "owner, name, url, interval_seconds, expected_content";

/// Latest status_log row per endpoint
const LATEST_JOIN: &str = "LEFT JOIN status_log sl ON sl.id = (
        SELECT MAX(id) FROM status_log
        WHERE owner = me.owner AND name = me.name
    )";

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
    validator: EndpointValidator,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool, validator: EndpointValidator) -> Self {
        Self { pool, validator }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }

    /// Endpoints of one owner with their latest status
    pub async fn endpoint_overviews(&self, owner: &str) -> Result<Vec<EndpointOverview>, StoreError> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT me.owner, me.name, me.url, me.interval_seconds, me.expected_content, sl.new_status, sl.checked_at
             FROM monitored_endpoints me {LATEST_JOIN}
             WHERE me.owner = ?
             ORDER BY me.id DESC"
        );

        let mut rows = conn.query(&sql, params![owner]).await?;
        let mut overviews = Vec::new();

        while let Some(row) = rows.next().await? {
            let endpoint = endpoint_from_row(&row)?;
            let status = match row.get::<Option<String>>(5)? {
                Some(raw) => parse_status(&raw)?,
                None => MonitorStatus::Unknown,
            };
            let checked_at = row.get::<Option<i64>>(6)?.map(i64_to_timestamp);

            overviews.push(EndpointOverview { endpoint, status, checked_at });
        }

        Ok(overviews)
    }

    async fn query_endpoints(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<MonitoredEndpoint>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut endpoints = Vec::new();

        while let Some(row) = rows.next().await? {
            endpoints.push(endpoint_from_row(&row)?);
        }

        Ok(endpoints)
    }
}

fn endpoint_from_row(row: &Row) -> Result<MonitoredEndpoint, StoreError> {
    Ok(MonitoredEndpoint {
        owner: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        interval_seconds: row.get::<i64>(3)?.max(0) as u64,
        expected_content: row.get(4)?,
    })
}

fn parse_status(raw: &str) -> Result<MonitorStatus, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

#[async_trait]
impl Registry for DatabaseImpl {
    async fn list(&self) -> Result<Vec<MonitoredEndpoint>, StoreError> {
        let sql = format!("SELECT {ENDPOINT_COLUMNS} FROM monitored_endpoints ORDER BY id");
        self.query_endpoints(&sql, ()).await
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<MonitoredEndpoint>, StoreError> {
        let sql = format!(
            "SELECT {ENDPOINT_COLUMNS} FROM monitored_endpoints WHERE owner = ? ORDER BY id DESC"
        );
        self.query_endpoints(&sql, params![owner]).await
    }

    async fn add(&self, endpoint: &MonitoredEndpoint) -> Result<(), RegistryError> {
        self.validator.validate(endpoint)?;

        let conn = self.get_conn().await.map_err(RegistryError::Store)?;
        let inserted = conn
            .execute(
                "INSERT INTO monitored_endpoints (owner, name, url, interval_seconds, expected_content, created_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    endpoint.owner.clone(),
                    endpoint.name.clone(),
                    endpoint.url.clone(),
                    endpoint.interval_seconds as i64,
                    endpoint.expected_content.clone(),
                    timestamp_to_i64(chrono::Utc::now())
                ],
            )
            .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
                Err(StoreError::Conflict(endpoint.key().to_string()).into())
            }
            Err(e) => Err(StoreError::Query(e).into()),
        }
    }

    async fn remove(&self, key: &EndpointKey) -> Result<bool, StoreError> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        // History goes first; the log never outlives its endpoint
        tx.execute(
            "DELETE FROM status_log WHERE owner = ? AND name = ?",
            params![key.owner.clone(), key.name.clone()],
        )
        .await?;
        let deleted = tx
            .execute(
                "DELETE FROM monitored_endpoints WHERE owner = ? AND name = ?",
                params![key.owner.clone(), key.name.clone()],
            )
            .await?;

        tx.commit().await?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl StatusStore for DatabaseImpl {
    async fn append(&self, record: &StatusRecord) -> Result<i64, StoreError> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO status_log (owner, name, old_status, new_status, checked_at) VALUES (?, ?, ?, ?, ?)",
            params![
                record.key.owner.clone(),
                record.key.name.clone(),
                record.old_status.as_str(),
                record.new_status.as_str(),
                timestamp_to_i64(record.checked_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn latest_summary(&self, key: &EndpointKey) -> Result<Option<StatusSummary>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT new_status, checked_at FROM status_log WHERE owner = ? AND name = ? ORDER BY id DESC LIMIT 1",
                params![key.owner.clone(), key.name.clone()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let status = parse_status(&row.get::<String>(0)?)?;
                let checked_at = i64_to_timestamp(row.get(1)?);
                Ok(Some(StatusSummary { status, checked_at }))
            }
            None => Ok(None),
        }
    }

    async fn history(&self, key: &EndpointKey, limit: usize) -> Result<Vec<StatusRecord>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, old_status, new_status, checked_at FROM status_log WHERE owner = ? AND name = ? ORDER BY id DESC LIMIT ?",
                params![key.owner.clone(), key.name.clone(), limit as i64],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(StatusRecord {
                id: Some(row.get(0)?),
                key: key.clone(),
                old_status: parse_status(&row.get::<String>(1)?)?,
                new_status: parse_status(&row.get::<String>(2)?)?,
                checked_at: i64_to_timestamp(row.get(3)?),
            });
        }

        Ok(records)
    }

    async fn status_counts(&self, owner: &str) -> Result<StatusCounts, StoreError> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT COALESCE(sl.new_status, 'UNKNOWN') AS status, COUNT(*)
             FROM monitored_endpoints me {LATEST_JOIN}
             WHERE me.owner = ?
             GROUP BY status"
        );

        let mut rows = conn.query(&sql, params![owner]).await?;
        let mut counts = StatusCounts::default();

        while let Some(row) = rows.next().await? {
            let count = row.get::<i64>(1)?.max(0) as u64;
            match parse_status(&row.get::<String>(0)?)? {
                MonitorStatus::Up => counts.up += count,
                MonitorStatus::Down => counts.down += count,
                MonitorStatus::Unknown => counts.unknown += count,
            }
        }

        Ok(counts)
    }
}
