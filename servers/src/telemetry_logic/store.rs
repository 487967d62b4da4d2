use chrono::Utc;
use lib_common::connections::db_postgres::{Database, DbError};
use thiserror::Error;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use super::model::{NewRecord, RecordFilter, RecordPatch, SensorRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(#[from] DbError),
    #[error("Database query error: {0}")]
    Query(#[from] tokio_postgres::Error),
}

const RECORD_COLUMNS: &str = "id, kind, name, value, unit, recorded_at";

/// Persistence layer for sensor records, backed by a single Postgres table.
/// The loosely shaped `value` field is stored as JSONB.
#[derive(Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    pub fn new(db: Database) -> Self {
        RecordStore { db }
    }

    /// Create the backing table if this is a fresh database.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let client = self.db.get().await?;
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS sensor_records (
                    id          TEXT PRIMARY KEY,
                    kind        TEXT,
                    name        TEXT,
                    value       JSONB,
                    unit        TEXT,
                    recorded_at TIMESTAMPTZ NOT NULL
                )",
            )
            .await?;
        Ok(())
    }

    /// Persist a new record. The id is generated here and a missing timestamp
    /// defaults to the current server time.
    pub async fn insert(&self, new: NewRecord) -> Result<SensorRecord, StoreError> {
        let id = lib_common::utils::record_id();
        let recorded_at = new.timestamp.unwrap_or_else(Utc::now);

        let sql = format!(
            "INSERT INTO sensor_records ({RECORD_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {RECORD_COLUMNS}"
        );
        let client = self.db.get().await?;
        let row = client
            .query_one(
                sql.as_str(),
                &[&id, &new.kind, &new.name, &new.value, &new.unit, &recorded_at],
            )
            .await?;
        Ok(record_from_row(&row))
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<SensorRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM sensor_records WHERE id = $1");
        let client = self.db.get().await?;
        let row = client.query_opt(sql.as_str(), &[&id]).await?;
        Ok(row.as_ref().map(record_from_row))
    }

    pub async fn list_all(&self) -> Result<Vec<SensorRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM sensor_records ORDER BY recorded_at");
        let client = self.db.get().await?;
        let rows = client.query(sql.as_str(), &[]).await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Exact-match filter on kind and/or name. An empty filter returns
    /// everything, same as `list_all`.
    pub async fn find(&self, filter: &RecordFilter) -> Result<Vec<SensorRecord>, StoreError> {
        let (sql, params) = filter_query(filter);
        let client = self.db.get().await?;
        let rows = client.query(sql.as_str(), &params).await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Apply a partial update. Returns `None` when no record has the given
    /// id. An empty patch reads the record back unchanged.
    pub async fn update_by_id(
        &self,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<Option<SensorRecord>, StoreError> {
        if patch.is_empty() {
            return self.get_by_id(id).await;
        }

        let (assignments, mut params) = patch_assignments(patch);
        let id_position = params.len() + 1;
        params.push(&id as &(dyn ToSql + Sync));

        let sql = format!(
            "UPDATE sensor_records SET {} WHERE id = ${} RETURNING {RECORD_COLUMNS}",
            assignments.join(", "),
            id_position
        );

        let client = self.db.get().await?;
        let row = client.query_opt(sql.as_str(), &params).await?;
        Ok(row.as_ref().map(record_from_row))
    }
}

fn record_from_row(row: &Row) -> SensorRecord {
    SensorRecord {
        id: row.get("id"),
        kind: row.get("kind"),
        name: row.get("name"),
        value: row.get("value"),
        unit: row.get("unit"),
        timestamp: row.get("recorded_at"),
    }
}

fn filter_query<'a>(filter: &'a RecordFilter) -> (String, Vec<&'a (dyn ToSql + Sync)>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

    if let Some(kind) = &filter.kind {
        params.push(kind);
        clauses.push(format!("kind = ${}", params.len()));
    }
    if let Some(name) = &filter.name {
        params.push(name);
        clauses.push(format!("name = ${}", params.len()));
    }

    let mut sql = format!("SELECT {RECORD_COLUMNS} FROM sensor_records");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY recorded_at");

    (sql, params)
}

fn patch_assignments<'a>(patch: &'a RecordPatch) -> (Vec<String>, Vec<&'a (dyn ToSql + Sync)>) {
    let mut assignments: Vec<String> = Vec::new();
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

    if let Some(kind) = &patch.kind {
        params.push(kind);
        assignments.push(format!("kind = ${}", params.len()));
    }
    if let Some(name) = &patch.name {
        params.push(name);
        assignments.push(format!("name = ${}", params.len()));
    }
    if let Some(value) = &patch.value {
        params.push(value);
        assignments.push(format!("value = ${}", params.len()));
    }
    if let Some(unit) = &patch.unit {
        params.push(unit);
        assignments.push(format!("unit = ${}", params.len()));
    }
    if let Some(timestamp) = &patch.timestamp {
        params.push(timestamp);
        assignments.push(format!("recorded_at = ${}", params.len()));
    }

    (assignments, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_filter_query_empty_selects_everything() {
        let filter = RecordFilter::default();
        let (sql, params) = filter_query(&filter);
        assert_eq!(
            sql,
            "SELECT id, kind, name, value, unit, recorded_at FROM sensor_records ORDER BY recorded_at"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_filter_query_numbers_clauses_in_order() {
        let filter = RecordFilter {
            kind: Some("temp".to_string()),
            name: Some("boiler".to_string()),
        };
        let (sql, params) = filter_query(&filter);
        assert!(sql.contains("WHERE kind = $1 AND name = $2"));
        assert_eq!(params.len(), 2);

        let name_only = RecordFilter {
            kind: None,
            name: Some("boiler".to_string()),
        };
        let (sql, params) = filter_query(&name_only);
        assert!(sql.contains("WHERE name = $1"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_patch_assignments_cover_only_present_fields() {
        let patch = RecordPatch {
            value: Some(json!(22.0)),
            unit: Some("C".to_string()),
            ..Default::default()
        };
        let (assignments, params) = patch_assignments(&patch);
        assert_eq!(assignments, vec!["value = $1", "unit = $2"]);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_patch_assignments_map_timestamp_to_recorded_at() {
        let patch = RecordPatch {
            timestamp: Some(Utc::now()),
            ..Default::default()
        };
        let (assignments, params) = patch_assignments(&patch);
        assert_eq!(assignments, vec!["recorded_at = $1"]);
        assert_eq!(params.len(), 1);
    }
}
