use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use hirehub_core::change::{ChangeEvent, ChangeOp};
use hirehub_core::types::Collection;

use crate::to_rfc3339;

/// Repository over the versioned `change_log` table.
#[derive(Clone)]
pub struct ChangeLogRepository {
    pool: SqlitePool,
}

impl ChangeLogRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns up to `limit` events with a version greater than `after`, oldest first.
    pub async fn list_since(
        &self,
        after: u64,
        limit: i64,
    ) -> Result<Vec<ChangeEvent>, ChangeLogError> {
        let rows = sqlx::query(
            "SELECT version, collection, doc_id, op, body_json, created_at \
             FROM change_log WHERE version > ? ORDER BY version ASC LIMIT ?",
        )
        .bind(after as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_row).collect()
    }

    /// Highest version ever assigned, including versions already pruned.
    pub async fn current_version(&self) -> Result<u64, ChangeLogError> {
        let seq: Option<i64> =
            sqlx::query_scalar("SELECT seq FROM sqlite_sequence WHERE name = 'change_log'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(seq.unwrap_or(0).max(0) as u64)
    }

    /// Deletes at most `limit` entries written before `threshold`.
    pub async fn delete_older_than_batch(
        &self,
        threshold: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM change_log WHERE version IN (\
                 SELECT version FROM change_log WHERE created_at < ? ORDER BY version LIMIT ?\
             )",
        )
        .bind(to_rfc3339(threshold))
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Change about to be appended inside a document write transaction.
pub(crate) struct NewChange<'a> {
    pub collection: Collection,
    pub doc_id: &'a str,
    pub op: ChangeOp,
    pub body: Option<&'a Value>,
    pub at: DateTime<Utc>,
}

/// Appends a change record and returns the event carrying its assigned version.
pub(crate) async fn append(
    tx: &mut Transaction<'_, Sqlite>,
    change: NewChange<'_>,
) -> Result<ChangeEvent, sqlx::Error> {
    let body_json = change.body.map(Value::to_string);
    let version: i64 = sqlx::query_scalar(
        "INSERT INTO change_log (collection, doc_id, op, body_json, created_at) \
         VALUES (?, ?, ?, ?, ?) RETURNING version",
    )
    .bind(change.collection.as_str())
    .bind(change.doc_id)
    .bind(change.op.as_str())
    .bind(body_json)
    .bind(to_rfc3339(change.at))
    .fetch_one(&mut **tx)
    .await?;

    Ok(ChangeEvent {
        version: version as u64,
        collection: change.collection,
        op: change.op,
        id: change.doc_id.to_string(),
        at: change.at,
        data: change.body.cloned(),
    })
}

fn decode_row(row: &SqliteRow) -> Result<ChangeEvent, ChangeLogError> {
    let version: i64 = row.try_get("version")?;
    let corrupt = |reason: String| ChangeLogError::Corrupt {
        version: version as u64,
        reason,
    };

    let collection: String = row.try_get("collection")?;
    let collection: Collection = collection
        .parse()
        .map_err(|_| corrupt(format!("unknown collection '{collection}'")))?;
    let op: String = row.try_get("op")?;
    let op: ChangeOp = op
        .parse()
        .map_err(|_| corrupt(format!("unknown op '{op}'")))?;
    let body_json: Option<String> = row.try_get("body_json")?;
    let data = body_json
        .map(|body| serde_json::from_str(&body))
        .transpose()
        .map_err(|err| corrupt(err.to_string()))?;
    let created_at: String = row.try_get("created_at")?;
    let at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|err| corrupt(err.to_string()))?
        .with_timezone(&Utc);

    Ok(ChangeEvent {
        version: version as u64,
        collection,
        op,
        id: row.try_get("doc_id")?,
        at,
        data,
    })
}

#[derive(Debug, Error)]
pub enum ChangeLogError {
    #[error("change log entry {version} is corrupt: {reason}")]
    Corrupt { version: u64, reason: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;
    use chrono::Duration;
    use serde_json::json;

    async fn append_at(db: &crate::Database, id: &str, at: DateTime<Utc>) -> ChangeEvent {
        let body = json!({ "id": id });
        let mut tx = db.begin().await.expect("begin");
        let event = append(
            &mut tx,
            NewChange {
                collection: Collection::Jobs,
                doc_id: id,
                op: ChangeOp::Created,
                body: Some(&body),
                at,
            },
        )
        .await
        .expect("append");
        tx.commit().await.expect("commit");
        event
    }

    #[tokio::test]
    async fn versions_increase_and_list_since_reads_back() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let first = append_at(&db, "j-1", now).await;
        let second = append_at(&db, "j-2", now).await;
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let repo = db.change_log();
        let events = repo.list_since(1, 10).await.expect("list");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "j-2");
        assert_eq!(events[0].collection, Collection::Jobs);
        assert_eq!(events[0].data, Some(json!({ "id": "j-2" })));
        assert_eq!(repo.current_version().await.expect("version"), 2);
    }

    #[tokio::test]
    async fn prune_removes_old_rows_but_keeps_version() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        append_at(&db, "j-old", now - Duration::hours(80)).await;
        append_at(&db, "j-new", now).await;

        let repo = db.change_log();
        let deleted = repo
            .delete_older_than_batch(now - Duration::hours(72), 100)
            .await
            .expect("prune");
        assert_eq!(deleted, 1);
        let remaining = repo.list_since(0, 10).await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "j-new");
        assert_eq!(repo.current_version().await.expect("version"), 2);
    }

    #[tokio::test]
    async fn empty_log_reports_version_zero() {
        let (db, _dir) = setup_db().await;
        assert_eq!(db.change_log().current_version().await.expect("version"), 0);
    }
}
