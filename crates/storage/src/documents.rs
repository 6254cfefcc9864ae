use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use hirehub_core::change::{ChangeEvent, ChangeOp};
use hirehub_core::document::Document;

use crate::change_log::{self, NewChange};
use crate::to_rfc3339;

/// Typed access to one collection of the `documents` table.
///
/// Every mutation runs inside the caller's transaction and appends to the
/// change log, so a commit publishes the document and its change together.
pub struct DocumentRepository<T> {
    pool: SqlitePool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for DocumentRepository<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Document> DocumentRepository<T> {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Lists every document of the collection in insertion order.
    pub async fn list(&self) -> Result<Vec<T>, DocumentStoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT body_json FROM documents WHERE collection = ? ORDER BY rowid ASC",
        )
        .bind(T::COLLECTION.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|(body,)| decode::<T>(&body)).collect()
    }

    pub async fn find(&self, id: &str) -> Result<Option<T>, DocumentStoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body_json FROM documents WHERE collection = ? AND id = ?")
                .bind(T::COLLECTION.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(body,)| decode::<T>(&body)).transpose()
    }

    pub async fn get(&self, id: &str) -> Result<T, DocumentStoreError> {
        self.find(id).await?.ok_or_else(|| not_found::<T>(id))
    }

    /// Reads a document through an open transaction, for read-modify-write cycles.
    pub async fn find_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> Result<Option<T>, DocumentStoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body_json FROM documents WHERE collection = ? AND id = ?")
                .bind(T::COLLECTION.as_str())
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?;

        row.map(|(body,)| decode::<T>(&body)).transpose()
    }

    pub async fn get_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> Result<T, DocumentStoreError> {
        self.find_in(tx, id).await?.ok_or_else(|| not_found::<T>(id))
    }

    /// Documents whose top-level text fields equal the given values, in insertion order.
    pub async fn find_matching_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        fields: &[(&str, &str)],
    ) -> Result<Vec<T>, DocumentStoreError> {
        let mut sql = String::from("SELECT body_json FROM documents WHERE collection = ?");
        for _ in fields {
            sql.push_str(" AND json_extract(body_json, ?) = ?");
        }
        sql.push_str(" ORDER BY rowid ASC");

        let mut query = sqlx::query_as::<_, (String,)>(&sql).bind(T::COLLECTION.as_str());
        for (field, value) in fields {
            query = query.bind(format!("$.{field}")).bind(*value);
        }
        let rows = query.fetch_all(&mut **tx).await?;

        rows.into_iter().map(|(body,)| decode::<T>(&body)).collect()
    }

    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        document: &T,
        at: DateTime<Utc>,
    ) -> Result<ChangeEvent, DocumentStoreError> {
        let body = encode(document)?;
        let timestamp = to_rfc3339(at);
        sqlx::query(
            "INSERT INTO documents (collection, id, body_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(T::COLLECTION.as_str())
        .bind(document.id())
        .bind(body.to_string())
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut **tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err)
                if matches!(db_err.code().as_deref(), Some("1555") | Some("2067")) =>
            {
                DocumentStoreError::Duplicate {
                    collection: T::COLLECTION.as_str(),
                    id: document.id().to_string(),
                }
            }
            other => DocumentStoreError::Database(other),
        })?;

        self.record(tx, document.id(), ChangeOp::Created, Some(&body), at)
            .await
    }

    /// Overwrites an existing document with its new full body.
    pub async fn replace(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        document: &T,
        at: DateTime<Utc>,
    ) -> Result<ChangeEvent, DocumentStoreError> {
        let body = encode(document)?;
        let result = sqlx::query(
            "UPDATE documents SET body_json = ?, updated_at = ? WHERE collection = ? AND id = ?",
        )
        .bind(body.to_string())
        .bind(to_rfc3339(at))
        .bind(T::COLLECTION.as_str())
        .bind(document.id())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found::<T>(document.id()));
        }

        self.record(tx, document.id(), ChangeOp::Updated, Some(&body), at)
            .await
    }

    pub async fn delete(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<ChangeEvent, DocumentStoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(T::COLLECTION.as_str())
            .bind(id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found::<T>(id));
        }

        self.record(tx, id, ChangeOp::Deleted, None, at).await
    }

    async fn record(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        op: ChangeOp,
        body: Option<&Value>,
        at: DateTime<Utc>,
    ) -> Result<ChangeEvent, DocumentStoreError> {
        let event = change_log::append(
            tx,
            NewChange {
                collection: T::COLLECTION,
                doc_id: id,
                op,
                body,
                at,
            },
        )
        .await?;
        Ok(event)
    }
}

fn encode<T: Document>(document: &T) -> Result<Value, DocumentStoreError> {
    serde_json::to_value(document).map_err(|source| DocumentStoreError::Decode {
        collection: T::COLLECTION.as_str(),
        source,
    })
}

fn decode<T: Document>(body: &str) -> Result<T, DocumentStoreError> {
    serde_json::from_str(body).map_err(|source| DocumentStoreError::Decode {
        collection: T::COLLECTION.as_str(),
        source,
    })
}

fn not_found<T: Document>(id: &str) -> DocumentStoreError {
    DocumentStoreError::NotFound {
        collection: T::COLLECTION.as_str(),
        id: id.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },
    #[error("{collection}/{id} already exists")]
    Duplicate { collection: &'static str, id: String },
    #[error("failed to decode {collection} document: {source}")]
    Decode {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;
    use hirehub_core::document::{create_document, merge_document};
    use hirehub_core::types::{Candidate, Collection, Job};
    use serde_json::json;

    fn candidate(id: &str, name: &str) -> Candidate {
        create_document(id, json!({ "name": name }), Utc::now()).expect("candidate")
    }

    #[tokio::test]
    async fn insert_list_and_get() {
        let (db, _dir) = setup_db().await;
        let repo = db.candidates();

        let mut tx = db.begin().await.expect("begin");
        for (id, name) in [("c-2", "Zoya"), ("c-1", "Arun")] {
            repo.insert(&mut tx, &candidate(id, name), Utc::now())
                .await
                .expect("insert");
        }
        tx.commit().await.expect("commit");

        let all = repo.list().await.expect("list");
        let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c-2", "c-1"]);
        assert_eq!(repo.get("c-1").await.expect("get").name, "Arun");
        assert!(matches!(
            repo.get("missing").await,
            Err(DocumentStoreError::NotFound { .. })
        ));
        assert!(db.jobs().list().await.expect("jobs").is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let (db, _dir) = setup_db().await;
        let repo = db.candidates();
        let mut tx = db.begin().await.expect("begin");
        repo.insert(&mut tx, &candidate("c-1", "Arun"), Utc::now())
            .await
            .expect("insert");
        let err = repo
            .insert(&mut tx, &candidate("c-1", "Arun"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn replace_and_delete_emit_change_events() {
        let (db, _dir) = setup_db().await;
        let repo = db.candidates();
        let original = candidate("c-1", "Arun");

        let mut tx = db.begin().await.expect("begin");
        let created = repo.insert(&mut tx, &original, Utc::now()).await.expect("insert");
        let merged: Candidate =
            merge_document(&original, json!({ "stage": "interview" }), Utc::now()).expect("merge");
        let updated = repo.replace(&mut tx, &merged, Utc::now()).await.expect("replace");
        let deleted = repo.delete(&mut tx, "c-1", Utc::now()).await.expect("delete");
        tx.commit().await.expect("commit");

        assert_eq!(created.op, ChangeOp::Created);
        assert_eq!(updated.op, ChangeOp::Updated);
        assert_eq!(updated.data.as_ref().map(|d| d["stage"].clone()), Some(json!("interview")));
        assert_eq!(deleted.op, ChangeOp::Deleted);
        assert!(deleted.data.is_none());
        assert_eq!(
            [created.version, updated.version, deleted.version],
            [1, 2, 3]
        );
        assert_eq!(deleted.collection, Collection::Candidates);
        assert!(repo.find("c-1").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn rolled_back_writes_leave_no_trace() {
        let (db, _dir) = setup_db().await;
        let mut tx = db.begin().await.expect("begin");
        let job: Job = create_document(
            "j-1",
            json!({ "title": "Cashier", "client": "MegaMart" }),
            Utc::now(),
        )
        .expect("job");
        db.jobs().insert(&mut tx, &job, Utc::now()).await.expect("insert");
        tx.rollback().await.expect("rollback");

        assert!(db.jobs().list().await.expect("list").is_empty());
        assert!(db.change_log().list_since(0, 10).await.expect("log").is_empty());
    }

    #[tokio::test]
    async fn missing_documents_cannot_be_replaced_or_deleted() {
        let (db, _dir) = setup_db().await;
        let repo = db.candidates();
        let mut tx = db.begin().await.expect("begin");
        let err = repo
            .replace(&mut tx, &candidate("ghost", "Ghost"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::NotFound { .. }));
        let err = repo.delete(&mut tx, "ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn find_matching_filters_on_json_fields() {
        let (db, _dir) = setup_db().await;
        let repo = db.candidates();
        let mut tx = db.begin().await.expect("begin");
        for (id, name, store) in [("c-1", "Arun", "Koramangala"), ("c-2", "Bala", "Indiranagar")] {
            let doc: Candidate = create_document(id, json!({ "name": name, "store": store }), Utc::now())
                .expect("candidate");
            repo.insert(&mut tx, &doc, Utc::now()).await.expect("insert");
        }

        let found = repo
            .find_matching_in(&mut tx, &[("store", "Indiranagar"), ("name", "Bala")])
            .await
            .expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c-2");
        let none = repo
            .find_matching_in(&mut tx, &[("store", "Whitefield")])
            .await
            .expect("query");
        assert!(none.is_empty());
    }
}
