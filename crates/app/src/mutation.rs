use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{Sqlite, Transaction};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use hirehub_core::attendance::{local_day, AttendanceError};
use hirehub_core::change::ChangeEvent;
use hirehub_core::document::{create_document, merge_document, Document, DocumentError, ValidationError};
use hirehub_core::types::{
    AttendanceRecord, Job, Requirement, ReviewDecision, ReviewError, Settings, TeamMember,
};
use hirehub_storage::{Database, DocumentStoreError};

use crate::sse::ChangeHub;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Runs every document write: one transaction per operation, change events
/// appended alongside, and a broadcast to live subscribers after commit.
#[derive(Clone)]
pub struct MutationExecutor {
    database: Database,
    hub: ChangeHub,
    clock: Clock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub reviewer: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    pub member_id: String,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub marked_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckOutRequest {
    pub member_id: String,
}

impl MutationExecutor {
    pub fn new(database: Database, hub: ChangeHub, clock: Clock) -> Self {
        Self {
            database,
            hub,
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub async fn create<T: Document>(&self, body: Value) -> Result<T, MutationError> {
        let now = self.now();
        let id = Uuid::new_v4().to_string();
        let document: T = create_document(&id, body, now).map_err(reject::<T>)?;

        let mut tx = self.database.begin().await?;
        let event = self
            .database
            .collection::<T>()
            .insert(&mut tx, &document, now)
            .await?;
        self.commit(tx, vec![event]).await?;
        Ok(document)
    }

    pub async fn update<T: Document>(&self, id: &str, patch: Value) -> Result<T, MutationError> {
        let now = self.now();
        let repo = self.database.collection::<T>();

        let mut tx = self.database.begin().await?;
        let current = repo.get_in(&mut tx, id).await?;
        let merged = merge_document(&current, patch, now).map_err(reject::<T>)?;
        let event = repo.replace(&mut tx, &merged, now).await?;
        self.commit(tx, vec![event]).await?;
        Ok(merged)
    }

    pub async fn delete<T: Document>(&self, id: &str) -> Result<(), MutationError> {
        let now = self.now();
        let mut tx = self.database.begin().await?;
        let event = self
            .database
            .collection::<T>()
            .delete(&mut tx, id, now)
            .await?;
        self.commit(tx, vec![event]).await
    }

    pub async fn update_settings(&self, patch: Value) -> Result<Settings, MutationError> {
        let now = self.now();
        let repo = self.database.settings();

        let mut tx = self.database.begin().await?;
        let current = repo.load_in(&mut tx).await?;
        let merged = merge_document(&current, patch, now).map_err(reject::<Settings>)?;
        let event = repo.save(&mut tx, &merged, now).await?;
        self.commit(tx, vec![event]).await?;
        Ok(merged)
    }

    /// Approves or rejects a pending requirement. Approval opens a job in the same transaction.
    pub async fn review_requirement(
        &self,
        id: &str,
        request: ReviewRequest,
    ) -> Result<Requirement, MutationError> {
        let now = self.now();
        let requirements = self.database.requirements();

        let mut tx = self.database.begin().await?;
        let mut requirement = requirements.get_in(&mut tx, id).await?;
        requirement.review(request.decision, &request.reviewer, request.note, now)?;

        let mut events = Vec::with_capacity(2);
        if request.decision == ReviewDecision::Approve {
            let job = Job::from_requirement(Uuid::new_v4().to_string(), &requirement, now);
            job.validate()?;
            events.push(self.database.jobs().insert(&mut tx, &job, now).await?);
            requirement.job_id = Some(job.id);
        }
        events.push(requirements.replace(&mut tx, &requirement, now).await?);
        self.commit(tx, events).await?;

        info!(
            stage = "mutation",
            requirement = %requirement.id,
            status = requirement.status.as_str(),
            "requirement reviewed"
        );
        Ok(requirement)
    }

    /// Opens today's attendance record for a member, in the configured timezone.
    pub async fn check_in(&self, request: CheckInRequest) -> Result<AttendanceRecord, MutationError> {
        let now = self.now();
        let mut tx = self.database.begin().await?;
        let member = self.load_member(&mut tx, &request.member_id).await?;
        let today = self.today(&mut tx, now).await?;
        let date = today.to_string();

        let existing = self
            .database
            .attendance()
            .find_matching_in(&mut tx, &[("member_id", member.id.as_str()), ("date", date.as_str())])
            .await?;
        if !existing.is_empty() {
            return Err(MutationError::Conflict(format!(
                "{} already has attendance for {date}",
                member.name
            )));
        }

        let body = json!({
            "member_id": member.id,
            "date": date,
            "status": "present",
            "check_in": now,
            "store": request.store.or(member.store),
            "marked_by": request.marked_by,
        });
        let record: AttendanceRecord =
            create_document(&Uuid::new_v4().to_string(), body, now).map_err(reject::<AttendanceRecord>)?;
        let event = self
            .database
            .attendance()
            .insert(&mut tx, &record, now)
            .await?;
        self.commit(tx, vec![event]).await?;
        Ok(record)
    }

    pub async fn check_out(&self, request: CheckOutRequest) -> Result<AttendanceRecord, MutationError> {
        let now = self.now();
        let repo = self.database.attendance();
        let mut tx = self.database.begin().await?;
        let member = self.load_member(&mut tx, &request.member_id).await?;
        let today = self.today(&mut tx, now).await?;
        let date = today.to_string();

        let mut record = repo
            .find_matching_in(&mut tx, &[("member_id", member.id.as_str()), ("date", date.as_str())])
            .await?
            .into_iter()
            .max_by_key(|record| record.updated_at)
            .ok_or_else(|| {
                MutationError::NotFound(format!("{} has not checked in on {date}", member.name))
            })?;
        if record.check_out.is_some() {
            return Err(MutationError::Conflict(format!(
                "{} already checked out on {date}",
                member.name
            )));
        }

        record.check_out = Some(now);
        record.updated_at = now;
        record.validate()?;
        let event = repo.replace(&mut tx, &record, now).await?;
        self.commit(tx, vec![event]).await?;
        Ok(record)
    }

    async fn load_member(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        member_id: &str,
    ) -> Result<TeamMember, MutationError> {
        self.database
            .users()
            .find_in(tx, member_id)
            .await?
            .ok_or_else(|| MutationError::NotFound(format!("member {member_id} not found")))
    }

    async fn today(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        now: DateTime<Utc>,
    ) -> Result<chrono::NaiveDate, MutationError> {
        let settings = self.database.settings().load_in(tx).await?;
        Ok(local_day(now, &settings.timezone)?)
    }

    async fn commit(
        &self,
        tx: Transaction<'_, Sqlite>,
        events: Vec<ChangeEvent>,
    ) -> Result<(), MutationError> {
        tx.commit().await?;
        for event in &events {
            counter!(
                "documents_written_total",
                "collection" => event.collection.as_str(),
                "op" => event.op.as_str()
            )
            .increment(1);
        }
        self.hub.publish(&events).await;
        Ok(())
    }
}

fn reject<T: Document>(err: DocumentError) -> MutationError {
    let reason = match &err {
        DocumentError::NotAnObject | DocumentError::Invalid(_) => "invalid_document",
        DocumentError::GuardedField(_) => "guarded_field",
        DocumentError::Validation(_) => "validation_failed",
    };
    counter!("mutations_rejected_total", "reason" => reason).increment(1);
    warn!(stage = "mutation", collection = T::COLLECTION.as_str(), %err, "document rejected");
    MutationError::Document(err)
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Document(DocumentError),
    #[error(transparent)]
    Store(#[from] DocumentStoreError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Attendance(#[from] AttendanceError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
