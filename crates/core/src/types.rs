use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{Document, ValidationError};

/// Named collections of the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Jobs,
    Candidates,
    Users,
    Complaints,
    Requirements,
    Attendance,
    Settings,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Self::Jobs,
        Self::Candidates,
        Self::Users,
        Self::Complaints,
        Self::Requirements,
        Self::Attendance,
        Self::Settings,
    ];

    /// Returns the canonical collection name used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Candidates => "candidates",
            Self::Users => "users",
            Self::Complaints => "complaints",
            Self::Requirements => "requirements",
            Self::Attendance => "attendance",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == value)
            .ok_or(())
    }
}

/// An opening billed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default = "default_openings")]
    pub openings: u32,
    /// Amount billed to the client per selected candidate.
    #[serde(default)]
    pub client_rate: u64,
    /// Amount paid to the sourcing partner per selected candidate.
    #[serde(default)]
    pub vendor_rate: u64,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Open,
    OnHold,
    Closed,
}

/// Largest per-placement rate a job may carry, so profit margins fit in `i64`.
pub const MAX_RATE: u64 = i64::MAX as u64;

impl Job {
    /// Builds an open job from an approved partner requirement.
    pub fn from_requirement(id: String, requirement: &Requirement, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: requirement.title.clone(),
            client: requirement
                .client
                .clone()
                .unwrap_or_else(|| requirement.partner.clone()),
            location: requirement.location.clone(),
            openings: requirement.openings,
            client_rate: 0,
            vendor_rate: 0,
            status: JobStatus::Open,
            requirement_id: Some(requirement.id.clone()),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Document for Job {
    const COLLECTION: Collection = Collection::Jobs;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("client", &self.client)?;
        if self.openings == 0 {
            return Err(ValidationError::new("openings", "must be at least 1"));
        }
        for (field, rate) in [("client_rate", self.client_rate), ("vendor_rate", self.vendor_rate)] {
            if rate > MAX_RATE {
                return Err(ValidationError::new(field, format!("must not exceed {MAX_RATE}")));
            }
        }
        Ok(())
    }
}

/// A person moving through the recruitment pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub stage: CandidateStage,
    #[serde(default)]
    pub status: CandidateStatus,
    /// Partner agency that sourced the candidate; `None` for internal sourcing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Name of the team member who owns the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recruiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joining_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    /// Returns the partner name when the candidate was sourced externally.
    pub fn partner(&self) -> Option<&str> {
        self.source
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("internal"))
    }
}

impl Document for Candidate {
    const COLLECTION: Collection = Collection::Candidates;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)
    }
}

/// Pipeline stage, in the order candidates move through it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStage {
    #[default]
    #[serde(alias = "Sourced")]
    Sourced,
    #[serde(alias = "On the way", alias = "on the way")]
    OnTheWay,
    #[serde(alias = "Interview")]
    Interview,
    #[serde(alias = "Selected")]
    Selected,
}

impl CandidateStage {
    pub const ALL: [CandidateStage; 4] = [
        Self::Sourced,
        Self::OnTheWay,
        Self::Interview,
        Self::Selected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sourced => "sourced",
            Self::OnTheWay => "on_the_way",
            Self::Interview => "interview",
            Self::Selected => "selected",
        }
    }

    /// Human readable label shown on boards.
    pub fn label(self) -> &'static str {
        match self {
            Self::Sourced => "Sourced",
            Self::OnTheWay => "On the way",
            Self::Interview => "Interview",
            Self::Selected => "Selected",
        }
    }
}

impl FromStr for CandidateStage {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|stage| {
                stage.as_str() == value || stage.label().eq_ignore_ascii_case(value)
            })
            .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    #[default]
    #[serde(alias = "Active")]
    Active,
    #[serde(alias = "Quit")]
    Quit,
    #[serde(alias = "Selected")]
    Selected,
    #[serde(alias = "Pending")]
    Pending,
}

impl CandidateStatus {
    pub const ALL: [CandidateStatus; 4] = [Self::Active, Self::Quit, Self::Selected, Self::Pending];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Quit => "quit",
            Self::Selected => "selected",
            Self::Pending => "pending",
        }
    }
}

impl FromStr for CandidateStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
            .ok_or(())
    }
}

/// Staff or external account listed under the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    /// Name of the member this one reports to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(default)]
    pub monthly_salary: u64,
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for TeamMember {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        if let Some(manager) = &self.reporting_manager {
            if manager.trim() == self.name.trim() {
                return Err(ValidationError::new(
                    "reporting_manager",
                    "a member cannot report to themselves",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "Admin")]
    Admin,
    #[serde(alias = "HR")]
    Hr,
    #[serde(alias = "Team Lead", alias = "TeamLead")]
    TeamLead,
    #[serde(alias = "Team")]
    Team,
    #[serde(alias = "Partner")]
    Partner,
    #[serde(alias = "Supervisor")]
    Supervisor,
}

impl Role {
    /// Internal staff take part in reporting hierarchies and payroll.
    pub fn is_internal(self) -> bool {
        matches!(self, Self::Admin | Self::Hr | Self::TeamLead | Self::Team)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: String,
    pub raised_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub against: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ComplaintStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Complaint {
    const COLLECTION: Collection = Collection::Complaints;

    fn id(&self) -> &str {
        &self.id
    }

    fn guarded_fields() -> &'static [&'static str] {
        &["id", "created_at", "updated_at", "resolved_at"]
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("raised_by", &self.raised_by)?;
        require_text("subject", &self.subject)
    }

    fn on_write(&mut self, previous: Option<&Self>, now: DateTime<Utc>) {
        let was_resolved = previous
            .map(|complaint| complaint.status == ComplaintStatus::Resolved)
            .unwrap_or(false);
        match (self.status, was_resolved) {
            (ComplaintStatus::Resolved, false) => self.resolved_at = Some(now),
            (ComplaintStatus::Resolved, true) => {}
            _ => self.resolved_at = None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
}

/// Opening request submitted by a partner agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub partner: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default = "default_openings")]
    pub openings: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: RequirementStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const REQUIREMENT_GUARDED_FIELDS: [&str; 8] = [
    "id",
    "created_at",
    "updated_at",
    "status",
    "reviewed_by",
    "review_note",
    "reviewed_at",
    "job_id",
];

impl Requirement {
    /// Records an admin decision. Only pending requirements can be reviewed.
    pub fn review(
        &mut self,
        decision: ReviewDecision,
        reviewer: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ReviewError> {
        if self.status != RequirementStatus::Pending {
            return Err(ReviewError::AlreadyReviewed(self.status));
        }
        if reviewer.trim().is_empty() {
            return Err(ReviewError::MissingReviewer);
        }
        self.status = match decision {
            ReviewDecision::Approve => RequirementStatus::Approved,
            ReviewDecision::Reject => RequirementStatus::Rejected,
        };
        self.reviewed_by = Some(reviewer.trim().to_string());
        self.review_note = note.filter(|value| !value.trim().is_empty());
        self.reviewed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

impl Document for Requirement {
    const COLLECTION: Collection = Collection::Requirements;

    fn id(&self) -> &str {
        &self.id
    }

    fn guarded_fields() -> &'static [&'static str] {
        &REQUIREMENT_GUARDED_FIELDS
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("partner", &self.partner)?;
        require_text("title", &self.title)?;
        if self.openings == 0 {
            return Err(ValidationError::new("openings", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequirementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("requirement was already {}", .0.as_str())]
    AlreadyReviewed(RequirementStatus),
    #[error("reviewer name is required")]
    MissingReviewer,
}

/// One day of attendance for a team member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub member_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for AttendanceRecord {
    const COLLECTION: Collection = Collection::Attendance;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("member_id", &self.member_id)?;
        if let (Some(check_in), Some(check_out)) = (self.check_in, self.check_out) {
            if check_out < check_in {
                return Err(ValidationError::new(
                    "check_out",
                    "must not be earlier than check_in",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    HalfDay,
    Leave,
}

pub const SETTINGS_ID: &str = "global";

/// Company wide settings stored as a singleton document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_settings_id")]
    pub id: String,
    #[serde(default = "default_company_name")]
    pub company_name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_working_days")]
    pub working_days_per_month: u32,
    #[serde(default = "default_paid_leaves")]
    pub paid_leaves_per_month: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: default_settings_id(),
            company_name: default_company_name(),
            timezone: default_timezone(),
            working_days_per_month: default_working_days(),
            paid_leaves_per_month: default_paid_leaves(),
            updated_at: None,
        }
    }
}

impl Document for Settings {
    const COLLECTION: Collection = Collection::Settings;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("company_name", &self.company_name)?;
        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ValidationError::new(
                "timezone",
                format!("unknown timezone '{}'", self.timezone),
            ));
        }
        if self.working_days_per_month == 0 || self.working_days_per_month > 31 {
            return Err(ValidationError::new(
                "working_days_per_month",
                "must be between 1 and 31",
            ));
        }
        Ok(())
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field, "must not be empty"))
    } else {
        Ok(())
    }
}

fn default_openings() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_settings_id() -> String {
    SETTINGS_ID.to_string()
}

fn default_company_name() -> String {
    "HireHub".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_working_days() -> u32 {
    26
}

fn default_paid_leaves() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requirement() -> Requirement {
        serde_json::from_value(json!({
            "id": "req-1",
            "partner": "Acme Staffing",
            "title": "Store associate",
            "openings": 3,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
        }))
        .expect("requirement json")
    }

    #[test]
    fn job_rates_are_capped() {
        let mut job: Job = serde_json::from_value(json!({
            "id": "job-1",
            "title": "Picker",
            "client": "MegaMart",
            "openings": 2,
            "client_rate": MAX_RATE,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
        }))
        .expect("job json");
        assert!(job.validate().is_ok());

        job.vendor_rate = MAX_RATE + 1;
        let err = job.validate().unwrap_err();
        assert_eq!(err.field, "vendor_rate");

        job.vendor_rate = 0;
        job.client_rate = u64::MAX;
        assert_eq!(job.validate().unwrap_err().field, "client_rate");
    }

    #[test]
    fn candidate_stage_accepts_display_labels() {
        let stage: CandidateStage = serde_json::from_value(json!("On the way")).unwrap();
        assert_eq!(stage, CandidateStage::OnTheWay);
        assert_eq!(serde_json::to_value(stage).unwrap(), json!("on_the_way"));
        assert_eq!("Interview".parse::<CandidateStage>(), Ok(CandidateStage::Interview));
        assert!("hired".parse::<CandidateStage>().is_err());
    }

    #[test]
    fn candidate_partner_ignores_internal_source() {
        let mut candidate: Candidate = serde_json::from_value(json!({
            "id": "c-1",
            "name": "Asha",
            "source": "Internal",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
        }))
        .unwrap();
        assert_eq!(candidate.partner(), None);
        assert_eq!(candidate.stage, CandidateStage::Sourced);
        assert_eq!(candidate.status, CandidateStatus::Active);

        candidate.source = Some(" Acme ".to_string());
        assert_eq!(candidate.partner(), Some("Acme"));
    }

    #[test]
    fn review_only_applies_to_pending_requirements() {
        let now = Utc::now();
        let mut req = requirement();
        req.review(ReviewDecision::Approve, "admin", Some("ok".into()), now)
            .expect("first review succeeds");
        assert_eq!(req.status, RequirementStatus::Approved);
        assert_eq!(req.reviewed_by.as_deref(), Some("admin"));
        assert_eq!(req.reviewed_at, Some(now));

        let err = req
            .review(ReviewDecision::Reject, "admin", None, now)
            .unwrap_err();
        assert_eq!(err, ReviewError::AlreadyReviewed(RequirementStatus::Approved));
    }

    #[test]
    fn job_from_requirement_falls_back_to_partner_as_client() {
        let req = requirement();
        let job = Job::from_requirement("job-1".into(), &req, Utc::now());
        assert_eq!(job.client, "Acme Staffing");
        assert_eq!(job.openings, 3);
        assert_eq!(job.requirement_id.as_deref(), Some("req-1"));
        assert_eq!(job.status, JobStatus::Open);
    }

    #[test]
    fn settings_reject_unknown_timezone() {
        let settings = Settings {
            timezone: "Mars/Olympus".to_string(),
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert_eq!(err.field, "timezone");
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn role_internal_flags() {
        assert!(Role::TeamLead.is_internal());
        assert!(!Role::Partner.is_internal());
        let role: Role = serde_json::from_value(json!("Team Lead")).unwrap();
        assert_eq!(role, Role::TeamLead);
    }

    #[test]
    fn collection_round_trips_through_str() {
        for collection in Collection::ALL {
            assert_eq!(collection.as_str().parse::<Collection>(), Ok(collection));
        }
    }
}
