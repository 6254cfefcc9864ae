use std::time::Instant;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::NaiveDate;
use metrics::histogram;
use serde::Deserialize;

use hirehub_core::attendance::{
    local_day, summarize_attendance, AttendanceError, AttendanceSummary, DateRange, MonthPeriod,
};
use hirehub_core::dashboard::{
    admin_dashboard, complaint_summary, hr_dashboard, partner_dashboard, supervisor_dashboard,
    team_lead_dashboard, AdminDashboard, ComplaintSummary, Dataset, HrDashboard, PartnerDashboard,
    SupervisorDashboard, TeamLeadDashboard,
};
use hirehub_core::hierarchy::{team_tree, TeamNode};
use hirehub_core::payroll::{compute_payroll, PayrollReport};
use hirehub_core::performance::{team_performance, PerformanceNode};
use hirehub_core::pipeline::{kanban_board, pipeline_summary, KanbanColumn, PipelineSummary};
use hirehub_core::profit::{profit_projection, ProfitReport};
use hirehub_core::types::{AttendanceRecord, Settings, TeamMember};
use hirehub_storage::{Database, DocumentRepository, SettingsRepository};

use crate::problem::ProblemResponse;
use crate::router::AppState;

type ApiResult<T> = Result<T, ProblemResponse>;

/// Loads every collection at once for dashboards.
pub async fn load_dataset(database: &Database) -> ApiResult<Dataset> {
    let (jobs_repo, candidates_repo, users_repo) =
        (database.jobs(), database.candidates(), database.users());
    let (complaints_repo, requirements_repo, attendance_repo, settings_repo) = (
        database.complaints(),
        database.requirements(),
        database.attendance(),
        database.settings(),
    );
    let (jobs, candidates, members, complaints, requirements, attendance, settings) = tokio::try_join!(
        jobs_repo.list(),
        candidates_repo.list(),
        users_repo.list(),
        complaints_repo.list(),
        requirements_repo.list(),
        attendance_repo.list(),
        settings_repo.load(),
    )?;

    Ok(Dataset {
        jobs,
        candidates,
        members,
        complaints,
        requirements,
        attendance,
        settings,
    })
}

fn attendance_sources(
    state: &AppState,
) -> (
    DocumentRepository<AttendanceRecord>,
    DocumentRepository<TeamMember>,
    SettingsRepository,
) {
    let storage = state.storage();
    (storage.attendance(), storage.users(), storage.settings())
}

fn record_build(view: &'static str, started: Instant) {
    histogram!("view_build_seconds", "view" => view).record(started.elapsed().as_secs_f64());
}

fn today(state: &AppState, settings: &Settings) -> ApiResult<NaiveDate> {
    local_day(state.now(), &settings.timezone).map_err(|err| ProblemResponse::internal(&err))
}

fn parse_month(raw: Option<&str>, fallback: NaiveDate) -> ApiResult<MonthPeriod> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|err: AttendanceError| {
                ProblemResponse::bad_request(err.to_string())
            }),
        None => Ok(MonthPeriod::containing(fallback)),
    }
}

pub async fn team_tree_view(State(state): State<AppState>) -> ApiResult<Json<Vec<TeamNode>>> {
    let members = state.storage().users().list().await?;
    Ok(Json(team_tree(&members)))
}

pub async fn team_performance_view(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PerformanceNode>>> {
    let started = Instant::now();
    let (users, candidates) = (state.storage().users(), state.storage().candidates());
    let (members, candidates) = tokio::try_join!(users.list(), candidates.list())?;
    let forest = team_tree(&members);
    let view = team_performance(&forest, &candidates);
    record_build("team_performance", started);
    Ok(Json(view))
}

pub async fn pipeline_view(State(state): State<AppState>) -> ApiResult<Json<PipelineSummary>> {
    let candidates = state.storage().candidates().list().await?;
    Ok(Json(pipeline_summary(&candidates)))
}

pub async fn kanban_view(State(state): State<AppState>) -> ApiResult<Json<Vec<KanbanColumn>>> {
    let candidates = state.storage().candidates().list().await?;
    Ok(Json(kanban_board(&candidates)))
}

pub async fn profit_view(State(state): State<AppState>) -> ApiResult<Json<ProfitReport>> {
    let started = Instant::now();
    let (candidates, jobs) = (state.storage().candidates(), state.storage().jobs());
    let (candidates, jobs) = tokio::try_join!(candidates.list(), jobs.list())?;
    let report = profit_projection(&candidates, &jobs);
    record_build("profit", started);
    Ok(Json(report))
}

pub async fn complaints_view(State(state): State<AppState>) -> ApiResult<Json<ComplaintSummary>> {
    let complaints = state.storage().complaints().list().await?;
    Ok(Json(complaint_summary(&complaints)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AttendanceQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    month: Option<String>,
    store: Option<String>,
}

/// Attendance summary for `from..=to`, a `month`, or the current month.
pub async fn attendance_view(
    State(state): State<AppState>,
    query: Result<Query<AttendanceQuery>, QueryRejection>,
) -> ApiResult<Json<AttendanceSummary>> {
    let Query(query) = query?;
    let started = Instant::now();
    let (attendance, users, settings) = attendance_sources(&state);
    let (records, members, settings) =
        tokio::try_join!(attendance.list(), users.list(), settings.load())?;

    let range = match (query.from, query.to) {
        (Some(from), Some(to)) => DateRange::new(from, to)
            .map_err(|err| ProblemResponse::bad_request(err.to_string()))?,
        (None, None) => parse_month(query.month.as_deref(), today(&state, &settings)?)?.range(),
        _ => {
            return Err(ProblemResponse::bad_request(
                "both from and to are required for a date range",
            ))
        }
    };
    let store = query
        .store
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let summary = summarize_attendance(&records, &members, range, store);
    record_build("attendance", started);
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MonthQuery {
    month: Option<String>,
}

pub async fn payroll_view(
    State(state): State<AppState>,
    query: Result<Query<MonthQuery>, QueryRejection>,
) -> ApiResult<Json<PayrollReport>> {
    let Query(query) = query?;
    let started = Instant::now();
    let (attendance, users, settings) = attendance_sources(&state);
    let (records, members, settings) =
        tokio::try_join!(attendance.list(), users.list(), settings.load())?;
    let month = parse_month(query.month.as_deref(), today(&state, &settings)?)?;
    let report = compute_payroll(&members, &records, &settings, month);
    record_build("payroll", started);
    Ok(Json(report))
}

pub async fn admin_view(State(state): State<AppState>) -> ApiResult<Json<AdminDashboard>> {
    let started = Instant::now();
    let data = load_dataset(state.storage()).await?;
    let dashboard = admin_dashboard(&data);
    record_build("dashboard_admin", started);
    Ok(Json(dashboard))
}

pub async fn hr_view(
    State(state): State<AppState>,
    query: Result<Query<MonthQuery>, QueryRejection>,
) -> ApiResult<Json<HrDashboard>> {
    let Query(query) = query?;
    let started = Instant::now();
    let data = load_dataset(state.storage()).await?;
    let month = parse_month(query.month.as_deref(), today(&state, &data.settings)?)?;
    let dashboard = hr_dashboard(&data, month);
    record_build("dashboard_hr", started);
    Ok(Json(dashboard))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NameQuery {
    name: Option<String>,
}

impl NameQuery {
    fn required(&self) -> ApiResult<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ProblemResponse::bad_request("query parameter 'name' is required"))
    }
}

pub async fn team_lead_view(
    State(state): State<AppState>,
    query: Result<Query<NameQuery>, QueryRejection>,
) -> ApiResult<Json<TeamLeadDashboard>> {
    let Query(query) = query?;
    let lead = query.required()?;
    let data = load_dataset(state.storage()).await?;
    Ok(Json(team_lead_dashboard(&data, lead)?))
}

pub async fn partner_view(
    State(state): State<AppState>,
    query: Result<Query<NameQuery>, QueryRejection>,
) -> ApiResult<Json<PartnerDashboard>> {
    let Query(query) = query?;
    let partner = query.required()?;
    let data = load_dataset(state.storage()).await?;
    Ok(Json(partner_dashboard(&data, partner)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SupervisorQuery {
    store: Option<String>,
    date: Option<NaiveDate>,
}

pub async fn supervisor_view(
    State(state): State<AppState>,
    query: Result<Query<SupervisorQuery>, QueryRejection>,
) -> ApiResult<Json<SupervisorDashboard>> {
    let Query(query) = query?;
    let store = query
        .store
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProblemResponse::bad_request("query parameter 'store' is required"))?;
    let data = load_dataset(state.storage()).await?;
    let date = match query.date {
        Some(date) => date,
        None => today(&state, &data.settings)?,
    };
    Ok(Json(supervisor_dashboard(&data, store, date)))
}
