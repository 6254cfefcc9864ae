use std::{collections::HashSet, sync::Arc, time::Duration};

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tracing::info;

use hirehub_core::document::Document;
use hirehub_core::types::{
    AttendanceRecord, Candidate, Collection, Complaint, Job, Requirement, TeamMember,
};
use hirehub_storage::Database;

use crate::documents;
use crate::mutation::{Clock, MutationExecutor};
use crate::problem::ProblemResponse;
use crate::sse::{ChangeHub, SseError, SseStream};
use crate::telemetry;
use crate::views;

const SSE_RING_TTL: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    hub: ChangeHub,
    mutations: MutationExecutor,
    clock: Clock,
    sse_heartbeat_secs: u64,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        sse_ring_max: usize,
        sse_heartbeat_secs: u64,
    ) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        let hub = ChangeHub::new(storage.clone(), sse_ring_max, SSE_RING_TTL);
        let mutations = MutationExecutor::new(storage.clone(), hub.clone(), clock.clone());
        Self {
            metrics,
            storage,
            hub,
            mutations,
            clock,
            sse_heartbeat_secs,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock.clone();
        self.mutations = MutationExecutor::new(self.storage.clone(), self.hub.clone(), clock);
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    pub fn mutations(&self) -> &MutationExecutor {
        &self.mutations
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn sse_heartbeat(&self) -> u64 {
        self.sse_heartbeat_secs
    }
}

pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/candidates",
            get(documents::list_candidates).post(documents::create::<Candidate>),
        )
        .route(
            "/candidates/:id",
            get(documents::get_one::<Candidate>)
                .patch(documents::update::<Candidate>)
                .delete(documents::remove::<Candidate>),
        )
        .route("/requirements/:id/review", post(documents::review_requirement))
        .route("/attendance/check-in", post(documents::check_in))
        .route("/attendance/check-out", post(documents::check_out))
        .route(
            "/settings",
            get(documents::get_settings).patch(documents::update_settings),
        )
        .route("/views/team-tree", get(views::team_tree_view))
        .route("/views/team-performance", get(views::team_performance_view))
        .route("/views/pipeline", get(views::pipeline_view))
        .route("/views/kanban", get(views::kanban_view))
        .route("/views/profit", get(views::profit_view))
        .route("/views/complaints", get(views::complaints_view))
        .route("/views/attendance", get(views::attendance_view))
        .route("/views/payroll", get(views::payroll_view))
        .route("/dashboards/admin", get(views::admin_view))
        .route("/dashboards/hr", get(views::hr_view))
        .route("/dashboards/team-lead", get(views::team_lead_view))
        .route("/dashboards/partner", get(views::partner_view))
        .route("/dashboards/supervisor", get(views::supervisor_view))
        .route("/stream", get(change_stream));

    let api = collection_routes::<Job>(api);
    let api = collection_routes::<TeamMember>(api);
    let api = collection_routes::<Complaint>(api);
    let api = collection_routes::<Requirement>(api);
    let api = collection_routes::<AttendanceRecord>(api);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .nest("/api", api)
        .with_state(state)
}

/// Plain CRUD routes for a collection without dedicated list handling.
fn collection_routes<T: Document>(router: Router<AppState>) -> Router<AppState> {
    let base = format!("/{}", T::COLLECTION.as_str());
    let item = format!("{base}/:id");
    router
        .route(&base, get(documents::list::<T>).post(documents::create::<T>))
        .route(
            &item,
            get(documents::get_one::<T>)
                .patch(documents::update::<T>)
                .delete(documents::remove::<T>),
        )
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamQuery {
    since_version: Option<u64>,
    collections: Option<String>,
}

async fn change_stream(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Sse<SseStream>, ProblemResponse> {
    let Query(query) = query?;

    let since_version = headers
        .get("Last-Event-ID")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .or(query.since_version);

    let collections = parse_collections(query.collections.as_deref())?;

    let subscription = state
        .hub()
        .subscribe(since_version, collections)
        .await
        .map_err(|err: SseError| ProblemResponse::internal(&err))?;
    if subscription.is_resync() {
        info!(stage = "sse", since = ?since_version, "stream opened with resync");
    }

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.sse_heartbeat()))
        .text("heartbeat");

    Ok(Sse::new(subscription.into_stream()).keep_alive(keep_alive))
}

fn parse_collections(raw: Option<&str>) -> Result<Option<HashSet<Collection>>, ProblemResponse> {
    let Some(value) = raw else {
        return Ok(None);
    };
    let mut set = HashSet::new();
    for item in value.split(',') {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        let collection = trimmed
            .parse::<Collection>()
            .map_err(|_| ProblemResponse::bad_request(format!("unknown collection '{trimmed}'")))?;
        set.insert(collection);
    }
    Ok(Some(set))
}
