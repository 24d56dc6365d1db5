//! HTTP API for the costing engine.
//!
//! This module exposes the [`CostingService`] as a REST API using the
//! [`axum`](https://crates.io/crates/axum) framework.  Every route lives
//! under `/api/v1`.  Errors are returned as `{code, message, status}`
//! with the status taken from [`ApiError::status_code`].
//!
//! Approval actions take the acting user from the `X-User-Id` header,
//! then the `actorUserId` query parameter, then the JSON body, in that
//! order of priority.

use crate::catalog::{expense_catalog, ExpenseCatalog};
use crate::config::AppConfig;
use crate::error::CostingError;
use crate::models::{
    ApprovalAction, ApprovalEntry, NonStaffCost, PriceSummary, Project, ProjectDetails, ProjectId,
    ProjectStatus, StaffCost,
};
use crate::pricing::CostBreakdown;
use crate::rates::{RateCatalog, RateTables};
use crate::service::CostingService;
use crate::store::{InMemoryProjectStore, Page, PageRequest};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const ACTOR_HEADER: &str = "x-user-id";

/// Application state shared across requests.
pub struct AppState {
    pub service: CostingService,
}

type SharedState = State<Arc<AppState>>;

/// [`CostingError`] as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub CostingError);

impl From<CostingError> for ApiError {
    fn from(err: CostingError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub status: u16,
}

impl ApiError {
    pub const fn status_code(&self) -> StatusCode {
        match self.0 {
            CostingError::NotFound { .. } => StatusCode::NOT_FOUND,
            CostingError::Validation { .. } | CostingError::RateNotFound { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CostingError::InvalidTransition { .. }
            | CostingError::OptimisticLockConflict { .. } => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the API router around `service`.  Returns the router and a
/// handle to the state.
pub fn build_router(service: CostingService) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState { service });
    let router = Router::new()
        .route("/api/v1/projects", post(create_project).get(list_projects))
        .route("/api/v1/projects/:id", get(get_project))
        .route("/api/v1/projects/:id/details", put(update_details))
        .route(
            "/api/v1/projects/:id/staff-costs",
            put(replace_staff_costs)
                .post(add_staff_cost)
                .delete(clear_staff_costs),
        )
        .route("/api/v1/projects/:id/staff-costs/:index", delete(remove_staff_cost))
        .route(
            "/api/v1/projects/:id/non-staff-costs",
            put(replace_non_staff_costs)
                .post(add_non_staff_cost)
                .delete(clear_non_staff_costs),
        )
        .route(
            "/api/v1/projects/:id/non-staff-costs/:index",
            delete(remove_non_staff_cost),
        )
        .route("/api/v1/projects/:id/price", get(get_summary))
        .route("/api/v1/projects/:id/price/recompute", post(recompute))
        .route("/api/v1/projects/:id/breakdown", get(cost_breakdown))
        .route("/api/v1/projects/:id/approvals", get(approval_history))
        .route("/api/v1/projects/:id/approvals/submit", post(submit))
        .route("/api/v1/projects/:id/approvals/approve", post(approve))
        .route("/api/v1/projects/:id/approvals/reject", post(reject))
        .route("/api/v1/projects/:id/approvals/comment", post(comment))
        .route("/api/v1/meta/expense-catalog", get(list_expense_catalog))
        .with_state(state.clone());
    (router, state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectRequest {
    #[serde(default)]
    owner_user_id: Option<String>,
    #[serde(flatten)]
    details: ProjectDetails,
}

/// The owner is the `X-User-Id` caller unless the body names one.
async fn create_project(
    State(state): SharedState,
    headers: HeaderMap,
    Json(request): Json<CreateProjectRequest>,
) -> std::result::Result<(StatusCode, Json<Project>), ApiError> {
    let owner = first_present([header_actor(&headers), request.owner_user_id])
        .ok_or_else(|| CostingError::validation("ownerUserId", "owner is required"))?;
    let project = state.service.create_project(request.details, &owner)?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    owner: Option<String>,
    status: Option<ProjectStatus>,
    page: Option<usize>,
    size: Option<usize>,
}

async fn list_projects(State(state): SharedState, Query(params): Query<ListParams>) -> Json<Page<Project>> {
    let default = PageRequest::default();
    let page = PageRequest::new(
        params.page.unwrap_or(default.page),
        params.size.unwrap_or(default.size),
    );
    // The status filter takes precedence over the owner filter.
    let projects = match (params.status, params.owner) {
        (Some(status), _) => state.service.list_by_status(status, page),
        (None, Some(owner)) => state.service.list_by_owner(&owner, page),
        (None, None) => state.service.list_all(page),
    };
    Json(projects)
}

async fn get_project(State(state): SharedState, Path(id): Path<ProjectId>) -> ApiResult<Project> {
    Ok(Json(state.service.get_project(&id)?))
}

async fn update_details(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
    Json(details): Json<ProjectDetails>,
) -> ApiResult<Project> {
    Ok(Json(state.service.update_details(&id, details)?))
}

async fn replace_staff_costs(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
    Json(lines): Json<Vec<StaffCost>>,
) -> ApiResult<Project> {
    Ok(Json(state.service.replace_staff_costs(&id, lines)?))
}

async fn add_staff_cost(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
    Json(line): Json<StaffCost>,
) -> ApiResult<Project> {
    Ok(Json(state.service.add_staff_cost(&id, line)?))
}

async fn clear_staff_costs(State(state): SharedState, Path(id): Path<ProjectId>) -> ApiResult<Project> {
    Ok(Json(state.service.clear_staff_costs(&id)?))
}

async fn remove_staff_cost(
    State(state): SharedState,
    Path((id, index)): Path<(ProjectId, usize)>,
) -> ApiResult<Project> {
    Ok(Json(state.service.remove_staff_cost(&id, index)?))
}

async fn replace_non_staff_costs(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
    Json(lines): Json<Vec<NonStaffCost>>,
) -> ApiResult<Project> {
    Ok(Json(state.service.replace_non_staff_costs(&id, lines)?))
}

async fn add_non_staff_cost(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
    Json(line): Json<NonStaffCost>,
) -> ApiResult<Project> {
    Ok(Json(state.service.add_non_staff_cost(&id, line)?))
}

async fn clear_non_staff_costs(State(state): SharedState, Path(id): Path<ProjectId>) -> ApiResult<Project> {
    Ok(Json(state.service.clear_non_staff_costs(&id)?))
}

async fn remove_non_staff_cost(
    State(state): SharedState,
    Path((id, index)): Path<(ProjectId, usize)>,
) -> ApiResult<Project> {
    Ok(Json(state.service.remove_non_staff_cost(&id, index)?))
}

async fn recompute(State(state): SharedState, Path(id): Path<ProjectId>) -> ApiResult<PriceSummary> {
    Ok(Json(state.service.recompute(&id)?))
}

async fn get_summary(State(state): SharedState, Path(id): Path<ProjectId>) -> ApiResult<PriceSummary> {
    Ok(Json(state.service.get_summary(&id)?))
}

async fn cost_breakdown(State(state): SharedState, Path(id): Path<ProjectId>) -> ApiResult<CostBreakdown> {
    Ok(Json(state.service.cost_breakdown(&id)?))
}

/// Actor and comment, accepted as query parameters or a JSON body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionParams {
    actor_user_id: Option<String>,
    comment: Option<String>,
}

fn header_actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// First non-blank candidate.
fn first_present<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
}

/// Resolve `(actor, comment)`: actor from header, query, body; comment
/// from query, body.
fn resolve_action(
    headers: &HeaderMap,
    query: ActionParams,
    body: Option<ActionParams>,
) -> (Option<String>, Option<String>) {
    let body = body.unwrap_or_default();
    let actor = first_present([header_actor(headers), query.actor_user_id, body.actor_user_id]);
    let comment = first_present([query.comment, body.comment]);
    (actor, comment)
}

fn act(
    state: &AppState,
    action: ApprovalAction,
    id: ProjectId,
    headers: &HeaderMap,
    query: ActionParams,
    body: Option<Json<ActionParams>>,
) -> ApiResult<Project> {
    let (actor, comment) = resolve_action(headers, query, body.map(|Json(b)| b));
    let (actor, comment) = (actor.as_deref(), comment.as_deref());
    let service = &state.service;
    let project = match action {
        ApprovalAction::Submit => service.submit(&id, actor, comment),
        ApprovalAction::Approve => service.approve(&id, actor, comment),
        ApprovalAction::Reject => service.reject(&id, actor, comment),
        ApprovalAction::Comment => service.comment(&id, actor, comment),
    }?;
    Ok(Json(project))
}

async fn submit(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
    Query(query): Query<ActionParams>,
    body: Option<Json<ActionParams>>,
) -> ApiResult<Project> {
    act(&state, ApprovalAction::Submit, id, &headers, query, body)
}

async fn approve(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
    Query(query): Query<ActionParams>,
    body: Option<Json<ActionParams>>,
) -> ApiResult<Project> {
    act(&state, ApprovalAction::Approve, id, &headers, query, body)
}

async fn reject(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
    Query(query): Query<ActionParams>,
    body: Option<Json<ActionParams>>,
) -> ApiResult<Project> {
    act(&state, ApprovalAction::Reject, id, &headers, query, body)
}

async fn comment(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
    headers: HeaderMap,
    Query(query): Query<ActionParams>,
    body: Option<Json<ActionParams>>,
) -> ApiResult<Project> {
    act(&state, ApprovalAction::Comment, id, &headers, query, body)
}

async fn approval_history(
    State(state): SharedState,
    Path(id): Path<ProjectId>,
) -> ApiResult<Vec<ApprovalEntry>> {
    Ok(Json(state.service.approval_history(&id)?))
}

async fn list_expense_catalog() -> Json<ExpenseCatalog> {
    Json(expense_catalog())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

/// Launch the API server.  Loads the rate tables from the configured
/// directory, binds to the configured address and runs until
/// interrupted.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let tables = RateTables::load_from_dir(&config.rate_dir)
        .with_context(|| format!("loading rate tables from {}", config.rate_dir.display()))?;
    let service = CostingService::new(
        Arc::new(InMemoryProjectStore::new()),
        Arc::new(RateCatalog::new(tables)),
        config.pricing.clone(),
    )
    .with_recompute_on_submit(config.recompute_on_submit);
    let (router, _state) = build_router(service);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "costing engine listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated")
}
