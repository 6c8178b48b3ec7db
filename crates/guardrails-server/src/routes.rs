//! HTTP routes
//!
//! Authentication happens upstream. The caller's identity arrives in the
//! `X-User-Id` and `X-Actor-Role` headers and is always paired with the
//! org named in the path, so a request can only ever act on that org.

use axum::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use guardrails_core::{
    Actor, OrgId, PatternType, RecordedViolation, Role, Rule, RuleDraft, RuleId, RulePatch,
};
use guardrails_policy::{
    PackInstallReport, PatternPreview, RuleSuggestion, SuggestionDraft, SuggestionStatus,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::scan::{scan_content, ScanRequest, ScanResponse};
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-actor-role";

const DEFAULT_RECENT_LIMIT: usize = 50;
const MAX_RECENT_LIMIT: usize = 500;

/// Create the service router
pub fn create_router(state: AppState) -> Router {
    // JSON escaping can expand content; the scan handler enforces the exact limit
    let body_limit = state
        .max_content_bytes
        .saturating_mul(2)
        .saturating_add(64 * 1024);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/v1/packs", get(list_packs))
        .route("/v1/orgs/:org_id/scan", post(scan))
        .route("/v1/orgs/:org_id/rules", get(list_rules).post(create_rule))
        .route("/v1/orgs/:org_id/rules/preview", post(preview_pattern))
        .route(
            "/v1/orgs/:org_id/rules/:rule_id",
            get(get_rule).patch(update_rule).delete(delete_rule),
        )
        .route(
            "/v1/orgs/:org_id/suggestions",
            get(list_suggestions).post(submit_suggestion),
        )
        .route(
            "/v1/orgs/:org_id/suggestions/:suggestion_id/approve",
            post(approve_suggestion),
        )
        .route(
            "/v1/orgs/:org_id/suggestions/:suggestion_id/reject",
            post(reject_suggestion),
        )
        .route("/v1/orgs/:org_id/packs/:pack/install", post(install_pack))
        .route("/v1/orgs/:org_id/violations/count", get(count_violations))
        .route("/v1/orgs/:org_id/violations/recent", get(recent_violations))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Caller identity taken from request headers
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    /// Bind the identity to the org named in the path
    pub fn in_org(self, org_id: String) -> Actor {
        Actor::new(OrgId::from(org_id), self.user_id, self.role)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &'static str| -> Result<Option<String>, AppError> {
            match parts.headers.get(name) {
                None => Ok(None),
                Some(value) => value
                    .to_str()
                    .map(|v| Some(v.trim().to_string()))
                    .map_err(|_| AppError::MissingIdentity(name)),
            }
        };

        let user_id = header(USER_ID_HEADER)?
            .filter(|id| !id.is_empty())
            .ok_or(AppError::MissingIdentity(USER_ID_HEADER))?;

        // No role header means the least privileged role
        let role = match header(ROLE_HEADER)? {
            Some(role) => role.parse::<Role>()?,
            None => Role::Member,
        };

        Ok(Self { user_id, role })
    }
}

// ---- service ----

async fn health() -> &'static str {
    "OK"
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PackSummary {
    pub name: String,
    pub title: String,
    pub description: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulation: Option<String>,
    pub rule_count: usize,
}

async fn list_packs(State(state): State<AppState>) -> Json<Vec<PackSummary>> {
    let packs = state
        .lifecycle
        .catalog()
        .packs()
        .iter()
        .map(|p| PackSummary {
            name: p.name.clone(),
            title: p.title.clone(),
            description: p.description.clone(),
            version: p.version.clone(),
            regulation: p.regulation.clone(),
            rule_count: p.rules.len(),
        })
        .collect();
    Json(packs)
}

// ---- scanning ----

async fn scan(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    identity: Identity,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanResponse>, AppError> {
    let Json(request) = payload?;
    let actor = identity.in_org(org_id);
    Ok(Json(scan_content(&state, &actor, request).await?))
}

// ---- rules ----

async fn list_rules(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    identity: Identity,
) -> Result<Json<Vec<Rule>>, AppError> {
    let actor = identity.in_org(org_id);
    Ok(Json(state.lifecycle.list_rules(&actor)?))
}

async fn create_rule(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    identity: Identity,
    payload: Result<Json<RuleDraft>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(draft) = payload?;
    let actor = identity.in_org(org_id);
    let rule = state.lifecycle.create_rule(&actor, draft)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub pattern: String,
    pub pattern_type: PatternType,
    pub sample: String,
}

async fn preview_pattern(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    identity: Identity,
    payload: Result<Json<PreviewRequest>, JsonRejection>,
) -> Result<Json<PatternPreview>, AppError> {
    let Json(req) = payload?;
    let actor = identity.in_org(org_id);
    let preview = state
        .lifecycle
        .preview_pattern(&actor, &req.pattern, req.pattern_type, &req.sample)?;
    Ok(Json(preview))
}

async fn get_rule(
    State(state): State<AppState>,
    Path((org_id, rule_id)): Path<(String, String)>,
    identity: Identity,
) -> Result<Json<Rule>, AppError> {
    let actor = identity.in_org(org_id);
    Ok(Json(state.lifecycle.get_rule(&actor, &RuleId::from(rule_id))?))
}

async fn update_rule(
    State(state): State<AppState>,
    Path((org_id, rule_id)): Path<(String, String)>,
    identity: Identity,
    payload: Result<Json<RulePatch>, JsonRejection>,
) -> Result<Json<Rule>, AppError> {
    let Json(patch) = payload?;
    let actor = identity.in_org(org_id);
    let rule = state
        .lifecycle
        .update_rule(&actor, &RuleId::from(rule_id), patch)?;
    Ok(Json(rule))
}

async fn delete_rule(
    State(state): State<AppState>,
    Path((org_id, rule_id)): Path<(String, String)>,
    identity: Identity,
) -> Result<Json<Rule>, AppError> {
    let actor = identity.in_org(org_id);
    Ok(Json(state.lifecycle.delete_rule(&actor, &RuleId::from(rule_id))?))
}

// ---- suggestions ----

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub status: Option<SuggestionStatus>,
}

async fn list_suggestions(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    identity: Identity,
    query: Result<Query<SuggestionQuery>, QueryRejection>,
) -> Result<Json<Vec<RuleSuggestion>>, AppError> {
    let Query(query) = query?;
    let actor = identity.in_org(org_id);
    Ok(Json(state.lifecycle.list_suggestions(&actor, query.status)?))
}

async fn submit_suggestion(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    identity: Identity,
    payload: Result<Json<SuggestionDraft>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(draft) = payload?;
    let actor = identity.in_org(org_id);
    let suggestion = state.lifecycle.submit_suggestion(&actor, draft)?;
    Ok((StatusCode::CREATED, Json(suggestion)))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub pattern: String,
    pub pattern_type: PatternType,
}

async fn approve_suggestion(
    State(state): State<AppState>,
    Path((org_id, suggestion_id)): Path<(String, String)>,
    identity: Identity,
    payload: Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let actor = identity.in_org(org_id);
    let rule = state
        .lifecycle
        .approve_suggestion(&actor, &suggestion_id, req.pattern, req.pattern_type)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

async fn reject_suggestion(
    State(state): State<AppState>,
    Path((org_id, suggestion_id)): Path<(String, String)>,
    identity: Identity,
    payload: Option<Json<RejectRequest>>,
) -> Result<Json<RuleSuggestion>, AppError> {
    let reason = payload.and_then(|Json(req)| req.reason);
    let actor = identity.in_org(org_id);
    Ok(Json(
        state
            .lifecycle
            .reject_suggestion(&actor, &suggestion_id, reason)?,
    ))
}

// ---- packs ----

async fn install_pack(
    State(state): State<AppState>,
    Path((org_id, pack)): Path<(String, String)>,
    identity: Identity,
) -> Result<Json<PackInstallReport>, AppError> {
    let actor = identity.in_org(org_id);
    let entitlement = state.orgs.entitlement(&actor.org_id);
    Ok(Json(state.lifecycle.install_pack(&actor, &pack, &entitlement)?))
}

// ---- violations ----

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    pub since: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViolationCount {
    pub org_id: OrgId,
    pub since: DateTime<Utc>,
    pub count: u64,
}

async fn count_violations(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    identity: Identity,
    query: Result<Query<CountQuery>, QueryRejection>,
) -> Result<Json<ViolationCount>, AppError> {
    let Query(query) = query?;
    let actor = identity.in_org(org_id);
    actor.require_privileged("read violations")?;

    let count = state.recorder.count_since(&actor.org_id, query.since).await?;
    Ok(Json(ViolationCount {
        org_id: actor.org_id,
        since: query.since,
        count,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

async fn recent_violations(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    identity: Identity,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<Vec<RecordedViolation>>, AppError> {
    let Query(query) = query?;
    let actor = identity.in_org(org_id);
    actor.require_privileged("read violations")?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    Ok(Json(state.recorder.recent(&actor.org_id, limit).await?))
}
