//! REST handlers.
//!
//! Handlers validate and translate; the actual behavior lives in the
//! assigner, recorder, and reporter. Tracking endpoints return
//! `{"success": true}` on the happy path, and the exit beacon returns 200
//! unconditionally because `navigator.sendBeacon` never reads the response.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::auth::{authorize_lp, AuthedUser};
use super::{cookie, SharedState};
use crate::assign::AssignmentOverrides;
use crate::error::{ApiError, ApiResult};
use crate::storage::{
    Component, ComponentStats, EventKind, LandingPage, TestResult, Variant, VariantLabel,
    VisitorSession,
};
use crate::tracking::TrackEventParams;

/// Standard tracking acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackResponse {
    pub success: bool,
}

impl TrackResponse {
    fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// Liveness probe
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Public LP delivery + variant assignment
// ---------------------------------------------------------------------------

/// One rendered component in the public LP response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicComponent {
    pub id: String,
    pub kind: String,
    pub position: i64,
    pub variant: VariantLabel,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js: Option<String>,
}

/// Public LP response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLpResponse {
    pub lp_id: String,
    pub session_id: String,
    pub components: Vec<PublicComponent>,
}

/// Serve a landing page with per-session variant assignments.
///
/// Honors `variant=<a|b>` and `variant_<componentId>=<a|b>` overrides and
/// re-issues the `lp_session` cookie with the updated assignment map.
pub async fn public_lp(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<PublicLpResponse>)> {
    let lp = state
        .storage
        .get_landing_page(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("landing page", id.as_str()))?;

    let components = state.storage.get_lp_components(&lp.id).await?;

    let (mut session, is_new) = resolve_session(&state, &jar, &lp.id).await?;

    let overrides = AssignmentOverrides::from_query(&params);
    {
        // ThreadRng is not Send; finish all draws before the next await.
        let mut rng = rand::thread_rng();
        for component in &components {
            state
                .assigner
                .assign(&mut session, &component.id, &overrides, &mut rng);
        }
    }

    let mut rendered = Vec::with_capacity(components.len());
    for component in &components {
        let Some(label) = session.assignment_for(&component.id) else {
            continue;
        };
        // Challenger without content yet falls back to the incumbent.
        let variant = match state
            .storage
            .get_component_variant(&component.id, label)
            .await?
        {
            Some(v) => Some(v),
            None => {
                state
                    .storage
                    .get_component_variant(&component.id, label.other())
                    .await?
            }
        };
        let Some(variant) = variant else {
            debug!(component_id = %component.id, "Component has no variants, skipped");
            continue;
        };

        rendered.push(PublicComponent {
            id: component.id.clone(),
            kind: component.kind.clone(),
            position: component.position,
            variant: label,
            html: variant.html,
            css: variant.css,
            js: variant.js,
        });
    }

    session.last_activity_at = Utc::now();
    if is_new {
        state.storage.create_session(&session).await?;
    } else {
        state.storage.update_session(&session).await?;
    }

    let jar = jar.add(cookie::issue(
        &session,
        state.config.tracking.session_cookie_max_age_days,
    ));

    Ok((
        jar,
        Json(PublicLpResponse {
            lp_id: lp.id,
            session_id: session.id,
            components: rendered,
        }),
    ))
}

/// Resolve the visitor session from the cookie, or start a fresh one.
///
/// A malformed cookie reads as absent. A valid cookie whose server-side
/// record is gone (or belongs to another page) is rebuilt from the cookie so
/// the visitor keeps their assignments.
async fn resolve_session(
    state: &SharedState,
    jar: &CookieJar,
    lp_id: &str,
) -> ApiResult<(VisitorSession, bool)> {
    let Some(cookie_state) = cookie::decode(jar) else {
        return Ok((VisitorSession::new(lp_id), true));
    };

    match state.storage.get_session(&cookie_state.id).await? {
        Some(session) if session.lp_id == lp_id => Ok((session, false)),
        Some(_) => Ok((VisitorSession::new(lp_id), true)),
        None => {
            let mut session = VisitorSession::new(lp_id);
            session.id = cookie_state.id;
            session.started_at = cookie_state.started_at;
            session.assignments = cookie_state.variants;
            session.device = cookie_state.device;
            session.utm_source = cookie_state.source;
            session.utm_campaign = cookie_state.campaign;
            Ok((session, true))
        }
    }
}

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

async fn record_as(
    state: &SharedState,
    mut params: TrackEventParams,
    kind: EventKind,
) -> ApiResult<Json<TrackResponse>> {
    params.event_type = Some(kind.to_string());
    state.recorder.record(params).await.map_err(ApiError::from)?;
    Ok(TrackResponse::ok())
}

/// `POST /api/tracking/pageview`
pub async fn track_pageview(
    State(state): State<SharedState>,
    Json(params): Json<TrackEventParams>,
) -> ApiResult<Json<TrackResponse>> {
    record_as(&state, params, EventKind::Pageview).await
}

/// `POST /api/tracking/component`
pub async fn track_component(
    State(state): State<SharedState>,
    Json(params): Json<TrackEventParams>,
) -> ApiResult<Json<TrackResponse>> {
    record_as(&state, params, EventKind::ComponentView).await
}

/// `POST /api/tracking/conversion`
pub async fn track_conversion(
    State(state): State<SharedState>,
    Json(params): Json<TrackEventParams>,
) -> ApiResult<Json<TrackResponse>> {
    record_as(&state, params, EventKind::Conversion).await
}

/// `POST /api/tracking/scroll`
pub async fn track_scroll(
    State(state): State<SharedState>,
    Json(params): Json<TrackEventParams>,
) -> ApiResult<Json<TrackResponse>> {
    record_as(&state, params, EventKind::ScrollDepth).await
}

/// `POST /api/tracking/event` - free-form event type, supplied by the body.
pub async fn track_event(
    State(state): State<SharedState>,
    Json(params): Json<TrackEventParams>,
) -> ApiResult<Json<TrackResponse>> {
    state.recorder.record(params).await.map_err(ApiError::from)?;
    Ok(TrackResponse::ok())
}

/// `POST /api/tracking/exit` - beacon contract: always 200.
///
/// The body is parsed leniently and handed to the bounded queue; a beacon
/// the browser fires during unload must never see an error or be retried.
pub async fn track_exit(State(state): State<SharedState>, body: Bytes) -> Json<TrackResponse> {
    match serde_json::from_slice::<TrackEventParams>(&body) {
        Ok(params) => {
            state
                .beacons
                .submit(params.with_event_type(EventKind::Exit.to_string()));
        }
        Err(e) => {
            debug!(error = %e, "Unparseable exit beacon ignored");
        }
    }
    TrackResponse::ok()
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Query string for the stats endpoints.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(rename = "lpId")]
    pub lp_id: Option<String>,
}

impl StatsQuery {
    fn require_lp_id(&self) -> ApiResult<&str> {
        self.lp_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::validation("lpId", "is required"))
    }
}

/// `GET /api/tracking/stats?lpId=` - traffic summary from the event log.
pub async fn lp_stats(
    State(state): State<SharedState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let lp_id = query.require_lp_id()?;
    let summary = state.storage.lp_traffic_summary(lp_id).await?;
    Ok(Json(json!({ "lpId": lp_id, "summary": summary })))
}

/// Per-variant counters of one component.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CounterSet {
    pub views: i64,
    pub clicks: i64,
    pub conversions: i64,
}

impl From<&ComponentStats> for CounterSet {
    fn from(stats: &ComponentStats) -> Self {
        Self {
            views: stats.views,
            clicks: stats.clicks,
            conversions: stats.conversions,
        }
    }
}

/// One component's counters in the stats response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatsEntry {
    pub component_id: String,
    pub variant_a: CounterSet,
    pub variant_b: CounterSet,
}

/// `GET /api/tracking/stats/components?lpId=` - denormalized dashboard
/// counters.
pub async fn component_stats(
    State(state): State<SharedState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let lp_id = query.require_lp_id()?;
    let rows = state.storage.get_lp_component_stats(lp_id).await?;

    // Rows arrive ordered by component position, then variant.
    let mut entries: Vec<ComponentStatsEntry> = Vec::new();
    for row in &rows {
        if entries
            .last()
            .map_or(true, |e| e.component_id != row.component_id)
        {
            entries.push(ComponentStatsEntry {
                component_id: row.component_id.clone(),
                variant_a: CounterSet::default(),
                variant_b: CounterSet::default(),
            });
        }
        if let Some(entry) = entries.last_mut() {
            match row.variant {
                VariantLabel::A => entry.variant_a = row.into(),
                VariantLabel::B => entry.variant_b = row.into(),
            }
        }
    }

    Ok(Json(json!({ "lpId": lp_id, "components": entries })))
}

/// `GET /api/tracking/stats/report/{testId}` - test-result snapshot.
pub async fn test_report(
    State(state): State<SharedState>,
    Path(test_id): Path<String>,
) -> ApiResult<Json<TestResult>> {
    let result = state
        .storage
        .get_test_result(&test_id)
        .await?
        .ok_or_else(|| ApiError::not_found("test", test_id.as_str()))?;
    Ok(Json(result))
}

// ---------------------------------------------------------------------------
// Winner application
// ---------------------------------------------------------------------------

/// Body of the apply-winner request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyWinnerRequest {
    pub component_id: String,
    pub variant_id: String,
}

/// `POST /api/tests/{id}/apply-winner` - one-way Decided -> Applied
/// transition, owner only.
pub async fn apply_winner(
    State(state): State<SharedState>,
    AuthedUser(user): AuthedUser,
    Path(test_id): Path<String>,
    Json(request): Json<ApplyWinnerRequest>,
) -> ApiResult<Json<TestResult>> {
    let result = state
        .storage
        .get_test_result(&test_id)
        .await?
        .ok_or_else(|| ApiError::not_found("test", test_id.as_str()))?;

    authorize_lp(state.storage.as_ref(), &result.lp_id, &user).await?;

    let applied = state
        .reporter
        .apply_winner(&test_id, &request.component_id, &request.variant_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(applied))
}

// ---------------------------------------------------------------------------
// Dashboard CRUD
// ---------------------------------------------------------------------------

/// Body for creating a landing page.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLpRequest {
    pub name: String,
}

/// `POST /api/lps`
pub async fn create_lp(
    State(state): State<SharedState>,
    AuthedUser(user): AuthedUser,
    Json(request): Json<CreateLpRequest>,
) -> ApiResult<(StatusCode, Json<LandingPage>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError::validation("name", "is required"));
    }

    let lp = LandingPage::new(&user.id, request.name.trim());
    state.storage.create_landing_page(&lp).await?;
    Ok((StatusCode::CREATED, Json(lp)))
}

/// `GET /api/lps`
pub async fn list_lps(
    State(state): State<SharedState>,
    AuthedUser(user): AuthedUser,
) -> ApiResult<Json<Vec<LandingPage>>> {
    let pages = state.storage.list_landing_pages(&user.id).await?;
    Ok(Json(pages))
}

/// Landing page with its components.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LpDetail {
    #[serde(flatten)]
    pub lp: LandingPage,
    pub components: Vec<Component>,
}

/// `GET /api/lps/{id}`
pub async fn get_lp(
    State(state): State<SharedState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<LpDetail>> {
    let lp = authorize_lp(state.storage.as_ref(), &id, &user).await?;
    let components = state.storage.get_lp_components(&lp.id).await?;
    Ok(Json(LpDetail { lp, components }))
}

/// `DELETE /api/lps/{id}`
pub async fn delete_lp(
    State(state): State<SharedState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TrackResponse>> {
    let lp = authorize_lp(state.storage.as_ref(), &id, &user).await?;
    state.storage.delete_landing_page(&lp.id).await?;
    Ok(TrackResponse::ok())
}

/// Body for creating a component.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComponentRequest {
    pub kind: String,
    pub position: i64,
    #[serde(default)]
    pub generation_params: Option<serde_json::Value>,
    /// Initial incumbent markup; when present, variant "a" is created too.
    #[serde(default)]
    pub html: Option<String>,
}

/// `POST /api/lps/{id}/components`
pub async fn create_component(
    State(state): State<SharedState>,
    AuthedUser(user): AuthedUser,
    Path(lp_id): Path<String>,
    Json(request): Json<CreateComponentRequest>,
) -> ApiResult<(StatusCode, Json<Component>)> {
    let lp = authorize_lp(state.storage.as_ref(), &lp_id, &user).await?;

    if request.kind.trim().is_empty() {
        return Err(ApiError::validation("kind", "is required"));
    }

    let mut component = Component::new(&lp.id, request.kind.trim(), request.position);
    if let Some(params) = request.generation_params {
        component = component.with_generation_params(params);
    }
    state.storage.create_component(&component).await?;

    if let Some(html) = request.html {
        let incumbent = Variant::new(&component.id, VariantLabel::A, html);
        state.storage.create_variant(&incumbent).await?;
    }

    Ok((StatusCode::CREATED, Json(component)))
}

/// Body for creating a variant.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVariantRequest {
    pub label: VariantLabel,
    pub html: String,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub js: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// `POST /api/components/{id}/variants`
pub async fn create_variant(
    State(state): State<SharedState>,
    AuthedUser(user): AuthedUser,
    Path(component_id): Path<String>,
    Json(request): Json<CreateVariantRequest>,
) -> ApiResult<(StatusCode, Json<Variant>)> {
    let component = state
        .storage
        .get_component(&component_id)
        .await?
        .ok_or_else(|| ApiError::not_found("component", component_id.as_str()))?;
    authorize_lp(state.storage.as_ref(), &component.lp_id, &user).await?;

    let mut variant = Variant::new(&component.id, request.label, request.html);
    variant.css = request.css;
    variant.js = request.js;
    variant.metadata = request.metadata;
    state.storage.create_variant(&variant).await?;

    Ok((StatusCode::CREATED, Json(variant)))
}

/// `POST /api/components/{id}/generate-variant` - draft the challenger via
/// the generation API and store it as variant "b".
pub async fn generate_variant(
    State(state): State<SharedState>,
    AuthedUser(user): AuthedUser,
    Path(component_id): Path<String>,
) -> ApiResult<Json<Variant>> {
    let component = state
        .storage
        .get_component(&component_id)
        .await?
        .ok_or_else(|| ApiError::not_found("component", component_id.as_str()))?;
    authorize_lp(state.storage.as_ref(), &component.lp_id, &user).await?;

    let client = state.generator.as_ref().ok_or_else(|| ApiError::Unavailable {
        message: "variant generation is not configured".to_string(),
    })?;

    let incumbent = state
        .storage
        .get_component_variant(&component.id, VariantLabel::A)
        .await?
        .ok_or_else(|| ApiError::not_found("variant", "a"))?;

    let draft = client
        .draft_variant(&component, &incumbent.html)
        .await
        .map_err(|e| ApiError::Unavailable {
            message: e.to_string(),
        })?;
    let metadata = draft.rationale.map(|r| json!({ "rationale": r }));

    let challenger = match state
        .storage
        .get_component_variant(&component.id, VariantLabel::B)
        .await?
    {
        Some(mut existing) => {
            existing.html = draft.html;
            existing.css = draft.css;
            existing.js = draft.js;
            existing.metadata = metadata;
            existing.updated_at = Utc::now();
            state.storage.update_variant_content(&existing).await?;
            existing
        }
        None => {
            let mut variant = Variant::new(&component.id, VariantLabel::B, draft.html);
            variant.css = draft.css;
            variant.js = draft.js;
            variant.metadata = metadata;
            state.storage.create_variant(&variant).await?;
            variant
        }
    };

    Ok(Json(challenger))
}
