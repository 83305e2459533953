use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{ContentType, DisplayScore, RankedItem, StarRating},
    services::{
        Choice, InvariantViolation, MutationOutcome, PlacementRequest, PlacementSession,
        RepairReport, Resolution,
    },
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct BeginPlacementRequest {
    pub content_item_id: String,
    pub star_rating: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdvancePlacementRequest {
    pub session: PlacementSession,
    pub choice: Choice,
}

#[derive(Debug, Deserialize)]
pub struct CommitPlacementRequest {
    pub session: PlacementSession,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub from_position: u32,
    pub to_position: u32,
}

/// The comparison the client should show next
#[derive(Debug, Serialize)]
pub struct ComparisonView {
    pub new_item: String,
    pub existing_item: String,
    pub existing_score: DisplayScore,
}

/// A placement session plus what to do with it next.
///
/// Exactly one of `comparison` and `resolution` is set.
#[derive(Debug, Serialize)]
pub struct PlacementResponse {
    pub session: PlacementSession,
    pub comparison: Option<ComparisonView>,
    pub resolution: Option<Resolution>,
}

impl From<PlacementSession> for PlacementResponse {
    fn from(session: PlacementSession) -> Self {
        let comparison = session.candidate_pair().map(|pair| ComparisonView {
            new_item: pair.new_item.to_string(),
            existing_item: pair.existing.content_item_id.clone(),
            existing_score: pair.existing.display_score,
        });
        let resolution = session.resolution();
        Self {
            session,
            comparison,
            resolution,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RankingsResponse {
    pub user_id: Uuid,
    pub content_type: ContentType,
    pub items: Vec<RankedItem>,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsResponse {
    pub item_count: usize,
    pub consistent: bool,
    pub violations: Vec<InvariantViolation>,
}

fn parse_content_type(raw: &str) -> AppResult<ContentType> {
    raw.parse()
}

/// A client-held session may only be committed to the list it was started on
fn ensure_session_matches(
    session: &PlacementSession,
    user_id: Uuid,
    content_type: ContentType,
) -> AppResult<()> {
    if session.user_id != user_id || session.content_type != content_type {
        return Err(AppError::InvalidInput(
            "session belongs to a different list".to_string(),
        ));
    }
    Ok(())
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// The user's ordered list for one content type
///
/// `GET /api/v1/users/:user_id/rankings/:content_type`, best title first. An unknown
/// content type is a 400.
pub async fn list_rankings(
    State(state): State<AppState>,
    Path((user_id, content_type)): Path<(Uuid, String)>,
) -> AppResult<Json<RankingsResponse>> {
    let content_type = parse_content_type(&content_type)?;
    let items = state.engine.list(user_id, content_type).await?;

    Ok(Json(RankingsResponse {
        user_id,
        content_type,
        items,
    }))
}

/// Reports every broken list invariant without changing anything
pub async fn diagnostics(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((user_id, content_type)): Path<(Uuid, String)>,
) -> AppResult<Json<DiagnosticsResponse>> {
    let content_type = parse_content_type(&content_type)?;
    let items = state.engine.list(user_id, content_type).await?;
    let violations = crate::services::ranking::check_invariants(&items);

    if !violations.is_empty() {
        tracing::warn!(
            request_id = %request_id,
            user_id = %user_id,
            content_type = %content_type,
            violations = violations.len(),
            "List invariants broken"
        );
    }

    Ok(Json(DiagnosticsResponse {
        item_count: items.len(),
        consistent: violations.is_empty(),
        violations,
    }))
}

/// Starts placing a newly rated (or re-rated) title
///
/// `POST .../placements` with `{ "content_item_id", "star_rating" }`.
///
/// The response carries the session the client must send back with every answer,
/// plus either the first comparison to show or, when the title's tier is empty, the
/// final resolution.
///
/// Errors:
/// - 400 for a star rating outside 1..=5 or an empty id
/// - 404 when the catalogue does not know the title
pub async fn begin_placement(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((user_id, content_type)): Path<(Uuid, String)>,
    Json(request): Json<BeginPlacementRequest>,
) -> AppResult<Json<PlacementResponse>> {
    let content_type = parse_content_type(&content_type)?;
    let star_rating = StarRating::try_from(request.star_rating)?;
    if request.content_item_id.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "content_item_id must not be empty".to_string(),
        ));
    }

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        content_type = %content_type,
        content_item_id = %request.content_item_id,
        star_rating = %star_rating,
        "Beginning placement"
    );

    let session = state
        .engine
        .begin_placement(PlacementRequest {
            user_id,
            content_type,
            content_item_id: request.content_item_id,
            star_rating,
        })
        .await?;

    Ok(Json(PlacementResponse::from(session)))
}

/// Applies one comparison answer to a client-held session
///
/// `POST /api/v1/placements/advance`. Nothing is read from or written to the store;
/// the session is checked for consistency and advanced by one step. A session that
/// is already complete, or whose counters were altered, is a 400.
pub async fn advance_placement(
    Json(request): Json<AdvancePlacementRequest>,
) -> AppResult<Json<PlacementResponse>> {
    let session = request.session.advance(request.choice)?;
    Ok(Json(PlacementResponse::from(session)))
}

/// Writes a finished placement to the list
///
/// `POST .../items` with `{ "session" }`, answering 201 with the stored item, any
/// warnings, and the repair report.
///
/// Errors:
/// - 400 when the session is unfinished, inconsistent, or from another list
/// - 409 when the list changed since the session's snapshot was read
/// - 503 when the write could not be saved; the list is left as it was
pub async fn commit_placement(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((user_id, content_type)): Path<(Uuid, String)>,
    Json(request): Json<CommitPlacementRequest>,
) -> AppResult<(StatusCode, Json<MutationOutcome>)> {
    let content_type = parse_content_type(&content_type)?;
    ensure_session_matches(&request.session, user_id, content_type)?;

    let outcome = state.engine.commit(&request.session).await?;

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        content_item_id = %outcome.item.content_item_id,
        position = outcome.item.rank_position,
        score = %outcome.item.display_score,
        warnings = outcome.warnings.len(),
        "Placement committed"
    );

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Drag-and-drop reorder
///
/// `POST .../moves` with `{ "from_position", "to_position" }`, both 1-based. The
/// moved item may come back with a different star rating when its new neighbours
/// require one.
pub async fn move_item(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((user_id, content_type)): Path<(Uuid, String)>,
    Json(request): Json<MoveRequest>,
) -> AppResult<Json<MutationOutcome>> {
    let content_type = parse_content_type(&content_type)?;

    let outcome = state
        .engine
        .move_item(
            user_id,
            content_type,
            request.from_position,
            request.to_position,
        )
        .await?;

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        from_position = request.from_position,
        to_position = request.to_position,
        star_rating = %outcome.item.star_rating,
        "Item moved"
    );

    Ok(Json(outcome))
}

/// `DELETE .../items/:content_item_id`; 404 when the title is not in the list
pub async fn remove_item(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((user_id, content_type, content_item_id)): Path<(Uuid, String, String)>,
) -> AppResult<Json<RankedItem>> {
    let content_type = parse_content_type(&content_type)?;
    let removed = state
        .engine
        .remove(user_id, content_type, &content_item_id)
        .await?;

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        content_item_id = %content_item_id,
        "Item removed"
    );

    Ok(Json(removed))
}

/// Runs the score repair pass on demand
pub async fn repair(
    State(state): State<AppState>,
    Path((user_id, content_type)): Path<(Uuid, String)>,
) -> AppResult<Json<RepairReport>> {
    let content_type = parse_content_type(&content_type)?;
    let report = state.engine.repair(user_id, content_type).await?;
    Ok(Json(report))
}
