use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::battle::{
        BattleListQuery, BattleSummary, CreateBattleRequest, PerformanceSummary,
        QuickChallengeRequest, UpdateRepsRequest,
    },
    error::AppError,
    routes::auth::CallerIdentity,
    services::battle_service,
    state::SharedState,
};

/// Routes handling the battle lifecycle and rep submissions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/battles", post(create_battle).get(list_battles))
        .route("/battles/quick", post(quick_challenge))
        .route("/battles/{id}", get(get_battle))
        .route("/battles/{id}/performances", get(get_performances))
        .route("/battles/{id}/accept", post(accept_battle))
        .route("/battles/{id}/decline", post(decline_battle))
        .route("/battles/{id}/start", post(start_battle))
        .route("/battles/{id}/reps", put(update_reps))
        .route("/battles/{id}/complete", post(complete_battle))
        .route("/battles/{id}/cancel", post(cancel_battle))
}

/// Challenge a specific opponent to a new battle.
#[utoipa::path(
    post,
    path = "/battles",
    tag = "battle",
    request_body = CreateBattleRequest,
    responses(
        (status = 200, description = "Battle created", body = BattleSummary),
        (status = 400, description = "Invalid input"),
    )
)]
pub async fn create_battle(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Json(payload): Json<CreateBattleRequest>,
) -> Result<Json<BattleSummary>, AppError> {
    let summary = battle_service::create_battle(&state, caller.0, payload).await?;
    Ok(Json(summary))
}

/// Challenge an automatically discovered nearby opponent.
#[utoipa::path(
    post,
    path = "/battles/quick",
    tag = "battle",
    request_body = QuickChallengeRequest,
    responses(
        (status = 200, description = "Battle created", body = BattleSummary),
        (status = 404, description = "No opponent available"),
    )
)]
pub async fn quick_challenge(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Json(payload): Json<QuickChallengeRequest>,
) -> Result<Json<BattleSummary>, AppError> {
    let summary = battle_service::create_quick_challenge(&state, caller.0, payload).await?;
    Ok(Json(summary))
}

/// List the caller's battles, optionally filtered by status.
#[utoipa::path(
    get,
    path = "/battles",
    tag = "battle",
    params(BattleListQuery),
    responses((status = 200, description = "Battles of the caller", body = [BattleSummary]))
)]
pub async fn list_battles(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Query(query): Query<BattleListQuery>,
) -> Result<Json<Vec<BattleSummary>>, AppError> {
    let battles = battle_service::get_user_battles(&state, caller.0, query.status).await?;
    Ok(Json(battles))
}

/// Fetch one battle.
#[utoipa::path(
    get,
    path = "/battles/{id}",
    tag = "battle",
    params(("id" = Uuid, Path, description = "Battle identifier")),
    responses(
        (status = 200, description = "Battle", body = BattleSummary),
        (status = 404, description = "No such battle"),
    )
)]
pub async fn get_battle(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<BattleSummary>, AppError> {
    let summary = battle_service::get_battle(&state, caller.0, id).await?;
    Ok(Json(summary))
}

/// Fetch the per-contestant rep records of one battle.
#[utoipa::path(
    get,
    path = "/battles/{id}/performances",
    tag = "battle",
    params(("id" = Uuid, Path, description = "Battle identifier")),
    responses(
        (status = 200, description = "Performances", body = [PerformanceSummary]),
        (status = 404, description = "No such battle"),
    )
)]
pub async fn get_performances(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PerformanceSummary>>, AppError> {
    let performances = battle_service::get_battle_performances(&state, caller.0, id).await?;
    Ok(Json(performances))
}

/// Accept a pending challenge (opponent only).
#[utoipa::path(
    post,
    path = "/battles/{id}/accept",
    tag = "battle",
    params(("id" = Uuid, Path, description = "Battle identifier")),
    responses(
        (status = 200, description = "Battle accepted", body = BattleSummary),
        (status = 403, description = "Caller is not the opponent"),
        (status = 409, description = "Battle is not pending"),
    )
)]
pub async fn accept_battle(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<BattleSummary>, AppError> {
    let summary = battle_service::accept_battle(&state, caller.0, id).await?;
    Ok(Json(summary))
}

/// Decline a pending challenge (opponent only).
#[utoipa::path(
    post,
    path = "/battles/{id}/decline",
    tag = "battle",
    params(("id" = Uuid, Path, description = "Battle identifier")),
    responses(
        (status = 200, description = "Battle declined", body = BattleSummary),
        (status = 403, description = "Caller is not the opponent"),
        (status = 409, description = "Battle is not pending"),
    )
)]
pub async fn decline_battle(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<BattleSummary>, AppError> {
    let summary = battle_service::decline_battle(&state, caller.0, id).await?;
    Ok(Json(summary))
}

/// Open the live session for an accepted battle.
#[utoipa::path(
    post,
    path = "/battles/{id}/start",
    tag = "battle",
    params(("id" = Uuid, Path, description = "Battle identifier")),
    responses(
        (status = 200, description = "Battle started", body = BattleSummary),
        (status = 409, description = "Battle is not accepted"),
    )
)]
pub async fn start_battle(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<BattleSummary>, AppError> {
    let summary = battle_service::start_battle(&state, caller.0, id).await?;
    Ok(Json(summary))
}

/// Submit the caller's current rep count for an active battle.
#[utoipa::path(
    put,
    path = "/battles/{id}/reps",
    tag = "battle",
    params(("id" = Uuid, Path, description = "Battle identifier")),
    request_body = UpdateRepsRequest,
    responses(
        (status = 200, description = "Accepted rep count", body = PerformanceSummary),
        (status = 403, description = "Caller is not a contestant"),
        (status = 409, description = "Battle not active or value stale"),
    )
)]
pub async fn update_reps(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRepsRequest>,
) -> Result<Json<PerformanceSummary>, AppError> {
    let summary = battle_service::update_reps(&state, caller.0, id, payload.reps).await?;
    Ok(Json(summary))
}

/// Finish an active battle and record the winner.
#[utoipa::path(
    post,
    path = "/battles/{id}/complete",
    tag = "battle",
    params(("id" = Uuid, Path, description = "Battle identifier")),
    responses(
        (status = 200, description = "Battle completed", body = BattleSummary),
        (status = 409, description = "Battle is not active"),
    )
)]
pub async fn complete_battle(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<BattleSummary>, AppError> {
    let summary = battle_service::complete_battle(&state, Some(caller.0), id).await?;
    Ok(Json(summary))
}

/// Call a battle off (participants only).
#[utoipa::path(
    post,
    path = "/battles/{id}/cancel",
    tag = "battle",
    params(("id" = Uuid, Path, description = "Battle identifier")),
    responses(
        (status = 200, description = "Battle cancelled", body = BattleSummary),
        (status = 403, description = "Caller is not a contestant"),
    )
)]
pub async fn cancel_battle(
    State(state): State<SharedState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<BattleSummary>, AppError> {
    let summary = battle_service::cancel_battle(&state, caller.0, id).await?;
    Ok(Json(summary))
}
