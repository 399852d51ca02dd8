use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Rep Rally Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::battles::create_battle,
        crate::routes::battles::quick_challenge,
        crate::routes::battles::list_battles,
        crate::routes::battles::get_battle,
        crate::routes::battles::get_performances,
        crate::routes::battles::accept_battle,
        crate::routes::battles::decline_battle,
        crate::routes::battles::start_battle,
        crate::routes::battles::update_reps,
        crate::routes::battles::complete_battle,
        crate::routes::battles::cancel_battle,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::battle::CreateBattleRequest,
            crate::dto::battle::QuickChallengeRequest,
            crate::dto::battle::UpdateRepsRequest,
            crate::dto::battle::BattleSummary,
            crate::dto::battle::PerformanceSummary,
            crate::dto::events::BattleEvent,
            crate::dto::ws::ClientFrame,
            crate::dto::ws::ServerFrame,
            crate::state::machine::BattleStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "battle", description = "Workout battle lifecycle and rep tracking"),
        (name = "realtime", description = "WebSocket channel for battle observers"),
    )
)]
pub struct ApiDoc;
