use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::SpectatorPolicy,
    dao::battle_store::BattlePatch,
    dao::models::BattleEntity,
    dao::storage::StorageError,
    dto::battle::{
        BattleSummary, CreateBattleRequest, PerformanceSummary, QuickChallengeRequest,
    },
    error::{ServiceError, tracker_error},
    services::events,
    state::{
        SharedState,
        battle::{Battle, Performance, winner_between},
        machine::{BattleCommand, BattleStatus, InvalidTransition},
        session::{BattleSession, FinishOutcome, FinishReason},
    },
};

use validator::Validate;

/// Issue a challenge against a specific opponent.
pub async fn create_battle(
    state: &SharedState,
    caller: Uuid,
    request: CreateBattleRequest,
) -> Result<BattleSummary, ServiceError> {
    request.validate()?;
    open_challenge(
        state,
        caller,
        request.opponent_id,
        request.exercise_type,
        request.duration_secs,
    )
    .await
}

/// Issue a challenge against an automatically discovered nearby opponent.
pub async fn create_quick_challenge(
    state: &SharedState,
    caller: Uuid,
    request: QuickChallengeRequest,
) -> Result<BattleSummary, ServiceError> {
    request.validate()?;

    let Some(discovery) = state.discovery().await else {
        warn!("quick challenge requested but no discovery collaborator is installed");
        return Err(ServiceError::NoOpponentFound);
    };
    let opponent = discovery
        .nearby_opponent(caller, &request.exercise_type)
        .await
        .ok_or(ServiceError::NoOpponentFound)?;

    open_challenge(
        state,
        caller,
        opponent,
        request.exercise_type,
        request.duration_secs,
    )
    .await
}

async fn open_challenge(
    state: &SharedState,
    creator: Uuid,
    opponent: Uuid,
    exercise_type: String,
    duration_secs: u32,
) -> Result<BattleSummary, ServiceError> {
    if creator == opponent {
        return Err(ServiceError::InvalidInput(
            "cannot open a battle against yourself".into(),
        ));
    }
    let exercise = exercise_type.trim().to_string();
    if exercise.is_empty() {
        return Err(ServiceError::InvalidInput(
            "exercise type must not be empty".into(),
        ));
    }
    if duration_secs == 0 {
        return Err(ServiceError::InvalidInput(
            "duration must be strictly positive".into(),
        ));
    }
    let max_duration = state.config().max_duration_secs();
    if duration_secs > max_duration {
        return Err(ServiceError::InvalidInput(format!(
            "duration must not exceed {max_duration} seconds"
        )));
    }

    let battle = Battle::new(creator, opponent, exercise, duration_secs);
    let store = state.require_battle_store().await?;
    store.create(battle.clone().into()).await?;

    info!(battle_id = %battle.id, %creator, %opponent, "battle created");
    Ok(battle.into())
}

/// Opponent accepts a pending challenge.
pub async fn accept_battle(
    state: &SharedState,
    caller: Uuid,
    battle_id: Uuid,
) -> Result<BattleSummary, ServiceError> {
    respond_to_challenge(state, caller, battle_id, BattleCommand::Accept).await
}

/// Opponent declines a pending challenge.
pub async fn decline_battle(
    state: &SharedState,
    caller: Uuid,
    battle_id: Uuid,
) -> Result<BattleSummary, ServiceError> {
    respond_to_challenge(state, caller, battle_id, BattleCommand::Decline).await
}

async fn respond_to_challenge(
    state: &SharedState,
    caller: Uuid,
    battle_id: Uuid,
    command: BattleCommand,
) -> Result<BattleSummary, ServiceError> {
    let battle: Battle = load_battle(state, battle_id).await?.into();
    if caller != battle.opponent_id {
        return Err(ServiceError::Forbidden(
            "only the challenged opponent may respond".into(),
        ));
    }
    let next = battle.status.apply(command)?;

    let store = state.require_battle_store().await?;
    let patch = BattlePatch {
        expect_status: Some(battle.status),
        status: Some(next),
        ..Default::default()
    };
    match store.update(battle_id, patch).await {
        Ok(entity) => {
            let fresh: Battle = entity.into();
            events::broadcast_status_changed(state, &fresh);
            Ok(fresh.into())
        }
        Err(StorageError::Conflict { found, .. }) => {
            Err(InvalidTransition { from: found, command }.into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Open the live session for an accepted battle and start its clock.
pub async fn start_battle(
    state: &SharedState,
    caller: Uuid,
    battle_id: Uuid,
) -> Result<BattleSummary, ServiceError> {
    let battle: Battle = load_battle(state, battle_id).await?.into();
    ensure_participant(&battle, caller)?;
    let next = battle.status.apply(BattleCommand::Start)?;

    let started_at = SystemTime::now();
    let store = state.require_battle_store().await?;
    let patch = BattlePatch {
        expect_status: Some(battle.status),
        status: Some(next),
        started_at: Some(started_at),
        ..Default::default()
    };
    let entity = match store.update(battle_id, patch).await {
        Ok(entity) => entity,
        Err(StorageError::Conflict { found, .. }) => {
            return Err(InvalidTransition {
                from: found,
                command: BattleCommand::Start,
            }
            .into());
        }
        Err(err) => return Err(err.into()),
    };

    let active: Battle = entity.into();
    // Performance records exist from the moment the battle is active.
    for user in active.participants() {
        store.upsert_performance(battle_id, user, 0, started_at).await?;
    }

    let session = Arc::new(BattleSession::new(active.clone(), Instant::now()));
    state.sessions().insert(battle_id, session.clone());
    for user in active.participants() {
        state.broadcaster().subscribe(battle_id, user);
    }

    let timer_state = state.clone();
    let duration = Duration::from_secs(u64::from(active.duration_secs));
    let handle = tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        if let Some(session) = timer_state.session(battle_id) {
            // Drop our own handle first so the completion path cannot abort
            // the very task that is driving it.
            session.disarm_timer();
        }
        if let Err(err) = complete_battle(&timer_state, None, battle_id).await {
            warn!(%battle_id, error = %err, "automatic completion failed");
        }
    });
    session.attach_timer(handle);

    info!(%battle_id, duration_secs = active.duration_secs, "battle session started");
    events::broadcast_status_changed(state, &active);
    Ok(active.into())
}

/// Record a contestant's current rep count on the live session.
pub async fn update_reps(
    state: &SharedState,
    caller: Uuid,
    battle_id: Uuid,
    reps: u32,
) -> Result<PerformanceSummary, ServiceError> {
    let Some(session) = state.session(battle_id) else {
        // No live session: distinguish unknown battles and outsiders from the
        // informational "too late" rejection a lagging client receives.
        let battle: Battle = load_battle(state, battle_id).await?.into();
        ensure_participant(&battle, caller)?;
        return Err(ServiceError::BattleNotActive(battle_id));
    };

    ensure_participant(session.battle(), caller)?;
    let accepted = session
        .submit_reps(caller, reps, SystemTime::now())
        .map_err(|err| tracker_error(battle_id, err))?;

    let counts = session.live_counts();
    events::broadcast_rep_update(state, session.battle(), &counts, session.elapsed_seconds());
    Ok(accepted.into())
}

/// Finish an active battle and record its winner.
///
/// `caller` is `None` when the request comes from the session's own timeout
/// timer; participants are checked otherwise. Losing a race against another
/// terminal transition resolves to the already-decided record, not an error.
pub async fn complete_battle(
    state: &SharedState,
    caller: Option<Uuid>,
    battle_id: Uuid,
) -> Result<BattleSummary, ServiceError> {
    if let Some(session) = state.session(battle_id) {
        if let Some(user) = caller {
            ensure_participant(session.battle(), user)?;
        }
        return finish_session(state, session, FinishReason::Completed).await;
    }

    let battle: Battle = load_battle(state, battle_id).await?.into();
    if let Some(user) = caller {
        ensure_participant(&battle, user)?;
    }
    match battle.status {
        // Lost a race against a concurrent completion/cancellation: observe
        // the decided outcome instead of surfacing an error.
        BattleStatus::Completed | BattleStatus::Cancelled => Ok(battle.into()),
        // Active in the store but no session: the live state was lost (e.g. a
        // restart). Finalize from the durable counts.
        BattleStatus::Active => finalize_without_session(state, battle).await,
        from => Err(InvalidTransition {
            from,
            command: BattleCommand::Complete,
        }
        .into()),
    }
}

/// Call a battle off on behalf of a participant.
pub async fn cancel_battle(
    state: &SharedState,
    caller: Uuid,
    battle_id: Uuid,
) -> Result<BattleSummary, ServiceError> {
    for _ in 0..2 {
        if let Some(session) = state.session(battle_id) {
            ensure_participant(session.battle(), caller)?;
            return finish_session(state, session, FinishReason::Cancelled).await;
        }

        let battle: Battle = load_battle(state, battle_id).await?.into();
        ensure_participant(&battle, caller)?;
        if battle.status.is_terminal() {
            return Ok(battle.into());
        }
        let next = battle.status.apply(BattleCommand::Cancel)?;

        let store = state.require_battle_store().await?;
        let patch = BattlePatch {
            expect_status: Some(battle.status),
            status: Some(next),
            ended_at: Some(SystemTime::now()),
            ..Default::default()
        };
        match store.update(battle_id, patch).await {
            Ok(entity) => {
                let fresh: Battle = entity.into();
                info!(%battle_id, "battle cancelled before start");
                events::broadcast_status_changed(state, &fresh);
                return Ok(fresh.into());
            }
            // Raced with another transition; re-evaluate from fresh state.
            Err(StorageError::Conflict { .. }) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    let battle: Battle = load_battle(state, battle_id).await?.into();
    if battle.status.is_terminal() {
        Ok(battle.into())
    } else {
        Err(InvalidTransition {
            from: battle.status,
            command: BattleCommand::Cancel,
        }
        .into())
    }
}

/// Fetch one battle, served from the live session while it is active.
pub async fn get_battle(
    state: &SharedState,
    caller: Uuid,
    battle_id: Uuid,
) -> Result<BattleSummary, ServiceError> {
    if let Some(session) = state.session(battle_id) {
        ensure_viewer(state, session.battle(), caller)?;
        return Ok(session.battle().clone().into());
    }
    let battle: Battle = load_battle(state, battle_id).await?.into();
    ensure_viewer(state, &battle, caller)?;
    Ok(battle.into())
}

/// List the caller's battles, optionally filtered by status, newest first.
pub async fn get_user_battles(
    state: &SharedState,
    caller: Uuid,
    status: Option<BattleStatus>,
) -> Result<Vec<BattleSummary>, ServiceError> {
    let store = state.require_battle_store().await?;
    let battles = store.list_for_user(caller, status).await?;
    Ok(battles
        .into_iter()
        .map(|entity| Battle::from(entity).into())
        .collect())
}

/// Fetch the per-contestant rep records of one battle.
///
/// Active battles are answered from the live tracker so clients never see
/// counts staler than the last broadcast.
pub async fn get_battle_performances(
    state: &SharedState,
    caller: Uuid,
    battle_id: Uuid,
) -> Result<Vec<PerformanceSummary>, ServiceError> {
    if let Some(session) = state.session(battle_id) {
        ensure_viewer(state, session.battle(), caller)?;
        return Ok(session.live_counts().into_iter().map(Into::into).collect());
    }

    let battle: Battle = load_battle(state, battle_id).await?.into();
    ensure_viewer(state, &battle, caller)?;
    let store = state.require_battle_store().await?;
    let records = store.performances(battle_id).await?;
    Ok(records
        .into_iter()
        .map(|entity| PerformanceSummary::from(Performance::from(entity)))
        .collect())
}

/// Check that `caller` may observe `battle_id`'s realtime events.
pub async fn authorize_observer(
    state: &SharedState,
    caller: Uuid,
    battle_id: Uuid,
) -> Result<(), ServiceError> {
    if let Some(session) = state.session(battle_id) {
        return ensure_viewer(state, session.battle(), caller);
    }
    let battle: Battle = load_battle(state, battle_id).await?.into();
    ensure_viewer(state, &battle, caller)
}

/// Run a terminal transition through the session's decision gate and persist it.
async fn finish_session(
    state: &SharedState,
    session: Arc<BattleSession>,
    reason: FinishReason,
) -> Result<BattleSummary, ServiceError> {
    let battle = session.battle().clone();
    let battle_id = battle.id;
    let store = state.require_battle_store().await?;
    let command = match reason {
        FinishReason::Completed => BattleCommand::Complete,
        FinishReason::Cancelled => BattleCommand::Cancel,
    };

    let work_store = store.clone();
    let outcome = session
        .finish(reason, move |end| async move {
            let status = match reason {
                FinishReason::Completed => BattleStatus::Completed,
                FinishReason::Cancelled => BattleStatus::Cancelled,
            };
            let patch = BattlePatch {
                expect_status: Some(BattleStatus::Active),
                status: Some(status),
                ended_at: Some(end.ended_at),
                winner_id: Some(end.winner_id),
                ..Default::default()
            };
            match work_store.update(battle_id, patch).await {
                Ok(_) => {}
                Err(StorageError::Conflict { found, .. }) => {
                    return Err(InvalidTransition {
                        from: found,
                        command,
                    }
                    .into());
                }
                Err(err) => return Err(err.into()),
            }
            // Last-known counts are written back for auditing either way; a
            // cancellation just never turns them into a result.
            for perf in end.final_counts {
                work_store
                    .upsert_performance(
                        battle_id,
                        perf.user_id,
                        perf.reps,
                        perf.last_updated_at.unwrap_or(end.ended_at),
                    )
                    .await?;
            }
            Ok(())
        })
        .await;

    match outcome {
        Ok(FinishOutcome::Decided(end)) => {
            state.sessions().remove(&battle_id);
            session.abort_timer();

            let mut finished = battle;
            finished.status = match end.reason {
                FinishReason::Completed => BattleStatus::Completed,
                FinishReason::Cancelled => BattleStatus::Cancelled,
            };
            finished.ended_at = Some(end.ended_at);
            finished.winner_id = end.winner_id;

            info!(
                %battle_id,
                reason = ?end.reason,
                winner = ?end.winner_id,
                "battle session finished"
            );
            events::broadcast_session_finished(state, &finished, &end);
            Ok(finished.into())
        }
        Ok(FinishOutcome::AlreadyDecided) => {
            // The winning racer persisted before releasing the gate, so the
            // store already holds the decided record.
            let battle: Battle = load_battle(state, battle_id).await?.into();
            Ok(battle.into())
        }
        Err(ServiceError::InvalidTransition(invalid)) => {
            // The store holds a terminal record this session did not write.
            // Re-read before reporting; never overwrite it.
            let fresh: Battle = load_battle(state, battle_id).await?.into();
            if fresh.status.is_terminal() {
                state.sessions().remove(&battle_id);
                session.abort_timer();
                state.broadcaster().drop_battle(battle_id);
                Ok(fresh.into())
            } else {
                Err(invalid.into())
            }
        }
        Err(err) => Err(err),
    }
}

/// Finalize an active battle whose live session is gone, from durable counts.
async fn finalize_without_session(
    state: &SharedState,
    battle: Battle,
) -> Result<BattleSummary, ServiceError> {
    let store = state.require_battle_store().await?;
    let records = store.performances(battle.id).await?;
    let reps_of = |user: Uuid| {
        records
            .iter()
            .find(|record| record.user_id == user)
            .map(|record| record.reps)
            .unwrap_or(0)
    };
    let winner = winner_between(
        (battle.creator_id, reps_of(battle.creator_id)),
        (battle.opponent_id, reps_of(battle.opponent_id)),
    );

    let patch = BattlePatch {
        expect_status: Some(BattleStatus::Active),
        status: Some(BattleStatus::Completed),
        ended_at: Some(SystemTime::now()),
        winner_id: Some(winner),
        ..Default::default()
    };
    match store.update(battle.id, patch).await {
        Ok(entity) => {
            let finished: Battle = entity.into();
            warn!(battle_id = %finished.id, "completed battle without a live session");
            events::broadcast_status_changed(state, &finished);
            Ok(finished.into())
        }
        Err(StorageError::Conflict { .. }) => {
            let fresh: Battle = load_battle(state, battle.id).await?.into();
            if fresh.status.is_terminal() {
                Ok(fresh.into())
            } else {
                Err(InvalidTransition {
                    from: fresh.status,
                    command: BattleCommand::Complete,
                }
                .into())
            }
        }
        Err(err) => Err(err.into()),
    }
}

async fn load_battle(state: &SharedState, battle_id: Uuid) -> Result<BattleEntity, ServiceError> {
    let store = state.require_battle_store().await?;
    store
        .find(battle_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("battle `{battle_id}` not found")))
}

fn ensure_participant(battle: &Battle, caller: Uuid) -> Result<(), ServiceError> {
    if battle.is_participant(caller) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "caller is not a contestant in this battle".into(),
        ))
    }
}

fn ensure_viewer(state: &SharedState, battle: &Battle, caller: Uuid) -> Result<(), ServiceError> {
    if battle.is_participant(caller) {
        return Ok(());
    }
    match state.config().spectator_policy() {
        SpectatorPolicy::Open => Ok(()),
        SpectatorPolicy::Participants => Err(ServiceError::Forbidden(
            "battle is restricted to its contestants".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt;
    use futures::future::BoxFuture;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::{AppConfig, SpectatorPolicy},
        dao::battle_store::memory::MemoryBattleStore,
        services::discovery::OpponentDiscovery,
        state::{AppState, broadcast::UserChannel},
    };

    struct FixedDiscovery(Option<Uuid>);

    impl OpponentDiscovery for FixedDiscovery {
        fn nearby_opponent(&self, _creator: Uuid, _exercise: &str) -> BoxFuture<'static, Option<Uuid>> {
            futures::future::ready(self.0).boxed()
        }
    }

    async fn harness() -> (SharedState, Uuid, Uuid) {
        harness_with(AppConfig::default()).await
    }

    async fn harness_with(config: AppConfig) -> (SharedState, Uuid, Uuid) {
        let state = AppState::new(config);
        state
            .install_battle_store(Arc::new(MemoryBattleStore::new()))
            .await;
        (state, Uuid::new_v4(), Uuid::new_v4())
    }

    fn challenge(opponent: Uuid, duration_secs: u32) -> CreateBattleRequest {
        CreateBattleRequest {
            opponent_id: opponent,
            exercise_type: "pushups".into(),
            duration_secs,
        }
    }

    async fn started_battle(
        state: &SharedState,
        creator: Uuid,
        opponent: Uuid,
        duration_secs: u32,
    ) -> Uuid {
        let battle = create_battle(state, creator, challenge(opponent, duration_secs))
            .await
            .unwrap();
        accept_battle(state, opponent, battle.id).await.unwrap();
        start_battle(state, creator, battle.id).await.unwrap();
        battle.id
    }

    #[tokio::test(start_paused = true)]
    async fn full_flow_with_stale_rejection_and_automatic_completion() {
        let (state, creator, opponent) = harness().await;
        let id = started_battle(&state, creator, opponent, 60).await;

        update_reps(&state, creator, id, 10).await.unwrap();
        update_reps(&state, opponent, id, 7).await.unwrap();

        let err = update_reps(&state, creator, id, 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::StaleUpdate { current: 10 }));

        // Let the session clock run out; the timer completes the battle.
        tokio::time::sleep(Duration::from_secs(61)).await;

        let battle = get_battle(&state, creator, id).await.unwrap();
        assert_eq!(battle.status, BattleStatus::Completed);
        assert_eq!(battle.winner_id, Some(creator));
        assert!(state.session(id).is_none());

        let mut performances = get_battle_performances(&state, creator, id).await.unwrap();
        performances.sort_by_key(|perf| std::cmp::Reverse(perf.reps));
        assert_eq!(performances[0].user_id, creator);
        assert_eq!(performances[0].reps, 10);
        assert_eq!(performances[1].user_id, opponent);
        assert_eq!(performances[1].reps, 7);
    }

    #[tokio::test]
    async fn declined_battle_cannot_be_started() {
        let (state, creator, opponent) = harness().await;
        let battle = create_battle(&state, creator, challenge(opponent, 60))
            .await
            .unwrap();

        decline_battle(&state, opponent, battle.id).await.unwrap();

        let err = start_battle(&state, creator, battle.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition(InvalidTransition {
                from: BattleStatus::Declined,
                command: BattleCommand::Start,
            })
        ));
    }

    #[tokio::test]
    async fn only_the_opponent_may_respond() {
        let (state, creator, opponent) = harness().await;
        let battle = create_battle(&state, creator, challenge(opponent, 60))
            .await
            .unwrap();

        let err = accept_battle(&state, creator, battle.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = accept_battle(&state, Uuid::new_v4(), battle.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let accepted = accept_battle(&state, opponent, battle.id).await.unwrap();
        assert_eq!(accepted.status, BattleStatus::Accepted);

        // A second response is a genuine transition error, not a race.
        let err = accept_battle(&state, opponent, battle.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn unknown_battles_are_not_found() {
        let (state, creator, _) = harness().await;
        let err = accept_battle(&state, creator, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let err = get_battle(&state, creator, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_battle_validates_its_input() {
        let (state, creator, opponent) = harness().await;

        let err = create_battle(&state, creator, challenge(creator, 60))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = create_battle(&state, creator, challenge(opponent, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = create_battle(
            &state,
            creator,
            CreateBattleRequest {
                opponent_id: opponent,
                exercise_type: "   ".into(),
                duration_secs: 60,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rep_updates_require_a_live_session() {
        let (state, creator, opponent) = harness().await;
        let battle = create_battle(&state, creator, challenge(opponent, 60))
            .await
            .unwrap();

        let err = update_reps(&state, creator, battle.id, 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::BattleNotActive(_)));

        // Outsiders are rejected on authorization before the lifecycle check.
        let err = update_reps(&state, Uuid::new_v4(), battle.id, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_submissions_for_both_contestants_land_in_one_snapshot() {
        let (state, creator, opponent) = harness().await;
        let id = started_battle(&state, creator, opponent, 600).await;

        // A connected spectator observes the broadcasts.
        let spectator = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.broadcaster().register(UserChannel {
            user_id: spectator,
            tx,
        });
        authorize_observer(&state, spectator, id).await.unwrap();
        state.broadcaster().subscribe(id, spectator);

        let (a, b) = tokio::join!(
            update_reps(&state, creator, id, 12),
            update_reps(&state, opponent, id, 9),
        );
        a.unwrap();
        b.unwrap();

        let mut last = None;
        while let Ok(frame) = rx.try_recv() {
            if let axum::extract::ws::Message::Text(text) = frame {
                last = Some(text.to_string());
            }
        }
        let last = last.expect("expected at least one broadcast frame");
        assert!(last.contains("rep_update"));
        assert!(last.contains("\"elapsed_seconds\":0"));
        assert!(last.contains(&format!("\"{creator}\":12")));
        assert!(last.contains(&format!("\"{opponent}\":9")));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_completion_races_resolve_to_one_outcome() {
        let (state, creator, opponent) = harness().await;
        let id = started_battle(&state, creator, opponent, 60).await;
        update_reps(&state, creator, id, 3).await.unwrap();

        let (first, second) = tokio::join!(
            complete_battle(&state, Some(creator), id),
            complete_battle(&state, Some(opponent), id),
        );
        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.status, BattleStatus::Completed);
        assert_eq!(second.status, BattleStatus::Completed);
        assert_eq!(first.winner_id, Some(creator));
        assert_eq!(second.winner_id, Some(creator));

        // The timer fires later against the already-terminal battle and must
        // stay silent; the record is unchanged.
        tokio::time::sleep(Duration::from_secs(61)).await;
        let battle = get_battle(&state, creator, id).await.unwrap();
        assert_eq!(battle.status, BattleStatus::Completed);
        assert_eq!(battle.winner_id, Some(creator));
    }

    #[tokio::test(start_paused = true)]
    async fn equal_counts_complete_as_a_tie() {
        let (state, creator, opponent) = harness().await;
        let id = started_battle(&state, creator, opponent, 60).await;
        update_reps(&state, creator, id, 8).await.unwrap();
        update_reps(&state, opponent, id, 8).await.unwrap();

        let battle = complete_battle(&state, Some(creator), id).await.unwrap();
        assert_eq!(battle.status, BattleStatus::Completed);
        assert_eq!(battle.winner_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_an_active_battle_keeps_audit_counts_and_no_winner() {
        let (state, creator, opponent) = harness().await;
        let id = started_battle(&state, creator, opponent, 60).await;
        update_reps(&state, creator, id, 10).await.unwrap();
        update_reps(&state, opponent, id, 7).await.unwrap();

        let battle = cancel_battle(&state, opponent, id).await.unwrap();
        assert_eq!(battle.status, BattleStatus::Cancelled);
        assert_eq!(battle.winner_id, None);
        assert!(state.session(id).is_none());

        let performances = get_battle_performances(&state, creator, id).await.unwrap();
        let reps_of = |user: Uuid| {
            performances
                .iter()
                .find(|perf| perf.user_id == user)
                .map(|perf| perf.reps)
        };
        assert_eq!(reps_of(creator), Some(10));
        assert_eq!(reps_of(opponent), Some(7));

        // Late submissions observe the terminal state, not a silent drop.
        let err = update_reps(&state, creator, id, 20).await.unwrap_err();
        assert!(matches!(err, ServiceError::BattleNotActive(_)));
    }

    #[tokio::test]
    async fn cancelling_before_start_is_allowed_for_both_participants() {
        let (state, creator, opponent) = harness().await;
        let battle = create_battle(&state, creator, challenge(opponent, 60))
            .await
            .unwrap();

        let err = cancel_battle(&state, Uuid::new_v4(), battle.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let cancelled = cancel_battle(&state, opponent, battle.id).await.unwrap();
        assert_eq!(cancelled.status, BattleStatus::Cancelled);
        assert_eq!(cancelled.winner_id, None);

        // Cancelling an already-terminal battle observes the record.
        let again = cancel_battle(&state, creator, battle.id).await.unwrap();
        assert_eq!(again.status, BattleStatus::Cancelled);
    }

    #[tokio::test]
    async fn listing_serves_the_callers_battles_with_status_filter() {
        let (state, creator, opponent) = harness().await;
        let first = create_battle(&state, creator, challenge(opponent, 60))
            .await
            .unwrap();
        let second = create_battle(&state, creator, challenge(opponent, 90))
            .await
            .unwrap();
        accept_battle(&state, opponent, second.id).await.unwrap();

        let all = get_user_battles(&state, creator, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let pending = get_user_battles(&state, creator, Some(BattleStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);

        assert!(
            get_user_battles(&state, Uuid::new_v4(), None)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn quick_challenge_uses_the_discovery_collaborator() {
        let (state, creator, opponent) = harness().await;
        let request = || QuickChallengeRequest {
            exercise_type: "squats".into(),
            duration_secs: 45,
        };

        // Discovery missing entirely.
        let err = create_quick_challenge(&state, creator, request())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoOpponentFound));

        state
            .install_discovery(Arc::new(FixedDiscovery(None)))
            .await;
        let err = create_quick_challenge(&state, creator, request())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoOpponentFound));

        state
            .install_discovery(Arc::new(FixedDiscovery(Some(opponent))))
            .await;
        let battle = create_quick_challenge(&state, creator, request())
            .await
            .unwrap();
        assert_eq!(battle.status, BattleStatus::Pending);
        assert_eq!(battle.creator_id, creator);
        assert_eq!(battle.opponent_id, opponent);
    }

    #[tokio::test]
    async fn spectator_policy_gates_non_participant_reads() {
        let (state, creator, opponent) =
            harness_with(AppConfig::for_tests(SpectatorPolicy::Participants)).await;
        let battle = create_battle(&state, creator, challenge(opponent, 60))
            .await
            .unwrap();

        let stranger = Uuid::new_v4();
        let err = get_battle(&state, stranger, battle.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = get_battle_performances(&state, stranger, battle.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = authorize_observer(&state, stranger, battle.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        // Contestants always pass.
        get_battle(&state, opponent, battle.id).await.unwrap();

        let (open_state, open_creator, open_opponent) = harness().await;
        let open_battle = create_battle(&open_state, open_creator, challenge(open_opponent, 60))
            .await
            .unwrap();
        get_battle(&open_state, Uuid::new_v4(), open_battle.id)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_reports_a_transition_error() {
        let (state, creator, opponent) = harness().await;
        let id = started_battle(&state, creator, opponent, 60).await;

        let err = start_battle(&state, creator, id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition(InvalidTransition {
                from: BattleStatus::Active,
                command: BattleCommand::Start,
            })
        ));
    }
}
