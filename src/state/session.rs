use std::sync::Mutex as StdMutex;
use std::time::SystemTime;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    state::{
        battle::{Battle, winner_between},
        tracker::{PerformanceTracker, TrackedPerformance, TrackerError},
    },
};

/// Why an active session reached its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The clock ran out or a participant requested completion.
    Completed,
    /// A participant called the battle off mid-session.
    Cancelled,
}

/// Final outcome produced when a session is decided.
#[derive(Debug, Clone)]
pub struct SessionEnd {
    /// How the session ended.
    pub reason: FinishReason,
    /// Sealed final counts, creator first.
    pub final_counts: [TrackedPerformance; 2],
    /// Winner on completion; `None` for ties and cancellations.
    pub winner_id: Option<Uuid>,
    /// Wall-clock end timestamp.
    pub ended_at: SystemTime,
    /// Seconds the session ran, clamped to the battle duration.
    pub elapsed_seconds: u64,
}

/// Outcome of racing a terminal transition through the decision gate.
#[derive(Debug)]
pub enum FinishOutcome {
    /// This caller won the race and owns the end-of-session bookkeeping.
    Decided(SessionEnd),
    /// Another caller already decided the session; observe, don't error.
    AlreadyDecided,
}

/// In-memory single-owner working state of one active battle.
///
/// All terminal transitions (explicit completion, explicit cancellation, and
/// the automatic timeout) funnel through [`BattleSession::finish`], whose
/// internal lock makes whichever request arrives first the single decision
/// for the battle. Rep submissions bypass the gate and hit the tracker
/// directly; the tracker seal orders them against the decision.
pub struct BattleSession {
    battle: Battle,
    started: Instant,
    tracker: PerformanceTracker,
    decision: Mutex<Option<FinishReason>>,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

impl BattleSession {
    /// Open the session for a battle that just became active.
    pub fn new(battle: Battle, started: Instant) -> Self {
        let tracker = PerformanceTracker::new(battle.creator_id, battle.opponent_id);
        Self {
            battle,
            started,
            tracker,
            decision: Mutex::new(None),
            timer: StdMutex::new(None),
        }
    }

    /// Immutable battle fields as of session start.
    pub fn battle(&self) -> &Battle {
        &self.battle
    }

    /// Seconds since the session started, clamped to the battle duration.
    pub fn elapsed_seconds(&self) -> u64 {
        self.started
            .elapsed()
            .as_secs()
            .min(u64::from(self.battle.duration_secs))
    }

    /// Record a contestant's rep count.
    pub fn submit_reps(
        &self,
        user: Uuid,
        reps: u32,
        at: SystemTime,
    ) -> Result<TrackedPerformance, TrackerError> {
        self.tracker.submit(user, reps, at)
    }

    /// Current combined counts, torn-free.
    pub fn live_counts(&self) -> [TrackedPerformance; 2] {
        self.tracker.snapshot()
    }

    /// Race to decide the end of this session.
    ///
    /// The first caller through the gate seals the tracker, computes the
    /// outcome and runs `work` (the terminal store write) while still holding
    /// the gate; later callers observe [`FinishOutcome::AlreadyDecided`] only
    /// after that write finished, so a re-read of the store sees the terminal
    /// record. When `work` fails the seal is reverted and the session stays
    /// active, keeping live state and durable record in agreement.
    pub async fn finish<F, Fut>(
        &self,
        reason: FinishReason,
        work: F,
    ) -> Result<FinishOutcome, ServiceError>
    where
        F: FnOnce(SessionEnd) -> Fut,
        Fut: Future<Output = Result<(), ServiceError>>,
    {
        let mut decided = self.decision.lock().await;
        if decided.is_some() {
            return Ok(FinishOutcome::AlreadyDecided);
        }

        let final_counts = self.tracker.seal();
        let winner_id = match reason {
            FinishReason::Completed => winner_between(
                (final_counts[0].user_id, final_counts[0].reps),
                (final_counts[1].user_id, final_counts[1].reps),
            ),
            FinishReason::Cancelled => None,
        };
        let end = SessionEnd {
            reason,
            final_counts,
            winner_id,
            ended_at: SystemTime::now(),
            elapsed_seconds: self.elapsed_seconds(),
        };

        match work(end.clone()).await {
            Ok(()) => {
                *decided = Some(reason);
                Ok(FinishOutcome::Decided(end))
            }
            Err(err) => {
                self.tracker.reopen();
                Err(err)
            }
        }
    }

    /// Attach the auto-completion timer task spawned at start.
    pub fn attach_timer(&self, handle: JoinHandle<()>) {
        let mut slot = self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(handle);
    }

    /// Drop the timer handle without aborting it.
    ///
    /// Called by the timer task itself right after waking, so a later
    /// [`BattleSession::abort_timer`] can never cancel the task mid-completion.
    pub fn disarm_timer(&self) {
        let mut slot = self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.take();
    }

    /// Abort the pending auto-completion timer after another terminal path won.
    pub fn abort_timer(&self) {
        let mut slot = self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn session(duration_secs: u32) -> (Arc<BattleSession>, Uuid, Uuid) {
        let creator = Uuid::new_v4();
        let opponent = Uuid::new_v4();
        let mut battle = Battle::new(creator, opponent, "pushups".into(), duration_secs);
        battle.status = crate::state::machine::BattleStatus::Active;
        battle.started_at = Some(SystemTime::now());
        (
            Arc::new(BattleSession::new(battle, Instant::now())),
            creator,
            opponent,
        )
    }

    #[tokio::test]
    async fn completion_computes_winner_from_sealed_counts() {
        let (session, creator, opponent) = session(60);
        let now = SystemTime::now();
        session.submit_reps(creator, 10, now).unwrap();
        session.submit_reps(opponent, 7, now).unwrap();

        let outcome = session
            .finish(FinishReason::Completed, |_| async { Ok(()) })
            .await
            .unwrap();

        match outcome {
            FinishOutcome::Decided(end) => {
                assert_eq!(end.winner_id, Some(creator));
                assert_eq!(end.final_counts[0].reps, 10);
                assert_eq!(end.final_counts[1].reps, 7);
            }
            FinishOutcome::AlreadyDecided => panic!("first finish must decide"),
        }
    }

    #[tokio::test]
    async fn equal_counts_are_a_tie() {
        let (session, creator, opponent) = session(60);
        let now = SystemTime::now();
        session.submit_reps(creator, 9, now).unwrap();
        session.submit_reps(opponent, 9, now).unwrap();

        let outcome = session
            .finish(FinishReason::Completed, |_| async { Ok(()) })
            .await
            .unwrap();
        match outcome {
            FinishOutcome::Decided(end) => assert_eq!(end.winner_id, None),
            FinishOutcome::AlreadyDecided => panic!("first finish must decide"),
        }
    }

    #[tokio::test]
    async fn cancellation_never_sets_a_winner() {
        let (session, creator, _) = session(60);
        session
            .submit_reps(creator, 25, SystemTime::now())
            .unwrap();

        let outcome = session
            .finish(FinishReason::Cancelled, |_| async { Ok(()) })
            .await
            .unwrap();
        match outcome {
            FinishOutcome::Decided(end) => {
                assert_eq!(end.winner_id, None);
                assert_eq!(end.final_counts[0].reps, 25);
            }
            FinishOutcome::AlreadyDecided => panic!("first finish must decide"),
        }
    }

    #[tokio::test]
    async fn concurrent_finishes_decide_exactly_once() {
        let (session, _, _) = session(60);
        let decided = Arc::new(AtomicUsize::new(0));

        let racers: Vec<_> = [FinishReason::Completed, FinishReason::Cancelled]
            .into_iter()
            .map(|reason| {
                let session = session.clone();
                let decided = decided.clone();
                tokio::spawn(async move {
                    let outcome = session.finish(reason, |_| async { Ok(()) }).await.unwrap();
                    if matches!(outcome, FinishOutcome::Decided(_)) {
                        decided.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for racer in racers {
            racer.await.unwrap();
        }

        assert_eq!(decided.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_persistence_leaves_the_session_undecided() {
        let (session, creator, _) = session(60);

        let err = session
            .finish(FinishReason::Completed, |_| async {
                Err(ServiceError::NotFound("store offline".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        // The tracker reopened, so the session keeps accepting updates and a
        // later finish can still decide.
        session.submit_reps(creator, 3, SystemTime::now()).unwrap();
        let outcome = session
            .finish(FinishReason::Completed, |_| async { Ok(()) })
            .await
            .unwrap();
        assert!(matches!(outcome, FinishOutcome::Decided(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_is_clamped_to_the_duration() {
        let (session, _, _) = session(30);
        tokio::time::advance(std::time::Duration::from_secs(90)).await;
        assert_eq!(session.elapsed_seconds(), 30);
    }
}
