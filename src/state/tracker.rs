use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use thiserror::Error;
use uuid::Uuid;

/// Error returned when a rep submission is rejected by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The battle already reached a terminal decision; no more updates apply.
    #[error("rep tracking is closed for this battle")]
    Sealed,
    /// The submitted value does not exceed the stored one.
    #[error("stale update: stored rep count is already {current}")]
    Stale {
        /// Rep count currently on record for the contestant.
        current: u32,
    },
    /// The submitting user is not one of the two contestants.
    #[error("user is not a contestant in this battle")]
    UnknownParticipant,
}

/// Consistent view of one contestant's tracked counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedPerformance {
    /// Contestant the counts belong to.
    pub user_id: Uuid,
    /// Latest accepted rep count.
    pub reps: u32,
    /// Timestamp of the most recent accepted update, if any arrived.
    pub last_updated_at: Option<SystemTime>,
}

#[derive(Debug)]
struct SlotState {
    reps: u32,
    last_updated_at: Option<SystemTime>,
    sealed: bool,
}

/// Concurrency-safe rep accumulator for the two contestants of one battle.
///
/// Each contestant owns an independent lock: concurrent submissions for the
/// same contestant serialize on that lock, submissions for different
/// contestants never contend. Sealing takes both locks in a fixed order, so a
/// sealed snapshot can never observe a half-applied update and any submission
/// that did not make the snapshot observes the seal instead.
#[derive(Debug)]
pub struct PerformanceTracker {
    ids: [Uuid; 2],
    slots: [Mutex<SlotState>; 2],
}

impl PerformanceTracker {
    /// Allocate zeroed slots for both contestants, creator first.
    pub fn new(creator_id: Uuid, opponent_id: Uuid) -> Self {
        let zeroed = || {
            Mutex::new(SlotState {
                reps: 0,
                last_updated_at: None,
                sealed: false,
            })
        };
        Self {
            ids: [creator_id, opponent_id],
            slots: [zeroed(), zeroed()],
        }
    }

    /// Record `reps` for `user` if it strictly exceeds the stored count.
    pub fn submit(
        &self,
        user: Uuid,
        reps: u32,
        at: SystemTime,
    ) -> Result<TrackedPerformance, TrackerError> {
        let index = self
            .ids
            .iter()
            .position(|id| *id == user)
            .ok_or(TrackerError::UnknownParticipant)?;

        let mut slot = lock_slot(&self.slots[index]);
        if slot.sealed {
            return Err(TrackerError::Sealed);
        }
        if reps <= slot.reps {
            return Err(TrackerError::Stale { current: slot.reps });
        }

        slot.reps = reps;
        slot.last_updated_at = Some(at);
        Ok(TrackedPerformance {
            user_id: user,
            reps,
            last_updated_at: slot.last_updated_at,
        })
    }

    /// Read both contestants' counts under both locks, torn-free.
    pub fn snapshot(&self) -> [TrackedPerformance; 2] {
        let first = lock_slot(&self.slots[0]);
        let second = lock_slot(&self.slots[1]);
        [view(self.ids[0], &first), view(self.ids[1], &second)]
    }

    /// Close both slots and return the final counts.
    ///
    /// Holding both locks while flipping the flags gives the required total
    /// order: an in-flight submission either lands before the seal (and is in
    /// the returned snapshot) or observes [`TrackerError::Sealed`].
    pub fn seal(&self) -> [TrackedPerformance; 2] {
        let mut first = lock_slot(&self.slots[0]);
        let mut second = lock_slot(&self.slots[1]);
        first.sealed = true;
        second.sealed = true;
        [view(self.ids[0], &first), view(self.ids[1], &second)]
    }

    /// Undo a seal after the terminal store write failed, so the session does
    /// not advance past a transition that was never persisted.
    pub fn reopen(&self) {
        let mut first = lock_slot(&self.slots[0]);
        let mut second = lock_slot(&self.slots[1]);
        first.sealed = false;
        second.sealed = false;
    }
}

fn view(user_id: Uuid, slot: &SlotState) -> TrackedPerformance {
    TrackedPerformance {
        user_id,
        reps: slot.reps,
        last_updated_at: slot.last_updated_at,
    }
}

// A poisoned slot still holds internally consistent counts (every mutation is
// a two-field store), so recover the guard instead of propagating the panic.
fn lock_slot(slot: &Mutex<SlotState>) -> MutexGuard<'_, SlotState> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn tracker() -> (PerformanceTracker, Uuid, Uuid) {
        let creator = Uuid::new_v4();
        let opponent = Uuid::new_v4();
        (PerformanceTracker::new(creator, opponent), creator, opponent)
    }

    #[test]
    fn increasing_values_are_accepted() {
        let (tracker, creator, _) = tracker();
        let now = SystemTime::now();

        assert!(tracker.submit(creator, 5, now).is_ok());
        assert!(tracker.submit(creator, 12, now).is_ok());
        assert_eq!(tracker.snapshot()[0].reps, 12);
    }

    #[test]
    fn reordered_smaller_value_is_rejected_and_count_kept() {
        let (tracker, creator, _) = tracker();
        let now = SystemTime::now();

        tracker.submit(creator, 10, now).unwrap();
        let err = tracker.submit(creator, 5, now).unwrap_err();
        assert_eq!(err, TrackerError::Stale { current: 10 });
        assert_eq!(tracker.snapshot()[0].reps, 10);
    }

    #[test]
    fn equal_value_counts_as_stale() {
        let (tracker, creator, _) = tracker();
        let now = SystemTime::now();

        tracker.submit(creator, 7, now).unwrap();
        assert_eq!(
            tracker.submit(creator, 7, now).unwrap_err(),
            TrackerError::Stale { current: 7 }
        );
    }

    #[test]
    fn zero_on_fresh_slot_is_stale() {
        let (tracker, creator, _) = tracker();
        assert_eq!(
            tracker.submit(creator, 0, SystemTime::now()).unwrap_err(),
            TrackerError::Stale { current: 0 }
        );
    }

    #[test]
    fn outsiders_are_rejected() {
        let (tracker, _, _) = tracker();
        assert_eq!(
            tracker
                .submit(Uuid::new_v4(), 3, SystemTime::now())
                .unwrap_err(),
            TrackerError::UnknownParticipant
        );
    }

    #[test]
    fn contestants_do_not_block_each_other() {
        let (tracker, creator, opponent) = tracker();
        let tracker = std::sync::Arc::new(tracker);

        let handles: Vec<_> = [(creator, 1u32), (opponent, 1u32)]
            .into_iter()
            .map(|(user, base)| {
                let tracker = tracker.clone();
                thread::spawn(move || {
                    for step in 0..100u32 {
                        tracker
                            .submit(user, base + step, SystemTime::now())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot[0].reps, 100);
        assert_eq!(snapshot[1].reps, 100);
    }

    #[test]
    fn sealed_tracker_rejects_submissions() {
        let (tracker, creator, opponent) = tracker();
        let now = SystemTime::now();

        tracker.submit(creator, 10, now).unwrap();
        tracker.submit(opponent, 7, now).unwrap();

        let finals = tracker.seal();
        assert_eq!(finals[0].reps, 10);
        assert_eq!(finals[1].reps, 7);

        assert_eq!(
            tracker.submit(creator, 11, now).unwrap_err(),
            TrackerError::Sealed
        );
    }

    #[test]
    fn reopen_allows_submissions_again() {
        let (tracker, creator, _) = tracker();
        let now = SystemTime::now();

        tracker.submit(creator, 4, now).unwrap();
        tracker.seal();
        tracker.reopen();
        tracker.submit(creator, 5, now).unwrap();
        assert_eq!(tracker.snapshot()[0].reps, 5);
    }
}
