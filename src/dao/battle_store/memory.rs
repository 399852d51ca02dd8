use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::battle_store::{BattlePatch, BattleStore};
use crate::dao::models::{BattleEntity, PerformanceEntity};
use crate::dao::storage::{StorageError, StorageResult};
use crate::state::machine::BattleStatus;

/// In-memory [`BattleStore`] backend.
///
/// Backs the default deployment and the test suite; database-backed
/// implementations plug in behind the same trait.
#[derive(Debug, Default, Clone)]
pub struct MemoryBattleStore {
    battles: Arc<DashMap<Uuid, BattleEntity>>,
    performances: Arc<DashMap<(Uuid, Uuid), PerformanceEntity>>,
}

impl MemoryBattleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_patch(&self, id: Uuid, patch: BattlePatch) -> StorageResult<BattleEntity> {
        let mut entry = self.battles.get_mut(&id).ok_or(StorageError::Missing(id))?;

        if let Some(expected) = patch.expect_status
            && entry.status != expected
        {
            return Err(StorageError::Conflict {
                battle_id: id,
                expected,
                found: entry.status,
            });
        }

        if let Some(next) = patch.status {
            // A terminal record never changes status again, expectations or not.
            if entry.status.is_terminal() && next != entry.status {
                return Err(StorageError::Conflict {
                    battle_id: id,
                    expected: patch.expect_status.unwrap_or(entry.status),
                    found: entry.status,
                });
            }
            entry.status = next;
        }
        if let Some(at) = patch.started_at {
            entry.started_at = Some(at);
        }
        if let Some(at) = patch.ended_at {
            entry.ended_at = Some(at);
        }
        if let Some(winner) = patch.winner_id {
            entry.winner_id = winner;
        }

        Ok(entry.clone())
    }
}

impl BattleStore for MemoryBattleStore {
    fn create(&self, battle: BattleEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.battles.insert(battle.id, battle);
        futures::future::ready(Ok(())).boxed()
    }

    fn find(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BattleEntity>>> {
        let found = self.battles.get(&id).map(|entry| entry.clone());
        futures::future::ready(Ok(found)).boxed()
    }

    fn update(&self, id: Uuid, patch: BattlePatch) -> BoxFuture<'static, StorageResult<BattleEntity>> {
        futures::future::ready(self.apply_patch(id, patch)).boxed()
    }

    fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<BattleStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<BattleEntity>>> {
        let mut battles: Vec<BattleEntity> = self
            .battles
            .iter()
            .filter(|entry| entry.creator_id == user_id || entry.opponent_id == user_id)
            .filter(|entry| status.is_none_or(|wanted| entry.status == wanted))
            .map(|entry| entry.clone())
            .collect();
        battles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        futures::future::ready(Ok(battles)).boxed()
    }

    fn performances(
        &self,
        battle_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PerformanceEntity>>> {
        let mut records: Vec<PerformanceEntity> = self
            .performances
            .iter()
            .filter(|entry| entry.battle_id == battle_id)
            .map(|entry| entry.clone())
            .collect();
        records.sort_by_key(|record| record.user_id);
        futures::future::ready(Ok(records)).boxed()
    }

    fn upsert_performance(
        &self,
        battle_id: Uuid,
        user_id: Uuid,
        reps: u32,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.performances.insert(
            (battle_id, user_id),
            PerformanceEntity {
                battle_id,
                user_id,
                reps,
                last_updated_at: at,
            },
        );
        futures::future::ready(Ok(())).boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        futures::future::ready(Ok(())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::battle::Battle;

    fn stored_battle(store: &MemoryBattleStore, status: BattleStatus) -> Uuid {
        let mut battle = Battle::new(Uuid::new_v4(), Uuid::new_v4(), "pushups".into(), 60);
        battle.status = status;
        let entity: BattleEntity = battle.into();
        let id = entity.id;
        store.battles.insert(id, entity);
        id
    }

    #[tokio::test]
    async fn optimistic_update_rejects_unexpected_status() {
        let store = MemoryBattleStore::new();
        let id = stored_battle(&store, BattleStatus::Active);

        let err = store
            .update(
                id,
                BattlePatch {
                    expect_status: Some(BattleStatus::Pending),
                    status: Some(BattleStatus::Accepted),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Conflict { found, .. } if found == BattleStatus::Active));
    }

    #[tokio::test]
    async fn terminal_status_is_never_overwritten() {
        let store = MemoryBattleStore::new();
        let id = stored_battle(&store, BattleStatus::Completed);

        let err = store
            .update(
                id,
                BattlePatch {
                    status: Some(BattleStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn listing_filters_by_participant_and_status() {
        let store = MemoryBattleStore::new();
        let user = Uuid::new_v4();

        let mut mine = Battle::new(user, Uuid::new_v4(), "squats".into(), 30);
        mine.status = BattleStatus::Accepted;
        store.battles.insert(mine.id, mine.clone().into());

        let other = Battle::new(Uuid::new_v4(), Uuid::new_v4(), "squats".into(), 30);
        store.battles.insert(other.id, other.into());

        let listed = store
            .list_for_user(user, Some(BattleStatus::Accepted))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);

        assert!(
            store
                .list_for_user(user, Some(BattleStatus::Active))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
