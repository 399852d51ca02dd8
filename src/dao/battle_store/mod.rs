pub mod memory;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{BattleEntity, PerformanceEntity};
use crate::dao::storage::StorageResult;
use crate::state::machine::BattleStatus;

/// Partial update applied to a battle record at a lifecycle boundary.
///
/// `expect_status` makes the write optimistic: the backend must reject the
/// update with a conflict when the stored status differs, so two racing
/// writers can never silently overwrite each other's transition.
#[derive(Debug, Clone, Default)]
pub struct BattlePatch {
    /// Status the caller based this update on, checked before writing.
    pub expect_status: Option<BattleStatus>,
    /// New lifecycle status.
    pub status: Option<BattleStatus>,
    /// Start timestamp, written once on activation.
    pub started_at: Option<SystemTime>,
    /// End timestamp, written once on completion/cancellation.
    pub ended_at: Option<SystemTime>,
    /// Winner field; `Some(None)` records a tie explicitly.
    pub winner_id: Option<Option<Uuid>>,
}

/// Abstraction over the persistence layer for battles and performances.
pub trait BattleStore: Send + Sync {
    /// Persist a freshly created battle.
    fn create(&self, battle: BattleEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch one battle by id.
    fn find(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BattleEntity>>>;
    /// Apply a partial update, honouring the patch's optimistic expectations.
    fn update(&self, id: Uuid, patch: BattlePatch) -> BoxFuture<'static, StorageResult<BattleEntity>>;
    /// List battles the user takes part in, optionally filtered by status,
    /// newest first.
    fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<BattleStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<BattleEntity>>>;
    /// Fetch the per-contestant rep records of one battle.
    fn performances(&self, battle_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<PerformanceEntity>>>;
    /// Write a contestant's rep count at a session boundary.
    fn upsert_performance(
        &self,
        battle_id: Uuid,
        user_id: Uuid,
        reps: u32,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Probe backend connectivity.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
