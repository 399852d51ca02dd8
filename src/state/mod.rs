pub mod battle;
pub mod broadcast;
pub mod machine;
pub mod session;
pub mod tracker;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    config::AppConfig, dao::battle_store::BattleStore, error::ServiceError,
    services::discovery::OpponentDiscovery, state::broadcast::Broadcaster,
    state::session::BattleSession,
};

/// Shared handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state storing live sessions, observer channels, and
/// collaborator handles.
pub struct AppState {
    config: AppConfig,
    battle_store: RwLock<Option<Arc<dyn BattleStore>>>,
    discovery: RwLock<Option<Arc<dyn OpponentDiscovery>>>,
    sessions: DashMap<Uuid, Arc<BattleSession>>,
    broadcaster: Arc<Broadcaster>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self {
            config,
            battle_store: RwLock::new(None),
            discovery: RwLock::new(None),
            sessions: DashMap::new(),
            broadcaster: Arc::new(Broadcaster::new()),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current battle store, if one is installed.
    pub async fn battle_store(&self) -> Option<Arc<dyn BattleStore>> {
        let guard = self.battle_store.read().await;
        guard.as_ref().cloned()
    }

    /// Battle store handle, or a degraded-mode error when none is installed.
    pub async fn require_battle_store(&self) -> Result<Arc<dyn BattleStore>, ServiceError> {
        self.battle_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new battle store implementation and leave degraded mode.
    pub async fn install_battle_store(&self, store: Arc<dyn BattleStore>) {
        let mut guard = self.battle_store.write().await;
        *guard = Some(store);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.battle_store.read().await;
        guard.is_none()
    }

    /// Opponent discovery collaborator, if one is installed.
    pub async fn discovery(&self) -> Option<Arc<dyn OpponentDiscovery>> {
        let guard = self.discovery.read().await;
        guard.as_ref().cloned()
    }

    /// Install the opponent discovery collaborator.
    pub async fn install_discovery(&self, discovery: Arc<dyn OpponentDiscovery>) {
        let mut guard = self.discovery.write().await;
        *guard = Some(discovery);
    }

    /// Live session registry keyed by battle id.
    pub fn sessions(&self) -> &DashMap<Uuid, Arc<BattleSession>> {
        &self.sessions
    }

    /// Live session for one battle, if it is currently active.
    pub fn session(&self, battle_id: Uuid) -> Option<Arc<BattleSession>> {
        self.sessions.get(&battle_id).map(|entry| entry.clone())
    }

    /// Observer fan-out shared with the WebSocket layer.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Cloneable broadcaster handle for collaborators built outside the state.
    pub fn broadcaster_handle(&self) -> Arc<Broadcaster> {
        self.broadcaster.clone()
    }
}
