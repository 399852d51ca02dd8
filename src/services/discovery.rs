use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use rand::seq::IndexedRandom;
use tracing::debug;
use uuid::Uuid;

use crate::state::broadcast::Broadcaster;

/// Supplies candidate opponents for quick challenges.
///
/// Matchmaking proper lives outside this service; implementations only need
/// to answer "who could `creator` battle right now".
pub trait OpponentDiscovery: Send + Sync {
    /// Return a candidate opponent for `creator`, if one can be found.
    fn nearby_opponent(&self, creator: Uuid, exercise_type: &str) -> BoxFuture<'static, Option<Uuid>>;
}

/// Default discovery that treats currently-connected users as "nearby".
pub struct NearbyOnlineDiscovery {
    broadcaster: Arc<Broadcaster>,
}

impl NearbyOnlineDiscovery {
    /// Build a discovery backed by the live connection registry.
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

impl OpponentDiscovery for NearbyOnlineDiscovery {
    fn nearby_opponent(&self, creator: Uuid, exercise_type: &str) -> BoxFuture<'static, Option<Uuid>> {
        let candidates: Vec<Uuid> = self
            .broadcaster
            .connected_users()
            .into_iter()
            .filter(|user| *user != creator)
            .collect();
        let pick = candidates.choose(&mut rand::rng()).copied();
        debug!(
            %creator,
            exercise_type,
            candidates = candidates.len(),
            picked = ?pick,
            "quick challenge opponent discovery"
        );
        futures::future::ready(pick).boxed()
    }
}
