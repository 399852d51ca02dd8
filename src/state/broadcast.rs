use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dto::events::BattleEvent;

/// Handle used to push frames to one connected user.
#[derive(Clone)]
pub struct UserChannel {
    /// Authenticated owner of the connection.
    pub user_id: Uuid,
    /// Sender half feeding the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Fan-out of battle events to connected observers.
///
/// Holds one send handle per connected user and one subscriber set per
/// battle. Delivery is fire-and-forget: a slow or dead observer never blocks
/// the update path, and a channel observed closed is pruned together with its
/// subscriptions.
#[derive(Default)]
pub struct Broadcaster {
    connections: DashMap<Uuid, UserChannel>,
    subscriptions: DashMap<Uuid, HashSet<Uuid>>,
}

impl Broadcaster {
    /// Create an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the send handle for a connected user.
    pub fn register(&self, channel: UserChannel) {
        self.connections.insert(channel.user_id, channel);
    }

    /// Remove a user's send handle and every subscription it held.
    pub fn unregister(&self, user_id: Uuid) {
        self.connections.remove(&user_id);
        for mut entry in self.subscriptions.iter_mut() {
            entry.value_mut().remove(&user_id);
        }
    }

    /// Subscribe a user to one battle's events.
    pub fn subscribe(&self, battle_id: Uuid, user_id: Uuid) {
        self.subscriptions
            .entry(battle_id)
            .or_default()
            .insert(user_id);
    }

    /// Drop a user's subscription to one battle.
    pub fn unsubscribe(&self, battle_id: Uuid, user_id: Uuid) {
        if let Some(mut entry) = self.subscriptions.get_mut(&battle_id) {
            entry.value_mut().remove(&user_id);
        }
    }

    /// Forget a battle's subscriber set once it left the active state.
    pub fn drop_battle(&self, battle_id: Uuid) {
        self.subscriptions.remove(&battle_id);
    }

    /// Users with a live connection right now.
    pub fn connected_users(&self) -> Vec<Uuid> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Deliver `event` to every subscriber of its battle.
    ///
    /// The payload is serialized once; send failures mark the connection dead
    /// and are swallowed after logging, never propagated to the caller.
    pub fn broadcast(&self, event: &BattleEvent) {
        let battle_id = event.battle_id();
        let Some(subscribers) = self.subscriptions.get(&battle_id) else {
            return;
        };
        let targets: Vec<Uuid> = subscribers.iter().copied().collect();
        drop(subscribers);

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%battle_id, error = %err, "failed to serialize battle event");
                return;
            }
        };

        let mut dead = Vec::new();
        for user_id in targets {
            let Some(connection) = self.connections.get(&user_id) else {
                // Not connected right now; keep the subscription so an
                // implicitly subscribed participant can pick events up after
                // reconnecting.
                continue;
            };
            if connection
                .tx
                .send(Message::Text(payload.clone().into()))
                .is_err()
            {
                dead.push(user_id);
            }
        }

        for user_id in dead {
            debug!(%battle_id, user_id = %user_id, "dropping closed observer channel");
            self.unregister(user_id);
        }
    }
}
