use std::sync::Arc;

use tracing::{debug, error};

use palaver_db::Store;
use palaver_types::events::ServerEvent;

use crate::connection::ActiveConnections;
use crate::registry::SessionRegistry;

/// Fans events out to the live connections of a chat's members. Delivery is
/// best-effort: a dead connection is skipped and left for its own read loop
/// to reap, and one failure never aborts delivery to the rest.
#[derive(Clone)]
pub struct Broadcaster {
    store: Arc<Store>,
    registry: SessionRegistry,
    connections: ActiveConnections,
}

impl Broadcaster {
    pub fn new(
        store: Arc<Store>,
        registry: SessionRegistry,
        connections: ActiveConnections,
    ) -> Self {
        Self {
            store,
            registry,
            connections,
        }
    }

    /// Deliver `event` to every live connection of every current member of
    /// the chat.
    pub async fn broadcast(&self, chat_id: &str, event: &ServerEvent) {
        let members = match self.store.members_of(chat_id) {
            Ok(members) => members,
            Err(e) => {
                error!("broadcast: resolving members of {} failed: {}", chat_id, e);
                return;
            }
        };

        let line = serde_json::to_string(event).unwrap();
        for member in &members {
            self.deliver(member, &line).await;
        }
    }

    /// Single-recipient case of the same mechanism: deliver to every live
    /// connection of one keyword.
    pub async fn notify(&self, keyword: &str, event: &ServerEvent) {
        let line = serde_json::to_string(event).unwrap();
        self.deliver(keyword, &line).await;
    }

    async fn deliver(&self, keyword: &str, line: &str) {
        for conn in self.registry.connections_of(keyword).await {
            match self.connections.sender(conn).await {
                Some(tx) => {
                    if tx.send(line.to_string()).is_err() {
                        debug!("delivery to connection {} failed, awaiting reap", conn);
                    }
                }
                None => debug!("connection {} already torn down", conn),
            }
        }
    }
}
