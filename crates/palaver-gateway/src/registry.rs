use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

/// Identifier the connection manager assigns to each accepted connection.
pub type ConnId = u64;

/// Bidirectional index between live connections and authenticated keywords.
///
/// Both directions live behind one lock so no caller can ever observe the
/// maps out of step: `connections_of(k)` returns exactly the connections
/// currently bound to `k`.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<Sessions>>,
}

#[derive(Default)]
struct Sessions {
    by_conn: HashMap<ConnId, String>,
    by_keyword: HashMap<String, HashSet<ConnId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `conn` authenticated as `keyword`. Re-login on the same
    /// connection overwrites the previous binding.
    pub async fn bind(&self, conn: ConnId, keyword: &str) {
        let mut sessions = self.inner.write().await;
        if let Some(previous) = sessions.by_conn.insert(conn, keyword.to_string()) {
            detach(&mut sessions.by_keyword, &previous, conn);
        }
        sessions
            .by_keyword
            .entry(keyword.to_string())
            .or_default()
            .insert(conn);
    }

    /// Remove the connection's binding, if any. Safe to call for a
    /// connection that never logged in or was already unbound.
    pub async fn unbind(&self, conn: ConnId) {
        let mut sessions = self.inner.write().await;
        if let Some(keyword) = sessions.by_conn.remove(&conn) {
            detach(&mut sessions.by_keyword, &keyword, conn);
        }
    }

    pub async fn identity_of(&self, conn: ConnId) -> Option<String> {
        self.inner.read().await.by_conn.get(&conn).cloned()
    }

    /// All live connections for a keyword; empty if offline.
    pub async fn connections_of(&self, keyword: &str) -> Vec<ConnId> {
        self.inner
            .read()
            .await
            .by_keyword
            .get(keyword)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default()
    }
}

fn detach(by_keyword: &mut HashMap<String, HashSet<ConnId>>, keyword: &str, conn: ConnId) {
    if let Some(conns) = by_keyword.get_mut(keyword) {
        conns.remove(&conn);
        if conns.is_empty() {
            by_keyword.remove(keyword);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_unbind_is_exact() {
        let registry = SessionRegistry::new();

        registry.bind(1, "alice").await;
        registry.bind(2, "alice").await;
        registry.bind(3, "bob").await;

        let mut alice = registry.connections_of("alice").await;
        alice.sort_unstable();
        assert_eq!(alice, vec![1, 2]);
        assert_eq!(registry.identity_of(3).await.as_deref(), Some("bob"));

        registry.unbind(1).await;
        assert_eq!(registry.connections_of("alice").await, vec![2]);
        assert_eq!(registry.identity_of(1).await, None);

        registry.unbind(2).await;
        assert!(registry.connections_of("alice").await.is_empty());

        // Unbinding an already-unbound or never-bound connection is a no-op.
        registry.unbind(2).await;
        registry.unbind(99).await;
    }

    #[tokio::test]
    async fn rebind_moves_connection_to_new_keyword() {
        let registry = SessionRegistry::new();

        registry.bind(7, "alice").await;
        registry.bind(7, "bob").await;

        assert!(registry.connections_of("alice").await.is_empty());
        assert_eq!(registry.connections_of("bob").await, vec![7]);
        assert_eq!(registry.identity_of(7).await.as_deref(), Some("bob"));
    }
}
