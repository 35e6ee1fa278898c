//! Last-known-good node state with hot-reload of the authorized user set

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::node::NodeDescriptor;
use super::quota::UserInfo;
use super::rules::DetectRule;
use super::UserId;
use crate::logger::log;

/// Outcome of replacing the authorized user set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserDiff {
    pub added: usize,
    pub removed: usize,
    /// Same id, different credentials or limits
    pub changed: usize,
}

impl UserDiff {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0
    }
}

/// Holds the latest successfully fetched descriptor, users and rules.
///
/// A failed or not-modified fetch never touches the registry, so consumers keep serving the
/// previous values.
#[derive(Default)]
pub struct SyncRegistry {
    node: RwLock<Option<Arc<NodeDescriptor>>>,
    users: RwLock<HashMap<UserId, UserInfo>>,
    rules: RwLock<Arc<Vec<DetectRule>>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current node descriptor
    pub async fn node(&self) -> Option<Arc<NodeDescriptor>> {
        self.node.read().await.clone()
    }

    /// Replace the node descriptor, returns true if it differs from the previous one
    pub async fn set_node(&self, node: NodeDescriptor) -> bool {
        let mut current = self.node.write().await;
        let changed = current.as_deref() != Some(&node);
        if changed {
            log::info!(
                node_id = node.node_id,
                port = node.port,
                network = %node.transport_protocol,
                "Node descriptor changed"
            );
        }
        *current = Some(Arc::new(node));
        changed
    }

    /// Authorized users, ordered by id
    pub async fn users(&self) -> Vec<UserInfo> {
        let mut users: Vec<UserInfo> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.uid);
        users
    }

    pub async fn user(&self, uid: UserId) -> Option<UserInfo> {
        self.users.read().await.get(&uid).cloned()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Replace the authorized user set
    pub async fn update_users(&self, new_users: &[UserInfo]) -> UserDiff {
        let mut users = self.users.write().await;

        let new_map: HashMap<UserId, UserInfo> =
            new_users.iter().map(|u| (u.uid, u.clone())).collect();

        let mut diff = UserDiff::default();
        for (uid, user) in &new_map {
            match users.get(uid) {
                None => diff.added += 1,
                Some(old) if old != user => diff.changed += 1,
                Some(_) => {}
            }
        }
        diff.removed = users.keys().filter(|uid| !new_map.contains_key(uid)).count();

        *users = new_map;

        if !diff.is_empty() {
            log::info!(
                added = diff.added,
                removed = diff.removed,
                changed = diff.changed,
                total = users.len(),
                "Users updated"
            );
        }
        diff
    }

    pub async fn rules(&self) -> Arc<Vec<DetectRule>> {
        Arc::clone(&*self.rules.read().await)
    }

    pub async fn set_rules(&self, rules: Vec<DetectRule>) {
        *self.rules.write().await = Arc::new(rules);
    }

    /// First rule matching `target`, if any
    pub async fn detect(&self, target: &str) -> Option<i64> {
        self.rules
            .read()
            .await
            .iter()
            .find(|r| r.is_match(target))
            .map(|r| r.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business::api::node::{NodeType, RealityConfig};
    use crate::business::api::rules::parse_local_rules;

    fn create_user(uid: UserId, uuid: &str, device_limit: u32) -> UserInfo {
        UserInfo {
            uid,
            uuid: uuid.to_string(),
            passwd: String::new(),
            port: 0,
            method: String::new(),
            speed_limit: 0,
            device_limit,
            alive_ip: 0,
        }
    }

    fn descriptor(port: u16) -> NodeDescriptor {
        NodeDescriptor {
            node_type: NodeType::Trojan,
            node_id: 1,
            port,
            speed_limit: 0,
            transport_protocol: "tcp".to_string(),
            enable_tls: true,
            enable_vless: false,
            vless_flow: String::new(),
            cipher_method: String::new(),
            server_key: String::new(),
            host: String::new(),
            path: String::new(),
            service_name: String::new(),
            header: None,
            enable_reality: false,
            reality: RealityConfig::default(),
            route_dns: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_registry_new_is_empty() {
        let registry = SyncRegistry::new();
        assert!(registry.node().await.is_none());
        assert_eq!(registry.user_count().await, 0);
        assert!(registry.rules().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_node_reports_change() {
        let registry = SyncRegistry::new();
        assert!(registry.set_node(descriptor(443)).await);
        assert!(!registry.set_node(descriptor(443)).await);
        assert!(registry.set_node(descriptor(8443)).await);
        assert_eq!(registry.node().await.unwrap().port, 8443);
    }

    #[tokio::test]
    async fn test_update_users_add() {
        let registry = SyncRegistry::new();
        registry.update_users(&[create_user(1, "uuid-1", 0)]).await;

        let diff = registry
            .update_users(&[
                create_user(1, "uuid-1", 0),
                create_user(2, "uuid-2", 0),
                create_user(3, "uuid-3", 0),
            ])
            .await;
        assert_eq!(
            diff,
            UserDiff {
                added: 2,
                removed: 0,
                changed: 0
            }
        );
        assert_eq!(registry.user_count().await, 3);
    }

    #[tokio::test]
    async fn test_update_users_remove_and_change() {
        let registry = SyncRegistry::new();
        registry
            .update_users(&[create_user(1, "uuid-1", 0), create_user(2, "uuid-2", 2)])
            .await;

        let diff = registry.update_users(&[create_user(2, "uuid-2", 1)]).await;
        assert_eq!(diff.added, 0);
        assert_eq!(diff.removed, 1);
        assert_eq!(diff.changed, 1);
        assert_eq!(registry.user(2).await.unwrap().device_limit, 1);
        assert!(registry.user(1).await.is_none());
    }

    #[tokio::test]
    async fn test_update_users_uuid_changed() {
        let registry = SyncRegistry::new();
        registry.update_users(&[create_user(1, "uuid-1", 0)]).await;
        let diff = registry.update_users(&[create_user(1, "uuid-1-new", 0)]).await;
        assert_eq!(diff.changed, 1);
        assert!(!diff.is_empty());
    }

    #[tokio::test]
    async fn test_users_sorted() {
        let registry = SyncRegistry::new();
        registry
            .update_users(&[create_user(3, "c", 0), create_user(1, "a", 0), create_user(2, "b", 0)])
            .await;
        let ids: Vec<UserId> = registry.users().await.iter().map(|u| u.uid).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_detect_first_match() {
        let registry = SyncRegistry::new();
        registry.set_rules(parse_local_rules("torrent\nexample")).await;
        assert_eq!(registry.detect("www.example.com").await, Some(-1));
        assert_eq!(registry.detect("clean.org").await, None);
    }
}
