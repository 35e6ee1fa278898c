//! Conditional fetch cache (ETag per resource kind)

use dashmap::DashMap;
use std::fmt;

/// Panel resources fetched with `If-None-Match`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Node,
    Users,
    Rules,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Node => "node",
            ResourceKind::Users => "users",
            ResourceKind::Rules => "rules",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-seen cache token for each resource kind
#[derive(Debug, Default)]
pub struct EtagCache {
    tokens: DashMap<ResourceKind, String>,
}

impl EtagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to send as `If-None-Match`, if one has been seen
    pub fn get(&self, kind: ResourceKind) -> Option<String> {
        self.tokens.get(&kind).map(|t| t.value().clone())
    }

    /// Store a response token. Absent or empty tokens leave the stored value untouched.
    ///
    /// Returns true when the stored token changed.
    pub fn update(&self, kind: ResourceKind, token: Option<&str>) -> bool {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return false,
        };

        if self.tokens.get(&kind).is_some_and(|cur| cur.value() == token) {
            return false;
        }
        self.tokens.insert(kind, token.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_has_no_token() {
        let cache = EtagCache::new();
        assert_eq!(cache.get(ResourceKind::Node), None);
    }

    #[test]
    fn test_update_stores_new_token() {
        let cache = EtagCache::new();
        assert!(cache.update(ResourceKind::Users, Some("\"v1\"")));
        assert_eq!(cache.get(ResourceKind::Users).as_deref(), Some("\"v1\""));
        assert_eq!(cache.get(ResourceKind::Node), None);
    }

    #[test]
    fn test_unchanged_token_is_noop() {
        let cache = EtagCache::new();
        cache.update(ResourceKind::Rules, Some("abc"));
        assert!(!cache.update(ResourceKind::Rules, Some("abc")));
        assert_eq!(cache.get(ResourceKind::Rules).as_deref(), Some("abc"));
    }

    #[test]
    fn test_absent_or_empty_token_keeps_previous() {
        let cache = EtagCache::new();
        cache.update(ResourceKind::Node, Some("abc"));
        assert!(!cache.update(ResourceKind::Node, None));
        assert!(!cache.update(ResourceKind::Node, Some("")));
        assert_eq!(cache.get(ResourceKind::Node).as_deref(), Some("abc"));
    }

    #[test]
    fn test_changed_token_overwrites() {
        let cache = EtagCache::new();
        cache.update(ResourceKind::Node, Some("abc"));
        assert!(cache.update(ResourceKind::Node, Some("def")));
        assert_eq!(cache.get(ResourceKind::Node).as_deref(), Some("def"));
    }
}
