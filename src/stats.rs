//! Usage collection for panel reports
//!
//! Downstream consumers record traffic, observed client IPs and detect hits here; the report
//! task drains everything once per reporting period.

use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::business::api::{IllegalItem, OnlineUser, UserId, UserTraffic};

/// Hook for components that observe user activity
pub trait UsageRecorder: Send + Sync {
    /// Record upload bytes (client -> remote)
    fn record_upload(&self, user_id: UserId, bytes: u64);
    /// Record download bytes (remote -> client)
    fn record_download(&self, user_id: UserId, bytes: u64);
    /// Record a client IP seen for a user
    fn record_online(&self, user_id: UserId, ip: &str);
    /// Record a detect rule hit
    fn record_illegal(&self, rule_id: i64, user_id: UserId);
}

#[derive(Debug, Default)]
struct UserTrafficData {
    upload_bytes: AtomicU64,
    download_bytes: AtomicU64,
}

/// Everything collected during one reporting period
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub traffic: Vec<UserTraffic>,
    pub online: Vec<OnlineUser>,
    pub illegal: Vec<IllegalItem>,
}

/// Concurrent usage collector
#[derive(Debug, Default)]
pub struct UsageCollector {
    traffic: DashMap<UserId, UserTrafficData>,
    online: DashSet<(UserId, String)>,
    illegal: DashSet<(i64, UserId)>,
    drain_lock: Mutex<()>,
}

impl UsageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with recorded traffic
    pub fn user_count(&self) -> usize {
        self.traffic.len()
    }

    /// Take everything recorded so far.
    ///
    /// Counters are swapped to zero, so writes racing with the drain land in either this
    /// snapshot or the next one. Users without traffic are left out of `traffic`.
    pub fn drain(&self) -> UsageSnapshot {
        let _guard = self.drain_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let keys: Vec<UserId> = self.traffic.iter().map(|e| *e.key()).collect();
        let mut traffic = Vec::with_capacity(keys.len());
        for uid in keys {
            if let Some(entry) = self.traffic.get(&uid) {
                let upload = entry.upload_bytes.swap(0, Ordering::AcqRel);
                let download = entry.download_bytes.swap(0, Ordering::AcqRel);
                if upload > 0 || download > 0 {
                    traffic.push(UserTraffic {
                        uid,
                        upload,
                        download,
                    });
                }
            }
        }
        self.traffic.retain(|_, data| {
            data.upload_bytes.load(Ordering::Relaxed) > 0
                || data.download_bytes.load(Ordering::Relaxed) > 0
        });
        traffic.sort_by_key(|t| t.uid);

        let mut online = Vec::with_capacity(self.online.len());
        let pairs: Vec<(UserId, String)> = self.online.iter().map(|e| e.key().clone()).collect();
        for pair in pairs {
            if let Some((uid, ip)) = self.online.remove(&pair) {
                online.push(OnlineUser { uid, ip });
            }
        }
        online.sort_by(|a, b| (a.uid, &a.ip).cmp(&(b.uid, &b.ip)));

        let hits: Vec<(i64, UserId)> = self.illegal.iter().map(|e| *e.key()).collect();
        let mut illegal = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some((rule_id, uid)) = self.illegal.remove(&hit) {
                illegal.push(IllegalItem { rule_id, uid });
            }
        }
        illegal.sort_by_key(|i| (i.uid, i.rule_id));

        UsageSnapshot {
            traffic,
            online,
            illegal,
        }
    }
}

impl UsageRecorder for UsageCollector {
    fn record_upload(&self, user_id: UserId, bytes: u64) {
        self.traffic
            .entry(user_id)
            .or_default()
            .upload_bytes
            .fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_download(&self, user_id: UserId, bytes: u64) {
        self.traffic
            .entry(user_id)
            .or_default()
            .download_bytes
            .fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_online(&self, user_id: UserId, ip: &str) {
        self.online.insert((user_id, ip.to_string()));
    }

    fn record_illegal(&self, rule_id: i64, user_id: UserId) {
        self.illegal.insert((rule_id, user_id));
    }
}
