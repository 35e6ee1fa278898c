//! Per-user device and speed quota reconciliation
//!
//! The panel reports how many IPs it currently sees alive for each user, possibly counted across
//! several nodes and possibly stale. This node remembers how many IPs it reported itself during
//! the last online report (the carry-over) and folds that count back in, so a user is only evicted
//! once the overage is confirmed rather than because of propagation lag.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::models::{OnlineUser, UserResponse};
use super::UserId;

/// Convert a panel speed (Mbps) to bytes per second, floored. Non-positive input yields 0.
pub fn mbps_to_bytes_per_sec(mbps: f64) -> u64 {
    if mbps.is_nan() || mbps <= 0.0 {
        return 0;
    }
    (mbps * 1_000_000.0 / 8.0).floor() as u64
}

/// `override` wins when set, otherwise the panel value
pub fn resolve_speed_limit(global_override: f64, value: f64) -> u64 {
    if global_override > 0.0 {
        mbps_to_bytes_per_sec(global_override)
    } else {
        mbps_to_bytes_per_sec(value)
    }
}

/// Node-wide overrides applied on top of per-user panel values (0 = unset)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuotaPolicy {
    /// Mbps
    pub speed_limit: f64,
    pub device_limit: u32,
}

/// An authorized user with resolved quotas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub uid: UserId,
    pub uuid: String,
    pub passwd: String,
    pub port: u32,
    pub method: String,
    /// Bytes per second, 0 = unlimited
    pub speed_limit: u64,
    /// Devices this node may admit, 0 = unlimited
    pub device_limit: u32,
    /// Alive IPs as reported by the panel
    pub alive_ip: i64,
}

/// Effective device limit, or `None` when the user has no device left and must be excluded.
pub fn effective_device_limit(limit: i64, alive_ip: i64, last_online: i64) -> Option<i64> {
    if limit > 0 && alive_ip > 0 {
        let local = limit - alive_ip + last_online;
        if local > 0 {
            Some(local)
        } else if last_online > 0 {
            Some(last_online)
        } else {
            None
        }
    } else {
        Some(limit.max(0))
    }
}

/// Count reported IPs per user. Repeated entries for one user are counted, not deduplicated.
pub fn count_online(online: &[OnlineUser]) -> HashMap<UserId, usize> {
    let mut counts = HashMap::new();
    for user in online {
        *counts.entry(user.uid).or_insert(0) += 1;
    }
    counts
}

/// Online counts from the last report, consumed by the next reconciliation
#[derive(Debug, Default)]
pub struct CarryOver {
    last_report: Mutex<HashMap<UserId, usize>>,
}

impl CarryOver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, usize>> {
        self.last_report.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the state with the counts of a fresh online report
    pub fn replace(&self, counts: HashMap<UserId, usize>) {
        *self.lock() = counts;
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> HashMap<UserId, usize> {
        self.lock().clone()
    }

    /// Resolve quotas for every user, then clear the state.
    ///
    /// The lock is held for the whole pass so a concurrent `replace` is seen entirely or not at all.
    pub fn reconcile(&self, users: &[UserResponse], policy: &QuotaPolicy) -> Vec<UserInfo> {
        let mut last_report = self.lock();

        let authorized = users
            .iter()
            .filter_map(|user| reconcile_user(user, &last_report, policy))
            .collect();

        last_report.clear();
        authorized
    }
}

fn reconcile_user(
    user: &UserResponse,
    last_report: &HashMap<UserId, usize>,
    policy: &QuotaPolicy,
) -> Option<UserInfo> {
    let limit = if policy.device_limit > 0 {
        i64::from(policy.device_limit)
    } else {
        user.device_limit
    };
    let last_online = last_report
        .get(&user.id)
        .map_or(0, |&n| i64::try_from(n).unwrap_or(i64::MAX));

    let device_limit = effective_device_limit(limit, user.alive_ip, last_online)?;

    Some(UserInfo {
        uid: user.id,
        uuid: user.uuid.clone(),
        passwd: user.passwd.clone(),
        port: user.port,
        method: user.method.clone(),
        speed_limit: resolve_speed_limit(policy.speed_limit, user.speed_limit),
        device_limit: u32::try_from(device_limit).unwrap_or(u32::MAX),
        alive_ip: user.alive_ip,
    })
}
