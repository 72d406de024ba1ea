//! Instance record — one running client process.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Identity of an instance: app, effective address and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub app: String,
    pub address: String,
    pub port: i32,
}

/// Last known state of a single client process.
///
/// Two records describe the same instance iff `app`, [`address`](Self::address)
/// and `port` match. `hostname` and the heartbeat fields never take part in
/// identity, so a fresh heartbeat replaces the stored record wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub app: String,
    pub app_type: i32,
    pub hostname: String,
    pub ip: String,
    /// Optional DNS name, e.g. `svc.namespace.svc.cluster.local`.
    pub domain: String,
    /// Optional override label, e.g. a StatefulSet pod name.
    pub name: String,
    /// `-1` while the client has not bound its command port yet.
    pub port: i32,
    /// Epoch millis of the last heartbeat.
    pub last_heartbeat: i64,
    pub heartbeat_version: i64,
    /// Client build string.
    pub version: String,
}

impl InstanceRecord {
    pub fn new(app: impl Into<String>, ip: impl Into<String>, port: i32) -> Self {
        Self {
            app: app.into(),
            app_type: 0,
            hostname: String::new(),
            ip: ip.into(),
            domain: String::new(),
            name: String::new(),
            port,
            last_heartbeat: 0,
            heartbeat_version: 0,
            version: String::new(),
        }
    }

    /// Address used for display and identity: `name`, else `domain`, else `ip`.
    pub fn address(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.domain.is_empty() {
            &self.domain
        } else {
            &self.ip
        }
    }

    /// `address:port`, e.g. `token-server-0:8719`.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.address(), self.port)
    }

    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            app: self.app.clone(),
            address: self.address().to_string(),
            port: self.port,
        }
    }

    /// Healthy while the last heartbeat is younger than `unhealthy_ms`.
    pub fn is_healthy_at(&self, now: i64, unhealthy_ms: i64) -> bool {
        now - self.last_heartbeat < unhealthy_ms
    }

    /// Expired once older than `auto_remove_ms`; never when that is `<= 0`.
    pub fn is_expired_at(&self, now: i64, auto_remove_ms: i64) -> bool {
        auto_remove_ms > 0 && now - self.last_heartbeat > auto_remove_ms
    }

    /// Listing order: port, then app and ip compared case-insensitively.
    ///
    /// Deliberately not an `Ord` impl: it disagrees with identity equality.
    pub fn listing_cmp(&self, other: &Self) -> Ordering {
        self.port
            .cmp(&other.port)
            .then_with(|| {
                if self.app == other.app {
                    Ordering::Equal
                } else {
                    cmp_ignore_case(&self.app, &other.app)
                }
            })
            .then_with(|| cmp_ignore_case(&self.ip, &other.ip))
    }

    /// Compact `app|ip|port|version` form for log lines.
    pub fn log_string(&self) -> String {
        format!("{}|{}|{}|{}", self.app, self.ip, self.port, self.version)
    }
}

impl PartialEq for InstanceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.app == other.app && self.address() == other.address() && self.port == other.port
    }
}

impl Eq for InstanceRecord {}

impl Hash for InstanceRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.app.hash(state);
        self.address().hash(state);
        self.port.hash(state);
    }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Read-only projection of an instance for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub app: String,
    pub hostname: String,
    pub ip: String,
    pub address: String,
    pub port: i32,
    pub heartbeat_version: i64,
    pub last_heartbeat: i64,
    pub healthy: bool,
    pub version: String,
}

impl InstanceView {
    pub fn from_record(record: &InstanceRecord, now: i64, unhealthy_ms: i64) -> Self {
        Self {
            app: record.app.clone(),
            hostname: record.hostname.clone(),
            ip: record.ip.clone(),
            address: record.address().to_string(),
            port: record.port,
            heartbeat_version: record.heartbeat_version,
            last_heartbeat: record.last_heartbeat,
            healthy: record.is_healthy_at(now, unhealthy_ms),
            version: record.version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn address_prefers_name_then_domain() {
        let mut r = InstanceRecord::new("app", "10.0.0.1", 8719);
        assert_eq!(r.address(), "10.0.0.1");
        r.domain = "svc.ns.svc.cluster.local".into();
        assert_eq!(r.address(), "svc.ns.svc.cluster.local");
        r.name = "token-server-0".into();
        assert_eq!(r.address(), "token-server-0");
        assert_eq!(r.host_port(), "token-server-0:8719");
    }

    #[test]
    fn hostname_does_not_affect_identity() {
        let mut a = InstanceRecord::new("app", "10.0.0.1", 8719);
        let mut b = a.clone();
        a.hostname = "host-a".into();
        b.hostname = "host-b".into();
        b.last_heartbeat = 99;
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn port_and_app_distinguish_instances() {
        let a = InstanceRecord::new("app", "10.0.0.1", 8719);
        assert_ne!(a, InstanceRecord::new("app", "10.0.0.1", 8720));
        assert_ne!(a, InstanceRecord::new("other", "10.0.0.1", 8719));
    }

    #[test]
    fn health_and_expiry() {
        let mut r = InstanceRecord::new("app", "10.0.0.1", 8719);
        r.last_heartbeat = 1_000;
        assert!(r.is_healthy_at(1_500, 1_000));
        assert!(!r.is_healthy_at(2_000, 1_000));

        assert!(!r.is_expired_at(1_000_000, 0));
        assert!(!r.is_expired_at(2_000, 1_000));
        assert!(r.is_expired_at(2_001, 1_000));
    }

    #[test]
    fn listing_order() {
        let mut list = vec![
            InstanceRecord::new("b", "10.0.0.2", 8720),
            InstanceRecord::new("B", "10.0.0.1", 8719),
            InstanceRecord::new("a", "10.0.0.9", 8719),
        ];
        list.sort_by(|x, y| x.listing_cmp(y));
        let order: Vec<_> = list.iter().map(|r| (r.app.as_str(), r.port)).collect();
        assert_eq!(order, vec![("a", 8719), ("B", 8719), ("b", 8720)]);
    }
}
