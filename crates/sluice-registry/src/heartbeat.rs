//! Heartbeat intake — validation of decoded heartbeat parameters.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{RegistryError, RegistryResult};
use crate::instance::InstanceRecord;

pub const MAX_APP_NAME_LEN: usize = 256;
pub const MAX_IP_LEN: usize = 128;
pub const MAX_HOSTNAME_LEN: usize = 256;

/// DNS names and Kubernetes service names (`svc`, `svc.ns`, `svc.ns.svc.cluster.local`).
static HOSTNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("hostname pattern compiles")
});

/// Heartbeat parameters as sent by a client.
///
/// Field names on the wire follow the client protocol: `version` carries
/// the heartbeat version and `v` the client build string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Heartbeat {
    pub app: Option<String>,
    #[serde(default)]
    pub app_type: Option<i32>,
    #[serde(rename = "version")]
    pub heartbeat_version: Option<i64>,
    #[serde(rename = "v")]
    pub client_version: Option<String>,
    pub hostname: Option<String>,
    pub ip: Option<String>,
    pub port: Option<i32>,
    pub domain: Option<String>,
    pub name: Option<String>,
}

impl Heartbeat {
    /// Check every field against the registry's boundary constraints.
    ///
    /// Messages are returned to the sender verbatim.
    pub fn validate(&self) -> RegistryResult<()> {
        let app = self.app.as_deref().unwrap_or_default();
        if is_blank(app) || app.chars().count() > MAX_APP_NAME_LEN {
            return Err(RegistryError::invalid("invalid appName"));
        }
        let ip = self.ip.as_deref().unwrap_or_default();
        if is_blank(ip) || ip.chars().count() > MAX_IP_LEN {
            return Err(RegistryError::invalid(format!("invalid ip: {ip}")));
        }
        if !is_valid_ip_or_hostname(ip) {
            return Err(RegistryError::invalid(format!(
                "invalid ip or hostname: {ip}"
            )));
        }
        let port = match self.port {
            Some(p) if p >= -1 => p,
            _ => return Err(RegistryError::invalid("invalid port")),
        };
        if self
            .hostname
            .as_deref()
            .is_some_and(|h| h.chars().count() > MAX_HOSTNAME_LEN)
        {
            return Err(RegistryError::invalid("hostname too long"));
        }
        for (field, value) in [("domain", &self.domain), ("name", &self.name)] {
            if value
                .as_deref()
                .is_some_and(|v| v.chars().count() > MAX_HOSTNAME_LEN)
            {
                return Err(RegistryError::invalid(format!("{field} too long")));
            }
        }
        if port == -1 {
            return Err(RegistryError::invalid("your port not set yet"));
        }
        Ok(())
    }

    /// Build the record stored in the registry. Call after [`validate`](Self::validate).
    pub fn into_record(self, now: i64) -> InstanceRecord {
        let client_version = match self.client_version {
            Some(v) if !is_blank(&v) => v,
            _ => "unknown".to_string(),
        };
        let mut record = InstanceRecord::new(
            self.app.unwrap_or_default(),
            self.ip.unwrap_or_default(),
            self.port.unwrap_or(-1),
        );
        record.app_type = self.app_type.unwrap_or(0);
        record.hostname = self.hostname.unwrap_or_default();
        record.domain = self.domain.unwrap_or_default();
        record.name = self.name.unwrap_or_default();
        record.heartbeat_version = self.heartbeat_version.unwrap_or(now);
        record.last_heartbeat = now;
        record.version = client_version;
        record
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn is_valid_ip_or_hostname(address: &str) -> bool {
    if is_blank(address) {
        return false;
    }
    address.parse::<IpAddr>().is_ok() || HOSTNAME_PATTERN.is_match(address)
}
