//! Authority (origin allow/deny list) rules.

use serde::{Deserialize, Serialize};

use crate::entity::RuleEntity;
use crate::error::{RuleError, RuleResult};

/// Whether `limit_app` lists allowed or denied callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityStrategy {
    White,
    Black,
}

impl TryFrom<i32> for AuthorityStrategy {
    type Error = RuleError;

    fn try_from(code: i32) -> RuleResult<Self> {
        match code {
            0 => Ok(Self::White),
            1 => Ok(Self::Black),
            _ => Err(RuleError::Invalid("strategy must be 0 or 1".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityRule {
    pub id: Option<u64>,
    pub app: String,
    pub ip: String,
    pub port: i32,
    pub resource: String,
    /// Comma separated caller origins.
    pub limit_app: String,
    /// `0` = white list, `1` = black list.
    pub strategy: i32,
    pub gmt_create: i64,
    pub gmt_modified: i64,
}

impl AuthorityRule {
    pub fn validate(&self) -> RuleResult<()> {
        if self.app.trim().is_empty() {
            return Err(RuleError::Invalid("app can't be null or empty".into()));
        }
        if self.resource.trim().is_empty() {
            return Err(RuleError::Invalid("resource can't be null or empty".into()));
        }
        if self.limit_app.trim().is_empty() {
            return Err(RuleError::Invalid("limitApp can't be null or empty".into()));
        }
        AuthorityStrategy::try_from(self.strategy)?;
        Ok(())
    }

    pub fn strategy(&self) -> RuleResult<AuthorityStrategy> {
        AuthorityStrategy::try_from(self.strategy)
    }
}

impl RuleEntity for AuthorityRule {
    fn id(&self) -> Option<u64> {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    fn app(&self) -> &str {
        &self.app
    }

    fn ip(&self) -> &str {
        &self.ip
    }

    fn port(&self) -> i32 {
        self.port
    }
}
