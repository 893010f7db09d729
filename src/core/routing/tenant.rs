// src/core/routing/tenant.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a logical routing domain. Both fields absent is the default domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TenantKey {
    #[serde(default)]
    pub tenant_id: Option<i64>,
    #[serde(default)]
    pub tenant_group: Option<String>,
}

impl TenantKey {
    pub fn new(tenant_id: Option<i64>, tenant_group: Option<impl Into<String>>) -> Self {
        Self {
            tenant_id,
            tenant_group: tenant_group.map(Into::into),
        }
    }

    /// The default routing domain.
    pub fn default_domain() -> Self {
        Self::default()
    }

    pub fn is_default(&self) -> bool {
        self.tenant_id.is_none() && self.tenant_group.is_none()
    }

    /// `<id>_<group>` with `default` standing in for absent parts. Used as a
    /// stable label in diagnostics.
    pub fn label(&self) -> String {
        let id = self
            .tenant_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "default".to_string());
        let group = self.tenant_group.as_deref().unwrap_or("default");
        format!("{id}_{group}")
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.tenant_id, &self.tenant_group) {
            (None, None) => write!(f, "(default)"),
            (id, group) => write!(
                f,
                "({}, {})",
                id.map(|i| i.to_string()).unwrap_or_else(|| "-".into()),
                group.as_deref().unwrap_or("-")
            ),
        }
    }
}
