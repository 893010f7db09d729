// src/core/auth.rs

//! The auth gate: decides whether a command may proceed and which tenant an
//! `AUTH` binds the connection to.

use crate::connection::SessionState;
use crate::core::ProxyError;
use crate::core::protocol::Command;
use crate::core::routing::TenantKey;
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// The credentials carried by an `AUTH` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: String,
}

impl Credentials {
    /// Parses `AUTH password` or `AUTH username password`.
    pub fn from_command(command: &Command) -> Result<Self, ProxyError> {
        let text = |i: usize| {
            command
                .arg(i)
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default()
        };
        match command.argc() {
            2 => Ok(Self {
                username: None,
                password: text(1),
            }),
            3 => Ok(Self {
                username: Some(text(1)),
                password: text(2),
            }),
            _ => Err(ProxyError::WrongArgumentCount("auth".to_string())),
        }
    }
}

/// What a provider grants for valid credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub tenant: TenantKey,
    /// Whether a later `AUTH` with these credentials may move an already
    /// bound connection to this tenant.
    pub allow_rebind: bool,
}

/// The outcome of running a command through the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Accepted(TenantKey),
    Rejected(ProxyError),
    NotAnAuthCommand,
}

/// A source of credential validation. Implementations may be backed by
/// static configuration or delegate elsewhere; failures are rejections, never
/// connection errors.
pub trait AuthProvider: Send + Sync {
    /// True if unauthenticated sessions must be refused.
    fn is_required(&self) -> bool;

    /// True if any credential is configured at all.
    fn has_credentials(&self) -> bool;

    fn validate(&self, credentials: &Credentials) -> Result<Grant, ProxyError>;
}

/// A user entry from the `[auth]` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// An argon2 PHC string; checked when `password` is absent.
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<i64>,
    #[serde(default)]
    pub tenant_group: Option<String>,
    #[serde(default)]
    pub allow_rebind: bool,
}

impl AuthUser {
    pub fn tenant(&self) -> TenantKey {
        TenantKey::new(self.tenant_id, self.tenant_group.clone())
    }

    fn matches_password(&self, password: &str) -> Result<bool, ProxyError> {
        if let Some(plain) = &self.password {
            return Ok(plain == password);
        }
        let Some(hash) = &self.password_hash else {
            return Ok(false);
        };
        let parsed = PasswordHash::new(hash)
            .map_err(|e| ProxyError::AuthProvider(format!("bad password hash: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

/// The provider built from the configuration file: an optional legacy
/// password bound to the default tenant, plus per-tenant users.
#[derive(Debug, Clone, Default)]
pub struct ConfigAuthProvider {
    required: bool,
    password: Option<String>,
    users: Vec<AuthUser>,
}

impl ConfigAuthProvider {
    pub fn new(required: bool, password: Option<String>, users: Vec<AuthUser>) -> Self {
        Self {
            required,
            password,
            users,
        }
    }
}

impl AuthProvider for ConfigAuthProvider {
    fn is_required(&self) -> bool {
        self.required
    }

    fn has_credentials(&self) -> bool {
        self.password.is_some() || !self.users.is_empty()
    }

    fn validate(&self, credentials: &Credentials) -> Result<Grant, ProxyError> {
        let username = credentials.username.as_deref();

        if matches!(username, None | Some("default"))
            && let Some(pass) = &self.password
            && *pass == credentials.password
        {
            return Ok(Grant {
                tenant: TenantKey::default_domain(),
                allow_rebind: false,
            });
        }

        for user in self.users.iter().filter(|u| u.username.as_deref() == username) {
            if user.matches_password(&credentials.password)? {
                return Ok(Grant {
                    tenant: user.tenant(),
                    allow_rebind: user.allow_rebind,
                });
            }
        }
        Err(ProxyError::InvalidPassword)
    }
}

/// Runs every command past the current auth provider. The provider can be
/// swapped at runtime; sessions keep whatever they were already granted.
pub struct AuthGate {
    provider: RwLock<Arc<dyn AuthProvider>>,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("required", &self.is_required())
            .finish()
    }
}

impl AuthGate {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider: RwLock::new(provider),
        }
    }

    pub fn set_provider(&self, provider: Arc<dyn AuthProvider>) {
        *self.provider.write() = provider;
    }

    pub fn is_required(&self) -> bool {
        self.provider.read().is_required()
    }

    /// Checks `command` against `session`, updating the session on a
    /// successful `AUTH`.
    ///
    /// A session that is already bound keeps its tenant on re-authentication
    /// unless the new grant allows rebinding; a failed re-authentication
    /// leaves the session as it was.
    pub fn authenticate(&self, session: &mut SessionState, command: &Command) -> AuthOutcome {
        let provider = self.provider.read().clone();

        if command.name() != "auth" {
            if provider.is_required() && !session.is_authenticated {
                return AuthOutcome::Rejected(ProxyError::AuthRequired);
            }
            return AuthOutcome::NotAnAuthCommand;
        }

        let credentials = match Credentials::from_command(command) {
            Ok(credentials) => credentials,
            Err(e) => return AuthOutcome::Rejected(e),
        };
        if !provider.has_credentials() {
            return AuthOutcome::Rejected(ProxyError::NoPasswordSet);
        }

        let grant = match provider.validate(&credentials) {
            Ok(grant) => grant,
            Err(e) => {
                if let ProxyError::AuthProvider(reason) = &e {
                    warn!("Auth provider failed for client {}: {}", session.client_id, reason);
                }
                return AuthOutcome::Rejected(e);
            }
        };

        if session.is_authenticated
            && let Some(bound) = &session.tenant
            && *bound != grant.tenant
            && !grant.allow_rebind
        {
            return AuthOutcome::Rejected(ProxyError::TenantRebind(bound.to_string()));
        }

        debug!(
            "Client {} authenticated for tenant {}",
            session.client_id, grant.tenant
        );
        session.is_authenticated = true;
        session.tenant = Some(grant.tenant.clone());
        AuthOutcome::Accepted(grant.tenant)
    }
}
