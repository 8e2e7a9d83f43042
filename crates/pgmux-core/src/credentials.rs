//! Credential fallback resolution
//!
//! Projects created before per-project database roles existed have no
//! credentials of their own. Their services keep authenticating with the
//! process-wide admin credentials until they are migrated; `is_fallback`
//! marks those so operators can find them.

use std::fmt;

use serde::Serialize;

/// Process-wide default database credentials
#[derive(Clone, Serialize)]
pub struct DefaultCredentials {
    pub user: String,
    #[serde(skip)]
    pub password: String,
}

impl DefaultCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for DefaultCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Effective credentials for one project
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSet {
    pub user: String,
    #[serde(skip)]
    pub password: String,
    /// True when the defaults were substituted for missing project credentials
    pub is_fallback: bool,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("is_fallback", &self.is_fallback)
            .finish()
    }
}

/// Resolves the credentials a project's services authenticate with.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    defaults: DefaultCredentials,
}

impl CredentialResolver {
    pub fn new(defaults: DefaultCredentials) -> Self {
        Self { defaults }
    }

    /// Project credentials when both user and password are present and
    /// non-empty, otherwise the defaults with `is_fallback = true`.
    pub fn resolve(
        &self,
        _project_ref: &str,
        project_user: Option<&str>,
        project_password: Option<&str>,
    ) -> CredentialSet {
        match (non_empty(project_user), non_empty(project_password)) {
            (Some(user), Some(password)) => CredentialSet {
                user: user.to_string(),
                password: password.to_string(),
                is_fallback: false,
            },
            _ => CredentialSet {
                user: self.defaults.user.clone(),
                password: self.defaults.password.clone(),
                is_fallback: true,
            },
        }
    }

    pub fn defaults(&self) -> &DefaultCredentials {
        &self.defaults
    }
}

pub fn should_use_fallback(set: &CredentialSet) -> bool {
    set.is_fallback
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
