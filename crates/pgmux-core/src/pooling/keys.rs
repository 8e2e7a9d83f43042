//! Pooling cache keys
//!
//! Every key starts with `["projects", <ref>]`. The remaining tokens name the
//! view. Unified keys are backend-agnostic: whoever fetches them resolves the
//! currently detected backend. Backend-specific keys belong to exactly one
//! pooling backend.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const PROJECTS: &str = "projects";
const POOLING: &str = "pooling";
const DATABASE: &str = "database";
const LEGACY_CONFIGURATION: &str = "pooling-configuration";

/// Connection-pooling backend in front of a project's database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolingBackend {
    Supavisor,
    #[serde(rename = "pgbouncer")]
    PgBouncer,
}

impl PoolingBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supavisor => "supavisor",
            Self::PgBouncer => "pgbouncer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "supavisor" => Some(Self::Supavisor),
            "pgbouncer" => Some(Self::PgBouncer),
            _ => None,
        }
    }

    /// The other backend
    pub fn other(&self) -> Self {
        match self {
            Self::Supavisor => Self::PgBouncer,
            Self::PgBouncer => Self::Supavisor,
        }
    }

    /// Supavisor runs as containers whose liveness is its health
    pub fn ties_health_to_containers(&self) -> bool {
        matches!(self, Self::Supavisor)
    }
}

impl fmt::Display for PoolingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One token of a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Text(String),
    Number(i64),
    Null,
}

impl KeyPart {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{:?}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Ordered token sequence; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<KeyPart>);

impl CacheKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// `["projects", project_ref, ...rest]`
    pub fn project(project_ref: &str, rest: &[&str]) -> Self {
        let mut parts = Vec::with_capacity(rest.len() + 2);
        parts.push(KeyPart::from(PROJECTS));
        parts.push(KeyPart::from(project_ref));
        parts.extend(rest.iter().map(|s| KeyPart::from(*s)));
        Self(parts)
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &[KeyPart]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", part)?;
        }
        f.write_str("]")
    }
}

// ============================================================================
// Key constructors
// ============================================================================

/// Pooling configuration. `None` selects the unified key.
pub fn configuration(project_ref: &str, backend: Option<PoolingBackend>) -> CacheKey {
    match backend {
        None => CacheKey::project(project_ref, &[POOLING, "configuration"]),
        Some(PoolingBackend::PgBouncer) => CacheKey::project(project_ref, &["pgbouncer", "config"]),
        Some(PoolingBackend::Supavisor) => CacheKey::project(project_ref, &["supavisor", "config"]),
    }
}

/// Pooling statistics. PgBouncer reports statistics through its status view.
pub fn statistics(project_ref: &str, backend: Option<PoolingBackend>) -> CacheKey {
    match backend {
        None => CacheKey::project(project_ref, &[POOLING, "statistics"]),
        Some(PoolingBackend::PgBouncer) => CacheKey::project(project_ref, &["pgbouncer", "status"]),
        Some(PoolingBackend::Supavisor) => CacheKey::project(project_ref, &["supavisor", "stats"]),
    }
}

/// Pooling health. PgBouncer reports health through its status view.
pub fn health(project_ref: &str, backend: Option<PoolingBackend>) -> CacheKey {
    match backend {
        None => CacheKey::project(project_ref, &[POOLING, "health"]),
        Some(PoolingBackend::PgBouncer) => CacheKey::project(project_ref, &["pgbouncer", "status"]),
        Some(PoolingBackend::Supavisor) => CacheKey::project(project_ref, &["supavisor", "health"]),
    }
}

/// Pre-unification configuration key still read by older views
pub fn legacy_configuration(project_ref: &str) -> CacheKey {
    CacheKey::project(project_ref, &[DATABASE, LEGACY_CONFIGURATION])
}

/// Backend-agnostic keys of one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedKeys {
    pub configuration: CacheKey,
    pub statistics: CacheKey,
    pub health: CacheKey,
    pub unified: CacheKey,
}

impl UnifiedKeys {
    pub fn all(&self) -> Vec<CacheKey> {
        vec![
            self.configuration.clone(),
            self.statistics.clone(),
            self.health.clone(),
            self.unified.clone(),
        ]
    }
}

pub fn unified(project_ref: &str) -> UnifiedKeys {
    UnifiedKeys {
        configuration: configuration(project_ref, None),
        statistics: statistics(project_ref, None),
        health: health(project_ref, None),
        unified: CacheKey::project(project_ref, &[POOLING, "unified"]),
    }
}

/// Backend-specific keys; the two backends expose differently shaped views
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceKeys {
    PgBouncer {
        config: CacheKey,
        status: CacheKey,
    },
    Supavisor {
        config: CacheKey,
        stats: CacheKey,
        health: CacheKey,
        recommendations: CacheKey,
        containers: CacheKey,
    },
}

impl ServiceKeys {
    pub fn all(&self) -> Vec<CacheKey> {
        match self {
            Self::PgBouncer { config, status } => vec![config.clone(), status.clone()],
            Self::Supavisor {
                config,
                stats,
                health,
                recommendations,
                containers,
            } => vec![
                config.clone(),
                stats.clone(),
                health.clone(),
                recommendations.clone(),
                containers.clone(),
            ],
        }
    }

    /// Keys holding statistics or health, never configuration
    pub fn monitoring(&self) -> Vec<CacheKey> {
        match self {
            Self::PgBouncer { status, .. } => vec![status.clone()],
            Self::Supavisor { stats, health, .. } => vec![stats.clone(), health.clone()],
        }
    }

    pub fn backend(&self) -> PoolingBackend {
        match self {
            Self::PgBouncer { .. } => PoolingBackend::PgBouncer,
            Self::Supavisor { .. } => PoolingBackend::Supavisor,
        }
    }
}

pub fn service_specific(project_ref: &str, backend: PoolingBackend) -> ServiceKeys {
    match backend {
        PoolingBackend::PgBouncer => ServiceKeys::PgBouncer {
            config: configuration(project_ref, Some(backend)),
            status: CacheKey::project(project_ref, &["pgbouncer", "status"]),
        },
        PoolingBackend::Supavisor => ServiceKeys::Supavisor {
            config: configuration(project_ref, Some(backend)),
            stats: statistics(project_ref, Some(backend)),
            health: health(project_ref, Some(backend)),
            recommendations: CacheKey::project(project_ref, &["supavisor", "recommendations"]),
            containers: containers(project_ref),
        },
    }
}

/// Container status of a project's pooler containers
pub fn containers(project_ref: &str) -> CacheKey {
    CacheKey::project(project_ref, &["supavisor", "containers"])
}

// ============================================================================
// Structural predicate
// ============================================================================

/// True iff the key is `["projects", <text ref>, ...]` followed by one of the
/// known pooling shapes.
pub fn is_pooling_key(key: &CacheKey) -> bool {
    match_pooling_key(key).is_some()
}

/// Inverse of the key constructors. `None` for any non-pooling key.
pub fn extract_project_ref(key: &CacheKey) -> Option<&str> {
    match_pooling_key(key)
}

fn match_pooling_key(key: &CacheKey) -> Option<&str> {
    let [KeyPart::Text(root), KeyPart::Text(project_ref), rest @ ..] = key.parts() else {
        return None;
    };
    if root != PROJECTS || project_ref.is_empty() {
        return None;
    }

    let [KeyPart::Text(group), KeyPart::Text(view)] = rest else {
        return None;
    };
    let known = match group.as_str() {
        POOLING => matches!(
            view.as_str(),
            "configuration" | "statistics" | "health" | "unified"
        ),
        DATABASE => view == LEGACY_CONFIGURATION,
        "pgbouncer" => matches!(view.as_str(), "config" | "status"),
        "supavisor" => matches!(
            view.as_str(),
            "config" | "stats" | "health" | "recommendations" | "containers"
        ),
        _ => false,
    };

    known.then_some(project_ref.as_str())
}
