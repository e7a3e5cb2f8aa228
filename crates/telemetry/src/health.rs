//! Component health for the status and readiness probes.
//!
//! Two dependencies are tracked: the bulk sink and the buffer store. Both
//! start out unhealthy and flip as soon as a push, a probe or a storage
//! round trip reports back.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Overall status derived from the components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    fn aggregate(components: &[ComponentHealthReport]) -> Self {
        let up = components.iter().filter(|c| c.healthy).count();
        match up {
            n if n == components.len() => Self::Healthy,
            0 => Self::Unhealthy,
            _ => Self::Degraded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }

    pub fn is_serving(&self) -> bool {
        !matches!(self, Self::Unhealthy)
    }
}

#[derive(Debug, Default)]
struct ComponentState {
    healthy: bool,
    detail: Option<String>,
    changed_at: Option<DateTime<Utc>>,
}

/// Last known health of one dependency.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    state: RwLock<ComponentState>,
}

impl ComponentHealth {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(ComponentState::default()),
        }
    }

    pub fn set_healthy(&self) {
        self.transition(true, None);
    }

    /// Marks the component down with the backend's reason.
    pub fn set_unhealthy(&self, detail: impl Into<String>) {
        self.transition(false, Some(detail.into()));
    }

    fn transition(&self, healthy: bool, detail: Option<String>) {
        let mut state = self.state.write();
        if state.healthy != healthy || state.changed_at.is_none() {
            state.changed_at = Some(Utc::now());
        }
        state.healthy = healthy;
        state.detail = detail;
    }

    pub fn is_healthy(&self) -> bool {
        self.state.read().healthy
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn report(&self) -> ComponentHealthReport {
        let state = self.state.read();
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: state.healthy,
            detail: state.detail.clone(),
            changed_at: state.changed_at,
        }
    }
}

/// Snapshot of one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the component last changed state (None = never reported)
    pub changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

/// Health of the bulk sink and the buffer store.
#[derive(Debug)]
pub struct HealthRegistry {
    pub sink: ComponentHealth,
    pub store: ComponentHealth,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            sink: ComponentHealth::new("sink"),
            store: ComponentHealth::new("store"),
        }
    }

    pub fn report(&self) -> HealthReport {
        let components = vec![self.sink.report(), self.store.report()];
        HealthReport {
            status: HealthStatus::aggregate(&components),
            components,
        }
    }

    /// Records can be accepted while they can be buffered; a sink outage
    /// only loses batches at flush time.
    pub fn is_ready(&self) -> bool {
        self.store.is_healthy()
    }

    pub fn is_alive(&self) -> bool {
        true
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static HEALTH: std::sync::LazyLock<HealthRegistry> = std::sync::LazyLock::new(HealthRegistry::new);

/// Process-wide health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
