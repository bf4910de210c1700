//! Health of the monitor's components
//!
//! The monitor has a fixed set of components. The record store and the alert
//! engine gate readiness: while either is unhealthy, readings cannot be
//! committed and the probe reports not ready. The notifier and the sweep only
//! affect the overall status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    RecordStore,
    AlertEngine,
    Notifier,
    Sweep,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::RecordStore,
        Component::AlertEngine,
        Component::Notifier,
        Component::Sweep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::RecordStore => "record_store",
            Component::AlertEngine => "alert_engine",
            Component::Notifier => "notifier",
            Component::Sweep => "sweep",
        }
    }

    /// Components without which a reading cannot be committed
    pub fn gates_readiness(&self) -> bool {
        matches!(self, Component::RecordStore | Component::AlertEngine)
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short names used at call sites
pub mod components {
    use super::Component;

    pub const RECORD_STORE: Component = Component::RecordStore;
    pub const ALERT_ENGINE: Component = Component::AlertEngine;
    pub const NOTIFIER: Component = Component::Notifier;
    pub const SWEEP: Component = Component::Sweep;

    pub const ALL: [Component; 4] = Component::ALL;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Partial failure, e.g. some devices failed a sweep
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        !matches!(self, ComponentStatus::Unhealthy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered its current status
    pub since: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl ComponentHealth {
    fn healthy(now: DateTime<Utc>) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            since: now,
            last_update: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct State {
    components: BTreeMap<Component, ComponentHealth>,
    started: bool,
}

/// Shared, cloneable view of component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy; the monitor starts not ready
    pub fn new() -> Self {
        let now = Utc::now();
        let components = Component::ALL
            .into_iter()
            .map(|c| (c, ComponentHealth::healthy(now)))
            .collect();
        Self {
            state: Arc::new(RwLock::new(State {
                components,
                started: false,
            })),
        }
    }

    pub async fn status(&self, component: Component) -> ComponentStatus {
        self.state
            .read()
            .await
            .components
            .get(&component)
            .map(|h| h.status)
            .unwrap_or(ComponentStatus::Healthy)
    }

    async fn update(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let entry = state
            .components
            .entry(component)
            .or_insert_with(|| ComponentHealth::healthy(now));
        if entry.status != status {
            entry.since = now;
        }
        entry.status = status;
        entry.message = message;
        entry.last_update = now;
    }

    pub async fn set_healthy(&self, component: Component) {
        self.update(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Mark startup finished (or shutdown begun)
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.started = ready;
    }

    /// Worst status across components
    pub async fn health(&self) -> HealthResponse {
        let components = self.state.read().await.components.clone();
        let status = components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.started {
            return ReadinessResponse {
                ready: false,
                reason: Some("Monitor not yet initialized".to_string()),
            };
        }

        let blocking = state
            .components
            .iter()
            .find(|(c, h)| c.gates_readiness() && !h.status.is_operational());
        match blocking {
            Some((component, health)) => ReadinessResponse {
                ready: false,
                reason: Some(match &health.message {
                    Some(message) => format!("{} unhealthy: {}", component, message),
                    None => format!("{} unhealthy", component),
                }),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_components_start_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), 4);
        assert_eq!(registry.status(components::SWEEP).await, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_degraded_sweep_keeps_monitor_ready() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;

        registry
            .set_degraded(components::SWEEP, "1 of 3 devices failed evaluation")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_notifier_does_not_gate_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry.set_unhealthy(components::NOTIFIER, "no subscribers").await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_store_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;

        registry
            .set_unhealthy(components::RECORD_STORE, "backend unavailable")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("record_store unhealthy: backend unavailable")
        );

        registry.set_healthy(components::RECORD_STORE).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_since_tracks_status_changes_only() {
        let registry = HealthRegistry::new();
        registry.set_degraded(components::SWEEP, "first").await;
        let first = registry.health().await.components[&Component::Sweep].clone();

        registry.set_degraded(components::SWEEP, "second").await;
        let second = registry.health().await.components[&Component::Sweep].clone();

        assert_eq!(first.since, second.since);
        assert_eq!(second.message.as_deref(), Some("second"));
        assert!(second.last_update >= first.last_update);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let readiness = HealthRegistry::new().readiness().await;

        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Monitor not yet initialized"));
    }

    #[test]
    fn test_component_keys_serialize_as_names() {
        let mut map = BTreeMap::new();
        map.insert(Component::RecordStore, ComponentStatus::Healthy);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"record_store":"healthy"}"#);
    }
}
