//! Application state

use std::sync::Arc;

use agent_runner::AgentBackends;
use dsa_core::config::Settings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    settings: Settings,
    backends: AgentBackends,
}

impl AppState {
    pub fn new(settings: Settings, backends: AgentBackends) -> Self {
        Self {
            inner: Arc::new(AppStateInner { settings, backends }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Services each agent run is built from
    pub fn backends(&self) -> &AgentBackends {
        &self.inner.backends
    }
}
