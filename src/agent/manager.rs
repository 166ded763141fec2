//! The configured set of agents.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use super::{Agent, AgentConfig, AgentRegistry, Locale};
use crate::error::{ColloquyError, Result};

/// Agent id with its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
}

/// Owns one agent per configured name. The first agent that constructs
/// becomes the default.
pub struct MultiAgentManager {
    registry: Arc<AgentRegistry>,
    configured: Vec<String>,
    agents: HashMap<String, Arc<dyn Agent>>,
    failures: HashMap<String, String>,
    default_agent: Option<String>,
    locale: Locale,
}

impl MultiAgentManager {
    /// Construct every configured agent, in order. Failures are logged and
    /// the agent is left out.
    pub async fn new(configs: Vec<(String, AgentConfig)>, registry: Arc<AgentRegistry>) -> Self {
        let locale = configs.first().map(|(_, c)| c.locale).unwrap_or_default();
        let mut manager = Self {
            registry,
            configured: Vec::with_capacity(configs.len()),
            agents: HashMap::new(),
            failures: HashMap::new(),
            default_agent: None,
            locale,
        };

        for (name, config) in configs {
            manager.configured.push(name.clone());
            match manager.registry.create(&name, &config).await {
                Ok(agent) => {
                    info!(agent = %name, display_name = agent.display_name(), "agent available");
                    manager.default_agent.get_or_insert_with(|| name.clone());
                    manager.agents.insert(name, agent);
                }
                Err(e) => {
                    error!(agent = %name, error = %e, "agent failed to initialize");
                    manager.failures.insert(name, e.to_string());
                }
            }
        }

        if manager.agents.is_empty() {
            warn!("no agent could be initialized");
        }
        manager
    }

    /// The named agent, else the default one.
    pub fn get_agent(&self, name: Option<&str>) -> Result<Arc<dyn Agent>> {
        if let Some(agent) = name.and_then(|n| self.agents.get(n)) {
            return Ok(agent.clone());
        }
        if let Some(n) = name.filter(|n| !n.is_empty() && *n != "default") {
            warn!(requested = n, default = ?self.default_agent, "agent unavailable, using default");
        }
        self.default_agent
            .as_deref()
            .and_then(|d| self.agents.get(d))
            .cloned()
            .ok_or_else(|| {
                ColloquyError::AgentResolution(format!(
                    "agent '{}' unavailable and no default agent",
                    name.unwrap_or("default")
                ))
            })
    }

    pub fn default_agent(&self) -> Option<&str> {
        self.default_agent.as_deref()
    }

    pub fn configured_agents(&self) -> Vec<String> {
        self.configured.clone()
    }

    /// Agents that constructed, in configuration order.
    pub fn available_agents(&self) -> Vec<String> {
        self.configured
            .iter()
            .filter(|n| self.agents.contains_key(*n))
            .cloned()
            .collect()
    }

    pub fn unavailable_agents(&self) -> Vec<String> {
        self.configured
            .iter()
            .filter(|n| !self.agents.contains_key(*n))
            .cloned()
            .collect()
    }

    /// Why an agent is unavailable.
    pub fn failure(&self, name: &str) -> Option<&str> {
        self.failures.get(name).map(String::as_str)
    }

    /// Display names for every configured agent.
    pub fn agent_details(&self) -> Vec<AgentInfo> {
        self.configured
            .iter()
            .map(|id| AgentInfo {
                id: id.clone(),
                name: self
                    .agents
                    .get(id)
                    .map(|a| a.display_name().to_string())
                    .unwrap_or_else(|| self.locale.fallback_agent_name(id)),
            })
            .collect()
    }

    /// Fail when no agent is usable.
    pub fn ensure_available(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(ColloquyError::AgentResolution(
                "no agent could be initialized".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MultiAgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiAgentManager")
            .field("configured", &self.configured)
            .field("available", &self.available_agents())
            .field("default_agent", &self.default_agent)
            .finish()
    }
}
