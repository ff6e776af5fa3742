//! Registry mapping logical agent names to network endpoints.
//!
//! The registry is populated at startup (from configuration) and read-only
//! afterwards; discovery tolerates per-agent failure so one dead agent does
//! not hide the rest.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::agents::client::AgentClient;
use crate::error::ClientError;

/// Result of probing one agent's card route.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryEntry {
    pub name: String,
    pub url: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Name → client mapping for all known agents.
#[derive(Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<AgentClient>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent endpoint. Re-registering a name replaces the
    /// previous endpoint.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<(), ClientError> {
        let name = name.into();
        let client = AgentClient::new(name.clone(), url, api_key)?;
        debug!(agent = %name, url = client.base_url(), "registered agent");
        self.agents.insert(name, Arc::new(client));
        Ok(())
    }

    /// Looks up an agent by logical name.
    pub fn get(&self, name: &str) -> Option<Arc<AgentClient>> {
        self.agents.get(name).cloned()
    }

    /// Registered agent names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Probes every registered agent's card route.
    ///
    /// Errors are recorded inline per agent, never propagated: the probe of
    /// a healthy fleet member must not fail because a neighbour is down.
    pub async fn discover_all(&self) -> Vec<DiscoveryEntry> {
        let probes = self.agents.values().map(|client| async move {
            match client.fetch_card().await {
                Ok(card) => DiscoveryEntry {
                    name: client.name().to_string(),
                    url: client.base_url().to_string(),
                    reachable: true,
                    agent: Some(card.name.clone()),
                    error: None,
                },
                Err(e) => DiscoveryEntry {
                    name: client.name().to_string(),
                    url: client.base_url().to_string(),
                    reachable: false,
                    agent: None,
                    error: Some(e.to_string()),
                },
            }
        });
        futures::future::join_all(probes).await
    }
}
