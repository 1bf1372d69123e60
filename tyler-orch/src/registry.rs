//! Named set of agents available to the router.

use std::collections::HashMap;
use std::sync::Arc;

use tyler_agent::Agent;

/// Holds named agents. Names are case-insensitive: they are lowercased
/// on registration and lookup.
#[derive(Default)]
pub struct Registry {
    agents: HashMap<String, Arc<Agent>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under a name. A later registration with the
    /// same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, agent: Arc<Agent>) {
        self.agents.insert(name.into().to_lowercase(), agent);
    }

    /// Look up an agent by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.get(&name.to_lowercase()).cloned()
    }

    /// The registered agent names.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether an agent with this name is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.agents.contains_key(&name.to_lowercase())
    }
}
