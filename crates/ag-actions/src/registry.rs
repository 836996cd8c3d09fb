//! Name → action lookup built once at startup.

use std::sync::Arc;

use ag_core::{ActionConfig, FxHashMap};

use crate::action::Action;
use crate::error::ActionError;
use crate::log::LogAction;
use crate::pushover::PushoverAction;

/// Instantiates the backend for one configured action.
///
/// # Errors
///
/// Returns an error if the backend can't be constructed.
pub fn build_action(name: &str, config: &ActionConfig) -> Result<Arc<dyn Action>, ActionError> {
    let action: Arc<dyn Action> = match config {
        ActionConfig::Pushover(config) => Arc::new(PushoverAction::new(config.clone())?),
        ActionConfig::Log(config) => Arc::new(LogAction::new(name, config)),
    };
    Ok(action)
}

/// Configured actions by name.
///
/// Cloning the registry shares the underlying actions, so per-backend state
/// (such as a cooldown) is shared as well.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: FxHashMap<String, Arc<dyn Action>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ActionRegistry")
            .field("actions", &names)
            .finish()
    }
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one instance per configured action.
    ///
    /// # Errors
    ///
    /// Returns the first backend construction error.
    pub fn from_configs(configs: &FxHashMap<String, ActionConfig>) -> Result<Self, ActionError> {
        let mut registry = Self::new();
        for (name, config) in configs {
            registry.insert(name.clone(), build_action(name, config)?);
            tracing::debug!(action = %name, kind = config.kind(), "Registered action");
        }
        Ok(registry)
    }

    /// Returns a registry with processor-local actions layered over this one.
    ///
    /// Local names hide global ones; global actions are shared, not rebuilt.
    ///
    /// # Errors
    ///
    /// Returns the first backend construction error.
    pub fn with_overrides(
        &self,
        local: &FxHashMap<String, ActionConfig>,
    ) -> Result<Self, ActionError> {
        let mut registry = self.clone();
        for (name, config) in local {
            registry.insert(name.clone(), build_action(name, config)?);
        }
        Ok(registry)
    }

    /// Adds or replaces an action.
    pub fn insert(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(name.into(), action);
    }

    /// Looks up an action by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Action>> {
        self.actions.get(name)
    }

    /// Iterates over the registered names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if no action is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
