//! Application entity registry.

use std::collections::HashMap;
use stow_core::config::EntityConfig;

/// In-memory registry of the configured application entities.
#[derive(Clone, Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, EntityConfig>,
}

impl EntityRegistry {
    pub fn from_config(entities: &[EntityConfig]) -> Self {
        Self {
            entities: entities
                .iter()
                .map(|e| (e.aet.clone(), e.clone()))
                .collect(),
        }
    }

    /// Look up an entity by title, whether installed or not.
    pub fn get(&self, aet: &str) -> Option<&EntityConfig> {
        self.entities.get(aet)
    }

    /// Resolve an entity that may receive objects. Titles are case sensitive.
    pub fn resolve(&self, aet: &str) -> Option<&EntityConfig> {
        self.get(aet).filter(|e| e.installed)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
