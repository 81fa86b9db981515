//! Layout types: the zone structure a layout is created with.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::CoreError;

/// A zone slot declared by a layout type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneDefinition {
    pub identifier: String,
    pub name: String,
    /// Block definitions accepted by the zone; empty accepts every block.
    pub allowed_block_definitions: Vec<String>,
}

impl ZoneDefinition {
    pub fn accepts(&self, block_definition: &str) -> bool {
        self.allowed_block_definitions.is_empty()
            || self
                .allowed_block_definitions
                .iter()
                .any(|allowed| allowed == block_definition)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutType {
    pub identifier: String,
    pub name: String,
    pub zones: IndexMap<String, ZoneDefinition>,
}

impl LayoutType {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            zones: IndexMap::new(),
        }
    }

    pub fn with_zone(self, identifier: &str, name: &str) -> Self {
        self.with_restricted_zone(identifier, name, &[])
    }

    pub fn with_restricted_zone(mut self, identifier: &str, name: &str, allowed: &[&str]) -> Self {
        self.zones.insert(
            identifier.to_string(),
            ZoneDefinition {
                identifier: identifier.to_string(),
                name: name.to_string(),
                allowed_block_definitions: allowed.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn zone(&self, identifier: &str) -> Option<&ZoneDefinition> {
        self.zones.get(identifier)
    }

    pub fn zone_identifiers(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    /// Whether `block_definition` may be placed directly in `zone`.
    ///
    /// Unknown zones accept nothing.
    pub fn is_block_allowed_in_zone(&self, zone: &str, block_definition: &str) -> bool {
        self.zone(zone)
            .is_some_and(|definition| definition.accepts(block_definition))
    }
}

/// Layout types known to the deployment, in registration order.
#[derive(Debug, Clone, Default)]
pub struct LayoutTypeRegistry {
    types: IndexMap<String, LayoutType>,
}

impl LayoutTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, layout_type: LayoutType) -> Self {
        self.types
            .insert(layout_type.identifier.clone(), layout_type);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<&LayoutType> {
        self.types.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.types.contains_key(identifier)
    }

    /// Lookup for a layout type already persisted; a miss is a deployment bug.
    pub fn require(&self, identifier: &str) -> Result<&LayoutType, CoreError> {
        self.get(identifier).ok_or_else(|| {
            CoreError::Runtime(format!("Layout type \"{identifier}\" does not exist."))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayoutType> {
        self.types.values()
    }
}
