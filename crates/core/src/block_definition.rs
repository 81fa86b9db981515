//! Block definitions: view types, placeholders, parameters and collections
//! a block of a given kind is built from.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Placeholder of a zone root block that holds the zone's blocks.
pub const ZONE_PLACEHOLDER: &str = "root";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewType {
    pub identifier: String,
    pub item_view_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockDefinition {
    pub identifier: String,
    pub name: String,
    pub view_types: IndexMap<String, ViewType>,
    /// Non-empty for container blocks.
    pub placeholders: Vec<String>,
    /// Parameter names and their default values.
    pub parameters: IndexMap<String, Value>,
    /// Collection identifiers a block of this definition may carry.
    pub collections: Vec<String>,
    /// Whether new blocks are translatable unless the caller says otherwise.
    pub translatable: bool,
}

impl BlockDefinition {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            view_types: IndexMap::new(),
            placeholders: Vec::new(),
            parameters: IndexMap::new(),
            collections: Vec::new(),
            translatable: false,
        }
    }

    pub fn with_view_type(mut self, identifier: &str, item_view_types: &[&str]) -> Self {
        self.view_types.insert(
            identifier.to_string(),
            ViewType {
                identifier: identifier.to_string(),
                item_view_types: item_view_types.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_placeholder(mut self, identifier: &str) -> Self {
        self.placeholders.push(identifier.to_string());
        self
    }

    pub fn with_parameter(mut self, name: &str, default: Value) -> Self {
        self.parameters.insert(name.to_string(), default);
        self
    }

    pub fn with_collection(mut self, identifier: &str) -> Self {
        self.collections.push(identifier.to_string());
        self
    }

    pub fn translatable(mut self) -> Self {
        self.translatable = true;
        self
    }

    pub fn is_container(&self) -> bool {
        !self.placeholders.is_empty()
    }

    pub fn has_placeholder(&self, placeholder: &str) -> bool {
        self.placeholders.iter().any(|p| p == placeholder)
    }

    pub fn has_view_type(&self, view_type: &str) -> bool {
        self.view_types.contains_key(view_type)
    }

    pub fn has_item_view_type(&self, view_type: &str, item_view_type: &str) -> bool {
        self.view_types
            .get(view_type)
            .is_some_and(|vt| vt.item_view_types.iter().any(|ivt| ivt == item_view_type))
    }

    pub fn has_collection(&self, identifier: &str) -> bool {
        self.collections.iter().any(|c| c == identifier)
    }

    /// Default parameters overlaid with `provided`.
    ///
    /// Returns the names of parameters the definition does not declare as
    /// the error value.
    pub fn merge_parameters(
        &self,
        provided: &Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<String>> {
        merge_with_defaults(&self.parameters, provided)
    }
}

pub(crate) fn merge_with_defaults(
    defaults: &IndexMap<String, Value>,
    provided: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<String>> {
    let unknown: Vec<String> = provided
        .keys()
        .filter(|name| !defaults.contains_key(*name))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(unknown);
    }

    let mut merged: Map<String, Value> = defaults
        .iter()
        .map(|(name, default)| (name.clone(), default.clone()))
        .collect();
    merged.extend(provided.iter().map(|(name, value)| (name.clone(), value.clone())));
    Ok(merged)
}

/// Where a block is being placed.
#[derive(Debug, Clone, Copy)]
pub enum PlacementTarget<'a> {
    /// Directly inside a zone (the zone root block's placeholder).
    Zone,
    /// Inside `placeholder` of a block with definition `parent`.
    Block {
        parent: &'a BlockDefinition,
        placeholder: &'a str,
    },
}

/// Check that `block` may be placed at `target`.
///
/// Runs before any position is allocated. Zone allow-lists come from the
/// layout type and are checked by the caller.
pub fn check_placement(
    target: PlacementTarget<'_>,
    block: &BlockDefinition,
) -> Result<(), CoreError> {
    let PlacementTarget::Block { parent, placeholder } = target else {
        return Ok(());
    };

    if !parent.is_container() {
        return Err(CoreError::bad_state(
            "target_block",
            "Target block is not a container.",
        ));
    }
    if !parent.has_placeholder(placeholder) {
        return Err(CoreError::bad_state(
            "placeholder",
            format!("Target block does not have the \"{placeholder}\" placeholder."),
        ));
    }
    if block.is_container() {
        return Err(CoreError::bad_state(
            "block",
            "Containers cannot be placed inside containers.",
        ));
    }
    Ok(())
}

/// Block definitions known to the deployment.
#[derive(Debug, Clone, Default)]
pub struct BlockDefinitionRegistry {
    definitions: IndexMap<String, BlockDefinition>,
}

impl BlockDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, definition: BlockDefinition) -> Self {
        self.definitions
            .insert(definition.identifier.clone(), definition);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<&BlockDefinition> {
        self.definitions.get(identifier)
    }

    /// Lookup for a block already persisted.
    pub fn require(&self, identifier: &str) -> Result<&BlockDefinition, CoreError> {
        self.get(identifier).ok_or_else(|| {
            CoreError::Runtime(format!("Block definition \"{identifier}\" does not exist."))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockDefinition> {
        self.definitions.values()
    }
}
