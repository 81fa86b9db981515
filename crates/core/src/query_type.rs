//! Query types backing dynamic collections.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::block_definition::merge_with_defaults;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryType {
    pub identifier: String,
    pub name: String,
    pub parameters: IndexMap<String, Value>,
}

impl QueryType {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            parameters: IndexMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: &str, default: Value) -> Self {
        self.parameters.insert(name.to_string(), default);
        self
    }

    /// Defaults overlaid with `provided`; unknown names are returned as the error.
    pub fn merge_parameters(
        &self,
        provided: &Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<String>> {
        merge_with_defaults(&self.parameters, provided)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryTypeRegistry {
    types: IndexMap<String, QueryType>,
}

impl QueryTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, query_type: QueryType) -> Self {
        self.types.insert(query_type.identifier.clone(), query_type);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<&QueryType> {
        self.types.get(identifier)
    }
}
