//! Seam to the external CMS that owns the items collections point at.
//!
//! Collection items store an opaque `(value_type, value)` pair. The core
//! never interprets it; it only asks an [`ItemLoader`] whether the value
//! type is supported and what the value resolves to.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;
use crate::status::ItemVisibility;
use crate::types::Timestamp;

/// An item as resolved by the CMS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CmsItem {
    pub value_type: String,
    pub value: String,
    pub name: String,
    pub visible: bool,
}

#[async_trait]
pub trait ItemLoader: Send + Sync {
    /// Whether items of `value_type` can be stored in collections.
    fn supports(&self, value_type: &str) -> bool;

    /// Resolve a stored value. `None` when the CMS no longer has it.
    async fn load(&self, value_type: &str, value: &str) -> Result<Option<CmsItem>, CoreError>;
}

/// Loader backed by a fixed in-memory item set.
#[derive(Debug, Clone, Default)]
pub struct StaticItemLoader {
    value_types: HashSet<String>,
    items: HashMap<(String, String), CmsItem>,
}

impl StaticItemLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value_type(mut self, value_type: &str) -> Self {
        self.value_types.insert(value_type.to_string());
        self
    }

    pub fn with_item(mut self, item: CmsItem) -> Self {
        self.value_types.insert(item.value_type.clone());
        self.items
            .insert((item.value_type.clone(), item.value.clone()), item);
        self
    }
}

#[async_trait]
impl ItemLoader for StaticItemLoader {
    fn supports(&self, value_type: &str) -> bool {
        self.value_types.contains(value_type)
    }

    async fn load(&self, value_type: &str, value: &str) -> Result<Option<CmsItem>, CoreError> {
        if !self.supports(value_type) {
            return Err(CoreError::Runtime(format!(
                "Value type \"{value_type}\" is not supported."
            )));
        }
        Ok(self
            .items
            .get(&(value_type.to_string(), value.to_string()))
            .cloned())
    }
}

/// Whether an item with the given visibility configuration is visible at `at`.
///
/// Scheduled items are visible inside `[from, to]`; a missing bound is open.
pub fn is_visible_at(
    visibility: ItemVisibility,
    visible_from: Option<Timestamp>,
    visible_to: Option<Timestamp>,
    at: Timestamp,
) -> bool {
    match visibility {
        ItemVisibility::Visible => true,
        ItemVisibility::Hidden => false,
        ItemVisibility::Scheduled => {
            visible_from.map_or(true, |from| from <= at) && visible_to.map_or(true, |to| at <= to)
        }
    }
}
