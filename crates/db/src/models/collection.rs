//! Collection, item and query models and DTOs.

use layouts_core::error::CoreError;
use layouts_core::status::{CollectionType, ItemType, ItemVisibility, Status, StatusId};
use layouts_core::types::{DbId, Position, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `collections` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Collection {
    pub id: DbId,
    pub status: StatusId,
    pub uuid: Uuid,
    pub block_id: DbId,
    pub identifier: String,
    pub collection_type: StatusId,
    /// Offset into the result.
    pub start: i64,
    /// Number of results, unlimited when `None`.
    pub length: Option<i64>,
}

impl Collection {
    pub fn collection_type(&self) -> Result<CollectionType, CoreError> {
        CollectionType::try_from(self.collection_type)
    }

    pub fn is_dynamic(&self) -> bool {
        self.collection_type == CollectionType::Dynamic.id()
    }

    pub fn is_draft(&self) -> bool {
        self.status == Status::Draft.id()
    }
}

/// A row from the `collection_items` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct CollectionItem {
    pub id: DbId,
    pub status: StatusId,
    pub uuid: Uuid,
    pub collection_id: DbId,
    pub position: Position,
    pub item_type: StatusId,
    pub value: Option<String>,
    pub value_type: String,
    pub visibility: StatusId,
    pub visible_from: Option<Timestamp>,
    pub visible_to: Option<Timestamp>,
    pub config: Value,
}

impl CollectionItem {
    pub fn item_type(&self) -> Result<ItemType, CoreError> {
        ItemType::try_from(self.item_type)
    }

    pub fn visibility(&self) -> Result<ItemVisibility, CoreError> {
        ItemVisibility::try_from(self.visibility)
    }

    pub fn is_draft(&self) -> bool {
        self.status == Status::Draft.id()
    }
}

/// A row from the `collection_queries` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct CollectionQuery {
    pub id: DbId,
    pub status: StatusId,
    pub uuid: Uuid,
    pub collection_id: DbId,
    pub query_type: String,
    pub parameters: Value,
}

impl CollectionQuery {
    pub fn is_draft(&self) -> bool {
        self.status == Status::Draft.id()
    }
}

// ---------------------------------------------------------------------------
// DTOs (request payloads)
// ---------------------------------------------------------------------------

/// DTO for a collection created together with its block.
///
/// The collection is dynamic when `query` is present.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCollection {
    #[validate(length(min = 1, max = 255))]
    pub identifier: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub offset: i64,
    #[validate(range(min = 1))]
    pub limit: Option<i64>,
    #[validate(nested)]
    pub query: Option<CreateQuery>,
}

/// DTO for the query of a dynamic collection.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuery {
    #[validate(length(min = 1, max = 255))]
    pub query_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// DTO for updating a collection draft. `limit = Some(0)` clears the limit.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCollection {
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
    #[validate(range(min = 0))]
    pub limit: Option<i64>,
}

/// DTO for updating the parameters of a query draft.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateQuery {
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// DTO for adding an item to a collection draft.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateItem {
    #[serde(default = "default_item_type")]
    pub item_type: ItemType,
    #[validate(length(max = 255))]
    pub value: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub value_type: String,
    #[serde(default = "default_visibility")]
    pub visibility: ItemVisibility,
    pub visible_from: Option<Timestamp>,
    pub visible_to: Option<Timestamp>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl CreateItem {
    pub fn manual(value_type: &str, value: &str) -> Self {
        Self {
            item_type: ItemType::Manual,
            value: Some(value.to_string()),
            value_type: value_type.to_string(),
            visibility: ItemVisibility::Visible,
            visible_from: None,
            visible_to: None,
            config: Map::new(),
        }
    }

    pub fn overriding(value_type: &str, value: &str) -> Self {
        Self {
            item_type: ItemType::Override,
            ..Self::manual(value_type, value)
        }
    }
}

/// DTO for partially updating an item draft.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateItem {
    pub visibility: Option<ItemVisibility>,
    pub visible_from: Option<Option<Timestamp>>,
    pub visible_to: Option<Option<Timestamp>>,
    pub config: Option<Map<String, Value>>,
}

fn default_item_type() -> ItemType {
    ItemType::Manual
}

fn default_visibility() -> ItemVisibility {
    ItemVisibility::Visible
}
