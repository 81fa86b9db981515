//! Block models and DTOs.

use layouts_core::status::{Status, StatusId};
use layouts_core::types::{DbId, Position};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::collection::CreateCollection;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `blocks` table.
///
/// Zone root blocks have no parent, no placeholder and an empty
/// definition identifier.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Block {
    pub id: DbId,
    pub status: StatusId,
    pub uuid: Uuid,
    pub layout_id: DbId,
    pub depth: i64,
    /// Materialized path of ids, e.g. `/1/4/9/`.
    pub path: String,
    pub parent_id: Option<DbId>,
    pub placeholder: Option<String>,
    pub position: Position,
    pub definition_identifier: String,
    pub view_type: String,
    pub item_view_type: String,
    pub name: String,
    pub config: Value,
    pub translatable: bool,
    pub main_locale: String,
    pub always_available: bool,
}

impl Block {
    pub fn is_draft(&self) -> bool {
        self.status == Status::Draft.id()
    }

    pub fn is_zone_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A row from the `block_translations` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct BlockTranslation {
    pub block_id: DbId,
    pub status: StatusId,
    pub locale: String,
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// DTOs (request payloads)
// ---------------------------------------------------------------------------

/// DTO for creating a block.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBlock {
    #[validate(length(min = 1, max = 255))]
    pub definition_identifier: String,
    #[validate(length(min = 1, max = 255))]
    pub view_type: String,
    #[validate(length(min = 1, max = 255))]
    pub item_view_type: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub name: String,
    /// Defaults to the definition's setting.
    #[serde(default)]
    pub translatable: Option<bool>,
    #[serde(default = "default_true")]
    pub always_available: bool,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    #[validate(nested)]
    pub collections: Vec<CreateCollection>,
}

impl CreateBlock {
    pub fn new(definition_identifier: &str, view_type: &str, item_view_type: &str) -> Self {
        Self {
            definition_identifier: definition_identifier.to_string(),
            view_type: view_type.to_string(),
            item_view_type: item_view_type.to_string(),
            name: String::new(),
            translatable: None,
            always_available: true,
            parameters: Map::new(),
            config: Map::new(),
            collections: Vec::new(),
        }
    }
}

/// DTO for partially updating a block draft.
///
/// `parameters` are written to `locale` for translatable blocks and to
/// every locale otherwise; `locale` defaults to the block's main locale.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBlock {
    #[validate(length(min = 2, max = 10))]
    pub locale: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub view_type: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub item_view_type: Option<String>,
    #[validate(length(max = 255))]
    pub name: Option<String>,
    pub always_available: Option<bool>,
    pub parameters: Option<Map<String, Value>>,
    pub config: Option<Map<String, Value>>,
}

fn default_true() -> bool {
    true
}
