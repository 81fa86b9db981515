//! Layout and zone models and DTOs.

use layouts_core::error::CoreError;
use layouts_core::status::{Status, StatusId};
use layouts_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `layouts` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Layout {
    pub id: DbId,
    pub status: StatusId,
    pub uuid: Uuid,
    pub layout_type: String,
    /// Blank on archived copies.
    pub name: String,
    pub description: String,
    pub shared: bool,
    pub main_locale: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Layout {
    pub fn status(&self) -> Result<Status, CoreError> {
        Status::try_from(self.status)
    }

    pub fn is_draft(&self) -> bool {
        self.status == Status::Draft.id()
    }

    pub fn is_published(&self) -> bool {
        self.status == Status::Published.id()
    }
}

/// A row from the `zones` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Zone {
    pub layout_id: DbId,
    pub status: StatusId,
    pub identifier: String,
    /// Block whose `root` placeholder holds the zone's blocks.
    pub root_block_id: DbId,
    pub linked_layout_id: Option<DbId>,
    pub linked_zone_identifier: Option<String>,
}

impl Zone {
    pub fn linked_zone(&self) -> Option<(DbId, &str)> {
        match (self.linked_layout_id, self.linked_zone_identifier.as_deref()) {
            (Some(layout_id), Some(identifier)) => Some((layout_id, identifier)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DTOs (request payloads)
// ---------------------------------------------------------------------------

/// DTO for creating a new layout.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLayout {
    #[validate(length(min = 1, max = 255))]
    pub layout_type: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub description: String,
    #[serde(default)]
    pub shared: bool,
    /// Left empty, the engine's default locale is used.
    #[serde(default)]
    #[validate(length(max = 10))]
    pub main_locale: String,
}

impl CreateLayout {
    pub fn new(layout_type: &str, name: &str) -> Self {
        Self {
            layout_type: layout_type.to_string(),
            name: name.to_string(),
            description: String::new(),
            shared: false,
            main_locale: String::new(),
        }
    }
}

/// DTO for partially updating a layout draft.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateLayout {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// DTO for copying a layout into a new logical layout.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CopyLayout {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}
