//! Rule, target and condition models and DTOs.

use layouts_core::status::{Status, StatusId};
use layouts_core::types::DbId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A `rules` row joined with its `rule_data`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Rule {
    pub id: DbId,
    pub status: StatusId,
    pub uuid: Uuid,
    pub layout_id: Option<DbId>,
    pub comment: String,
    /// Shared by every status copy.
    pub enabled: bool,
    /// Shared by every status copy. Higher wins.
    pub priority: i64,
}

impl Rule {
    pub fn is_draft(&self) -> bool {
        self.status == Status::Draft.id()
    }

    pub fn is_published(&self) -> bool {
        self.status == Status::Published.id()
    }
}

/// A row from the `rule_targets` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RuleTarget {
    pub id: DbId,
    pub status: StatusId,
    pub uuid: Uuid,
    pub rule_id: DbId,
    pub target_type: String,
    pub value: String,
}

/// A row from the `rule_conditions` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RuleCondition {
    pub id: DbId,
    pub status: StatusId,
    pub uuid: Uuid,
    pub rule_id: DbId,
    pub condition_type: String,
    pub value: Value,
}

// ---------------------------------------------------------------------------
// DTOs (request payloads)
// ---------------------------------------------------------------------------

/// DTO for creating a rule draft.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateRule {
    pub layout_id: Option<DbId>,
    /// Defaults to one below the lowest existing priority.
    pub priority: Option<i64>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub comment: String,
}

/// DTO for partially updating a rule draft.
///
/// `layout_id = Some(None)` removes the layout from the rule.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateRule {
    pub layout_id: Option<Option<DbId>>,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

/// DTO for the metadata shared by every status copy of a rule.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateRuleMetadata {
    pub priority: i64,
}

/// DTO for adding a target to a rule draft.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTarget {
    #[validate(length(min = 1, max = 255))]
    pub target_type: String,
    #[validate(length(min = 1, max = 2048))]
    pub value: String,
}

/// DTO for updating a target draft.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateTarget {
    #[validate(length(min = 1, max = 2048))]
    pub value: String,
}

/// DTO for adding a condition to a rule draft.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCondition {
    #[validate(length(min = 1, max = 255))]
    pub condition_type: String,
    pub value: Value,
}

/// DTO for updating a condition draft.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCondition {
    pub value: Value,
}
