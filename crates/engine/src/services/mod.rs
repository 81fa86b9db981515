//! Transactional services over the versioned store.
//!
//! Services take logical ids and operate on the status copy the operation
//! is defined for: mutations always target the draft, lifecycle
//! transitions go through [`layouts_core::lifecycle`] plans executed by a
//! [`layouts_db::repositories::VersionedTree`].

pub mod block;
pub mod collection;
pub mod layout;
pub mod rule;

mod tree;

pub use block::BlockService;
pub use collection::CollectionService;
pub use layout::LayoutService;
pub use rule::RuleService;

use layouts_core::error::CoreError;
use layouts_core::position::PositionScope;
use layouts_core::status::{ItemType, Status, StatusId};
use layouts_core::types::DbId;
use layouts_db::models::block::Block;
use layouts_db::models::layout::{Layout, Zone};
use layouts_db::models::rule::Rule;
use layouts_db::repositories::{BlockRepo, LayoutRepo, RuleRepo, ZoneRepo};
use serde_json::{Map, Value};
use sqlx::SqliteConnection;

use crate::error::{EngineError, EngineResult};

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// Error for a missing draft: `BadState` when another status copy exists,
/// `NotFound` when the logical id is unknown.
fn missing_draft(
    entity: &'static str,
    argument: &str,
    id: DbId,
    statuses: &[StatusId],
) -> EngineError {
    if statuses.is_empty() {
        CoreError::not_found(entity, id).into()
    } else {
        CoreError::bad_state(argument, format!("Only draft {argument}s can be modified.")).into()
    }
}

pub(crate) async fn require_layout(
    conn: &mut SqliteConnection,
    id: DbId,
    status: Status,
) -> EngineResult<Layout> {
    LayoutRepo::find(conn, id, status)
        .await?
        .ok_or_else(|| CoreError::not_found("Layout", id).into())
}

pub(crate) async fn require_draft_layout(
    conn: &mut SqliteConnection,
    id: DbId,
) -> EngineResult<Layout> {
    match LayoutRepo::find(&mut *conn, id, Status::Draft).await? {
        Some(layout) => Ok(layout),
        None => {
            let statuses = LayoutRepo::statuses(conn, id).await?;
            Err(missing_draft("Layout", "layout", id, &statuses))
        }
    }
}

pub(crate) async fn require_zone(
    conn: &mut SqliteConnection,
    layout_id: DbId,
    status: Status,
    identifier: &str,
) -> EngineResult<Zone> {
    ZoneRepo::find(conn, layout_id, status, identifier)
        .await?
        .ok_or_else(|| {
            CoreError::bad_state(
                "zone",
                format!("Zone with \"{identifier}\" identifier does not exist in the layout."),
            )
            .into()
        })
}

pub(crate) async fn require_block(
    conn: &mut SqliteConnection,
    id: DbId,
    status: Status,
) -> EngineResult<Block> {
    BlockRepo::find(conn, id, status)
        .await?
        .ok_or_else(|| CoreError::not_found("Block", id).into())
}

pub(crate) async fn require_draft_block(
    conn: &mut SqliteConnection,
    id: DbId,
) -> EngineResult<Block> {
    match BlockRepo::find(&mut *conn, id, Status::Draft).await? {
        Some(block) => Ok(block),
        None => {
            let statuses = BlockRepo::statuses(conn, id).await?;
            Err(missing_draft("Block", "block", id, &statuses))
        }
    }
}

pub(crate) async fn require_rule(
    conn: &mut SqliteConnection,
    id: DbId,
    status: Status,
) -> EngineResult<Rule> {
    RuleRepo::find(conn, id, status)
        .await?
        .ok_or_else(|| CoreError::not_found("Rule", id).into())
}

pub(crate) async fn require_draft_rule(
    conn: &mut SqliteConnection,
    id: DbId,
) -> EngineResult<Rule> {
    match RuleRepo::find(&mut *conn, id, Status::Draft).await? {
        Some(rule) => Ok(rule),
        None => {
            let statuses = RuleRepo::statuses(conn, id).await?;
            Err(missing_draft("Rule", "rule", id, &statuses))
        }
    }
}

/// Status of a stored row; an unknown tag is a corrupted row.
pub(crate) fn row_status(status: StatusId) -> EngineResult<Status> {
    Ok(Status::try_from(status)?)
}

// ---------------------------------------------------------------------------
// Position scopes
// ---------------------------------------------------------------------------

/// Siblings of a block: same parent, same placeholder, same status.
pub(crate) fn block_scope(parent_id: DbId, placeholder: &str, status: Status) -> PositionScope {
    PositionScope::new("blocks")
        .filter("parent_id", parent_id)
        .filter("placeholder", placeholder)
        .filter("status", status.id())
}

/// Items of one type in one collection copy.
pub(crate) fn item_scope(
    collection_id: DbId,
    item_type: ItemType,
    status: Status,
) -> PositionScope {
    PositionScope::new("collection_items")
        .filter("collection_id", collection_id)
        .filter("item_type", item_type.id())
        .filter("status", status.id())
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// `base` (an object, anything else counts as empty) overlaid with `changes`.
pub(crate) fn merge_object(base: &Value, changes: &Map<String, Value>) -> Value {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    merged.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_object_overlays_keys() {
        let base = json!({ "a": 1, "b": 2 });
        let changes = json!({ "b": 3, "c": 4 });
        assert_eq!(
            merge_object(&base, changes.as_object().unwrap()),
            json!({ "a": 1, "b": 3, "c": 4 })
        );
    }

    #[test]
    fn merge_object_ignores_non_object_base() {
        let changes = json!({ "c": 4 });
        assert_eq!(
            merge_object(&Value::Null, changes.as_object().unwrap()),
            json!({ "c": 4 })
        );
    }

    #[test]
    fn block_scope_filters_in_order() {
        let scope = block_scope(7, "left", Status::Draft);
        let columns: Vec<&str> = scope.filters.iter().map(|(column, _)| *column).collect();
        assert_eq!(columns, vec!["parent_id", "placeholder", "status"]);
    }
}
