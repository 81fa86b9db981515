//! Status-wide operations over every table of a versioned entity tree.
//!
//! A tree lists its tables root first. Each table carries a predicate
//! selecting the rows of one logical entity (`?1`) in one status (`?2`).
//! Child predicates reach their root through ids only, never through the
//! parent's status, so rows can be re-tagged table by table.

use layouts_core::lifecycle::{apply_steps, LifecycleStep, StatusSet};
use layouts_core::status::{Status, StatusId};
use layouts_core::types::DbId;
use sqlx::SqliteConnection;

use crate::DbError;

/// One table of a versioned tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeTable {
    pub table: &'static str,
    /// Every column except `status`.
    pub columns: &'static str,
    /// Rows of entity `?1` tagged `?2`.
    pub predicate: &'static str,
    /// Column blanked when the row is archived by a publish.
    pub name_column: Option<&'static str>,
}

/// The tables that are versioned together.
#[derive(Debug, Clone, Copy)]
pub struct VersionedTree {
    pub entity: &'static str,
    /// Statuses present for `?1`; `None` for trees without a root row.
    pub root_statuses: Option<&'static str>,
    pub tables: &'static [TreeTable],
}

/// A layout with its zones, blocks and collections.
pub const LAYOUT_TREE: VersionedTree = VersionedTree {
    entity: "layout",
    root_statuses: Some("SELECT status FROM layouts WHERE id = ?1 ORDER BY status"),
    tables: &[
        TreeTable {
            table: "layouts",
            columns: "id, uuid, layout_type, name, description, shared, main_locale, \
                created_at, updated_at",
            predicate: "id = ?1 AND status = ?2",
            name_column: Some("name"),
        },
        TreeTable {
            table: "layout_translations",
            columns: "layout_id, locale",
            predicate: "layout_id = ?1 AND status = ?2",
            name_column: None,
        },
        TreeTable {
            table: "zones",
            columns: "layout_id, identifier, root_block_id, linked_layout_id, \
                linked_zone_identifier",
            predicate: "layout_id = ?1 AND status = ?2",
            name_column: None,
        },
        TreeTable {
            table: "blocks",
            columns: BLOCK_COLUMNS,
            predicate: "layout_id = ?1 AND status = ?2",
            name_column: None,
        },
        TreeTable {
            table: "block_translations",
            columns: BLOCK_TRANSLATION_COLUMNS,
            predicate: "status = ?2 AND block_id IN \
                (SELECT id FROM blocks WHERE layout_id = ?1)",
            name_column: None,
        },
        TreeTable {
            table: "collections",
            columns: COLLECTION_COLUMNS,
            predicate: "status = ?2 AND block_id IN \
                (SELECT id FROM blocks WHERE layout_id = ?1)",
            name_column: None,
        },
        TreeTable {
            table: "collection_items",
            columns: ITEM_COLUMNS,
            predicate: "status = ?2 AND collection_id IN \
                (SELECT c.id FROM collections c JOIN blocks b ON b.id = c.block_id \
                 WHERE b.layout_id = ?1)",
            name_column: None,
        },
        TreeTable {
            table: "collection_queries",
            columns: QUERY_COLUMNS,
            predicate: "status = ?2 AND collection_id IN \
                (SELECT c.id FROM collections c JOIN blocks b ON b.id = c.block_id \
                 WHERE b.layout_id = ?1)",
            name_column: None,
        },
    ],
};

/// The content of one block (translations and collections), without the
/// block row and without child blocks.
pub const BLOCK_CONTENT_TREE: VersionedTree = VersionedTree {
    entity: "block",
    root_statuses: None,
    tables: &[
        TreeTable {
            table: "block_translations",
            columns: BLOCK_TRANSLATION_COLUMNS,
            predicate: "block_id = ?1 AND status = ?2",
            name_column: None,
        },
        TreeTable {
            table: "collections",
            columns: COLLECTION_COLUMNS,
            predicate: "block_id = ?1 AND status = ?2",
            name_column: None,
        },
        TreeTable {
            table: "collection_items",
            columns: ITEM_COLUMNS,
            predicate: "status = ?2 AND collection_id IN \
                (SELECT id FROM collections WHERE block_id = ?1)",
            name_column: None,
        },
        TreeTable {
            table: "collection_queries",
            columns: QUERY_COLUMNS,
            predicate: "status = ?2 AND collection_id IN \
                (SELECT id FROM collections WHERE block_id = ?1)",
            name_column: None,
        },
    ],
};

/// A rule with its targets and conditions. `rule_data` is not versioned.
pub const RULE_TREE: VersionedTree = VersionedTree {
    entity: "rule",
    root_statuses: Some("SELECT status FROM rules WHERE id = ?1 ORDER BY status"),
    tables: &[
        TreeTable {
            table: "rules",
            columns: "id, uuid, layout_id, comment",
            predicate: "id = ?1 AND status = ?2",
            name_column: None,
        },
        TreeTable {
            table: "rule_targets",
            columns: "id, uuid, rule_id, target_type, value",
            predicate: "rule_id = ?1 AND status = ?2",
            name_column: None,
        },
        TreeTable {
            table: "rule_conditions",
            columns: "id, uuid, rule_id, condition_type, value",
            predicate: "rule_id = ?1 AND status = ?2",
            name_column: None,
        },
    ],
};

const BLOCK_COLUMNS: &str = "id, uuid, layout_id, depth, path, parent_id, placeholder, position, \
    definition_identifier, view_type, item_view_type, name, config, translatable, \
    main_locale, always_available";
const BLOCK_TRANSLATION_COLUMNS: &str = "block_id, locale, parameters";
const COLLECTION_COLUMNS: &str = "id, uuid, block_id, identifier, collection_type, start, length";
const ITEM_COLUMNS: &str = "id, uuid, collection_id, position, item_type, value, value_type, \
    visibility, visible_from, visible_to, config";
const QUERY_COLUMNS: &str = "id, uuid, collection_id, query_type, parameters";

impl VersionedTree {
    /// Which status copies of `id` exist.
    pub async fn statuses(
        &self,
        conn: &mut SqliteConnection,
        id: DbId,
    ) -> Result<StatusSet, DbError> {
        let Some(sql) = self.root_statuses else {
            return Ok(StatusSet::default());
        };
        let ids: Vec<StatusId> = sqlx::query_scalar(sql).bind(id).fetch_all(&mut *conn).await?;
        let statuses = ids
            .into_iter()
            .map(Status::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StatusSet::from_statuses(statuses))
    }

    /// Execute a lifecycle plan for `id`, after checking it against the
    /// statuses currently stored.
    pub async fn run(
        &self,
        conn: &mut SqliteConnection,
        id: DbId,
        steps: &[LifecycleStep],
    ) -> Result<StatusSet, DbError> {
        let present = self.statuses(conn, id).await?;
        let after = apply_steps(present, steps)?;

        for step in steps {
            match *step {
                LifecycleStep::Delete(status) => self.delete(conn, id, status).await?,
                LifecycleStep::Retag {
                    from,
                    to,
                    blank_name,
                } => self.retag(conn, id, from, to, blank_name).await?,
                LifecycleStep::Copy { from, to } => self.copy(conn, id, from, to).await?,
            }
        }

        tracing::debug!(entity = self.entity, id, steps = steps.len(), "Lifecycle steps applied");
        Ok(after)
    }

    /// Delete every row of `id` tagged `status`, leaves first.
    pub async fn delete(
        &self,
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<(), sqlx::Error> {
        for table in self.tables.iter().rev() {
            let sql = format!("DELETE FROM {} WHERE {}", table.table, table.predicate);
            sqlx::query(&sql)
                .bind(id)
                .bind(status.id())
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Move every row of `id` from `from` to `to`, leaves first.
    pub async fn retag(
        &self,
        conn: &mut SqliteConnection,
        id: DbId,
        from: Status,
        to: Status,
        blank_name: bool,
    ) -> Result<(), sqlx::Error> {
        for table in self.tables.iter().rev() {
            let blank = match table.name_column {
                Some(column) if blank_name => format!(", {column} = ''"),
                _ => String::new(),
            };
            let sql = format!(
                "UPDATE {} SET status = ?3{blank} WHERE {}",
                table.table, table.predicate
            );
            sqlx::query(&sql)
                .bind(id)
                .bind(from.id())
                .bind(to.id())
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Duplicate every row of `id` tagged `from` under the same ids, tagged `to`.
    pub async fn copy(
        &self,
        conn: &mut SqliteConnection,
        id: DbId,
        from: Status,
        to: Status,
    ) -> Result<(), sqlx::Error> {
        for table in self.tables {
            let sql = format!(
                "INSERT INTO {table} (status, {columns}) \
                 SELECT ?3, {columns} FROM {table} WHERE {predicate}",
                table = table.table,
                columns = table.columns,
                predicate = table.predicate,
            );
            sqlx::query(&sql)
                .bind(id)
                .bind(from.id())
                .bind(to.id())
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}
