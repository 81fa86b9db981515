//! Repository for the `blocks` and `block_translations` tables.
//!
//! Blocks form a tree per layout copy. Each row stores the materialized
//! path of ids from its zone root (`/root/parent/self/`), so a subtree is
//! a prefix match on `path`.

use layouts_core::status::{Status, StatusId};
use layouts_core::types::{DbId, Position};
use serde_json::Value;
use sqlx::SqliteConnection;

use crate::models::block::{Block, BlockTranslation};

const COLUMNS: &str = "id, status, uuid, layout_id, depth, path, parent_id, placeholder, \
    position, definition_identifier, view_type, item_view_type, name, config, \
    translatable, main_locale, always_available";

const TRANSLATION_COLUMNS: &str = "block_id, status, locale, parameters";

/// Provides data access for blocks.
pub struct BlockRepo;

impl BlockRepo {
    /// Allocate the next logical block id.
    pub async fn next_id(conn: &mut SqliteConnection) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM blocks")
            .fetch_one(conn)
            .await
    }

    /// Insert a block row as given.
    pub async fn create(conn: &mut SqliteConnection, block: &Block) -> Result<Block, sqlx::Error> {
        let query = format!(
            "INSERT INTO blocks ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Block>(&query)
            .bind(block.id)
            .bind(block.status)
            .bind(block.uuid)
            .bind(block.layout_id)
            .bind(block.depth)
            .bind(&block.path)
            .bind(block.parent_id)
            .bind(&block.placeholder)
            .bind(block.position)
            .bind(&block.definition_identifier)
            .bind(&block.view_type)
            .bind(&block.item_view_type)
            .bind(&block.name)
            .bind(&block.config)
            .bind(block.translatable)
            .bind(&block.main_locale)
            .bind(block.always_available)
            .fetch_one(conn)
            .await
    }

    pub async fn find(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<Option<Block>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM blocks WHERE id = ?1 AND status = ?2");
        sqlx::query_as::<_, Block>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    /// Raw status ids of every copy of a block.
    pub async fn statuses(
        conn: &mut SqliteConnection,
        id: DbId,
    ) -> Result<Vec<StatusId>, sqlx::Error> {
        sqlx::query_scalar("SELECT status FROM blocks WHERE id = ?1 ORDER BY status")
            .bind(id)
            .fetch_all(conn)
            .await
    }

    /// Direct children of a block, optionally in one placeholder only.
    /// Ordered by placeholder, then position.
    pub async fn children(
        conn: &mut SqliteConnection,
        parent_id: DbId,
        status: Status,
        placeholder: Option<&str>,
    ) -> Result<Vec<Block>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM blocks \
             WHERE parent_id = ?1 AND status = ?2 AND (?3 IS NULL OR placeholder = ?3) \
             ORDER BY placeholder, position"
        );
        sqlx::query_as::<_, Block>(&query)
            .bind(parent_id)
            .bind(status.id())
            .bind(placeholder)
            .fetch_all(conn)
            .await
    }

    /// A block and all of its descendants, parents before children.
    pub async fn subtree(
        conn: &mut SqliteConnection,
        block: &Block,
    ) -> Result<Vec<Block>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM blocks \
             WHERE layout_id = ?1 AND status = ?2 AND substr(path, 1, length(?3)) = ?3 \
             ORDER BY depth, placeholder, position"
        );
        sqlx::query_as::<_, Block>(&query)
            .bind(block.layout_id)
            .bind(block.status)
            .bind(&block.path)
            .fetch_all(conn)
            .await
    }

    /// Write the content fields of a block copy. Placement is untouched.
    pub async fn save(conn: &mut SqliteConnection, block: &Block) -> Result<Block, sqlx::Error> {
        let query = format!(
            "UPDATE blocks SET \
                 view_type        = ?3, \
                 item_view_type   = ?4, \
                 name             = ?5, \
                 config           = ?6, \
                 translatable     = ?7, \
                 main_locale      = ?8, \
                 always_available = ?9 \
             WHERE id = ?1 AND status = ?2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Block>(&query)
            .bind(block.id)
            .bind(block.status)
            .bind(&block.view_type)
            .bind(&block.item_view_type)
            .bind(&block.name)
            .bind(&block.config)
            .bind(block.translatable)
            .bind(&block.main_locale)
            .bind(block.always_available)
            .fetch_one(conn)
            .await
    }

    pub async fn set_position(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        position: Position,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE blocks SET position = ?3 WHERE id = ?1 AND status = ?2")
            .bind(id)
            .bind(status.id())
            .bind(position)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Re-parent a block and rewrite the path and depth of its subtree.
    pub async fn set_placement(
        conn: &mut SqliteConnection,
        block: &Block,
        parent: &Block,
        placeholder: &str,
        position: Position,
    ) -> Result<(), sqlx::Error> {
        let new_path = format!("{}{}/", parent.path, block.id);
        let depth_delta = parent.depth + 1 - block.depth;

        sqlx::query(
            "UPDATE blocks SET \
                 path  = ?4 || substr(path, length(?3) + 1), \
                 depth = depth + ?5 \
             WHERE layout_id = ?1 AND status = ?2 AND substr(path, 1, length(?3)) = ?3",
        )
        .bind(block.layout_id)
        .bind(block.status)
        .bind(&block.path)
        .bind(&new_path)
        .bind(depth_delta)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "UPDATE blocks SET parent_id = ?3, placeholder = ?4, position = ?5 \
             WHERE id = ?1 AND status = ?2",
        )
        .bind(block.id)
        .bind(block.status)
        .bind(parent.id)
        .bind(placeholder)
        .bind(position)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Delete a block copy with its descendants, their translations and
    /// their collections. Sibling positions are the caller's concern.
    pub async fn delete_subtree(
        conn: &mut SqliteConnection,
        block: &Block,
    ) -> Result<u64, sqlx::Error> {
        const SUBTREE: &str = "SELECT id FROM blocks \
            WHERE layout_id = ?1 AND status = ?2 AND substr(path, 1, length(?3)) = ?3";

        let statements = [
            format!(
                "DELETE FROM collection_items WHERE status = ?2 AND collection_id IN \
                 (SELECT id FROM collections WHERE status = ?2 AND block_id IN ({SUBTREE}))"
            ),
            format!(
                "DELETE FROM collection_queries WHERE status = ?2 AND collection_id IN \
                 (SELECT id FROM collections WHERE status = ?2 AND block_id IN ({SUBTREE}))"
            ),
            format!("DELETE FROM collections WHERE status = ?2 AND block_id IN ({SUBTREE})"),
            format!("DELETE FROM block_translations WHERE status = ?2 AND block_id IN ({SUBTREE})"),
        ];
        for sql in &statements {
            sqlx::query(sql)
                .bind(block.layout_id)
                .bind(block.status)
                .bind(&block.path)
                .execute(&mut *conn)
                .await?;
        }

        let result = sqlx::query(
            "DELETE FROM blocks \
             WHERE layout_id = ?1 AND status = ?2 AND substr(path, 1, length(?3)) = ?3",
        )
        .bind(block.layout_id)
        .bind(block.status)
        .bind(&block.path)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Translations
    // -----------------------------------------------------------------------

    pub async fn create_translation(
        conn: &mut SqliteConnection,
        translation: &BlockTranslation,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO block_translations ({TRANSLATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"
        );
        sqlx::query(&query)
            .bind(translation.block_id)
            .bind(translation.status)
            .bind(&translation.locale)
            .bind(&translation.parameters)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Translations of a block copy, ordered by locale.
    pub async fn translations(
        conn: &mut SqliteConnection,
        block_id: DbId,
        status: Status,
    ) -> Result<Vec<BlockTranslation>, sqlx::Error> {
        let query = format!(
            "SELECT {TRANSLATION_COLUMNS} FROM block_translations \
             WHERE block_id = ?1 AND status = ?2 ORDER BY locale"
        );
        sqlx::query_as::<_, BlockTranslation>(&query)
            .bind(block_id)
            .bind(status.id())
            .fetch_all(conn)
            .await
    }

    /// Overwrite the parameters of one translation.
    pub async fn set_parameters(
        conn: &mut SqliteConnection,
        block_id: DbId,
        status: Status,
        locale: &str,
        parameters: &Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE block_translations SET parameters = ?4 \
             WHERE block_id = ?1 AND status = ?2 AND locale = ?3",
        )
        .bind(block_id)
        .bind(status.id())
        .bind(locale)
        .bind(parameters)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete one translation of a block copy.
    pub async fn delete_translation(
        conn: &mut SqliteConnection,
        block_id: DbId,
        status: Status,
        locale: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM block_translations WHERE block_id = ?1 AND status = ?2 AND locale = ?3",
        )
        .bind(block_id)
        .bind(status.id())
        .bind(locale)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every translation of a block copy except `keep_locale`.
    pub async fn delete_translations_except(
        conn: &mut SqliteConnection,
        block_id: DbId,
        status: Status,
        keep_locale: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM block_translations WHERE block_id = ?1 AND status = ?2 AND locale <> ?3",
        )
        .bind(block_id)
        .bind(status.id())
        .bind(keep_locale)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete one locale from every block of a layout copy.
    pub async fn delete_layout_locale(
        conn: &mut SqliteConnection,
        layout_id: DbId,
        status: Status,
        locale: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM block_translations WHERE status = ?2 AND locale = ?3 AND block_id IN \
             (SELECT id FROM blocks WHERE layout_id = ?1 AND status = ?2)",
        )
        .bind(layout_id)
        .bind(status.id())
        .bind(locale)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Blocks of a layout copy that are translatable, i.e. carry one
    /// translation per layout locale.
    pub async fn list_translatable(
        conn: &mut SqliteConnection,
        layout_id: DbId,
        status: Status,
    ) -> Result<Vec<Block>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM blocks \
             WHERE layout_id = ?1 AND status = ?2 AND translatable = 1 AND parent_id IS NOT NULL \
             ORDER BY id"
        );
        sqlx::query_as::<_, Block>(&query)
            .bind(layout_id)
            .bind(status.id())
            .fetch_all(conn)
            .await
    }
}
