//! Repository for the `collections`, `collection_items` and
//! `collection_queries` tables.

use layouts_core::status::{CollectionType, ItemType, ItemVisibility, Status};
use layouts_core::types::{DbId, Position, Timestamp};
use serde_json::Value;
use sqlx::SqliteConnection;

use crate::models::collection::{Collection, CollectionItem, CollectionQuery};

const COLLECTION_COLUMNS: &str = "id, status, uuid, block_id, identifier, collection_type, \
    start, length";

const ITEM_COLUMNS: &str = "id, status, uuid, collection_id, position, item_type, value, \
    value_type, visibility, visible_from, visible_to, config";

const QUERY_COLUMNS: &str = "id, status, uuid, collection_id, query_type, parameters";

/// Provides data access for collections, their items and their query.
pub struct CollectionRepo;

impl CollectionRepo {
    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    pub async fn next_id(conn: &mut SqliteConnection) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM collections")
            .fetch_one(conn)
            .await
    }

    pub async fn create(
        conn: &mut SqliteConnection,
        collection: &Collection,
    ) -> Result<Collection, sqlx::Error> {
        let query = format!(
            "INSERT INTO collections ({COLLECTION_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             RETURNING {COLLECTION_COLUMNS}"
        );
        sqlx::query_as::<_, Collection>(&query)
            .bind(collection.id)
            .bind(collection.status)
            .bind(collection.uuid)
            .bind(collection.block_id)
            .bind(&collection.identifier)
            .bind(collection.collection_type)
            .bind(collection.start)
            .bind(collection.length)
            .fetch_one(conn)
            .await
    }

    pub async fn find(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<Option<Collection>, sqlx::Error> {
        let query = format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?1 AND status = ?2"
        );
        sqlx::query_as::<_, Collection>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    /// Collections of a block copy, ordered by identifier.
    pub async fn list_for_block(
        conn: &mut SqliteConnection,
        block_id: DbId,
        status: Status,
    ) -> Result<Vec<Collection>, sqlx::Error> {
        let query = format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections \
             WHERE block_id = ?1 AND status = ?2 ORDER BY identifier"
        );
        sqlx::query_as::<_, Collection>(&query)
            .bind(block_id)
            .bind(status.id())
            .fetch_all(conn)
            .await
    }

    /// Update offset and limit of a collection copy.
    pub async fn update(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        start: i64,
        length: Option<i64>,
    ) -> Result<Option<Collection>, sqlx::Error> {
        let query = format!(
            "UPDATE collections SET start = ?3, length = ?4 \
             WHERE id = ?1 AND status = ?2 \
             RETURNING {COLLECTION_COLUMNS}"
        );
        sqlx::query_as::<_, Collection>(&query)
            .bind(id)
            .bind(status.id())
            .bind(start)
            .bind(length)
            .fetch_optional(conn)
            .await
    }

    pub async fn set_type(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        collection_type: CollectionType,
    ) -> Result<Option<Collection>, sqlx::Error> {
        let query = format!(
            "UPDATE collections SET collection_type = ?3 \
             WHERE id = ?1 AND status = ?2 \
             RETURNING {COLLECTION_COLUMNS}"
        );
        sqlx::query_as::<_, Collection>(&query)
            .bind(id)
            .bind(status.id())
            .bind(collection_type.id())
            .fetch_optional(conn)
            .await
    }

    /// Whether the collection has a copy in `status`.
    pub async fn exists(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM collections WHERE id = ?1 AND status = ?2)")
            .bind(id)
            .bind(status.id())
            .fetch_one(conn)
            .await
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    pub async fn next_item_id(conn: &mut SqliteConnection) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM collection_items")
            .fetch_one(conn)
            .await
    }

    pub async fn create_item(
        conn: &mut SqliteConnection,
        item: &CollectionItem,
    ) -> Result<CollectionItem, sqlx::Error> {
        let query = format!(
            "INSERT INTO collection_items ({ITEM_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
             RETURNING {ITEM_COLUMNS}"
        );
        sqlx::query_as::<_, CollectionItem>(&query)
            .bind(item.id)
            .bind(item.status)
            .bind(item.uuid)
            .bind(item.collection_id)
            .bind(item.position)
            .bind(item.item_type)
            .bind(&item.value)
            .bind(&item.value_type)
            .bind(item.visibility)
            .bind(item.visible_from)
            .bind(item.visible_to)
            .bind(&item.config)
            .fetch_one(conn)
            .await
    }

    pub async fn find_item(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<Option<CollectionItem>, sqlx::Error> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM collection_items WHERE id = ?1 AND status = ?2"
        );
        sqlx::query_as::<_, CollectionItem>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    /// Items of a collection copy: manual items first, each type by position.
    pub async fn list_items(
        conn: &mut SqliteConnection,
        collection_id: DbId,
        status: Status,
    ) -> Result<Vec<CollectionItem>, sqlx::Error> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM collection_items \
             WHERE collection_id = ?1 AND status = ?2 \
             ORDER BY item_type, position"
        );
        sqlx::query_as::<_, CollectionItem>(&query)
            .bind(collection_id)
            .bind(status.id())
            .fetch_all(conn)
            .await
    }

    pub async fn set_item_position(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        position: Position,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE collection_items SET position = ?3 WHERE id = ?1 AND status = ?2")
            .bind(id)
            .bind(status.id())
            .bind(position)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Overwrite the visibility configuration and config of an item copy.
    pub async fn update_item(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        visibility: ItemVisibility,
        visible_from: Option<Timestamp>,
        visible_to: Option<Timestamp>,
        config: &Value,
    ) -> Result<Option<CollectionItem>, sqlx::Error> {
        let query = format!(
            "UPDATE collection_items SET \
                 visibility   = ?3, \
                 visible_from = ?4, \
                 visible_to   = ?5, \
                 config       = ?6 \
             WHERE id = ?1 AND status = ?2 \
             RETURNING {ITEM_COLUMNS}"
        );
        sqlx::query_as::<_, CollectionItem>(&query)
            .bind(id)
            .bind(status.id())
            .bind(visibility.id())
            .bind(visible_from)
            .bind(visible_to)
            .bind(config)
            .fetch_optional(conn)
            .await
    }

    pub async fn delete_item(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM collection_items WHERE id = ?1 AND status = ?2")
            .bind(id)
            .bind(status.id())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every item of one type from a collection copy.
    pub async fn delete_items_of_type(
        conn: &mut SqliteConnection,
        collection_id: DbId,
        status: Status,
        item_type: ItemType,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM collection_items \
             WHERE collection_id = ?1 AND status = ?2 AND item_type = ?3",
        )
        .bind(collection_id)
        .bind(status.id())
        .bind(item_type.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn next_query_id(conn: &mut SqliteConnection) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM collection_queries")
            .fetch_one(conn)
            .await
    }

    pub async fn create_query(
        conn: &mut SqliteConnection,
        query_row: &CollectionQuery,
    ) -> Result<CollectionQuery, sqlx::Error> {
        let query = format!(
            "INSERT INTO collection_queries ({QUERY_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             RETURNING {QUERY_COLUMNS}"
        );
        sqlx::query_as::<_, CollectionQuery>(&query)
            .bind(query_row.id)
            .bind(query_row.status)
            .bind(query_row.uuid)
            .bind(query_row.collection_id)
            .bind(&query_row.query_type)
            .bind(&query_row.parameters)
            .fetch_one(conn)
            .await
    }

    pub async fn find_query(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<Option<CollectionQuery>, sqlx::Error> {
        let query = format!(
            "SELECT {QUERY_COLUMNS} FROM collection_queries WHERE id = ?1 AND status = ?2"
        );
        sqlx::query_as::<_, CollectionQuery>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    /// The query of a collection copy, if it is dynamic.
    pub async fn find_query_for_collection(
        conn: &mut SqliteConnection,
        collection_id: DbId,
        status: Status,
    ) -> Result<Option<CollectionQuery>, sqlx::Error> {
        let query = format!(
            "SELECT {QUERY_COLUMNS} FROM collection_queries \
             WHERE collection_id = ?1 AND status = ?2"
        );
        sqlx::query_as::<_, CollectionQuery>(&query)
            .bind(collection_id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    pub async fn update_query_parameters(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        parameters: &Value,
    ) -> Result<Option<CollectionQuery>, sqlx::Error> {
        let query = format!(
            "UPDATE collection_queries SET parameters = ?3 \
             WHERE id = ?1 AND status = ?2 \
             RETURNING {QUERY_COLUMNS}"
        );
        sqlx::query_as::<_, CollectionQuery>(&query)
            .bind(id)
            .bind(status.id())
            .bind(parameters)
            .fetch_optional(conn)
            .await
    }

    /// Delete the query of a collection copy. Returns `true` if one existed.
    pub async fn delete_query_for_collection(
        conn: &mut SqliteConnection,
        collection_id: DbId,
        status: Status,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM collection_queries WHERE collection_id = ?1 AND status = ?2",
        )
        .bind(collection_id)
        .bind(status.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
