//! Collection service: collection type, items and queries of block drafts.

use std::sync::Arc;

use chrono::Utc;
use layouts_core::cms::{is_visible_at, CmsItem};
use layouts_core::error::CoreError;
use layouts_core::position::{create_position, move_to_position, remove_position};
use layouts_core::status::{CollectionType, ItemType, Status};
use layouts_core::types::{DbId, Position, Timestamp};
use layouts_core::validation::Violations;
use layouts_db::models::collection::{
    Collection, CollectionItem, CollectionQuery, CreateItem, CreateQuery, UpdateCollection,
    UpdateItem, UpdateQuery,
};
use layouts_db::repositories::{BlockRepo, CollectionRepo, LayoutRepo, SqlitePositions};
use layouts_db::DbPool;
use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::engine::Registries;
use crate::error::EngineResult;

use super::{item_scope, merge_object};

pub struct CollectionService {
    pool: DbPool,
    registries: Arc<Registries>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn require_collection(
    conn: &mut SqliteConnection,
    id: DbId,
    status: Status,
) -> EngineResult<Collection> {
    CollectionRepo::find(conn, id, status)
        .await?
        .ok_or_else(|| CoreError::not_found("Collection", id).into())
}

async fn require_draft_collection(
    conn: &mut SqliteConnection,
    id: DbId,
) -> EngineResult<Collection> {
    if let Some(collection) = CollectionRepo::find(&mut *conn, id, Status::Draft).await? {
        return Ok(collection);
    }
    for status in [Status::Published, Status::Archived] {
        if CollectionRepo::exists(&mut *conn, id, status).await? {
            return Err(CoreError::bad_state(
                "collection",
                "Only draft collections can be modified.",
            )
            .into());
        }
    }
    Err(CoreError::not_found("Collection", id).into())
}

async fn require_item(
    conn: &mut SqliteConnection,
    id: DbId,
    status: Status,
) -> EngineResult<CollectionItem> {
    CollectionRepo::find_item(conn, id, status)
        .await?
        .ok_or_else(|| CoreError::not_found("Item", id).into())
}

async fn require_draft_item(conn: &mut SqliteConnection, id: DbId) -> EngineResult<CollectionItem> {
    if let Some(item) = CollectionRepo::find_item(&mut *conn, id, Status::Draft).await? {
        return Ok(item);
    }
    for status in [Status::Published, Status::Archived] {
        if CollectionRepo::find_item(&mut *conn, id, status).await?.is_some() {
            return Err(CoreError::bad_state("item", "Only draft items can be modified.").into());
        }
    }
    Err(CoreError::not_found("Item", id).into())
}

async fn require_query(
    conn: &mut SqliteConnection,
    id: DbId,
    status: Status,
) -> EngineResult<CollectionQuery> {
    CollectionRepo::find_query(conn, id, status)
        .await?
        .ok_or_else(|| CoreError::not_found("Query", id).into())
}

async fn require_draft_query(
    conn: &mut SqliteConnection,
    id: DbId,
) -> EngineResult<CollectionQuery> {
    if let Some(query) = CollectionRepo::find_query(&mut *conn, id, Status::Draft).await? {
        return Ok(query);
    }
    for status in [Status::Published, Status::Archived] {
        if CollectionRepo::find_query(&mut *conn, id, status).await?.is_some() {
            return Err(CoreError::bad_state("query", "Only draft queries can be modified.").into());
        }
    }
    Err(CoreError::not_found("Query", id).into())
}

/// Bump the layout draft owning a collection's block.
async fn touch_layout(conn: &mut SqliteConnection, block_id: DbId) -> EngineResult<()> {
    if let Some(block) = BlockRepo::find(&mut *conn, block_id, Status::Draft).await? {
        LayoutRepo::touch(conn, block.layout_id, Status::Draft, Utc::now()).await?;
    }
    Ok(())
}

fn check_visibility_range(
    violations: &mut Violations,
    visible_from: Option<Timestamp>,
    visible_to: Option<Timestamp>,
) {
    if let (Some(from), Some(to)) = (visible_from, visible_to) {
        violations.check(
            from <= to,
            "visible_to",
            "invalid_range",
            "Visibility end must not be before its start.",
        );
    }
}

impl CollectionService {
    pub fn new(pool: DbPool, registries: Arc<Registries>) -> Self {
        Self { pool, registries }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    pub async fn load_collection(&self, id: DbId) -> EngineResult<Collection> {
        let mut conn = self.pool.acquire().await?;
        require_collection(&mut conn, id, Status::Published).await
    }

    pub async fn load_collection_draft(&self, id: DbId) -> EngineResult<Collection> {
        let mut conn = self.pool.acquire().await?;
        require_collection(&mut conn, id, Status::Draft).await
    }

    pub async fn load_block_collections(
        &self,
        block_id: DbId,
        status: Status,
    ) -> EngineResult<Vec<Collection>> {
        let mut conn = self.pool.acquire().await?;
        Ok(CollectionRepo::list_for_block(&mut conn, block_id, status).await?)
    }

    pub async fn load_item(&self, id: DbId) -> EngineResult<CollectionItem> {
        let mut conn = self.pool.acquire().await?;
        require_item(&mut conn, id, Status::Published).await
    }

    pub async fn load_item_draft(&self, id: DbId) -> EngineResult<CollectionItem> {
        let mut conn = self.pool.acquire().await?;
        require_item(&mut conn, id, Status::Draft).await
    }

    /// Items of a collection copy: manual items first, each type by position.
    pub async fn load_collection_items(
        &self,
        collection_id: DbId,
        status: Status,
    ) -> EngineResult<Vec<CollectionItem>> {
        let mut conn = self.pool.acquire().await?;
        require_collection(&mut conn, collection_id, status).await?;
        Ok(CollectionRepo::list_items(&mut conn, collection_id, status).await?)
    }

    pub async fn load_query(&self, id: DbId) -> EngineResult<CollectionQuery> {
        let mut conn = self.pool.acquire().await?;
        require_query(&mut conn, id, Status::Published).await
    }

    pub async fn load_query_draft(&self, id: DbId) -> EngineResult<CollectionQuery> {
        let mut conn = self.pool.acquire().await?;
        require_query(&mut conn, id, Status::Draft).await
    }

    /// The query of a collection copy; `None` for manual collections.
    pub async fn load_collection_query(
        &self,
        collection_id: DbId,
        status: Status,
    ) -> EngineResult<Option<CollectionQuery>> {
        let mut conn = self.pool.acquire().await?;
        require_collection(&mut conn, collection_id, status).await?;
        Ok(CollectionRepo::find_query_for_collection(&mut conn, collection_id, status).await?)
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    /// Switch a collection draft between manual and dynamic.
    ///
    /// Going manual drops the query and the override items and closes the
    /// gaps between manual items. Going dynamic requires `query` and
    /// replaces any existing query.
    pub async fn change_collection_type(
        &self,
        id: DbId,
        new_type: CollectionType,
        query: Option<&CreateQuery>,
    ) -> EngineResult<Collection> {
        let query_parameters = match (new_type, query) {
            (CollectionType::Dynamic, None) => {
                return Err(CoreError::bad_state(
                    "query_create",
                    "Query create struct must be defined when converting to dynamic collection.",
                )
                .into());
            }
            (CollectionType::Dynamic, Some(query)) => Some(self.prepare_query(query)?),
            (CollectionType::Manual, _) => None,
        };

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let collection = require_draft_collection(&mut tx, id).await?;

        CollectionRepo::delete_query_for_collection(&mut tx, id, Status::Draft).await?;
        match (query, query_parameters) {
            (Some(query), Some(parameters)) => {
                let query_id = CollectionRepo::next_query_id(&mut tx).await?;
                CollectionRepo::create_query(
                    &mut tx,
                    &CollectionQuery {
                        id: query_id,
                        status: Status::Draft.id(),
                        uuid: Uuid::new_v4(),
                        collection_id: id,
                        query_type: query.query_type.clone(),
                        parameters: Value::Object(parameters),
                    },
                )
                .await?;
            }
            _ => {
                CollectionRepo::delete_items_of_type(&mut tx, id, Status::Draft, ItemType::Override)
                    .await?;
                let manual = CollectionRepo::list_items(&mut tx, id, Status::Draft).await?;
                for (position, item) in (0..).zip(manual.iter()) {
                    if item.position != position {
                        CollectionRepo::set_item_position(&mut tx, item.id, Status::Draft, position)
                            .await?;
                    }
                }
            }
        }

        let updated = CollectionRepo::set_type(&mut tx, id, Status::Draft, new_type)
            .await?
            .ok_or(CoreError::not_found("Collection", id))?;
        touch_layout(&mut tx, collection.block_id).await?;
        tx.commit().await?;

        tracing::info!(collection_id = id, collection_type = %new_type, "Collection type changed");
        Ok(updated)
    }

    /// Change offset and limit of a collection draft; a limit of 0 removes it.
    pub async fn update_collection(
        &self,
        id: DbId,
        input: &UpdateCollection,
    ) -> EngineResult<Collection> {
        Violations::of(input).into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let collection = require_draft_collection(&mut tx, id).await?;
        let start = input.offset.unwrap_or(collection.start);
        let length = match input.limit {
            None => collection.length,
            Some(0) => None,
            Some(limit) => Some(limit),
        };

        let updated = CollectionRepo::update(&mut tx, id, Status::Draft, start, length)
            .await?
            .ok_or(CoreError::not_found("Collection", id))?;
        touch_layout(&mut tx, collection.block_id).await?;
        tx.commit().await?;

        tracing::info!(collection_id = id, start, length = ?length, "Collection updated");
        Ok(updated)
    }

    fn prepare_query(&self, query: &CreateQuery) -> EngineResult<Map<String, Value>> {
        let mut violations = Violations::of(query);
        let parameters = match self.registries.query_types.get(&query.query_type) {
            None => {
                violations.add(
                    "query_type",
                    "unknown_query_type",
                    format!("Query type \"{}\" does not exist.", query.query_type),
                );
                Map::new()
            }
            Some(query_type) => query_type
                .merge_parameters(&query.parameters)
                .unwrap_or_else(|unknown| {
                    violations.add(
                        "parameters",
                        "unknown_parameter",
                        format!("Unknown query parameters: {}.", unknown.join(", ")),
                    );
                    Map::new()
                }),
        };
        violations.into_result()?;
        Ok(parameters)
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    /// Add an item to a collection draft.
    ///
    /// Dynamic collections accept positions past the end of the item list
    /// since their items interleave with query results.
    pub async fn add_item(
        &self,
        collection_id: DbId,
        input: &CreateItem,
        position: Option<Position>,
    ) -> EngineResult<CollectionItem> {
        let mut violations = Violations::of(input);
        violations.check(
            self.registries.items.supports(&input.value_type),
            "value_type",
            "unsupported_value_type",
            format!("Value type \"{}\" is not supported.", input.value_type),
        );
        check_visibility_range(&mut violations, input.visible_from, input.visible_to);
        violations.into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let collection = require_draft_collection(&mut tx, collection_id).await?;
        if input.item_type == ItemType::Override && !collection.is_dynamic() {
            return Err(CoreError::bad_state(
                "item",
                "Override items can only be added to dynamic collections.",
            )
            .into());
        }

        let position = create_position(
            &mut SqlitePositions::new(&mut tx),
            &item_scope(collection_id, input.item_type, Status::Draft),
            position,
            None,
            collection.is_dynamic(),
        )
        .await?;

        let id = CollectionRepo::next_item_id(&mut tx).await?;
        let item = CollectionRepo::create_item(
            &mut tx,
            &CollectionItem {
                id,
                status: Status::Draft.id(),
                uuid: Uuid::new_v4(),
                collection_id,
                position,
                item_type: input.item_type.id(),
                value: input.value.clone(),
                value_type: input.value_type.clone(),
                visibility: input.visibility.id(),
                visible_from: input.visible_from,
                visible_to: input.visible_to,
                config: Value::Object(input.config.clone()),
            },
        )
        .await?;
        touch_layout(&mut tx, collection.block_id).await?;
        tx.commit().await?;

        tracing::info!(item_id = id, collection_id, position, "Collection item added");
        Ok(item)
    }

    pub async fn move_item(&self, id: DbId, position: Position) -> EngineResult<CollectionItem> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let item = require_draft_item(&mut tx, id).await?;
        let collection = require_collection(&mut tx, item.collection_id, Status::Draft).await?;

        let position = move_to_position(
            &mut SqlitePositions::new(&mut tx),
            &item_scope(item.collection_id, item.item_type()?, Status::Draft),
            item.position,
            position,
            collection.is_dynamic(),
        )
        .await?;
        CollectionRepo::set_item_position(&mut tx, id, Status::Draft, position).await?;
        touch_layout(&mut tx, collection.block_id).await?;
        tx.commit().await?;

        tracing::info!(item_id = id, position, "Collection item moved");
        Ok(CollectionItem { position, ..item })
    }

    /// Update the visibility configuration and config of an item draft.
    pub async fn update_item(&self, id: DbId, input: &UpdateItem) -> EngineResult<CollectionItem> {
        Violations::of(input).into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let item = require_draft_item(&mut tx, id).await?;
        let visibility = match input.visibility {
            Some(visibility) => visibility,
            None => item.visibility()?,
        };
        let visible_from = input.visible_from.unwrap_or(item.visible_from);
        let visible_to = input.visible_to.unwrap_or(item.visible_to);

        let mut violations = Violations::new();
        check_visibility_range(&mut violations, visible_from, visible_to);
        violations.into_result()?;

        let config = match &input.config {
            Some(changes) => merge_object(&item.config, changes),
            None => item.config.clone(),
        };
        let updated = CollectionRepo::update_item(
            &mut tx,
            id,
            Status::Draft,
            visibility,
            visible_from,
            visible_to,
            &config,
        )
        .await?
        .ok_or(CoreError::not_found("Item", id))?;
        let collection = require_collection(&mut tx, item.collection_id, Status::Draft).await?;
        touch_layout(&mut tx, collection.block_id).await?;
        tx.commit().await?;

        tracing::info!(item_id = id, visibility = %visibility, "Collection item updated");
        Ok(updated)
    }

    /// Delete an item draft. Manual collections close the gap; dynamic
    /// collections keep the remaining items where they are.
    pub async fn delete_item(&self, id: DbId) -> EngineResult<()> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let item = require_draft_item(&mut tx, id).await?;
        let collection = require_collection(&mut tx, item.collection_id, Status::Draft).await?;

        CollectionRepo::delete_item(&mut tx, id, Status::Draft).await?;
        if !collection.is_dynamic() {
            remove_position(
                &mut SqlitePositions::new(&mut tx),
                &item_scope(item.collection_id, item.item_type()?, Status::Draft),
                item.position,
            )
            .await?;
        }
        touch_layout(&mut tx, collection.block_id).await?;
        tx.commit().await?;

        tracing::info!(item_id = id, collection_id = item.collection_id, "Collection item deleted");
        Ok(())
    }

    /// Whether an item is visible at `at` according to its visibility
    /// configuration.
    pub fn item_visible(&self, item: &CollectionItem, at: Timestamp) -> EngineResult<bool> {
        Ok(is_visible_at(
            item.visibility()?,
            item.visible_from,
            item.visible_to,
            at,
        ))
    }

    /// Resolve the CMS value an item points at.
    pub async fn load_item_value(&self, item: &CollectionItem) -> EngineResult<Option<CmsItem>> {
        let Some(value) = item.value.as_deref() else {
            return Ok(None);
        };
        Ok(self.registries.items.load(&item.value_type, value).await?)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Overlay the parameters of a query draft.
    pub async fn update_query(
        &self,
        id: DbId,
        input: &UpdateQuery,
    ) -> EngineResult<CollectionQuery> {
        Violations::of(input).into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let query = require_draft_query(&mut tx, id).await?;
        let query_type = self.registries.query_types.get(&query.query_type).ok_or_else(|| {
            CoreError::Runtime(format!("Query type \"{}\" does not exist.", query.query_type))
        })?;

        let mut violations = Violations::new();
        if let Err(unknown) = query_type.merge_parameters(&input.parameters) {
            violations.add(
                "parameters",
                "unknown_parameter",
                format!("Unknown query parameters: {}.", unknown.join(", ")),
            );
        }
        violations.into_result()?;

        let parameters = merge_object(&query.parameters, &input.parameters);
        let updated =
            CollectionRepo::update_query_parameters(&mut tx, id, Status::Draft, &parameters)
                .await?
            .ok_or(CoreError::not_found("Query", id))?;
        let collection = require_collection(&mut tx, query.collection_id, Status::Draft).await?;
        touch_layout(&mut tx, collection.block_id).await?;
        tx.commit().await?;

        tracing::info!(query_id = id, query_type = %query.query_type, "Query updated");
        Ok(updated)
    }
}
