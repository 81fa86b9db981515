//! Block service: placement, content and translations of blocks inside
//! layout drafts.

use std::sync::Arc;

use chrono::Utc;
use layouts_core::block_definition::{
    check_placement, BlockDefinition, PlacementTarget, ZONE_PLACEHOLDER,
};
use layouts_core::error::CoreError;
use layouts_core::position::{create_position, move_to_position, remove_position};
use layouts_core::status::{CollectionType, Status};
use layouts_core::types::{DbId, Position};
use layouts_core::validation::Violations;
use layouts_db::models::block::{Block, BlockTranslation, CreateBlock, UpdateBlock};
use layouts_db::models::collection::{Collection, CollectionQuery, CreateCollection};
use layouts_db::models::layout::Layout;
use layouts_db::repositories::{
    BlockRepo, CollectionRepo, LayoutRepo, SqlitePositions, ZoneRepo, BLOCK_CONTENT_TREE,
};
use layouts_db::DbPool;
use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::engine::Registries;
use crate::error::EngineResult;

use super::tree::{copy_subtree, CopyTarget};
use super::{
    block_scope, merge_object, require_block, require_draft_block, require_draft_layout,
    require_layout, require_zone,
};

pub struct BlockService {
    pool: DbPool,
    registries: Arc<Registries>,
}

/// A create DTO checked against the registries.
struct PreparedBlock<'a> {
    definition: &'a BlockDefinition,
    parameters: Map<String, Value>,
    /// Collections with the merged parameters of their query, if any.
    collections: Vec<(&'a CreateCollection, Option<Map<String, Value>>)>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parent and placeholder of a block; zone root blocks have neither.
fn placement(block: &Block) -> EngineResult<(DbId, &str)> {
    match (block.parent_id, block.placeholder.as_deref()) {
        (Some(parent_id), Some(placeholder)) => Ok((parent_id, placeholder)),
        _ => Err(CoreError::bad_state("block", "Zone root blocks cannot be modified.").into()),
    }
}

fn ensure_same_layout(block: &Block, target: &Block) -> EngineResult<()> {
    if block.layout_id != target.layout_id {
        return Err(CoreError::bad_state(
            "target_block",
            "Block is not in the same layout as the target block.",
        )
        .into());
    }
    if target.path.starts_with(&block.path) {
        return Err(CoreError::bad_state(
            "target_block",
            "Block cannot be placed inside itself.",
        )
        .into());
    }
    Ok(())
}

/// Give a block a translation for every layout locale it is missing,
/// seeded from its main translation.
async fn add_missing_translations(
    conn: &mut SqliteConnection,
    block: &Block,
    locales: &[String],
) -> EngineResult<()> {
    let status = super::row_status(block.status)?;
    let existing = BlockRepo::translations(&mut *conn, block.id, status).await?;
    let main_parameters = existing
        .iter()
        .find(|t| t.locale == block.main_locale)
        .map(|t| t.parameters.clone())
        .unwrap_or_else(|| Value::Object(Map::new()));

    for locale in locales {
        if existing.iter().any(|t| &t.locale == locale) {
            continue;
        }
        BlockRepo::create_translation(
            &mut *conn,
            &BlockTranslation {
                block_id: block.id,
                status: block.status,
                locale: locale.clone(),
                parameters: main_parameters.clone(),
            },
        )
        .await?;
    }
    Ok(())
}

impl BlockService {
    pub fn new(pool: DbPool, registries: Arc<Registries>) -> Self {
        Self { pool, registries }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load the published copy of a block.
    pub async fn load_block(&self, id: DbId) -> EngineResult<Block> {
        let mut conn = self.pool.acquire().await?;
        require_block(&mut conn, id, Status::Published).await
    }

    pub async fn load_block_draft(&self, id: DbId) -> EngineResult<Block> {
        let mut conn = self.pool.acquire().await?;
        require_block(&mut conn, id, Status::Draft).await
    }

    /// Blocks placed directly in a zone, by position.
    pub async fn load_zone_blocks(
        &self,
        layout_id: DbId,
        status: Status,
        zone: &str,
    ) -> EngineResult<Vec<Block>> {
        let mut conn = self.pool.acquire().await?;
        let zone = require_zone(&mut conn, layout_id, status, zone).await?;
        Ok(
            BlockRepo::children(&mut conn, zone.root_block_id, status, Some(ZONE_PLACEHOLDER))
                .await?,
        )
    }

    /// Blocks in one placeholder of a container, by position.
    pub async fn load_placeholder_blocks(
        &self,
        block_id: DbId,
        status: Status,
        placeholder: &str,
    ) -> EngineResult<Vec<Block>> {
        let mut conn = self.pool.acquire().await?;
        require_block(&mut conn, block_id, status).await?;
        Ok(BlockRepo::children(&mut conn, block_id, status, Some(placeholder)).await?)
    }

    pub async fn load_block_translations(
        &self,
        block_id: DbId,
        status: Status,
    ) -> EngineResult<Vec<BlockTranslation>> {
        let mut conn = self.pool.acquire().await?;
        require_block(&mut conn, block_id, status).await?;
        Ok(BlockRepo::translations(&mut conn, block_id, status).await?)
    }

    // -----------------------------------------------------------------------
    // Creating
    // -----------------------------------------------------------------------

    /// Create a block directly in a zone of a layout draft.
    pub async fn create_block_in_zone(
        &self,
        input: &CreateBlock,
        layout_id: DbId,
        zone: &str,
        position: Option<Position>,
    ) -> EngineResult<Block> {
        let prepared = self.prepare(input)?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let layout = require_draft_layout(&mut tx, layout_id).await?;
        let zone = require_zone(&mut tx, layout_id, Status::Draft, zone).await?;
        let root = require_block(&mut tx, zone.root_block_id, Status::Draft).await?;
        self.check_target(&mut tx, &layout, &root, ZONE_PLACEHOLDER, prepared.definition)
            .await?;

        let block = self
            .insert_block(&mut tx, &layout, &root, ZONE_PLACEHOLDER, position, input, prepared)
            .await?;
        tx.commit().await?;

        tracing::info!(
            block_id = block.id,
            layout_id,
            zone = %zone.identifier,
            definition = %block.definition_identifier,
            "Block created"
        );
        Ok(block)
    }

    /// Create a block in a placeholder of a container block draft.
    pub async fn create_block(
        &self,
        input: &CreateBlock,
        parent_id: DbId,
        placeholder: &str,
        position: Option<Position>,
    ) -> EngineResult<Block> {
        let prepared = self.prepare(input)?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let parent = require_draft_block(&mut tx, parent_id).await?;
        let layout = require_layout(&mut tx, parent.layout_id, Status::Draft).await?;
        self.check_target(&mut tx, &layout, &parent, placeholder, prepared.definition)
            .await?;

        let block = self
            .insert_block(&mut tx, &layout, &parent, placeholder, position, input, prepared)
            .await?;
        tx.commit().await?;

        tracing::info!(
            block_id = block.id,
            parent_id,
            placeholder,
            definition = %block.definition_identifier,
            "Block created"
        );
        Ok(block)
    }

    /// Check a create DTO against the block definition and query type
    /// registries, collecting every violation.
    fn prepare<'a>(&'a self, input: &'a CreateBlock) -> EngineResult<PreparedBlock<'a>> {
        let mut violations = Violations::of(input);
        let Some(definition) = self.registries.block_definitions.get(&input.definition_identifier)
        else {
            violations.add(
                "definition_identifier",
                "unknown_block_definition",
                format!("Block definition \"{}\" does not exist.", input.definition_identifier),
            );
            return Err(violations.into_error().into());
        };

        violations.check(
            definition.has_view_type(&input.view_type),
            "view_type",
            "unknown_view_type",
            format!("Block definition does not have \"{}\" view type.", input.view_type),
        );
        violations.check(
            !definition.has_view_type(&input.view_type)
                || definition.has_item_view_type(&input.view_type, &input.item_view_type),
            "item_view_type",
            "unknown_item_view_type",
            format!(
                "View type \"{}\" does not have \"{}\" item view type.",
                input.view_type, input.item_view_type
            ),
        );

        let parameters = match definition.merge_parameters(&input.parameters) {
            Ok(parameters) => parameters,
            Err(unknown) => {
                violations.add(
                    "parameters",
                    "unknown_parameter",
                    format!("Unknown parameters: {}.", unknown.join(", ")),
                );
                Map::new()
            }
        };

        let mut collections = Vec::with_capacity(input.collections.len());
        for collection in &input.collections {
            violations.check(
                definition.has_collection(&collection.identifier),
                "collections",
                "unknown_collection",
                format!(
                    "Block definition does not declare \"{}\" collection.",
                    collection.identifier
                ),
            );
            let query = match &collection.query {
                None => None,
                Some(query) => match self.registries.query_types.get(&query.query_type) {
                    None => {
                        violations.add(
                            "collections",
                            "unknown_query_type",
                            format!("Query type \"{}\" does not exist.", query.query_type),
                        );
                        None
                    }
                    Some(query_type) => match query_type.merge_parameters(&query.parameters) {
                        Ok(parameters) => Some(parameters),
                        Err(unknown) => {
                            violations.add(
                                "collections",
                                "unknown_parameter",
                                format!("Unknown query parameters: {}.", unknown.join(", ")),
                            );
                            None
                        }
                    },
                },
            };
            collections.push((collection, query));
        }

        violations.into_result()?;
        Ok(PreparedBlock {
            definition,
            parameters,
            collections,
        })
    }

    /// Check that a block of `definition` may go into `placeholder` of
    /// `parent`. Zone roots defer to the layout type's allow-lists.
    async fn check_target(
        &self,
        conn: &mut SqliteConnection,
        layout: &Layout,
        parent: &Block,
        placeholder: &str,
        definition: &BlockDefinition,
    ) -> EngineResult<()> {
        if !parent.is_zone_root() {
            let parent_definition = self
                .registries
                .block_definitions
                .require(&parent.definition_identifier)?;
            check_placement(
                PlacementTarget::Block {
                    parent: parent_definition,
                    placeholder,
                },
                definition,
            )?;
            return Ok(());
        }

        if placeholder != ZONE_PLACEHOLDER {
            return Err(CoreError::bad_state(
                "placeholder",
                format!("Target block does not have the \"{placeholder}\" placeholder."),
            )
            .into());
        }
        let zone = ZoneRepo::find_by_root_block(conn, parent.id, Status::Draft)
            .await?
            .ok_or_else(|| CoreError::Runtime(format!("Root block {} has no zone.", parent.id)))?;
        let layout_type = self.registries.layout_types.require(&layout.layout_type)?;
        if !layout_type.is_block_allowed_in_zone(&zone.identifier, &definition.identifier) {
            return Err(CoreError::bad_state(
                "zone",
                "Block is not allowed in specified zone.",
            )
            .into());
        }
        check_placement(PlacementTarget::Zone, definition)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_block(
        &self,
        conn: &mut SqliteConnection,
        layout: &Layout,
        parent: &Block,
        placeholder: &str,
        position: Option<Position>,
        input: &CreateBlock,
        prepared: PreparedBlock<'_>,
    ) -> EngineResult<Block> {
        let position = create_position(
            &mut SqlitePositions::new(&mut *conn),
            &block_scope(parent.id, placeholder, Status::Draft),
            position,
            None,
            false,
        )
        .await?;

        let id = BlockRepo::next_id(&mut *conn).await?;
        let translatable = input.translatable.unwrap_or(prepared.definition.translatable);
        let block = BlockRepo::create(
            &mut *conn,
            &Block {
                id,
                status: Status::Draft.id(),
                uuid: Uuid::new_v4(),
                layout_id: layout.id,
                depth: parent.depth + 1,
                path: format!("{}{id}/", parent.path),
                parent_id: Some(parent.id),
                placeholder: Some(placeholder.to_string()),
                position,
                definition_identifier: input.definition_identifier.clone(),
                view_type: input.view_type.clone(),
                item_view_type: input.item_view_type.clone(),
                name: input.name.clone(),
                config: Value::Object(input.config.clone()),
                translatable,
                main_locale: layout.main_locale.clone(),
                always_available: input.always_available,
            },
        )
        .await?;

        let locales = if translatable {
            LayoutRepo::locales(&mut *conn, layout.id, Status::Draft).await?
        } else {
            vec![layout.main_locale.clone()]
        };
        let parameters = Value::Object(prepared.parameters);
        for locale in locales {
            BlockRepo::create_translation(
                &mut *conn,
                &BlockTranslation {
                    block_id: id,
                    status: Status::Draft.id(),
                    locale,
                    parameters: parameters.clone(),
                },
            )
            .await?;
        }

        for (collection, query) in prepared.collections {
            let collection_id = CollectionRepo::next_id(&mut *conn).await?;
            let collection_type = match query {
                Some(_) => CollectionType::Dynamic,
                None => CollectionType::Manual,
            };
            CollectionRepo::create(
                &mut *conn,
                &Collection {
                    id: collection_id,
                    status: Status::Draft.id(),
                    uuid: Uuid::new_v4(),
                    block_id: id,
                    identifier: collection.identifier.clone(),
                    collection_type: collection_type.id(),
                    start: collection.offset,
                    length: collection.limit,
                },
            )
            .await?;

            if let (Some(parameters), Some(create)) = (query, &collection.query) {
                let query_id = CollectionRepo::next_query_id(&mut *conn).await?;
                CollectionRepo::create_query(
                    &mut *conn,
                    &CollectionQuery {
                        id: query_id,
                        status: Status::Draft.id(),
                        uuid: Uuid::new_v4(),
                        collection_id,
                        query_type: create.query_type.clone(),
                        parameters: Value::Object(parameters),
                    },
                )
                .await?;
            }
        }

        LayoutRepo::touch(&mut *conn, layout.id, Status::Draft, Utc::now()).await?;
        Ok(block)
    }

    // -----------------------------------------------------------------------
    // Updating
    // -----------------------------------------------------------------------

    /// Update a block draft.
    ///
    /// Parameters go to the requested locale (default: the block's main
    /// locale) of a translatable block and to every translation otherwise.
    pub async fn update_block(&self, id: DbId, input: &UpdateBlock) -> EngineResult<Block> {
        Violations::of(input).into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let block = require_draft_block(&mut tx, id).await?;
        placement(&block)?;
        let definition = self
            .registries
            .block_definitions
            .require(&block.definition_identifier)?;

        let view_type = input.view_type.clone().unwrap_or_else(|| block.view_type.clone());
        let item_view_type = input
            .item_view_type
            .clone()
            .unwrap_or_else(|| block.item_view_type.clone());

        let mut violations = Violations::new();
        violations.check(
            definition.has_view_type(&view_type),
            "view_type",
            "unknown_view_type",
            format!("Block definition does not have \"{view_type}\" view type."),
        );
        violations.check(
            !definition.has_view_type(&view_type)
                || definition.has_item_view_type(&view_type, &item_view_type),
            "item_view_type",
            "unknown_item_view_type",
            format!("View type \"{view_type}\" does not have \"{item_view_type}\" item view type."),
        );
        if let Some(parameters) = &input.parameters {
            if let Err(unknown) = definition.merge_parameters(parameters) {
                violations.add(
                    "parameters",
                    "unknown_parameter",
                    format!("Unknown parameters: {}.", unknown.join(", ")),
                );
            }
        }
        violations.into_result()?;

        if let Some(changes) = &input.parameters {
            let translations = BlockRepo::translations(&mut tx, id, Status::Draft).await?;
            let locale = input.locale.as_deref().unwrap_or(&block.main_locale);
            let targets: Vec<&BlockTranslation> = if block.translatable {
                translations.iter().filter(|t| t.locale == locale).collect()
            } else {
                translations.iter().collect()
            };
            if targets.is_empty() {
                return Err(CoreError::bad_state(
                    "locale",
                    "Block does not have the specified translation.",
                )
                .into());
            }
            for translation in targets {
                let merged = merge_object(&translation.parameters, changes);
                BlockRepo::set_parameters(&mut tx, id, Status::Draft, &translation.locale, &merged)
                    .await?;
            }
        }

        let config = match &input.config {
            Some(changes) => merge_object(&block.config, changes),
            None => block.config.clone(),
        };
        let updated = BlockRepo::save(
            &mut tx,
            &Block {
                view_type,
                item_view_type,
                name: input.name.clone().unwrap_or_else(|| block.name.clone()),
                always_available: input.always_available.unwrap_or(block.always_available),
                config,
                ..block.clone()
            },
        )
        .await?;
        LayoutRepo::touch(&mut tx, block.layout_id, Status::Draft, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(block_id = id, "Block updated");
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Moving and copying
    // -----------------------------------------------------------------------

    /// Move a block draft to `placeholder` of `parent_id` at `position`.
    pub async fn move_block(
        &self,
        id: DbId,
        parent_id: DbId,
        placeholder: &str,
        position: Position,
    ) -> EngineResult<Block> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let block = require_draft_block(&mut tx, id).await?;
        let parent = require_draft_block(&mut tx, parent_id).await?;
        let moved = self.relocate(&mut tx, &block, &parent, placeholder, position).await?;
        tx.commit().await?;

        tracing::info!(block_id = id, parent_id, placeholder, position, "Block moved");
        Ok(moved)
    }

    /// Move a block draft directly into a zone of its layout.
    pub async fn move_block_to_zone(
        &self,
        id: DbId,
        zone: &str,
        position: Position,
    ) -> EngineResult<Block> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let block = require_draft_block(&mut tx, id).await?;
        let zone_row = require_zone(&mut tx, block.layout_id, Status::Draft, zone).await?;
        let root = require_block(&mut tx, zone_row.root_block_id, Status::Draft).await?;
        let moved = self.relocate(&mut tx, &block, &root, ZONE_PLACEHOLDER, position).await?;
        tx.commit().await?;

        tracing::info!(block_id = id, zone, position, "Block moved to zone");
        Ok(moved)
    }

    async fn relocate(
        &self,
        conn: &mut SqliteConnection,
        block: &Block,
        parent: &Block,
        placeholder: &str,
        position: Position,
    ) -> EngineResult<Block> {
        let (current_parent, current_placeholder) = placement(block)?;
        ensure_same_layout(block, parent)?;
        let layout = require_layout(&mut *conn, block.layout_id, Status::Draft).await?;
        let definition = self
            .registries
            .block_definitions
            .require(&block.definition_identifier)?;
        self.check_target(&mut *conn, &layout, parent, placeholder, definition)
            .await?;

        if current_parent == parent.id && current_placeholder == placeholder {
            let position = move_to_position(
                &mut SqlitePositions::new(&mut *conn),
                &block_scope(parent.id, placeholder, Status::Draft),
                block.position,
                position,
                false,
            )
            .await?;
            BlockRepo::set_position(&mut *conn, block.id, Status::Draft, position).await?;
        } else {
            let position = create_position(
                &mut SqlitePositions::new(&mut *conn),
                &block_scope(parent.id, placeholder, Status::Draft),
                Some(position),
                None,
                false,
            )
            .await?;
            BlockRepo::set_placement(&mut *conn, block, parent, placeholder, position).await?;
            remove_position(
                &mut SqlitePositions::new(&mut *conn),
                &block_scope(current_parent, current_placeholder, Status::Draft),
                block.position,
            )
            .await?;
        }

        LayoutRepo::touch(&mut *conn, block.layout_id, Status::Draft, Utc::now()).await?;
        require_block(conn, block.id, Status::Draft).await
    }

    /// Copy a block draft, with its subtree, into `placeholder` of `parent_id`.
    pub async fn copy_block(
        &self,
        id: DbId,
        parent_id: DbId,
        placeholder: &str,
        position: Option<Position>,
    ) -> EngineResult<Block> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let block = require_draft_block(&mut tx, id).await?;
        let parent = require_draft_block(&mut tx, parent_id).await?;
        let copy = self.duplicate(&mut tx, &block, &parent, placeholder, position).await?;
        tx.commit().await?;

        tracing::info!(block_id = id, copy_id = copy.id, parent_id, placeholder, "Block copied");
        Ok(copy)
    }

    /// Copy a block draft, with its subtree, into a zone of its layout.
    pub async fn copy_block_to_zone(
        &self,
        id: DbId,
        zone: &str,
        position: Option<Position>,
    ) -> EngineResult<Block> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let block = require_draft_block(&mut tx, id).await?;
        let zone_row = require_zone(&mut tx, block.layout_id, Status::Draft, zone).await?;
        let root = require_block(&mut tx, zone_row.root_block_id, Status::Draft).await?;
        let copy = self.duplicate(&mut tx, &block, &root, ZONE_PLACEHOLDER, position).await?;
        tx.commit().await?;

        tracing::info!(block_id = id, copy_id = copy.id, zone, "Block copied to zone");
        Ok(copy)
    }

    async fn duplicate(
        &self,
        conn: &mut SqliteConnection,
        block: &Block,
        parent: &Block,
        placeholder: &str,
        position: Option<Position>,
    ) -> EngineResult<Block> {
        placement(block)?;
        ensure_same_layout(block, parent)?;
        let layout = require_layout(&mut *conn, block.layout_id, Status::Draft).await?;
        let definition = self
            .registries
            .block_definitions
            .require(&block.definition_identifier)?;
        self.check_target(&mut *conn, &layout, parent, placeholder, definition)
            .await?;

        let position = create_position(
            &mut SqlitePositions::new(&mut *conn),
            &block_scope(parent.id, placeholder, Status::Draft),
            position,
            None,
            false,
        )
        .await?;
        let copy = copy_subtree(
            &mut *conn,
            block,
            CopyTarget {
                layout_id: layout.id,
                status: Status::Draft,
                parent: Some(parent),
                placeholder: Some(placeholder),
                position,
            },
        )
        .await?;
        LayoutRepo::touch(&mut *conn, layout.id, Status::Draft, Utc::now()).await?;
        Ok(copy)
    }

    // -----------------------------------------------------------------------
    // Restoring and translations
    // -----------------------------------------------------------------------

    /// Reset the content of a block draft to its published copy.
    ///
    /// Placement and child blocks stay as they are in the draft.
    /// Translations follow the draft layout's locales.
    pub async fn restore_block(&self, id: DbId) -> EngineResult<Block> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let draft = require_draft_block(&mut tx, id).await?;
        placement(&draft)?;
        let published = BlockRepo::find(&mut tx, id, Status::Published)
            .await?
            .ok_or_else(|| {
                CoreError::bad_state("block", "Block does not have a published status.")
            })?;

        let restored = BlockRepo::save(
            &mut tx,
            &Block {
                view_type: published.view_type,
                item_view_type: published.item_view_type,
                name: published.name,
                config: published.config,
                translatable: published.translatable,
                always_available: published.always_available,
                ..draft.clone()
            },
        )
        .await?;

        BLOCK_CONTENT_TREE.delete(&mut tx, id, Status::Draft).await?;
        BLOCK_CONTENT_TREE
            .copy(&mut tx, id, Status::Published, Status::Draft)
            .await?;

        if restored.translatable {
            let locales = LayoutRepo::locales(&mut tx, restored.layout_id, Status::Draft).await?;
            add_missing_translations(&mut tx, &restored, &locales).await?;
            for translation in BlockRepo::translations(&mut tx, id, Status::Draft).await? {
                if !locales.contains(&translation.locale) {
                    BlockRepo::delete_translation(&mut tx, id, Status::Draft, &translation.locale)
                        .await?;
                }
            }
        } else {
            BlockRepo::delete_translations_except(&mut tx, id, Status::Draft, &restored.main_locale)
                .await?;
        }

        LayoutRepo::touch(&mut tx, restored.layout_id, Status::Draft, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(block_id = id, "Block restored from published");
        Ok(restored)
    }

    /// Make a block draft translatable, adding a translation per layout
    /// locale seeded from the main translation.
    pub async fn enable_translations(&self, id: DbId) -> EngineResult<Block> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let block = require_draft_block(&mut tx, id).await?;
        placement(&block)?;
        if block.translatable {
            return Err(CoreError::bad_state("block", "Block is already translatable.").into());
        }

        let updated = BlockRepo::save(
            &mut tx,
            &Block {
                translatable: true,
                ..block.clone()
            },
        )
        .await?;
        let locales = LayoutRepo::locales(&mut tx, block.layout_id, Status::Draft).await?;
        add_missing_translations(&mut tx, &updated, &locales).await?;
        LayoutRepo::touch(&mut tx, block.layout_id, Status::Draft, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(block_id = id, locales = locales.len(), "Block translations enabled");
        Ok(updated)
    }

    /// Make a block draft untranslatable, keeping only its main translation.
    pub async fn disable_translations(&self, id: DbId) -> EngineResult<Block> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let block = require_draft_block(&mut tx, id).await?;
        placement(&block)?;
        if !block.translatable {
            return Err(CoreError::bad_state("block", "Block is not translatable.").into());
        }

        let removed =
            BlockRepo::delete_translations_except(&mut tx, id, Status::Draft, &block.main_locale)
                .await?;
        let updated = BlockRepo::save(
            &mut tx,
            &Block {
                translatable: false,
                ..block.clone()
            },
        )
        .await?;
        LayoutRepo::touch(&mut tx, block.layout_id, Status::Draft, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(
            block_id = id,
            removed_translations = removed,
            "Block translations disabled"
        );
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Deleting
    // -----------------------------------------------------------------------

    /// Delete a block draft with its subtree and close the gap it leaves.
    pub async fn delete_block(&self, id: DbId) -> EngineResult<()> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let block = require_draft_block(&mut tx, id).await?;
        let (parent_id, placeholder) = placement(&block)?;

        let deleted = BlockRepo::delete_subtree(&mut tx, &block).await?;
        remove_position(
            &mut SqlitePositions::new(&mut tx),
            &block_scope(parent_id, placeholder, Status::Draft),
            block.position,
        )
        .await?;
        LayoutRepo::touch(&mut tx, block.layout_id, Status::Draft, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(block_id = id, blocks = deleted, "Block deleted");
        Ok(())
    }
}
