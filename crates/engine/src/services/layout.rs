//! Layout service: loading, editing and the lifecycle of layouts.

use std::sync::Arc;

use chrono::Utc;
use layouts_core::error::CoreError;
use layouts_core::lifecycle::{
    plan_create_draft, plan_delete, plan_discard_draft, plan_publish, plan_restore_from_archive,
};
use layouts_core::locale::is_valid_locale;
use layouts_core::status::Status;
use layouts_core::types::DbId;
use layouts_core::validation::Violations;
use layouts_db::models::block::{Block, BlockTranslation};
use layouts_db::models::layout::{CopyLayout, CreateLayout, Layout, UpdateLayout, Zone};
use layouts_db::repositories::{BlockRepo, LayoutRepo, ZoneRepo, LAYOUT_TREE};
use layouts_db::DbPool;
use serde_json::json;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::engine::Registries;
use crate::error::EngineResult;

use super::tree::{copy_subtree, CopyTarget};
use super::{require_block, require_draft_layout, require_layout, require_zone};

pub struct LayoutService {
    pool: DbPool,
    registries: Arc<Registries>,
    default_locale: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn ensure_name_available(
    conn: &mut SqliteConnection,
    name: &str,
    exclude_id: Option<DbId>,
) -> EngineResult<()> {
    if LayoutRepo::name_exists(conn, name, exclude_id).await? {
        return Err(CoreError::bad_state(
            "name",
            "Layout with provided name already exists.",
        )
        .into());
    }
    Ok(())
}

/// The root block holding the blocks of one zone.
fn zone_root_block(id: DbId, layout: &Layout) -> Block {
    Block {
        id,
        status: layout.status,
        uuid: Uuid::new_v4(),
        layout_id: layout.id,
        depth: 0,
        path: format!("/{id}/"),
        parent_id: None,
        placeholder: None,
        position: 0,
        definition_identifier: String::new(),
        view_type: String::new(),
        item_view_type: String::new(),
        name: String::new(),
        config: json!({}),
        translatable: false,
        main_locale: layout.main_locale.clone(),
        always_available: true,
    }
}

impl LayoutService {
    pub fn new(pool: DbPool, registries: Arc<Registries>, default_locale: String) -> Self {
        Self {
            pool,
            registries,
            default_locale,
        }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load the published copy of a layout.
    pub async fn load_layout(&self, id: DbId) -> EngineResult<Layout> {
        self.load_layout_with_status(id, Status::Published).await
    }

    pub async fn load_layout_draft(&self, id: DbId) -> EngineResult<Layout> {
        self.load_layout_with_status(id, Status::Draft).await
    }

    pub async fn load_layout_archive(&self, id: DbId) -> EngineResult<Layout> {
        self.load_layout_with_status(id, Status::Archived).await
    }

    pub async fn load_layout_with_status(&self, id: DbId, status: Status) -> EngineResult<Layout> {
        let mut conn = self.pool.acquire().await?;
        require_layout(&mut conn, id, status).await
    }

    /// Published layouts; with `include_drafts`, also layouts that were
    /// never published.
    pub async fn load_layouts(&self, include_drafts: bool) -> EngineResult<Vec<Layout>> {
        let mut conn = self.pool.acquire().await?;
        let layouts = LayoutRepo::list(&mut conn, include_drafts).await?;
        tracing::debug!(count = layouts.len(), include_drafts, "Listed layouts");
        Ok(layouts)
    }

    pub async fn load_shared_layouts(&self) -> EngineResult<Vec<Layout>> {
        let mut conn = self.pool.acquire().await?;
        Ok(LayoutRepo::list_shared(&mut conn).await?)
    }

    /// Published layouts with a zone linked to the given shared layout.
    pub async fn load_related_layouts(&self, shared_layout_id: DbId) -> EngineResult<Vec<Layout>> {
        let mut conn = self.pool.acquire().await?;
        let shared = LayoutRepo::find(&mut conn, shared_layout_id, Status::Published)
            .await?
            .ok_or_else(|| {
                CoreError::bad_state(
                    "shared_layout",
                    "Related layouts can only be loaded for published shared layouts.",
                )
            })?;
        if !shared.shared {
            return Err(CoreError::bad_state(
                "shared_layout",
                "Related layouts can only be loaded for shared layouts.",
            )
            .into());
        }
        Ok(LayoutRepo::list_related(&mut conn, shared_layout_id).await?)
    }

    pub async fn has_status(&self, id: DbId, status: Status) -> EngineResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(LAYOUT_TREE.statuses(&mut conn, id).await?.contains(status))
    }

    /// Whether a non-blank `name` is used by a layout other than `exclude_id`.
    pub async fn layout_name_exists(
        &self,
        name: &str,
        exclude_id: Option<DbId>,
    ) -> EngineResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(LayoutRepo::name_exists(&mut conn, name, exclude_id).await?)
    }

    pub async fn load_zones(&self, layout_id: DbId, status: Status) -> EngineResult<Vec<Zone>> {
        let mut conn = self.pool.acquire().await?;
        require_layout(&mut conn, layout_id, status).await?;
        Ok(ZoneRepo::list(&mut conn, layout_id, status).await?)
    }

    pub async fn load_zone(
        &self,
        layout_id: DbId,
        status: Status,
        identifier: &str,
    ) -> EngineResult<Zone> {
        let mut conn = self.pool.acquire().await?;
        require_zone(&mut conn, layout_id, status, identifier).await
    }

    /// Locales of a layout copy, main locale included.
    pub async fn load_locales(&self, layout_id: DbId, status: Status) -> EngineResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        require_layout(&mut conn, layout_id, status).await?;
        Ok(LayoutRepo::locales(&mut conn, layout_id, status).await?)
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Create a draft layout with one empty zone per zone of its type.
    pub async fn create_layout(&self, input: &CreateLayout) -> EngineResult<Layout> {
        let mut input = input.clone();
        if input.main_locale.trim().is_empty() {
            input.main_locale = self.default_locale.clone();
        }

        let mut violations = Violations::of(&input);
        violations.check(
            self.registries.layout_types.contains(&input.layout_type),
            "layout_type",
            "unknown_layout_type",
            format!("Layout type \"{}\" does not exist.", input.layout_type),
        );
        violations.check(
            is_valid_locale(&input.main_locale),
            "main_locale",
            "invalid_locale",
            format!("\"{}\" is not a valid locale.", input.main_locale),
        );
        violations.into_result()?;
        let layout_type = self.registries.layout_types.require(&input.layout_type)?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        ensure_name_available(&mut tx, &input.name, None).await?;

        let now = Utc::now();
        let id = LayoutRepo::next_id(&mut tx).await?;
        let layout = LayoutRepo::create(
            &mut tx,
            &Layout {
                id,
                status: Status::Draft.id(),
                uuid: Uuid::new_v4(),
                layout_type: input.layout_type.clone(),
                name: input.name.clone(),
                description: input.description.clone(),
                shared: input.shared,
                main_locale: input.main_locale.clone(),
                created_at: now,
                updated_at: now,
            },
        )
        .await?;
        LayoutRepo::add_locale(&mut tx, id, Status::Draft, &layout.main_locale).await?;

        for identifier in layout_type.zone_identifiers() {
            let root_id = BlockRepo::next_id(&mut tx).await?;
            BlockRepo::create(&mut tx, &zone_root_block(root_id, &layout)).await?;
            ZoneRepo::create(
                &mut tx,
                &Zone {
                    layout_id: id,
                    status: Status::Draft.id(),
                    identifier: identifier.to_string(),
                    root_block_id: root_id,
                    linked_layout_id: None,
                    linked_zone_identifier: None,
                },
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            layout_id = id,
            layout_type = %layout.layout_type,
            name = %layout.name,
            "Layout created"
        );
        Ok(layout)
    }

    /// Update name and description of a layout draft.
    pub async fn update_layout(&self, id: DbId, input: &UpdateLayout) -> EngineResult<Layout> {
        Violations::of(input).into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        require_draft_layout(&mut tx, id).await?;
        if let Some(name) = &input.name {
            ensure_name_available(&mut tx, name, Some(id)).await?;
        }

        let layout = LayoutRepo::update(&mut tx, id, Status::Draft, input, Utc::now())
            .await?
            .ok_or(CoreError::not_found("Layout", id))?;
        tx.commit().await?;

        tracing::info!(layout_id = id, "Layout updated");
        Ok(layout)
    }

    /// Copy one status copy of a layout into a new draft layout.
    ///
    /// Zones keep their links; blocks, translations and collections are
    /// copied under new ids.
    pub async fn copy_layout(
        &self,
        id: DbId,
        status: Status,
        input: &CopyLayout,
    ) -> EngineResult<Layout> {
        Violations::of(input).into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let source = require_layout(&mut tx, id, status).await?;
        ensure_name_available(&mut tx, &input.name, None).await?;

        let now = Utc::now();
        let copy_id = LayoutRepo::next_id(&mut tx).await?;
        let copy = LayoutRepo::create(
            &mut tx,
            &Layout {
                id: copy_id,
                status: Status::Draft.id(),
                uuid: Uuid::new_v4(),
                name: input.name.clone(),
                description: input
                    .description
                    .clone()
                    .unwrap_or_else(|| source.description.clone()),
                created_at: now,
                updated_at: now,
                ..source.clone()
            },
        )
        .await?;

        for locale in LayoutRepo::locales(&mut tx, id, status).await? {
            LayoutRepo::add_locale(&mut tx, copy_id, Status::Draft, &locale).await?;
        }

        for zone in ZoneRepo::list(&mut tx, id, status).await? {
            let root = require_block(&mut tx, zone.root_block_id, status).await?;
            let root_copy = copy_subtree(
                &mut tx,
                &root,
                CopyTarget {
                    layout_id: copy_id,
                    status: Status::Draft,
                    parent: None,
                    placeholder: None,
                    position: 0,
                },
            )
            .await?;
            ZoneRepo::create(
                &mut tx,
                &Zone {
                    layout_id: copy_id,
                    status: Status::Draft.id(),
                    root_block_id: root_copy.id,
                    ..zone
                },
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(layout_id = id, copy_id, status = %status, "Layout copied");
        Ok(copy)
    }

    /// Link a zone of a layout draft to a zone of a published shared layout.
    pub async fn link_zone(
        &self,
        layout_id: DbId,
        zone: &str,
        linked_layout_id: DbId,
        linked_zone: &str,
    ) -> EngineResult<Zone> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let layout = require_draft_layout(&mut tx, layout_id).await?;
        if layout.shared {
            return Err(CoreError::bad_state("zone", "Zone cannot be in the shared layout.").into());
        }
        require_zone(&mut tx, layout_id, Status::Draft, zone).await?;

        if linked_layout_id == layout_id {
            return Err(CoreError::bad_state(
                "linked_zone",
                "Linked zone needs to be in a different layout.",
            )
            .into());
        }
        let linked_layout = LayoutRepo::find(&mut tx, linked_layout_id, Status::Published)
            .await?
            .ok_or_else(|| {
                CoreError::bad_state("linked_zone", "Linked zone is not published.")
            })?;
        if !linked_layout.shared {
            return Err(CoreError::bad_state(
                "linked_zone",
                "Linked zone is not in the shared layout.",
            )
            .into());
        }
        if ZoneRepo::find(&mut tx, linked_layout_id, Status::Published, linked_zone)
            .await?
            .is_none()
        {
            return Err(CoreError::bad_state(
                "linked_zone",
                format!(
                    "Zone with \"{linked_zone}\" identifier does not exist in the linked layout."
                ),
            )
            .into());
        }

        let updated = ZoneRepo::set_link(
            &mut tx,
            layout_id,
            Status::Draft,
            zone,
            Some((linked_layout_id, linked_zone)),
        )
        .await?
        .ok_or(CoreError::not_found("Layout", layout_id))?;
        LayoutRepo::touch(&mut tx, layout_id, Status::Draft, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(
            layout_id,
            zone,
            linked_layout_id,
            linked_zone,
            "Zone linked"
        );
        Ok(updated)
    }

    pub async fn unlink_zone(&self, layout_id: DbId, zone: &str) -> EngineResult<Zone> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        require_draft_layout(&mut tx, layout_id).await?;
        require_zone(&mut tx, layout_id, Status::Draft, zone).await?;

        let updated = ZoneRepo::set_link(&mut tx, layout_id, Status::Draft, zone, None)
            .await?
            .ok_or(CoreError::not_found("Layout", layout_id))?;
        LayoutRepo::touch(&mut tx, layout_id, Status::Draft, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(layout_id, zone, "Zone unlinked");
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Translations
    // -----------------------------------------------------------------------

    /// Add `locale` to a layout draft. Translatable blocks get a
    /// translation copied from `source_locale`.
    pub async fn add_translation(
        &self,
        id: DbId,
        locale: &str,
        source_locale: &str,
    ) -> EngineResult<Layout> {
        let mut violations = Violations::new();
        violations.check(
            is_valid_locale(locale),
            "locale",
            "invalid_locale",
            format!("\"{locale}\" is not a valid locale."),
        );
        violations.into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let layout = require_draft_layout(&mut tx, id).await?;
        let locales = LayoutRepo::locales(&mut tx, id, Status::Draft).await?;
        if locales.iter().any(|l| l == locale) {
            return Err(CoreError::bad_state(
                "locale",
                "Layout already has the provided locale.",
            )
            .into());
        }
        if !locales.iter().any(|l| l == source_locale) {
            return Err(CoreError::bad_state(
                "source_locale",
                "Layout does not have the provided source locale.",
            )
            .into());
        }

        LayoutRepo::add_locale(&mut tx, id, Status::Draft, locale).await?;
        let blocks = BlockRepo::list_translatable(&mut tx, id, Status::Draft).await?;
        for block in &blocks {
            let translations = BlockRepo::translations(&mut tx, block.id, Status::Draft).await?;
            let parameters = translations
                .into_iter()
                .find(|t| t.locale == source_locale)
                .map(|t| t.parameters)
                .unwrap_or_else(|| json!({}));
            BlockRepo::create_translation(
                &mut tx,
                &BlockTranslation {
                    block_id: block.id,
                    status: Status::Draft.id(),
                    locale: locale.to_string(),
                    parameters,
                },
            )
            .await?;
        }
        LayoutRepo::touch(&mut tx, id, Status::Draft, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(
            layout_id = id,
            locale,
            source_locale,
            blocks = blocks.len(),
            "Layout translation added"
        );
        Ok(layout)
    }

    /// Remove `locale` from a layout draft and from all of its blocks.
    pub async fn remove_translation(&self, id: DbId, locale: &str) -> EngineResult<Layout> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let layout = require_draft_layout(&mut tx, id).await?;
        if layout.main_locale == locale {
            return Err(CoreError::bad_state(
                "locale",
                "Main translation cannot be removed from the layout.",
            )
            .into());
        }
        if !LayoutRepo::remove_locale(&mut tx, id, Status::Draft, locale).await? {
            return Err(CoreError::bad_state(
                "locale",
                "Layout does not have the provided locale.",
            )
            .into());
        }
        let removed = BlockRepo::delete_layout_locale(&mut tx, id, Status::Draft, locale).await?;
        LayoutRepo::touch(&mut tx, id, Status::Draft, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(
            layout_id = id,
            locale,
            translations = removed,
            "Layout translation removed"
        );
        Ok(layout)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create a draft from the published layout.
    pub async fn create_draft(&self, id: DbId, discard_existing: bool) -> EngineResult<Layout> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = LAYOUT_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Layout", id).into());
        }
        let steps = plan_create_draft("layout", present, discard_existing)?;
        LAYOUT_TREE.run(&mut tx, id, &steps).await?;
        LayoutRepo::touch(&mut tx, id, Status::Draft, Utc::now()).await?;
        let draft = require_layout(&mut tx, id, Status::Draft).await?;
        tx.commit().await?;

        tracing::info!(layout_id = id, discard_existing, "Layout draft created");
        Ok(draft)
    }

    pub async fn discard_draft(&self, id: DbId) -> EngineResult<()> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = LAYOUT_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Layout", id).into());
        }
        let steps = plan_discard_draft("layout", present)?;
        LAYOUT_TREE.run(&mut tx, id, &steps).await?;
        tx.commit().await?;

        tracing::info!(layout_id = id, "Layout draft discarded");
        Ok(())
    }

    /// Publish the draft. The previous published copy becomes the archive
    /// with a blank name; an older archive is dropped.
    pub async fn publish_layout(&self, id: DbId) -> EngineResult<Layout> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = LAYOUT_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Layout", id).into());
        }
        let steps = plan_publish("layout", present, true)?;
        let after = LAYOUT_TREE.run(&mut tx, id, &steps).await?;
        LayoutRepo::touch(&mut tx, id, Status::Published, Utc::now()).await?;
        let published = require_layout(&mut tx, id, Status::Published).await?;
        tx.commit().await?;

        tracing::info!(
            layout_id = id,
            archived = after.archived,
            "Layout published"
        );
        Ok(published)
    }

    /// Replace the draft with a copy of the archived layout.
    ///
    /// Archived names are blank, so the restored draft takes the name of
    /// the current draft or, failing that, of the published copy.
    pub async fn restore_from_archive(&self, id: DbId) -> EngineResult<Layout> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = LAYOUT_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Layout", id).into());
        }
        let steps = plan_restore_from_archive("layout", present)?;

        let mut name = String::new();
        for status in [Status::Draft, Status::Published] {
            if let Some(layout) = LayoutRepo::find(&mut tx, id, status).await? {
                name = layout.name;
                break;
            }
        }

        LAYOUT_TREE.run(&mut tx, id, &steps).await?;
        LayoutRepo::set_name(&mut tx, id, Status::Draft, &name).await?;
        LayoutRepo::touch(&mut tx, id, Status::Draft, Utc::now()).await?;
        let draft = require_layout(&mut tx, id, Status::Draft).await?;
        tx.commit().await?;

        tracing::info!(layout_id = id, "Layout restored from archive");
        Ok(draft)
    }

    /// Delete every status copy of a layout. Zones linked to it are unlinked.
    pub async fn delete_layout(&self, id: DbId) -> EngineResult<()> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = LAYOUT_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Layout", id).into());
        }
        LAYOUT_TREE.run(&mut tx, id, &plan_delete(present)).await?;
        let unlinked = ZoneRepo::unlink_all_to(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(layout_id = id, unlinked_zones = unlinked, "Layout deleted");
        Ok(())
    }
}

