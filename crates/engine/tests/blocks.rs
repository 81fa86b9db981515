//! Integration tests for `BlockService`.
//!
//! Exercises blocks against a real database:
//! - Positions stay dense on create, move, copy and delete
//! - Zone allow-lists and container placement rules
//! - Block definition validation of create and update input
//! - Per-locale parameters, restore from published, translation toggling

mod common;

use assert_matches::assert_matches;
use common::{
    columns_block, layout_draft, list_block, named, names, published_layout, test_engine,
    title_block,
};
use layouts_core::error::CoreError;
use layouts_core::status::{CollectionType, Status};
use layouts_db::models::block::{Block, UpdateBlock};
use layouts_db::models::collection::{CreateCollection, CreateQuery};
use layouts_engine::{Engine, EngineError};
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn bad_state_argument(err: &EngineError) -> Option<&str> {
    err.as_core().and_then(CoreError::argument)
}

/// Create title blocks named `block_names` at the end of `zone`.
async fn fill_zone(
    engine: &Engine,
    layout_id: i64,
    zone: &str,
    block_names: &[&str],
) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(block_names.len());
    for name in block_names {
        let block = engine
            .blocks()
            .create_block_in_zone(&named(title_block(), name), layout_id, zone, None)
            .await
            .unwrap();
        blocks.push(block);
    }
    blocks
}

async fn zone_names(engine: &Engine, layout_id: i64, zone: &str) -> Vec<String> {
    let blocks = engine
        .blocks()
        .load_zone_blocks(layout_id, Status::Draft, zone)
        .await
        .unwrap();
    names(&blocks).into_iter().map(str::to_string).collect()
}

async fn zone_positions(engine: &Engine, layout_id: i64, zone: &str) -> Vec<i64> {
    engine
        .blocks()
        .load_zone_blocks(layout_id, Status::Draft, zone)
        .await
        .unwrap()
        .iter()
        .map(|block| block.position)
        .collect()
}

// ---------------------------------------------------------------------------
// Test: creating blocks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_create_block_in_zone_keeps_positions_dense(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    fill_zone(&engine, layout.id, "left", &["a", "b"]).await;

    let c = engine
        .blocks()
        .create_block_in_zone(&named(title_block(), "c"), layout.id, "left", Some(1))
        .await
        .unwrap();
    assert_eq!(c.position, 1);
    assert_eq!(c.depth, 1);
    assert_eq!(c.placeholder.as_deref(), Some("root"));

    assert_eq!(zone_names(&engine, layout.id, "left").await, vec!["a", "c", "b"]);
    assert_eq!(zone_positions(&engine, layout.id, "left").await, vec![0, 1, 2]);

    let err = engine
        .blocks()
        .create_block_in_zone(&title_block(), layout.id, "left", Some(5))
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("position"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_create_block_fills_defaults(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;

    let mut input = title_block();
    input.parameters = params(json!({ "title": "Welcome" }));
    let block = engine
        .blocks()
        .create_block_in_zone(&input, layout.id, "header", None)
        .await
        .unwrap();
    assert!(block.translatable);
    assert_eq!(block.main_locale, "en");

    let translations = engine
        .blocks()
        .load_block_translations(block.id, Status::Draft)
        .await
        .unwrap();
    assert_eq!(translations.len(), 1);
    assert_eq!(
        translations[0].parameters,
        json!({ "title": "Welcome", "tag": "h1" })
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_create_block_with_dynamic_collection(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;

    let mut input = list_block();
    input.collections.push(CreateCollection {
        identifier: "default".to_string(),
        offset: 0,
        limit: Some(5),
        query: Some(CreateQuery {
            query_type: "latest".to_string(),
            parameters: params(json!({ "limit": 3 })),
        }),
    });
    let block = engine
        .blocks()
        .create_block_in_zone(&input, layout.id, "left", None)
        .await
        .unwrap();

    let collections = engine
        .collections()
        .load_block_collections(block.id, Status::Draft)
        .await
        .unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].collection_type().unwrap(), CollectionType::Dynamic);
    assert_eq!(collections[0].length, Some(5));

    let query = engine
        .collections()
        .load_collection_query(collections[0].id, Status::Draft)
        .await
        .unwrap()
        .expect("dynamic collection has a query");
    assert_eq!(query.parameters, json!({ "limit": 3, "parent": null }));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_create_block_reports_definition_violations(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;

    let mut input = list_block();
    input.view_type = "grid".to_string();
    input.item_view_type = "overlay".to_string();
    input.parameters = params(json!({ "rows": 3 }));
    input.collections.push(CreateCollection {
        identifier: "featured".to_string(),
        offset: 0,
        limit: None,
        query: None,
    });

    let err = engine
        .blocks()
        .create_block_in_zone(&input, layout.id, "left", None)
        .await
        .unwrap_err();
    let EngineError::Core(CoreError::ValidationFailed(errors)) = err else {
        panic!("expected validation failure, got {err:?}");
    };
    let fields = errors.field_errors();
    assert!(fields.contains_key("item_view_type"));
    assert!(fields.contains_key("parameters"));
    assert!(fields.contains_key("collections"));
    assert!(!fields.contains_key("view_type"));

    let mut unknown = columns_block();
    unknown.definition_identifier = "gallery".to_string();
    assert_matches!(
        engine
            .blocks()
            .create_block_in_zone(&unknown, layout.id, "left", None)
            .await,
        Err(EngineError::Core(CoreError::ValidationFailed(_)))
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_zone_allow_list(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;

    let err = engine
        .blocks()
        .create_block_in_zone(&list_block(), layout.id, "header", None)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("zone"));

    let err = engine
        .blocks()
        .create_block_in_zone(&title_block(), layout.id, "footer", None)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("zone"));

    let list = engine
        .blocks()
        .create_block_in_zone(&list_block(), layout.id, "left", None)
        .await
        .unwrap();
    let err = engine
        .blocks()
        .move_block_to_zone(list.id, "header", 0)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("zone"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_container_placement(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let blocks = engine.blocks();
    let columns = blocks
        .create_block_in_zone(&columns_block(), layout.id, "left", None)
        .await
        .unwrap();

    let child = blocks
        .create_block(&title_block(), columns.id, "right", None)
        .await
        .unwrap();
    assert_eq!(child.parent_id, Some(columns.id));
    assert_eq!(child.depth, 2);
    assert_eq!(child.path, format!("{}{}/", columns.path, child.id));

    let err = blocks
        .create_block(&columns_block(), columns.id, "left", None)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("block"));

    let err = blocks
        .create_block(&title_block(), columns.id, "middle", None)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("placeholder"));

    let err = blocks
        .create_block(&title_block(), child.id, "left", None)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("target_block"));

    let in_right = blocks
        .load_placeholder_blocks(columns.id, Status::Draft, "right")
        .await
        .unwrap();
    assert_eq!(in_right.iter().map(|b| b.id).collect::<Vec<_>>(), vec![child.id]);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_blocks_only_change_in_drafts(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let block = fill_zone(&engine, layout.id, "left", &["a"]).await.remove(0);
    engine.layouts().publish_layout(layout.id).await.unwrap();

    let err = engine
        .blocks()
        .update_block(block.id, &UpdateBlock::default())
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("block"));

    assert_matches!(
        engine.blocks().delete_block(9999).await,
        Err(EngineError::Core(CoreError::NotFound { entity: "Block", .. }))
    );

    let err = engine
        .blocks()
        .create_block_in_zone(&title_block(), layout.id, "left", None)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("layout"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_zone_root_blocks_are_fixed(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let zone = engine
        .layouts()
        .load_zone(layout.id, Status::Draft, "left")
        .await
        .unwrap();

    let err = engine.blocks().delete_block(zone.root_block_id).await.unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("block"));

    let err = engine
        .blocks()
        .update_block(zone.root_block_id, &UpdateBlock::default())
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("block"));

    let err = engine
        .blocks()
        .copy_block_to_zone(zone.root_block_id, "right", None)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("block"));
}

// ---------------------------------------------------------------------------
// Test: moving and copying
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_move_block_within_zone(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let blocks = fill_zone(&engine, layout.id, "left", &["a", "b", "c"]).await;

    let moved = engine
        .blocks()
        .move_block_to_zone(blocks[0].id, "left", 2)
        .await
        .unwrap();
    assert_eq!(moved.position, 2);
    assert_eq!(zone_names(&engine, layout.id, "left").await, vec!["b", "c", "a"]);

    engine
        .blocks()
        .move_block_to_zone(blocks[0].id, "left", 0)
        .await
        .unwrap();
    assert_eq!(zone_names(&engine, layout.id, "left").await, vec!["a", "b", "c"]);
    assert_eq!(zone_positions(&engine, layout.id, "left").await, vec![0, 1, 2]);

    let err = engine
        .blocks()
        .move_block_to_zone(blocks[0].id, "left", 3)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("position"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_move_block_between_zones_closes_gap(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let left = fill_zone(&engine, layout.id, "left", &["a", "b", "c"]).await;
    fill_zone(&engine, layout.id, "right", &["x"]).await;

    let moved = engine
        .blocks()
        .move_block_to_zone(left[1].id, "right", 0)
        .await
        .unwrap();
    assert_eq!(moved.position, 0);

    assert_eq!(zone_names(&engine, layout.id, "left").await, vec!["a", "c"]);
    assert_eq!(zone_positions(&engine, layout.id, "left").await, vec![0, 1]);
    assert_eq!(zone_names(&engine, layout.id, "right").await, vec!["b", "x"]);
    assert_eq!(zone_positions(&engine, layout.id, "right").await, vec![0, 1]);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_move_block_into_container(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let columns = engine
        .blocks()
        .create_block_in_zone(&columns_block(), layout.id, "left", None)
        .await
        .unwrap();
    let title = fill_zone(&engine, layout.id, "left", &["a"]).await.remove(0);

    let moved = engine
        .blocks()
        .move_block(title.id, columns.id, "left", 0)
        .await
        .unwrap();
    assert_eq!(moved.parent_id, Some(columns.id));
    assert_eq!(moved.depth, 2);
    assert_eq!(moved.path, format!("{}{}/", columns.path, title.id));

    let zone = engine
        .blocks()
        .load_zone_blocks(layout.id, Status::Draft, "left")
        .await
        .unwrap();
    assert_eq!(zone.iter().map(|b| b.id).collect::<Vec<_>>(), vec![columns.id]);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_move_block_across_layouts_is_rejected(pool: SqlitePool) {
    let engine = test_engine(pool);
    let first = layout_draft(&engine, "First").await;
    let second = layout_draft(&engine, "Second").await;
    let title = fill_zone(&engine, first.id, "left", &["a"]).await.remove(0);
    let columns = engine
        .blocks()
        .create_block_in_zone(&columns_block(), second.id, "left", None)
        .await
        .unwrap();

    let err = engine
        .blocks()
        .move_block(title.id, columns.id, "left", 0)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("target_block"));

    let err = engine
        .blocks()
        .copy_block(title.id, columns.id, "left", None)
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("target_block"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_copy_block_copies_subtree(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let blocks = engine.blocks();
    let columns = blocks
        .create_block_in_zone(&named(columns_block(), "columns"), layout.id, "left", None)
        .await
        .unwrap();
    let child = blocks
        .create_block(&named(title_block(), "child"), columns.id, "left", None)
        .await
        .unwrap();
    fill_zone(&engine, layout.id, "right", &["x"]).await;

    let copy = blocks
        .copy_block_to_zone(columns.id, "right", Some(0))
        .await
        .unwrap();
    assert_ne!(copy.id, columns.id);
    assert_eq!(copy.position, 0);
    assert_eq!(zone_names(&engine, layout.id, "right").await, vec!["columns", "x"]);

    let copied_children = blocks
        .load_placeholder_blocks(copy.id, Status::Draft, "left")
        .await
        .unwrap();
    assert_eq!(copied_children.len(), 1);
    assert_ne!(copied_children[0].id, child.id);
    assert_eq!(copied_children[0].name, "child");
    assert_eq!(copied_children[0].parent_id, Some(copy.id));

    let original_children = blocks
        .load_placeholder_blocks(columns.id, Status::Draft, "left")
        .await
        .unwrap();
    assert_eq!(original_children.iter().map(|b| b.id).collect::<Vec<_>>(), vec![child.id]);
}

// ---------------------------------------------------------------------------
// Test: updating, restoring and translations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_update_block_keeps_untouched_fields(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let block = fill_zone(&engine, layout.id, "left", &["a"]).await.remove(0);
    let blocks = engine.blocks();
    let before = blocks.load_block_draft(block.id).await.unwrap();
    let translations = blocks
        .load_block_translations(block.id, Status::Draft)
        .await
        .unwrap();

    let input = UpdateBlock {
        locale: Some(before.main_locale.clone()),
        view_type: Some(before.view_type.clone()),
        item_view_type: Some(before.item_view_type.clone()),
        name: Some("Renamed".to_string()),
        always_available: Some(before.always_available),
        parameters: translations[0].parameters.as_object().cloned(),
        config: before.config.as_object().cloned(),
    };
    blocks.update_block(block.id, &input).await.unwrap();

    let after = blocks.load_block_draft(block.id).await.unwrap();
    assert_eq!(
        after,
        Block {
            name: "Renamed".to_string(),
            ..before
        }
    );
    assert_eq!(
        blocks
            .load_block_translations(block.id, Status::Draft)
            .await
            .unwrap(),
        translations
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_update_block_writes_requested_locale(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    engine.layouts().add_translation(layout.id, "hr_HR", "en").await.unwrap();
    let title = fill_zone(&engine, layout.id, "left", &["a"]).await.remove(0);
    let list = engine
        .blocks()
        .create_block_in_zone(&list_block(), layout.id, "left", None)
        .await
        .unwrap();

    engine
        .blocks()
        .update_block(
            title.id,
            &UpdateBlock {
                locale: Some("hr_HR".to_string()),
                parameters: Some(params(json!({ "title": "Dobrodošli" }))),
                ..UpdateBlock::default()
            },
        )
        .await
        .unwrap();
    let translations = engine
        .blocks()
        .load_block_translations(title.id, Status::Draft)
        .await
        .unwrap();
    for translation in &translations {
        let expected = if translation.locale == "hr_HR" { "Dobrodošli" } else { "" };
        assert_eq!(translation.parameters["title"], json!(expected));
    }

    let updated = engine
        .blocks()
        .update_block(
            list.id,
            &UpdateBlock {
                view_type: Some("grid".to_string()),
                parameters: Some(params(json!({ "columns": 4 }))),
                ..UpdateBlock::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.view_type, "grid");
    let translations = engine
        .blocks()
        .load_block_translations(list.id, Status::Draft)
        .await
        .unwrap();
    assert_eq!(translations.len(), 1);
    assert_eq!(translations[0].parameters["columns"], json!(4));

    assert_matches!(
        engine
            .blocks()
            .update_block(
                list.id,
                &UpdateBlock {
                    item_view_type: Some("overlay".to_string()),
                    ..UpdateBlock::default()
                },
            )
            .await,
        Err(EngineError::Core(CoreError::ValidationFailed(_)))
    );

    let err = engine
        .blocks()
        .update_block(
            title.id,
            &UpdateBlock {
                locale: Some("de".to_string()),
                parameters: Some(params(json!({ "title": "Willkommen" }))),
                ..UpdateBlock::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("locale"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_restore_block_from_published(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let mut input = named(title_block(), "Title");
    input.parameters = params(json!({ "title": "Original" }));
    let block = engine
        .blocks()
        .create_block_in_zone(&input, layout.id, "left", None)
        .await
        .unwrap();

    let err = engine.blocks().restore_block(block.id).await.unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("block"));

    engine.layouts().publish_layout(layout.id).await.unwrap();
    engine.layouts().create_draft(layout.id, false).await.unwrap();
    engine
        .blocks()
        .update_block(
            block.id,
            &UpdateBlock {
                name: Some("Renamed".to_string()),
                parameters: Some(params(json!({ "title": "Changed" }))),
                ..UpdateBlock::default()
            },
        )
        .await
        .unwrap();

    let restored = engine.blocks().restore_block(block.id).await.unwrap();
    assert_eq!(restored.name, "Title");
    let translations = engine
        .blocks()
        .load_block_translations(block.id, Status::Draft)
        .await
        .unwrap();
    assert_eq!(translations.len(), 1);
    assert_eq!(translations[0].parameters["title"], json!("Original"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_toggle_translations(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    engine.layouts().add_translation(layout.id, "hr_HR", "en").await.unwrap();
    let list = engine
        .blocks()
        .create_block_in_zone(&list_block(), layout.id, "left", None)
        .await
        .unwrap();
    assert!(!list.translatable);

    let err = engine.blocks().disable_translations(list.id).await.unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("block"));

    let enabled = engine.blocks().enable_translations(list.id).await.unwrap();
    assert!(enabled.translatable);
    let locales: Vec<String> = engine
        .blocks()
        .load_block_translations(list.id, Status::Draft)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.locale)
        .collect();
    assert_eq!(locales.len(), 2);
    assert!(locales.contains(&"hr_HR".to_string()));

    let err = engine.blocks().enable_translations(list.id).await.unwrap_err();
    assert_eq!(bad_state_argument(&err), Some("block"));

    engine.blocks().disable_translations(list.id).await.unwrap();
    let translations = engine
        .blocks()
        .load_block_translations(list.id, Status::Draft)
        .await
        .unwrap();
    assert_eq!(translations.len(), 1);
    assert_eq!(translations[0].locale, "en");
}

// ---------------------------------------------------------------------------
// Test: deleting
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_delete_block_closes_gap(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let blocks = fill_zone(&engine, layout.id, "left", &["a", "b", "c"]).await;

    engine.blocks().delete_block(blocks[0].id).await.unwrap();

    assert_eq!(zone_names(&engine, layout.id, "left").await, vec!["b", "c"]);
    assert_eq!(zone_positions(&engine, layout.id, "left").await, vec![0, 1]);
    assert_matches!(
        engine.blocks().load_block_draft(blocks[0].id).await,
        Err(EngineError::Core(CoreError::NotFound { .. }))
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_delete_container_removes_children(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = layout_draft(&engine, "Homepage").await;
    let columns = engine
        .blocks()
        .create_block_in_zone(&columns_block(), layout.id, "left", None)
        .await
        .unwrap();
    let child = engine
        .blocks()
        .create_block(&title_block(), columns.id, "left", None)
        .await
        .unwrap();

    engine.blocks().delete_block(columns.id).await.unwrap();

    assert_matches!(
        engine.blocks().load_block_draft(child.id).await,
        Err(EngineError::Core(CoreError::NotFound { .. }))
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_published_blocks_load(pool: SqlitePool) {
    let engine = test_engine(pool);
    let layout = published_layout(&engine, "Homepage").await;
    let zones = engine.layouts().load_zones(layout.id, Status::Published).await.unwrap();
    let root = zones[0].root_block_id;

    let block = engine.blocks().load_block(root).await.unwrap();
    assert!(block.is_zone_root());
    assert_matches!(
        engine.blocks().load_block_draft(root).await,
        Err(EngineError::Core(CoreError::NotFound { .. }))
    );
}
