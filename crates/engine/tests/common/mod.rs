#![allow(dead_code)]

use std::sync::Arc;

use layouts_core::block_definition::BlockDefinition;
use layouts_core::cms::{CmsItem, StaticItemLoader};
use layouts_core::layout_type::LayoutType;
use layouts_core::query_type::QueryType;
use layouts_db::models::block::{Block, CreateBlock};
use layouts_db::models::layout::{CreateLayout, Layout};
use layouts_engine::{Engine, Registries};
use serde_json::json;
use sqlx::SqlitePool;

/// Layout type with two free zones and a header that only takes titles.
pub fn two_columns() -> LayoutType {
    LayoutType::new("two_columns", "Two columns")
        .with_restricted_zone("header", "Header", &["title"])
        .with_zone("left", "Left")
        .with_zone("right", "Right")
}

pub fn title_definition() -> BlockDefinition {
    BlockDefinition::new("title", "Title")
        .with_view_type("title", &["standard"])
        .with_parameter("title", json!(""))
        .with_parameter("tag", json!("h1"))
        .translatable()
}

pub fn list_definition() -> BlockDefinition {
    BlockDefinition::new("list", "List")
        .with_view_type("list", &["standard", "overlay"])
        .with_view_type("grid", &["standard"])
        .with_parameter("columns", json!(2))
        .with_collection("default")
}

pub fn columns_definition() -> BlockDefinition {
    BlockDefinition::new("two_columns", "Two columns")
        .with_view_type("two_columns", &["standard"])
        .with_placeholder("left")
        .with_placeholder("right")
}

pub fn article(value: &str) -> CmsItem {
    CmsItem {
        value_type: "article".to_string(),
        value: value.to_string(),
        name: format!("Article {value}"),
        visible: true,
    }
}

/// Registries shared by the engine tests.
pub fn test_registries() -> Registries {
    let items = StaticItemLoader::new()
        .with_item(article("42"))
        .with_item(article("43"));

    Registries::new(Arc::new(items))
        .with_layout_type(two_columns())
        .with_block_definition(title_definition())
        .with_block_definition(list_definition())
        .with_block_definition(columns_definition())
        .with_query_type(
            QueryType::new("latest", "Latest content")
                .with_parameter("limit", json!(10))
                .with_parameter("parent", json!(null)),
        )
}

/// Build an engine over the test pool with the test registries.
pub fn test_engine(pool: SqlitePool) -> Engine {
    Engine::new(pool, test_registries())
}

/// Create a draft `two_columns` layout.
pub async fn layout_draft(engine: &Engine, name: &str) -> Layout {
    engine
        .layouts()
        .create_layout(&CreateLayout::new("two_columns", name))
        .await
        .unwrap()
}

/// Create and publish a `two_columns` layout.
pub async fn published_layout(engine: &Engine, name: &str) -> Layout {
    let draft = layout_draft(engine, name).await;
    engine.layouts().publish_layout(draft.id).await.unwrap()
}

pub fn title_block() -> CreateBlock {
    CreateBlock::new("title", "title", "standard")
}

pub fn list_block() -> CreateBlock {
    CreateBlock::new("list", "list", "standard")
}

pub fn columns_block() -> CreateBlock {
    CreateBlock::new("two_columns", "two_columns", "standard")
}

/// Names of blocks in order, for position assertions.
pub fn names(blocks: &[Block]) -> Vec<&str> {
    blocks.iter().map(|block| block.name.as_str()).collect()
}

/// A create DTO with a name, so order can be asserted by name.
pub fn named(mut input: CreateBlock, name: &str) -> CreateBlock {
    input.name = name.to_string();
    input
}
