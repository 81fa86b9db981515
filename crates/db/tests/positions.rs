//! Integration tests for the SQL position store.
//!
//! Exercises `SqlitePositions` against a real database:
//! - Appending and inserting keep positions dense
//! - Moving down and up renumbers only the affected range
//! - Removing closes the gap
//! - Manual and override items keep independent sequences

use layouts_core::position::{create_position, move_to_position, remove_position, PositionScope};
use layouts_core::status::{ItemType, ItemVisibility, Status};
use layouts_db::models::collection::CollectionItem;
use layouts_db::repositories::{CollectionRepo, SqlitePositions};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const COLLECTION_ID: i64 = 1;

fn scope(item_type: ItemType) -> PositionScope {
    PositionScope::new("collection_items")
        .filter("collection_id", COLLECTION_ID)
        .filter("item_type", item_type.id())
        .filter("status", Status::Draft.id())
}

async fn insert_item(
    conn: &mut SqliteConnection,
    item_type: ItemType,
    value: &str,
    position: Option<i64>,
) -> i64 {
    let position = create_position(
        &mut SqlitePositions::new(&mut *conn),
        &scope(item_type),
        position,
        None,
        false,
    )
    .await
    .unwrap();

    let id = CollectionRepo::next_item_id(&mut *conn).await.unwrap();
    CollectionRepo::create_item(
        &mut *conn,
        &CollectionItem {
            id,
            status: Status::Draft.id(),
            uuid: Uuid::new_v4(),
            collection_id: COLLECTION_ID,
            position,
            item_type: item_type.id(),
            value: Some(value.to_string()),
            value_type: "article".to_string(),
            visibility: ItemVisibility::Visible.id(),
            visible_from: None,
            visible_to: None,
            config: json!({}),
        },
    )
    .await
    .unwrap();
    id
}

/// `(value, position)` of the manual items, ordered by position.
async fn manual_positions(conn: &mut SqliteConnection) -> Vec<(String, i64)> {
    CollectionRepo::list_items(conn, COLLECTION_ID, Status::Draft)
        .await
        .unwrap()
        .into_iter()
        .filter(|item| item.item_type == ItemType::Manual.id())
        .map(|item| (item.value.unwrap_or_default(), item.position))
        .collect()
}

async fn move_item(conn: &mut SqliteConnection, id: i64, new_position: i64) {
    let item = CollectionRepo::find_item(&mut *conn, id, Status::Draft)
        .await
        .unwrap()
        .unwrap();
    let position = move_to_position(
        &mut SqlitePositions::new(&mut *conn),
        &scope(ItemType::Manual),
        item.position,
        new_position,
        false,
    )
    .await
    .unwrap();
    CollectionRepo::set_item_position(&mut *conn, id, Status::Draft, position)
        .await
        .unwrap();
}

fn pairs(expected: &[(&str, i64)]) -> Vec<(String, i64)> {
    expected
        .iter()
        .map(|(value, position)| (value.to_string(), *position))
        .collect()
}

// ---------------------------------------------------------------------------
// Test: insert at a position shifts the tail
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_insert_shifts_following_items(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    insert_item(&mut conn, ItemType::Manual, "a", None).await;
    insert_item(&mut conn, ItemType::Manual, "b", None).await;
    insert_item(&mut conn, ItemType::Manual, "c", Some(1)).await;

    assert_eq!(
        manual_positions(&mut conn).await,
        pairs(&[("a", 0), ("c", 1), ("b", 2)])
    );
}

// ---------------------------------------------------------------------------
// Test: moving the last item to the front
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_move_last_item_to_front(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    let first = insert_item(&mut conn, ItemType::Manual, "a", None).await;
    let second = insert_item(&mut conn, ItemType::Manual, "b", None).await;
    let third = insert_item(&mut conn, ItemType::Manual, "c", None).await;

    move_item(&mut conn, third, 0).await;

    let mut positions = Vec::new();
    for id in [first, second, third] {
        let item = CollectionRepo::find_item(&mut conn, id, Status::Draft)
            .await
            .unwrap()
            .unwrap();
        positions.push(item.position);
    }
    assert_eq!(positions, vec![1, 2, 0]);
}

// ---------------------------------------------------------------------------
// Test: moving down, no-op move, out-of-range move
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_move_down_and_boundaries(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    let first = insert_item(&mut conn, ItemType::Manual, "a", None).await;
    insert_item(&mut conn, ItemType::Manual, "b", None).await;
    insert_item(&mut conn, ItemType::Manual, "c", None).await;

    move_item(&mut conn, first, 2).await;
    assert_eq!(
        manual_positions(&mut conn).await,
        pairs(&[("b", 0), ("c", 1), ("a", 2)])
    );

    move_item(&mut conn, first, 2).await;
    assert_eq!(
        manual_positions(&mut conn).await,
        pairs(&[("b", 0), ("c", 1), ("a", 2)])
    );

    let result = move_to_position(
        &mut SqlitePositions::new(&mut conn),
        &scope(ItemType::Manual),
        2,
        3,
        false,
    )
    .await;
    assert!(result.is_err(), "moving past the end must fail");
}

// ---------------------------------------------------------------------------
// Test: removing closes the gap
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_remove_closes_gap(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    insert_item(&mut conn, ItemType::Manual, "a", None).await;
    let second = insert_item(&mut conn, ItemType::Manual, "b", None).await;
    insert_item(&mut conn, ItemType::Manual, "c", None).await;

    CollectionRepo::delete_item(&mut conn, second, Status::Draft)
        .await
        .unwrap();
    remove_position(&mut SqlitePositions::new(&mut conn), &scope(ItemType::Manual), 1)
        .await
        .unwrap();

    assert_eq!(manual_positions(&mut conn).await, pairs(&[("a", 0), ("c", 1)]));
}

// ---------------------------------------------------------------------------
// Test: item types are separate scopes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_item_types_have_independent_sequences(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    insert_item(&mut conn, ItemType::Manual, "a", None).await;
    insert_item(&mut conn, ItemType::Manual, "b", None).await;
    insert_item(&mut conn, ItemType::Override, "x", Some(0)).await;

    assert_eq!(manual_positions(&mut conn).await, pairs(&[("a", 0), ("b", 1)]));

    let next = layouts_core::position::PositionStore::next_position(
        &mut SqlitePositions::new(&mut conn),
        &scope(ItemType::Override),
    )
    .await
    .unwrap();
    assert_eq!(next, 1);
}
