//! Integration tests for the resolver's rule queries.
//!
//! Exercises `RuleRepo::match_rules` and `RuleRepo::conditions_for_rules`:
//! - Only published, enabled rules are returned
//! - Order is priority descending, then id
//! - Prefix targets match stored prefixes of the requested value
//! - Conditions come back in declaration order

use layouts_core::status::Status;
use layouts_db::models::rule::{Rule, RuleCondition, RuleTarget};
use layouts_db::repositories::RuleRepo;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_rule(
    conn: &mut SqliteConnection,
    status: Status,
    enabled: bool,
    priority: i64,
    target_type: &str,
    values: &[&str],
) -> i64 {
    let id = RuleRepo::next_id(&mut *conn).await.unwrap();
    RuleRepo::create(
        &mut *conn,
        &Rule {
            id,
            status: status.id(),
            uuid: Uuid::new_v4(),
            layout_id: Some(id * 100),
            comment: String::new(),
            enabled,
            priority,
        },
    )
    .await
    .unwrap();
    RuleRepo::create_data(&mut *conn, id, enabled, priority)
        .await
        .unwrap();

    for value in values {
        let target_id = RuleRepo::next_target_id(&mut *conn).await.unwrap();
        RuleRepo::create_target(
            &mut *conn,
            &RuleTarget {
                id: target_id,
                status: status.id(),
                uuid: Uuid::new_v4(),
                rule_id: id,
                target_type: target_type.to_string(),
                value: value.to_string(),
            },
        )
        .await
        .unwrap();
    }
    id
}

async fn add_condition(conn: &mut SqliteConnection, rule_id: i64, kind: &str, marker: i64) -> i64 {
    let id = RuleRepo::next_condition_id(&mut *conn).await.unwrap();
    RuleRepo::create_condition(
        &mut *conn,
        &RuleCondition {
            id,
            status: Status::Published.id(),
            uuid: Uuid::new_v4(),
            rule_id,
            condition_type: kind.to_string(),
            value: json!({ "marker": marker }),
        },
    )
    .await
    .unwrap();
    id
}

fn values(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Test: status, enabled flag and ordering
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_match_rules_filters_and_orders(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    let low = seed_rule(&mut conn, Status::Published, true, 5, "route", &["home"]).await;
    let high = seed_rule(&mut conn, Status::Published, true, 10, "route", &["home", "news"]).await;
    let tie = seed_rule(&mut conn, Status::Published, true, 5, "route", &["home"]).await;
    seed_rule(&mut conn, Status::Published, false, 50, "route", &["home"]).await;
    seed_rule(&mut conn, Status::Draft, true, 50, "route", &["home"]).await;
    seed_rule(&mut conn, Status::Published, true, 50, "path_info", &["home"]).await;

    let rules = RuleRepo::match_rules(&mut conn, "route", &values(&["home"]), false)
        .await
        .unwrap();
    let ids: Vec<i64> = rules.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![high, low, tie]);
}

// ---------------------------------------------------------------------------
// Test: any requested value may match, each rule appears once
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_match_rules_any_value_once(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    let id = seed_rule(&mut conn, Status::Published, true, 0, "route", &["home", "news"]).await;

    let rules = RuleRepo::match_rules(&mut conn, "route", &values(&["news", "home"]), false)
        .await
        .unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, id);

    let none = RuleRepo::match_rules(&mut conn, "route", &values(&["contact"]), false)
        .await
        .unwrap();
    assert!(none.is_empty());
}

// ---------------------------------------------------------------------------
// Test: prefix matching
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_match_rules_prefix(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    let blog = seed_rule(
        &mut conn,
        Status::Published,
        true,
        0,
        "path_info_prefix",
        &["/blog/"],
    )
    .await;
    seed_rule(&mut conn, Status::Published, true, 0, "path_info_prefix", &["/shop/"]).await;

    let rules = RuleRepo::match_rules(
        &mut conn,
        "path_info_prefix",
        &values(&["/blog/2026/hello"]),
        true,
    )
    .await
    .unwrap();
    let ids: Vec<i64> = rules.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![blog]);

    let exact = RuleRepo::match_rules(
        &mut conn,
        "path_info_prefix",
        &values(&["/blog/2026/hello"]),
        false,
    )
    .await
    .unwrap();
    assert!(exact.is_empty());
}

// ---------------------------------------------------------------------------
// Test: conditions in declaration order
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_conditions_in_declaration_order(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    let first = seed_rule(&mut conn, Status::Published, true, 0, "route", &["home"]).await;
    let second = seed_rule(&mut conn, Status::Published, true, 0, "route", &["home"]).await;
    let a = add_condition(&mut conn, second, "route_parameter", 1).await;
    let b = add_condition(&mut conn, first, "query_parameter", 2).await;
    let c = add_condition(&mut conn, second, "exception", 3).await;

    let conditions = RuleRepo::conditions_for_rules(&mut conn, &[first, second], Status::Published)
        .await
        .unwrap();
    let order: Vec<(i64, i64)> = conditions.iter().map(|c| (c.rule_id, c.id)).collect();
    assert_eq!(order, vec![(first, b), (second, a), (second, c)]);
    assert_eq!(conditions[1].value, json!({ "marker": 1 }));
}
