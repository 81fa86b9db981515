//! Repository for the `rules`, `rule_data`, `rule_targets` and
//! `rule_conditions` tables, including the resolver's matching query.

use layouts_core::status::{Status, StatusId};
use layouts_core::types::DbId;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqliteConnection;

use crate::models::rule::{Rule, RuleCondition, RuleTarget, UpdateRule};

/// Rule columns, joined with `rule_data d`.
const RULE_COLUMNS: &str = "r.id, r.status, r.uuid, r.layout_id, r.comment, d.enabled, d.priority";

const TARGET_COLUMNS: &str = "id, status, uuid, rule_id, target_type, value";

const CONDITION_COLUMNS: &str = "id, status, uuid, rule_id, condition_type, value";

/// Provides data access for rules, targets and conditions.
pub struct RuleRepo;

impl RuleRepo {
    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    pub async fn next_id(conn: &mut SqliteConnection) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM rules")
            .fetch_one(conn)
            .await
    }

    /// Insert a rule row. `enabled` and `priority` of `rule` are ignored;
    /// they live in `rule_data` (see [`RuleRepo::create_data`]).
    pub async fn create(conn: &mut SqliteConnection, rule: &Rule) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO rules (id, status, uuid, layout_id, comment) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(rule.id)
        .bind(rule.status)
        .bind(rule.uuid)
        .bind(rule.layout_id)
        .bind(&rule.comment)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn create_data(
        conn: &mut SqliteConnection,
        rule_id: DbId,
        enabled: bool,
        priority: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO rule_data (rule_id, enabled, priority) VALUES (?1, ?2, ?3)")
            .bind(rule_id)
            .bind(enabled)
            .bind(priority)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn find(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<Option<Rule>, sqlx::Error> {
        let query = format!(
            "SELECT {RULE_COLUMNS} FROM rules r JOIN rule_data d ON d.rule_id = r.id \
             WHERE r.id = ?1 AND r.status = ?2"
        );
        sqlx::query_as::<_, Rule>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    /// Rules in `status`, optionally only those pointing at `layout_id`.
    /// Highest priority first.
    pub async fn list(
        conn: &mut SqliteConnection,
        status: Status,
        layout_id: Option<DbId>,
    ) -> Result<Vec<Rule>, sqlx::Error> {
        let query = format!(
            "SELECT {RULE_COLUMNS} FROM rules r JOIN rule_data d ON d.rule_id = r.id \
             WHERE r.status = ?1 AND (?2 IS NULL OR r.layout_id = ?2) \
             ORDER BY d.priority DESC, r.id"
        );
        sqlx::query_as::<_, Rule>(&query)
            .bind(status.id())
            .bind(layout_id)
            .fetch_all(conn)
            .await
    }

    /// Lowest priority over all rules, `None` when there are none.
    pub async fn lowest_priority(conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT MIN(priority) FROM rule_data")
            .fetch_one(conn)
            .await
    }

    /// Partially update a rule copy.
    pub async fn update(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        dto: &UpdateRule,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rules SET \
                 layout_id = CASE WHEN ?3 THEN ?4 ELSE layout_id END, \
                 comment   = COALESCE(?5, comment) \
             WHERE id = ?1 AND status = ?2",
        )
        .bind(id)
        .bind(status.id())
        .bind(dto.layout_id.is_some())
        .bind(dto.layout_id.flatten())
        .bind(&dto.comment)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_enabled(
        conn: &mut SqliteConnection,
        rule_id: DbId,
        enabled: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE rule_data SET enabled = ?2 WHERE rule_id = ?1")
            .bind(rule_id)
            .bind(enabled)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn set_priority(
        conn: &mut SqliteConnection,
        rule_id: DbId,
        priority: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE rule_data SET priority = ?2 WHERE rule_id = ?1")
            .bind(rule_id)
            .bind(priority)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn delete_data(
        conn: &mut SqliteConnection,
        rule_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM rule_data WHERE rule_id = ?1")
            .bind(rule_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Raw status ids of every copy of a rule.
    pub async fn statuses(
        conn: &mut SqliteConnection,
        id: DbId,
    ) -> Result<Vec<StatusId>, sqlx::Error> {
        sqlx::query_scalar("SELECT status FROM rules WHERE id = ?1 ORDER BY status")
            .bind(id)
            .fetch_all(conn)
            .await
    }

    // -----------------------------------------------------------------------
    // Resolver queries
    // -----------------------------------------------------------------------

    /// Published, enabled rules with a target of `target_type` matching one
    /// of `values`, by descending priority with ties in id order.
    ///
    /// With `prefix` set, a stored target value matches when it is a prefix
    /// of a requested value.
    pub async fn match_rules(
        conn: &mut SqliteConnection,
        target_type: &str,
        values: &[String],
        prefix: bool,
    ) -> Result<Vec<Rule>, sqlx::Error> {
        let query = format!(
            "SELECT {RULE_COLUMNS} FROM rules r JOIN rule_data d ON d.rule_id = r.id \
             WHERE r.status = ?1 AND d.enabled = 1 AND EXISTS ( \
                 SELECT 1 FROM rule_targets t, json_each(?3) v \
                 WHERE t.rule_id = r.id AND t.status = r.status AND t.target_type = ?2 \
                   AND CASE WHEN ?4 \
                       THEN substr(v.value, 1, length(t.value)) = t.value \
                       ELSE t.value = v.value END) \
             ORDER BY d.priority DESC, r.id"
        );
        sqlx::query_as::<_, Rule>(&query)
            .bind(Status::Published.id())
            .bind(target_type)
            .bind(Json(values))
            .bind(prefix)
            .fetch_all(conn)
            .await
    }

    /// Conditions of the given rules in `status`, grouped by rule and in
    /// declaration order within a rule.
    pub async fn conditions_for_rules(
        conn: &mut SqliteConnection,
        rule_ids: &[DbId],
        status: Status,
    ) -> Result<Vec<RuleCondition>, sqlx::Error> {
        let query = format!(
            "SELECT {CONDITION_COLUMNS} FROM rule_conditions \
             WHERE status = ?1 AND rule_id IN (SELECT value FROM json_each(?2)) \
             ORDER BY rule_id, id"
        );
        sqlx::query_as::<_, RuleCondition>(&query)
            .bind(status.id())
            .bind(Json(rule_ids))
            .fetch_all(conn)
            .await
    }

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------

    pub async fn next_target_id(conn: &mut SqliteConnection) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM rule_targets")
            .fetch_one(conn)
            .await
    }

    pub async fn create_target(
        conn: &mut SqliteConnection,
        target: &RuleTarget,
    ) -> Result<RuleTarget, sqlx::Error> {
        let query = format!(
            "INSERT INTO rule_targets ({TARGET_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             RETURNING {TARGET_COLUMNS}"
        );
        sqlx::query_as::<_, RuleTarget>(&query)
            .bind(target.id)
            .bind(target.status)
            .bind(target.uuid)
            .bind(target.rule_id)
            .bind(&target.target_type)
            .bind(&target.value)
            .fetch_one(conn)
            .await
    }

    pub async fn find_target(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<Option<RuleTarget>, sqlx::Error> {
        let query =
            format!("SELECT {TARGET_COLUMNS} FROM rule_targets WHERE id = ?1 AND status = ?2");
        sqlx::query_as::<_, RuleTarget>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    /// Targets of a rule copy in declaration order.
    pub async fn list_targets(
        conn: &mut SqliteConnection,
        rule_id: DbId,
        status: Status,
    ) -> Result<Vec<RuleTarget>, sqlx::Error> {
        let query = format!(
            "SELECT {TARGET_COLUMNS} FROM rule_targets \
             WHERE rule_id = ?1 AND status = ?2 ORDER BY id"
        );
        sqlx::query_as::<_, RuleTarget>(&query)
            .bind(rule_id)
            .bind(status.id())
            .fetch_all(conn)
            .await
    }

    pub async fn count_targets(
        conn: &mut SqliteConnection,
        rule_id: DbId,
        status: Status,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM rule_targets WHERE rule_id = ?1 AND status = ?2")
            .bind(rule_id)
            .bind(status.id())
            .fetch_one(conn)
            .await
    }

    pub async fn update_target(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        value: &str,
    ) -> Result<Option<RuleTarget>, sqlx::Error> {
        let query = format!(
            "UPDATE rule_targets SET value = ?3 WHERE id = ?1 AND status = ?2 \
             RETURNING {TARGET_COLUMNS}"
        );
        sqlx::query_as::<_, RuleTarget>(&query)
            .bind(id)
            .bind(status.id())
            .bind(value)
            .fetch_optional(conn)
            .await
    }

    pub async fn delete_target(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM rule_targets WHERE id = ?1 AND status = ?2")
            .bind(id)
            .bind(status.id())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Conditions
    // -----------------------------------------------------------------------

    pub async fn next_condition_id(conn: &mut SqliteConnection) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM rule_conditions")
            .fetch_one(conn)
            .await
    }

    pub async fn create_condition(
        conn: &mut SqliteConnection,
        condition: &RuleCondition,
    ) -> Result<RuleCondition, sqlx::Error> {
        let query = format!(
            "INSERT INTO rule_conditions ({CONDITION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             RETURNING {CONDITION_COLUMNS}"
        );
        sqlx::query_as::<_, RuleCondition>(&query)
            .bind(condition.id)
            .bind(condition.status)
            .bind(condition.uuid)
            .bind(condition.rule_id)
            .bind(&condition.condition_type)
            .bind(&condition.value)
            .fetch_one(conn)
            .await
    }

    pub async fn find_condition(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<Option<RuleCondition>, sqlx::Error> {
        let query = format!(
            "SELECT {CONDITION_COLUMNS} FROM rule_conditions WHERE id = ?1 AND status = ?2"
        );
        sqlx::query_as::<_, RuleCondition>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(conn)
            .await
    }

    /// Conditions of a rule copy in declaration order.
    pub async fn list_conditions(
        conn: &mut SqliteConnection,
        rule_id: DbId,
        status: Status,
    ) -> Result<Vec<RuleCondition>, sqlx::Error> {
        let query = format!(
            "SELECT {CONDITION_COLUMNS} FROM rule_conditions \
             WHERE rule_id = ?1 AND status = ?2 ORDER BY id"
        );
        sqlx::query_as::<_, RuleCondition>(&query)
            .bind(rule_id)
            .bind(status.id())
            .fetch_all(conn)
            .await
    }

    pub async fn update_condition(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
        value: &Value,
    ) -> Result<Option<RuleCondition>, sqlx::Error> {
        let query = format!(
            "UPDATE rule_conditions SET value = ?3 WHERE id = ?1 AND status = ?2 \
             RETURNING {CONDITION_COLUMNS}"
        );
        sqlx::query_as::<_, RuleCondition>(&query)
            .bind(id)
            .bind(status.id())
            .bind(value)
            .fetch_optional(conn)
            .await
    }

    pub async fn delete_condition(
        conn: &mut SqliteConnection,
        id: DbId,
        status: Status,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM rule_conditions WHERE id = ?1 AND status = ?2")
            .bind(id)
            .bind(status.id())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
