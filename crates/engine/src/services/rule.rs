//! Rule service: rules, their targets and conditions, and the rule
//! lifecycle including the shared enabled/priority data.

use std::sync::Arc;

use layouts_core::error::CoreError;
use layouts_core::lifecycle::{
    check_rule_disable, check_rule_enable, enabled_after_publish, plan_create_draft, plan_delete,
    plan_discard_draft, plan_publish, plan_restore_from_archive,
};
use layouts_core::status::Status;
use layouts_core::types::DbId;
use layouts_core::validation::Violations;
use layouts_db::models::rule::{
    CreateCondition, CreateRule, CreateTarget, Rule, RuleCondition, RuleTarget, UpdateCondition,
    UpdateRule, UpdateRuleMetadata, UpdateTarget,
};
use layouts_db::repositories::{LayoutRepo, RuleRepo, RULE_TREE};
use layouts_db::DbPool;
use serde_json::Value;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::engine::Registries;
use crate::error::EngineResult;

use super::{require_draft_rule, require_rule};

pub struct RuleService {
    pool: DbPool,
    registries: Arc<Registries>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn ensure_layout_exists(conn: &mut SqliteConnection, layout_id: DbId) -> EngineResult<()> {
    if LayoutRepo::statuses(conn, layout_id).await?.is_empty() {
        return Err(CoreError::bad_state(
            "layout_id",
            format!("Layout with ID \"{layout_id}\" does not exist."),
        )
        .into());
    }
    Ok(())
}

/// Enabled state and priority live outside the versioned rows, so they are
/// only changed through the published copy.
async fn require_published_rule(conn: &mut SqliteConnection, id: DbId) -> EngineResult<Rule> {
    if let Some(rule) = RuleRepo::find(&mut *conn, id, Status::Published).await? {
        return Ok(rule);
    }
    if RuleRepo::statuses(conn, id).await?.is_empty() {
        return Err(CoreError::not_found("Rule", id).into());
    }
    Err(CoreError::bad_state("rule", "Only published rules can be changed.").into())
}

async fn require_draft_target(conn: &mut SqliteConnection, id: DbId) -> EngineResult<RuleTarget> {
    if let Some(target) = RuleRepo::find_target(&mut *conn, id, Status::Draft).await? {
        return Ok(target);
    }
    for status in [Status::Published, Status::Archived] {
        if RuleRepo::find_target(&mut *conn, id, status).await?.is_some() {
            return Err(CoreError::bad_state(
                "target",
                "Only draft targets can be modified.",
            )
            .into());
        }
    }
    Err(CoreError::not_found("Target", id).into())
}

async fn require_draft_condition(
    conn: &mut SqliteConnection,
    id: DbId,
) -> EngineResult<RuleCondition> {
    if let Some(condition) = RuleRepo::find_condition(&mut *conn, id, Status::Draft).await? {
        return Ok(condition);
    }
    for status in [Status::Published, Status::Archived] {
        if RuleRepo::find_condition(&mut *conn, id, status).await?.is_some() {
            return Err(CoreError::bad_state(
                "condition",
                "Only draft conditions can be modified.",
            )
            .into());
        }
    }
    Err(CoreError::not_found("Condition", id).into())
}

impl RuleService {
    pub fn new(pool: DbPool, registries: Arc<Registries>) -> Self {
        Self { pool, registries }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load the published copy of a rule.
    pub async fn load_rule(&self, id: DbId) -> EngineResult<Rule> {
        let mut conn = self.pool.acquire().await?;
        require_rule(&mut conn, id, Status::Published).await
    }

    pub async fn load_rule_draft(&self, id: DbId) -> EngineResult<Rule> {
        let mut conn = self.pool.acquire().await?;
        require_rule(&mut conn, id, Status::Draft).await
    }

    pub async fn load_rule_archive(&self, id: DbId) -> EngineResult<Rule> {
        let mut conn = self.pool.acquire().await?;
        require_rule(&mut conn, id, Status::Archived).await
    }

    /// Published rules, optionally only those mapped to `layout_id`.
    /// Highest priority first.
    pub async fn load_rules(&self, layout_id: Option<DbId>) -> EngineResult<Vec<Rule>> {
        let mut conn = self.pool.acquire().await?;
        let rules = RuleRepo::list(&mut conn, Status::Published, layout_id).await?;
        tracing::debug!(count = rules.len(), layout_id = ?layout_id, "Listed rules");
        Ok(rules)
    }

    pub async fn load_rule_targets(
        &self,
        rule_id: DbId,
        status: Status,
    ) -> EngineResult<Vec<RuleTarget>> {
        let mut conn = self.pool.acquire().await?;
        require_rule(&mut conn, rule_id, status).await?;
        Ok(RuleRepo::list_targets(&mut conn, rule_id, status).await?)
    }

    /// Conditions in declaration order.
    pub async fn load_rule_conditions(
        &self,
        rule_id: DbId,
        status: Status,
    ) -> EngineResult<Vec<RuleCondition>> {
        let mut conn = self.pool.acquire().await?;
        require_rule(&mut conn, rule_id, status).await?;
        Ok(RuleRepo::list_conditions(&mut conn, rule_id, status).await?)
    }

    pub async fn load_target(&self, id: DbId, status: Status) -> EngineResult<RuleTarget> {
        let mut conn = self.pool.acquire().await?;
        RuleRepo::find_target(&mut conn, id, status)
            .await?
            .ok_or_else(|| CoreError::not_found("Target", id).into())
    }

    pub async fn load_condition(&self, id: DbId, status: Status) -> EngineResult<RuleCondition> {
        let mut conn = self.pool.acquire().await?;
        RuleRepo::find_condition(&mut conn, id, status)
            .await?
            .ok_or_else(|| CoreError::not_found("Condition", id).into())
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Create a rule draft. Without an explicit priority the rule goes
    /// below every existing rule.
    pub async fn create_rule(&self, input: &CreateRule) -> EngineResult<Rule> {
        Violations::of(input).into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        if let Some(layout_id) = input.layout_id {
            ensure_layout_exists(&mut tx, layout_id).await?;
        }
        let priority = match input.priority {
            Some(priority) => priority,
            None => RuleRepo::lowest_priority(&mut tx)
                .await?
                .map_or(0, |lowest| lowest - 1),
        };

        let id = RuleRepo::next_id(&mut tx).await?;
        RuleRepo::create(
            &mut tx,
            &Rule {
                id,
                status: Status::Draft.id(),
                uuid: Uuid::new_v4(),
                layout_id: input.layout_id,
                comment: input.comment.clone(),
                enabled: input.enabled,
                priority,
            },
        )
        .await?;
        RuleRepo::create_data(&mut tx, id, input.enabled, priority).await?;
        let rule = require_rule(&mut tx, id, Status::Draft).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, layout_id = ?rule.layout_id, priority, "Rule created");
        Ok(rule)
    }

    /// Change the layout or comment of a rule draft.
    pub async fn update_rule(&self, id: DbId, input: &UpdateRule) -> EngineResult<Rule> {
        Violations::of(input).into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        require_draft_rule(&mut tx, id).await?;
        if let Some(Some(layout_id)) = input.layout_id {
            ensure_layout_exists(&mut tx, layout_id).await?;
        }
        RuleRepo::update(&mut tx, id, Status::Draft, input).await?;
        let rule = require_rule(&mut tx, id, Status::Draft).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, "Rule updated");
        Ok(rule)
    }

    /// Change the priority, shared by every status copy, of a published rule.
    pub async fn update_rule_metadata(
        &self,
        id: DbId,
        input: &UpdateRuleMetadata,
    ) -> EngineResult<Rule> {
        Violations::of(input).into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        require_published_rule(&mut tx, id).await?;
        RuleRepo::set_priority(&mut tx, id, input.priority).await?;
        let rule = require_rule(&mut tx, id, Status::Published).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, priority = input.priority, "Rule metadata updated");
        Ok(rule)
    }

    /// Copy one status copy of a rule, with targets and conditions, into a
    /// new disabled rule draft with the same priority.
    pub async fn copy_rule(&self, id: DbId, status: Status) -> EngineResult<Rule> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let source = require_rule(&mut tx, id, status).await?;

        let copy_id = RuleRepo::next_id(&mut tx).await?;
        RuleRepo::create(
            &mut tx,
            &Rule {
                id: copy_id,
                status: Status::Draft.id(),
                uuid: Uuid::new_v4(),
                enabled: false,
                ..source.clone()
            },
        )
        .await?;
        RuleRepo::create_data(&mut tx, copy_id, false, source.priority).await?;

        for target in RuleRepo::list_targets(&mut tx, id, status).await? {
            let target_id = RuleRepo::next_target_id(&mut tx).await?;
            RuleRepo::create_target(
                &mut tx,
                &RuleTarget {
                    id: target_id,
                    status: Status::Draft.id(),
                    uuid: Uuid::new_v4(),
                    rule_id: copy_id,
                    ..target
                },
            )
            .await?;
        }
        for condition in RuleRepo::list_conditions(&mut tx, id, status).await? {
            let condition_id = RuleRepo::next_condition_id(&mut tx).await?;
            RuleRepo::create_condition(
                &mut tx,
                &RuleCondition {
                    id: condition_id,
                    status: Status::Draft.id(),
                    uuid: Uuid::new_v4(),
                    rule_id: copy_id,
                    ..condition
                },
            )
            .await?;
        }

        let copy = require_rule(&mut tx, copy_id, Status::Draft).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, copy_id, status = %status, "Rule copied");
        Ok(copy)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub async fn create_draft(&self, id: DbId, discard_existing: bool) -> EngineResult<Rule> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = RULE_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Rule", id).into());
        }
        let steps = plan_create_draft("rule", present, discard_existing)?;
        RULE_TREE.run(&mut tx, id, &steps).await?;
        let draft = require_rule(&mut tx, id, Status::Draft).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, discard_existing, "Rule draft created");
        Ok(draft)
    }

    pub async fn discard_draft(&self, id: DbId) -> EngineResult<()> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = RULE_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Rule", id).into());
        }
        let steps = plan_discard_draft("rule", present)?;
        RULE_TREE.run(&mut tx, id, &steps).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, "Rule draft discarded");
        Ok(())
    }

    /// Publish the draft. A published rule without a layout or without
    /// targets is disabled instead of rejected.
    pub async fn publish_rule(&self, id: DbId) -> EngineResult<Rule> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = RULE_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Rule", id).into());
        }
        let steps = plan_publish("rule", present, false)?;
        RULE_TREE.run(&mut tx, id, &steps).await?;

        let mut published = require_rule(&mut tx, id, Status::Published).await?;
        let targets = RuleRepo::count_targets(&mut tx, id, Status::Published).await?;
        let enabled = enabled_after_publish(
            published.enabled,
            published.layout_id.is_some(),
            usize::try_from(targets).unwrap_or_default(),
        );
        if enabled != published.enabled {
            RuleRepo::set_enabled(&mut tx, id, enabled).await?;
            tracing::warn!(
                rule_id = id,
                has_layout = published.layout_id.is_some(),
                targets,
                "Published rule cannot stay enabled, disabling"
            );
            published.enabled = enabled;
        }
        tx.commit().await?;

        tracing::info!(rule_id = id, enabled = published.enabled, "Rule published");
        Ok(published)
    }

    /// Replace the draft with a copy of the archived rule.
    pub async fn restore_from_archive(&self, id: DbId) -> EngineResult<Rule> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = RULE_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Rule", id).into());
        }
        let steps = plan_restore_from_archive("rule", present)?;
        RULE_TREE.run(&mut tx, id, &steps).await?;
        let draft = require_rule(&mut tx, id, Status::Draft).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, "Rule restored from archive");
        Ok(draft)
    }

    /// Delete every status copy of a rule and its shared data.
    pub async fn delete_rule(&self, id: DbId) -> EngineResult<()> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let present = RULE_TREE.statuses(&mut tx, id).await?;
        if present.is_empty() {
            return Err(CoreError::not_found("Rule", id).into());
        }
        RULE_TREE.run(&mut tx, id, &plan_delete(present)).await?;
        RuleRepo::delete_data(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, "Rule deleted");
        Ok(())
    }

    /// Enable a published rule that has a layout and at least one target.
    pub async fn enable_rule(&self, id: DbId) -> EngineResult<Rule> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let rule = require_published_rule(&mut tx, id).await?;
        let targets = RuleRepo::count_targets(&mut tx, id, Status::Published).await?;
        check_rule_enable(
            rule.enabled,
            rule.layout_id.is_some(),
            usize::try_from(targets).unwrap_or_default(),
        )?;
        RuleRepo::set_enabled(&mut tx, id, true).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, "Rule enabled");
        Ok(Rule {
            enabled: true,
            ..rule
        })
    }

    pub async fn disable_rule(&self, id: DbId) -> EngineResult<Rule> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let rule = require_published_rule(&mut tx, id).await?;
        check_rule_disable(rule.enabled)?;
        RuleRepo::set_enabled(&mut tx, id, false).await?;
        tx.commit().await?;

        tracing::info!(rule_id = id, "Rule disabled");
        Ok(Rule {
            enabled: false,
            ..rule
        })
    }

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------

    fn check_target_value(&self, violations: &mut Violations, target_type: &str, value: &str) {
        match self.registries.targets.get(target_type) {
            Err(_) => violations.add(
                "target_type",
                "unknown_target_type",
                format!("Target type \"{target_type}\" does not exist."),
            ),
            Ok(builder) => {
                if let Err(reason) = builder.validate_value(value) {
                    violations.add("value", "invalid_value", reason);
                }
            }
        }
    }

    /// Add a target to a rule draft. Every target of a rule has the same type.
    pub async fn add_target(
        &self,
        rule_id: DbId,
        input: &CreateTarget,
    ) -> EngineResult<RuleTarget> {
        let mut violations = Violations::of(input);
        self.check_target_value(&mut violations, &input.target_type, &input.value);
        violations.into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        require_draft_rule(&mut tx, rule_id).await?;
        let existing = RuleRepo::list_targets(&mut tx, rule_id, Status::Draft).await?;
        if let Some(other) = existing.iter().find(|t| t.target_type != input.target_type) {
            return Err(CoreError::bad_state(
                "target",
                format!(
                    "Rule with ID \"{rule_id}\" only accepts targets with \"{}\" target type.",
                    other.target_type
                ),
            )
            .into());
        }

        let id = RuleRepo::next_target_id(&mut tx).await?;
        let target = RuleRepo::create_target(
            &mut tx,
            &RuleTarget {
                id,
                status: Status::Draft.id(),
                uuid: Uuid::new_v4(),
                rule_id,
                target_type: input.target_type.clone(),
                value: input.value.clone(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(target_id = id, rule_id, target_type = %input.target_type, "Target added");
        Ok(target)
    }

    pub async fn update_target(&self, id: DbId, input: &UpdateTarget) -> EngineResult<RuleTarget> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let target = require_draft_target(&mut tx, id).await?;

        let mut violations = Violations::of(input);
        self.check_target_value(&mut violations, &target.target_type, &input.value);
        violations.into_result()?;

        let updated = RuleRepo::update_target(&mut tx, id, Status::Draft, &input.value)
            .await?
            .ok_or(CoreError::not_found("Target", id))?;
        tx.commit().await?;

        tracing::info!(target_id = id, rule_id = target.rule_id, "Target updated");
        Ok(updated)
    }

    pub async fn delete_target(&self, id: DbId) -> EngineResult<()> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let target = require_draft_target(&mut tx, id).await?;
        RuleRepo::delete_target(&mut tx, id, Status::Draft).await?;
        tx.commit().await?;

        tracing::info!(target_id = id, rule_id = target.rule_id, "Target deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Conditions
    // -----------------------------------------------------------------------

    fn check_condition_value(
        &self,
        violations: &mut Violations,
        condition_type: &str,
        value: &Value,
    ) {
        match self.registries.conditions.get(condition_type) {
            Err(_) => violations.add(
                "condition_type",
                "unknown_condition_type",
                format!("Condition type \"{condition_type}\" does not exist."),
            ),
            Ok(matcher) => {
                if let Err(reason) = matcher.validate_value(value) {
                    violations.add("value", "invalid_value", reason);
                }
            }
        }
    }

    pub async fn add_condition(
        &self,
        rule_id: DbId,
        input: &CreateCondition,
    ) -> EngineResult<RuleCondition> {
        let mut violations = Violations::of(input);
        self.check_condition_value(&mut violations, &input.condition_type, &input.value);
        violations.into_result()?;

        let mut tx = layouts_db::begin_write(&self.pool).await?;
        require_draft_rule(&mut tx, rule_id).await?;
        let id = RuleRepo::next_condition_id(&mut tx).await?;
        let condition = RuleRepo::create_condition(
            &mut tx,
            &RuleCondition {
                id,
                status: Status::Draft.id(),
                uuid: Uuid::new_v4(),
                rule_id,
                condition_type: input.condition_type.clone(),
                value: input.value.clone(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            condition_id = id,
            rule_id,
            condition_type = %input.condition_type,
            "Condition added"
        );
        Ok(condition)
    }

    pub async fn update_condition(
        &self,
        id: DbId,
        input: &UpdateCondition,
    ) -> EngineResult<RuleCondition> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let condition = require_draft_condition(&mut tx, id).await?;

        let mut violations = Violations::of(input);
        self.check_condition_value(&mut violations, &condition.condition_type, &input.value);
        violations.into_result()?;

        let updated = RuleRepo::update_condition(&mut tx, id, Status::Draft, &input.value)
            .await?
            .ok_or(CoreError::not_found("Condition", id))?;
        tx.commit().await?;

        tracing::info!(condition_id = id, rule_id = condition.rule_id, "Condition updated");
        Ok(updated)
    }

    pub async fn delete_condition(&self, id: DbId) -> EngineResult<()> {
        let mut tx = layouts_db::begin_write(&self.pool).await?;
        let condition = require_draft_condition(&mut tx, id).await?;
        RuleRepo::delete_condition(&mut tx, id, Status::Draft).await?;
        tx.commit().await?;

        tracing::info!(condition_id = id, rule_id = condition.rule_id, "Condition deleted");
        Ok(())
    }
}
