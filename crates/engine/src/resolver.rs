//! SQL-backed [`RuleLoader`].

use std::collections::HashMap;

use async_trait::async_trait;
use layouts_core::resolver::{ResolvedRule, RuleCondition, RuleLoader, Target, TargetMatch};
use layouts_core::status::Status;
use layouts_core::types::DbId;
use layouts_db::repositories::RuleRepo;
use layouts_db::DbPool;

use crate::error::{EngineError, EngineResult};

/// Loads published, enabled rules and their conditions for a target.
#[derive(Debug, Clone)]
pub struct DbRuleLoader {
    pool: DbPool,
}

impl DbRuleLoader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleLoader for DbRuleLoader {
    type Error = EngineError;

    async fn load_rules(&self, target: &Target) -> EngineResult<Vec<ResolvedRule>> {
        if target.values.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await?;
        let rules = RuleRepo::match_rules(
            &mut conn,
            &target.kind,
            &target.values,
            target.matching == TargetMatch::Prefix,
        )
        .await?;
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<DbId> = rules.iter().map(|rule| rule.id).collect();
        let rows = RuleRepo::conditions_for_rules(&mut conn, &ids, Status::Published).await?;

        let mut conditions: HashMap<DbId, Vec<RuleCondition>> = HashMap::new();
        for row in rows {
            conditions.entry(row.rule_id).or_default().push(RuleCondition {
                id: row.id,
                kind: row.condition_type,
                value: row.value,
            });
        }

        tracing::debug!(
            target_kind = %target.kind,
            rules = rules.len(),
            "Rules loaded for target"
        );

        Ok(rules
            .into_iter()
            .map(|rule| {
                let mut rule_conditions = conditions.remove(&rule.id).unwrap_or_default();
                rule_conditions.sort_by_key(|condition| condition.id);
                ResolvedRule {
                    id: rule.id,
                    layout_id: rule.layout_id,
                    priority: rule.priority,
                    enabled: rule.enabled,
                    comment: rule.comment,
                    conditions: rule_conditions,
                }
            })
            .collect())
    }
}
