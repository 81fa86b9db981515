//! Layout resolution: pick the rule, and with it the layout, for a request.
//!
//! Target builders are asked in registry order for the values of the
//! current request. For every non-empty target the [`RuleLoader`] returns
//! the published, enabled rules matching it, highest priority first, and
//! the first rule whose conditions all match wins. "No match" is a normal
//! `Ok(None)`; only an unknown condition kind is an error.

pub mod condition;
pub mod request;
pub mod target;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::types::DbId;

pub use condition::{ConditionKind, ConditionMatcher, ConditionMatcherRegistry};
pub use request::RequestContext;
pub use target::{Target, TargetBuilder, TargetBuilderRegistry, TargetKind, TargetMatch};

/// A condition attached to a resolved rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleCondition {
    pub id: DbId,
    pub kind: String,
    pub value: Value,
}

/// A published, enabled rule as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRule {
    pub id: DbId,
    pub layout_id: Option<DbId>,
    pub priority: i64,
    pub enabled: bool,
    pub comment: String,
    /// Declaration order.
    pub conditions: Vec<RuleCondition>,
}

#[async_trait]
pub trait RuleLoader: Send + Sync {
    type Error: From<CoreError> + Send;

    /// Published, enabled rules matching `target`, by descending priority
    /// with ties in insertion order. Empty `target.values` yields no rules.
    async fn load_rules(&self, target: &Target) -> Result<Vec<ResolvedRule>, Self::Error>;
}

pub struct LayoutResolver<L> {
    targets: Arc<TargetBuilderRegistry>,
    conditions: Arc<ConditionMatcherRegistry>,
    loader: L,
}

impl<L: RuleLoader> LayoutResolver<L> {
    pub fn new(
        targets: Arc<TargetBuilderRegistry>,
        conditions: Arc<ConditionMatcherRegistry>,
        loader: L,
    ) -> Self {
        Self {
            targets,
            conditions,
            loader,
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Try every target builder in order until one yields a matching rule.
    pub async fn resolve_layout(
        &self,
        request: &RequestContext,
    ) -> Result<Option<ResolvedRule>, L::Error> {
        for builder in self.targets.iter() {
            let Some(target) = target::build_with(builder.as_ref(), request) else {
                continue;
            };
            if target.values.is_empty() {
                continue;
            }

            if let Some(rule) = self.resolve_layout_for_target(&target, request).await? {
                tracing::debug!(
                    target_kind = %target.kind,
                    rule_id = rule.id,
                    layout_id = ?rule.layout_id,
                    "Resolved layout"
                );
                return Ok(Some(rule));
            }
        }

        tracing::debug!("No rule matched the request");
        Ok(None)
    }

    /// First rule for `target`, in loader order, whose conditions all match.
    pub async fn resolve_layout_for_target(
        &self,
        target: &Target,
        request: &RequestContext,
    ) -> Result<Option<ResolvedRule>, L::Error> {
        let rules = self.loader.load_rules(target).await?;
        tracing::debug!(
            target_kind = %target.kind,
            candidates = rules.len(),
            "Loaded rules for target"
        );

        for rule in rules {
            if self.match_conditions(&rule, request)? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    /// Whether every condition of `rule` matches; stops at the first miss.
    pub fn match_conditions(
        &self,
        rule: &ResolvedRule,
        request: &RequestContext,
    ) -> Result<bool, CoreError> {
        for condition in &rule.conditions {
            let matcher = self.conditions.get(&condition.kind)?;
            if !matcher.matches(&condition.value, request) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // -- mocks ---------------------------------------------------------------

    /// Matcher whose outcome is the condition value itself, counting calls.
    #[derive(Default)]
    struct FlagMatcher {
        calls: AtomicUsize,
        seen: Mutex<Vec<Value>>,
    }

    impl ConditionMatcher for FlagMatcher {
        fn kind(&self) -> &str {
            "flag"
        }

        fn matches(&self, value: &Value, _request: &RequestContext) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(value.clone());
            value.get("result").and_then(Value::as_bool).unwrap_or(false)
        }

        fn validate_value(&self, _value: &Value) -> Result<(), String> {
            Ok(())
        }
    }

    /// Builder returning a fixed value list.
    struct FixedTarget {
        kind: &'static str,
        values: Vec<String>,
    }

    impl TargetBuilder for FixedTarget {
        fn kind(&self) -> &str {
            self.kind
        }

        fn build(&self, _request: &RequestContext) -> Option<Vec<String>> {
            Some(self.values.clone())
        }
    }

    /// Loader keyed by target value, recording every queried target.
    #[derive(Default)]
    struct MockLoader {
        rules: Vec<(String, ResolvedRule)>,
        queried: Mutex<Vec<Target>>,
    }

    impl MockLoader {
        fn with_rule(mut self, value: &str, rule: ResolvedRule) -> Self {
            self.rules.push((value.to_string(), rule));
            self
        }

        fn queried_values(&self) -> Vec<Vec<String>> {
            self.queried
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.values.clone())
                .collect()
        }
    }

    #[async_trait]
    impl RuleLoader for MockLoader {
        type Error = CoreError;

        async fn load_rules(&self, target: &Target) -> Result<Vec<ResolvedRule>, CoreError> {
            if target.values.is_empty() {
                return Ok(Vec::new());
            }
            self.queried.lock().unwrap().push(target.clone());
            let mut rules: Vec<ResolvedRule> = self
                .rules
                .iter()
                .filter(|(value, _)| target.values.contains(value))
                .map(|(_, rule)| rule.clone())
                .collect();
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
            Ok(rules)
        }
    }

    fn rule(id: DbId, priority: i64, flags: &[bool]) -> ResolvedRule {
        ResolvedRule {
            id,
            layout_id: Some(id * 100),
            priority,
            enabled: true,
            comment: String::new(),
            conditions: flags
                .iter()
                .enumerate()
                .map(|(i, flag)| RuleCondition {
                    id: id * 10 + i as DbId,
                    kind: "flag".to_string(),
                    value: json!({ "result": flag, "index": i }),
                })
                .collect(),
        }
    }

    fn resolver(
        builders: Vec<FixedTarget>,
        matcher: Arc<FlagMatcher>,
        loader: MockLoader,
    ) -> LayoutResolver<MockLoader> {
        let targets = builders
            .into_iter()
            .fold(TargetBuilderRegistry::new(), |registry, builder| {
                registry.register(Arc::new(builder))
            });
        let conditions = ConditionMatcherRegistry::new().register(matcher);
        LayoutResolver::new(Arc::new(targets), Arc::new(conditions), loader)
    }

    fn route(values: &[&str]) -> FixedTarget {
        FixedTarget {
            kind: "route",
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    // -- resolve_layout_for_target -------------------------------------------

    #[tokio::test]
    async fn failed_high_priority_rule_falls_through_to_lower() {
        let loader = MockLoader::default()
            .with_rule("home", rule(1, 10, &[false]))
            .with_rule("home", rule(2, 5, &[]));
        let resolver = resolver(vec![], Arc::default(), loader);

        let target = Target::exact("route", vec!["home".into()]);
        let resolved = resolver
            .resolve_layout_for_target(&target, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(resolved.map(|r| r.id), Some(2));
    }

    #[tokio::test]
    async fn conditions_short_circuit_on_first_miss() {
        let matcher = Arc::new(FlagMatcher::default());
        let loader = MockLoader::default().with_rule("home", rule(1, 10, &[true, false, true]));
        let resolver = resolver(vec![], matcher.clone(), loader);

        let target = Target::exact("route", vec!["home".into()]);
        let resolved = resolver
            .resolve_layout_for_target(&target, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(resolved, None);
        assert_eq!(matcher.calls.load(Ordering::SeqCst), 2);
        let indexes: Vec<Value> = matcher
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|v| v["index"].clone())
            .collect();
        assert_eq!(indexes, vec![json!(0), json!(1)]);
    }

    #[tokio::test]
    async fn first_full_match_wins_over_higher_priority_failure() {
        let loader = MockLoader::default()
            .with_rule("home", rule(1, 10, &[true]))
            .with_rule("home", rule(2, 20, &[true, false]));
        let resolver = resolver(vec![], Arc::default(), loader);

        let target = Target::exact("route", vec!["home".into()]);
        let resolved = resolver
            .resolve_layout_for_target(&target, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(resolved.map(|r| r.priority), Some(10));
    }

    #[tokio::test]
    async fn rule_without_conditions_always_matches() {
        let resolver = resolver(vec![], Arc::default(), MockLoader::default());
        assert!(resolver
            .match_conditions(&rule(1, 0, &[]), &RequestContext::new())
            .unwrap());
    }

    #[tokio::test]
    async fn unknown_condition_kind_is_fatal() {
        let mut broken = rule(1, 10, &[true]);
        broken.conditions[0].kind = "ip_address".to_string();
        let loader = MockLoader::default().with_rule("home", broken);
        let resolver = resolver(vec![route(&["home"])], Arc::default(), loader);

        assert_matches!(
            resolver.resolve_layout(&RequestContext::new()).await,
            Err(CoreError::Runtime(_))
        );
    }

    // -- resolve_layout -------------------------------------------------------

    #[tokio::test]
    async fn first_builder_with_a_match_short_circuits() {
        let loader = MockLoader::default()
            .with_rule("42", rule(1, 0, &[]))
            .with_rule("84", rule(2, 99, &[]));
        let resolver = resolver(
            vec![
                route(&["42"]),
                FixedTarget {
                    kind: "path_info",
                    values: vec!["84".into()],
                },
            ],
            Arc::default(),
            loader,
        );

        let resolved = resolver.resolve_layout(&RequestContext::new()).await.unwrap();
        assert_eq!(resolved.map(|r| r.id), Some(1));
        assert_eq!(resolver.loader().queried_values(), vec![vec!["42".to_string()]]);
    }

    #[tokio::test]
    async fn empty_targets_are_skipped() {
        let loader = MockLoader::default().with_rule("84", rule(2, 0, &[]));
        let resolver = resolver(
            vec![
                route(&[]),
                FixedTarget {
                    kind: "path_info",
                    values: vec!["84".into()],
                },
            ],
            Arc::default(),
            loader,
        );

        let resolved = resolver.resolve_layout(&RequestContext::new()).await.unwrap();
        assert_eq!(resolved.map(|r| r.id), Some(2));
        assert_eq!(resolver.loader().queried_values(), vec![vec!["84".to_string()]]);
    }

    #[tokio::test]
    async fn no_match_is_not_an_error() {
        let resolver = resolver(vec![route(&["home"])], Arc::default(), MockLoader::default());
        assert_eq!(resolver.resolve_layout(&RequestContext::new()).await.unwrap(), None);
    }
}
