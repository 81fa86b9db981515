//! Condition matchers: decide whether one rule condition holds for a request.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::Timestamp;

use super::request::RequestContext;

pub trait ConditionMatcher: Send + Sync {
    fn kind(&self) -> &str;

    /// Evaluate one stored condition value against the request. A value the
    /// matcher cannot interpret never matches.
    fn matches(&self, value: &Value, request: &RequestContext) -> bool;

    /// Check a value an editor wants to store on a rule condition.
    fn validate_value(&self, value: &Value) -> Result<(), String>;
}

impl std::fmt::Debug for dyn ConditionMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionMatcher")
            .field("kind", &self.kind())
            .finish()
    }
}

/// The built-in condition kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConditionKind {
    RouteParameter,
    QueryParameter,
    Exception,
    Time,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 4] = [
        ConditionKind::RouteParameter,
        ConditionKind::QueryParameter,
        ConditionKind::Exception,
        ConditionKind::Time,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionKind::RouteParameter => "route_parameter",
            ConditionKind::QueryParameter => "query_parameter",
            ConditionKind::Exception => "exception",
            ConditionKind::Time => "time",
        }
    }

    fn matcher(self) -> Arc<dyn ConditionMatcher> {
        match self {
            ConditionKind::RouteParameter => Arc::new(ParameterCondition::route()),
            ConditionKind::QueryParameter => Arc::new(ParameterCondition::query()),
            ConditionKind::Exception => Arc::new(ExceptionCondition),
            ConditionKind::Time => Arc::new(TimeCondition),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter conditions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ParameterValue {
    parameter_name: String,
    #[serde(default)]
    parameter_values: Vec<String>,
}

/// Matches when a named request parameter is present and, if values are
/// listed, equal to one of them.
#[derive(Debug, Clone, Copy)]
pub struct ParameterCondition {
    kind: ConditionKind,
}

impl ParameterCondition {
    pub fn route() -> Self {
        Self {
            kind: ConditionKind::RouteParameter,
        }
    }

    pub fn query() -> Self {
        Self {
            kind: ConditionKind::QueryParameter,
        }
    }

    fn parameters<'a>(&self, request: &'a RequestContext) -> &'a BTreeMap<String, String> {
        match self.kind {
            ConditionKind::QueryParameter => &request.query,
            _ => &request.route_params,
        }
    }
}

impl ConditionMatcher for ParameterCondition {
    fn kind(&self) -> &str {
        self.kind.as_str()
    }

    fn matches(&self, value: &Value, request: &RequestContext) -> bool {
        let Ok(expected) = ParameterValue::deserialize(value) else {
            return false;
        };
        let Some(actual) = self.parameters(request).get(&expected.parameter_name) else {
            return false;
        };
        expected.parameter_values.is_empty() || expected.parameter_values.contains(actual)
    }

    fn validate_value(&self, value: &Value) -> Result<(), String> {
        let parsed = ParameterValue::deserialize(value).map_err(|e| e.to_string())?;
        if parsed.parameter_name.trim().is_empty() {
            return Err("Parameter name must not be empty.".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Exception condition
// ---------------------------------------------------------------------------

/// Matches error pages; the value lists status codes, empty means any error.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionCondition;

impl ConditionMatcher for ExceptionCondition {
    fn kind(&self) -> &str {
        ConditionKind::Exception.as_str()
    }

    fn matches(&self, value: &Value, request: &RequestContext) -> bool {
        let Some(status_code) = request.status_code else {
            return false;
        };
        let Ok(codes) = Vec::<u16>::deserialize(value) else {
            return false;
        };
        codes.is_empty() || codes.contains(&status_code)
    }

    fn validate_value(&self, value: &Value) -> Result<(), String> {
        let codes = Vec::<u16>::deserialize(value).map_err(|e| e.to_string())?;
        if let Some(code) = codes.iter().find(|code| !(400..600).contains(*code)) {
            return Err(format!("{code} is not an error status code."));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Time condition
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TimeWindow {
    from: Option<Timestamp>,
    to: Option<Timestamp>,
}

/// Matches while `RequestContext::now` lies inside `[from, to]`.
#[derive(Debug, Clone, Copy)]
pub struct TimeCondition;

impl ConditionMatcher for TimeCondition {
    fn kind(&self) -> &str {
        ConditionKind::Time.as_str()
    }

    fn matches(&self, value: &Value, request: &RequestContext) -> bool {
        let Ok(window) = TimeWindow::deserialize(value) else {
            return false;
        };
        window.from.map_or(true, |from| from <= request.now)
            && window.to.map_or(true, |to| request.now <= to)
    }

    fn validate_value(&self, value: &Value) -> Result<(), String> {
        let window = TimeWindow::deserialize(value).map_err(|e| e.to_string())?;
        if let (Some(from), Some(to)) = (window.from, window.to) {
            if from > to {
                return Err("Time window ends before it starts.".to_string());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct ConditionMatcherRegistry {
    matchers: HashMap<String, Arc<dyn ConditionMatcher>>,
}

impl std::fmt::Debug for ConditionMatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.matchers.keys()).finish()
    }
}

impl ConditionMatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        ConditionKind::ALL
            .into_iter()
            .fold(Self::new(), |registry, kind| registry.register(kind.matcher()))
    }

    pub fn register(mut self, matcher: Arc<dyn ConditionMatcher>) -> Self {
        self.matchers.insert(matcher.kind().to_string(), matcher);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.matchers.contains_key(kind)
    }

    pub fn get(&self, kind: &str) -> Result<&Arc<dyn ConditionMatcher>, CoreError> {
        self.matchers.get(kind).ok_or_else(|| {
            CoreError::Runtime(format!("No condition matcher for kind \"{kind}\"."))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn matcher(kind: &str) -> Arc<dyn ConditionMatcher> {
        ConditionMatcherRegistry::with_defaults()
            .get(kind)
            .unwrap()
            .clone()
    }

    #[test]
    fn route_parameter_matches_listed_values() {
        let request = RequestContext::new().with_route_param("id", "42");
        let m = matcher("route_parameter");
        assert!(m.matches(
            &json!({ "parameter_name": "id", "parameter_values": ["41", "42"] }),
            &request
        ));
        assert!(!m.matches(
            &json!({ "parameter_name": "id", "parameter_values": ["7"] }),
            &request
        ));
        assert!(m.matches(&json!({ "parameter_name": "id" }), &request));
        assert!(!m.matches(&json!({ "parameter_name": "slug" }), &request));
    }

    #[test]
    fn query_parameter_reads_query_string() {
        let request = RequestContext::new()
            .with_query_param("page", "2")
            .with_route_param("page", "9");
        let m = matcher("query_parameter");
        assert!(m.matches(
            &json!({ "parameter_name": "page", "parameter_values": ["2"] }),
            &request
        ));
    }

    #[test]
    fn malformed_values_never_match() {
        let request = RequestContext::new().with_route_param("id", "42");
        assert!(!matcher("route_parameter").matches(&json!("id"), &request));
        assert!(!matcher("exception").matches(&json!({}), &request.with_status_code(404)));
    }

    #[test]
    fn exception_matches_status_codes() {
        let m = matcher("exception");
        let not_found = RequestContext::new().with_status_code(404);
        assert!(m.matches(&json!([404, 410]), &not_found));
        assert!(!m.matches(&json!([500]), &not_found));
        assert!(m.matches(&json!([]), &not_found));
        assert!(!m.matches(&json!([]), &RequestContext::new()));
    }

    #[test]
    fn time_window_is_inclusive() {
        let now = Utc::now();
        let request = RequestContext::new().at(now);
        let m = matcher("time");
        assert!(m.matches(&json!({ "from": now, "to": now }), &request));
        assert!(m.matches(&json!({ "from": null, "to": null }), &request));
        assert!(!m.matches(&json!({ "from": now + Duration::minutes(1) }), &request));
        assert!(!m.matches(&json!({ "to": now - Duration::minutes(1) }), &request));
    }

    #[test]
    fn value_validation() {
        assert!(matcher("route_parameter")
            .validate_value(&json!({ "parameter_name": "" }))
            .is_err());
        assert!(matcher("exception").validate_value(&json!([404])).is_ok());
        assert!(matcher("exception").validate_value(&json!([200])).is_err());
        let now = Utc::now();
        assert!(matcher("time")
            .validate_value(&json!({ "from": now, "to": now - Duration::hours(1) }))
            .is_err());
    }

    #[test]
    fn unknown_kind_is_fatal() {
        assert_matches!(
            ConditionMatcherRegistry::with_defaults().get("ip_address"),
            Err(CoreError::Runtime(_))
        );
    }
}
