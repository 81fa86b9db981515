//! Target builders: derive `(kind, values)` descriptors from a request.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::CoreError;

use super::request::RequestContext;

/// How stored target values are compared with request values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetMatch {
    /// Stored value equals one of the request values.
    Exact,
    /// Stored value is a prefix of one of the request values.
    Prefix,
}

/// A target descriptor produced for one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub kind: String,
    pub values: Vec<String>,
    pub matching: TargetMatch,
}

impl Target {
    pub fn exact(kind: &str, values: Vec<String>) -> Self {
        Self {
            kind: kind.to_string(),
            values,
            matching: TargetMatch::Exact,
        }
    }
}

pub trait TargetBuilder: Send + Sync {
    fn kind(&self) -> &str;

    fn matching(&self) -> TargetMatch {
        TargetMatch::Exact
    }

    /// Values for the current request; `None` when the builder does not
    /// apply to it.
    fn build(&self, request: &RequestContext) -> Option<Vec<String>>;

    /// Check a value an editor wants to store on a rule target.
    fn validate_value(&self, value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Target value must not be empty.".to_string());
        }
        Ok(())
    }
}

/// The built-in target kinds, in default registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetKind {
    Route,
    RoutePrefix,
    PathInfo,
    PathInfoPrefix,
    RequestUri,
    RequestUriPrefix,
}

impl TargetKind {
    pub const ALL: [TargetKind; 6] = [
        TargetKind::Route,
        TargetKind::RoutePrefix,
        TargetKind::PathInfo,
        TargetKind::PathInfoPrefix,
        TargetKind::RequestUri,
        TargetKind::RequestUriPrefix,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Route => "route",
            TargetKind::RoutePrefix => "route_prefix",
            TargetKind::PathInfo => "path_info",
            TargetKind::PathInfoPrefix => "path_info_prefix",
            TargetKind::RequestUri => "request_uri",
            TargetKind::RequestUriPrefix => "request_uri_prefix",
        }
    }

    fn matching(self) -> TargetMatch {
        match self {
            TargetKind::RoutePrefix | TargetKind::PathInfoPrefix | TargetKind::RequestUriPrefix => {
                TargetMatch::Prefix
            }
            _ => TargetMatch::Exact,
        }
    }

    fn is_path(self) -> bool {
        !matches!(self, TargetKind::Route | TargetKind::RoutePrefix)
    }
}

/// Built-in builder reading one request field.
#[derive(Debug, Clone, Copy)]
pub struct RequestTarget {
    kind: TargetKind,
}

impl RequestTarget {
    pub fn new(kind: TargetKind) -> Self {
        Self { kind }
    }
}

impl TargetBuilder for RequestTarget {
    fn kind(&self) -> &str {
        self.kind.as_str()
    }

    fn matching(&self) -> TargetMatch {
        self.kind.matching()
    }

    fn build(&self, request: &RequestContext) -> Option<Vec<String>> {
        let value = match self.kind {
            TargetKind::Route | TargetKind::RoutePrefix => request.route.as_ref(),
            TargetKind::PathInfo | TargetKind::PathInfoPrefix => request.path_info.as_ref(),
            TargetKind::RequestUri | TargetKind::RequestUriPrefix => request.request_uri.as_ref(),
        }?;
        Some(vec![value.clone()])
    }

    fn validate_value(&self, value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Target value must not be empty.".to_string());
        }
        if self.kind.is_path() && !value.starts_with('/') {
            return Err(format!(
                "Value of a \"{}\" target must start with \"/\".",
                self.kind.as_str()
            ));
        }
        Ok(())
    }
}

/// Target builders in resolution order.
#[derive(Clone, Default)]
pub struct TargetBuilderRegistry {
    builders: IndexMap<String, Arc<dyn TargetBuilder>>,
}

impl std::fmt::Debug for TargetBuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.builders.keys()).finish()
    }
}

impl TargetBuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind.
    pub fn with_defaults() -> Self {
        TargetKind::ALL
            .into_iter()
            .fold(Self::new(), |registry, kind| {
                registry.register(Arc::new(RequestTarget::new(kind)))
            })
    }

    /// Register a builder. Re-registering a kind keeps its original slot.
    pub fn register(mut self, builder: Arc<dyn TargetBuilder>) -> Self {
        self.builders.insert(builder.kind().to_string(), builder);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.builders.contains_key(kind)
    }

    pub fn get(&self, kind: &str) -> Result<&Arc<dyn TargetBuilder>, CoreError> {
        self.builders.get(kind).ok_or_else(|| {
            CoreError::Runtime(format!("No target builder for kind \"{kind}\"."))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TargetBuilder>> {
        self.builders.values()
    }

    /// Build the descriptor of one kind; `None` when the builder does not apply.
    pub fn build_target(
        &self,
        kind: &str,
        request: &RequestContext,
    ) -> Result<Option<Target>, CoreError> {
        let builder = self.get(kind)?;
        Ok(build_with(builder.as_ref(), request))
    }
}

pub(crate) fn build_with(builder: &dyn TargetBuilder, request: &RequestContext) -> Option<Target> {
    builder.build(request).map(|values| Target {
        kind: builder.kind().to_string(),
        values,
        matching: builder.matching(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn default_registry_order() {
        let registry = TargetBuilderRegistry::with_defaults();
        let kinds: Vec<&str> = registry.iter().map(|b| b.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "route",
                "route_prefix",
                "path_info",
                "path_info_prefix",
                "request_uri",
                "request_uri_prefix"
            ]
        );
    }

    #[test]
    fn route_builder_reads_route_name() {
        let request = RequestContext::new().with_route("article_view");
        let target = TargetBuilderRegistry::with_defaults()
            .build_target("route", &request)
            .unwrap()
            .unwrap();
        assert_eq!(target.values, vec!["article_view".to_string()]);
        assert_eq!(target.matching, TargetMatch::Exact);
    }

    #[test]
    fn prefix_builders_declare_prefix_matching() {
        let request = RequestContext::new().with_path_info("/blog/2026/post");
        let target = TargetBuilderRegistry::with_defaults()
            .build_target("path_info_prefix", &request)
            .unwrap()
            .unwrap();
        assert_eq!(target.matching, TargetMatch::Prefix);
    }

    #[test]
    fn builder_without_request_field_does_not_apply() {
        let request = RequestContext::new().with_route("home");
        assert_eq!(
            TargetBuilderRegistry::with_defaults()
                .build_target("request_uri", &request)
                .unwrap(),
            None
        );
    }

    #[test]
    fn unknown_kind_is_fatal() {
        let registry = TargetBuilderRegistry::with_defaults();
        assert_matches!(
            registry.build_target("content", &RequestContext::new()),
            Err(CoreError::Runtime(_))
        );
    }

    #[test]
    fn path_targets_require_leading_slash() {
        let builder = RequestTarget::new(TargetKind::PathInfo);
        assert!(builder.validate_value("/about").is_ok());
        assert!(builder.validate_value("about").is_err());
        assert!(RequestTarget::new(TargetKind::Route)
            .validate_value("about")
            .is_ok());
        assert!(RequestTarget::new(TargetKind::Route)
            .validate_value("  ")
            .is_err());
    }
}
