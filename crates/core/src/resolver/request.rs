use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use crate::types::Timestamp;

/// The parts of an inbound request that targets and conditions look at.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub route: Option<String>,
    pub route_params: BTreeMap<String, String>,
    pub path_info: Option<String>,
    /// Path plus query string, as requested.
    pub request_uri: Option<String>,
    pub query: BTreeMap<String, String>,
    /// Set when the request is rendering an error page.
    pub status_code: Option<u16>,
    pub now: Timestamp,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            route: None,
            route_params: BTreeMap::new(),
            path_info: None,
            request_uri: None,
            query: BTreeMap::new(),
            status_code: None,
            now: Utc::now(),
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: &str) -> Self {
        self.route = Some(route.to_string());
        self
    }

    pub fn with_route_param(mut self, name: &str, value: &str) -> Self {
        self.route_params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_path_info(mut self, path: &str) -> Self {
        self.path_info = Some(path.to_string());
        self
    }

    pub fn with_request_uri(mut self, uri: &str) -> Self {
        self.request_uri = Some(uri.to_string());
        self
    }

    pub fn with_query_param(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn at(mut self, now: Timestamp) -> Self {
        self.now = now;
        self
    }
}
