//! Inbound request type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the token parameter, header and cookie.
pub const TOKEN_FIELD: &str = "token";

/// A request as seen by the gateway: routing target plus parameter bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundRequest {
    /// Controller name; dots denote nesting (`admin.user`).
    pub controller: String,

    /// Action name within the controller.
    pub action: String,

    /// Query and body parameters merged.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request cookies.
    #[serde(default)]
    pub cookies: HashMap<String, String>,
}

impl InboundRequest {
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            ..Self::default()
        }
    }

    /// Add a parameter (builder pattern).
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replace all parameters (builder pattern).
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Add a header (builder pattern).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a cookie (builder pattern).
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Lowercased action name.
    pub fn action_name(&self) -> String {
        self.action.to_lowercase()
    }

    /// Permission path: `controller/action`, lowercased, with controller
    /// dots turned into slashes.
    pub fn path(&self) -> String {
        format!(
            "{}/{}",
            self.controller.to_lowercase().replace('.', "/"),
            self.action_name()
        )
    }

    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// String view of a parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// The session token. A `token` header wins over a `token` parameter,
    /// which wins over a `token` cookie. Presence decides, not emptiness.
    pub fn token(&self) -> Option<String> {
        if let Some(value) = self.header(TOKEN_FIELD) {
            return Some(value.to_string());
        }
        if let Some(value) = self.params.get(TOKEN_FIELD) {
            return Some(match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            });
        }
        self.cookies.get(TOKEN_FIELD).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_normalization() {
        let request = InboundRequest::new("Admin.User", "Profile");
        assert_eq!(request.path(), "admin/user/profile");
        assert_eq!(request.action_name(), "profile");
    }

    #[test]
    fn test_token_precedence() {
        let request = InboundRequest::new("index", "echo")
            .with_cookie("token", "from-cookie")
            .with_param("token", "from-param")
            .with_header("Token", "from-header");
        assert_eq!(request.token().as_deref(), Some("from-header"));

        let request = InboundRequest::new("index", "echo")
            .with_cookie("token", "from-cookie")
            .with_param("token", "from-param");
        assert_eq!(request.token().as_deref(), Some("from-param"));

        let request = InboundRequest::new("index", "echo").with_cookie("token", "from-cookie");
        assert_eq!(request.token().as_deref(), Some("from-cookie"));

        assert_eq!(InboundRequest::new("index", "echo").token(), None);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: InboundRequest = serde_json::from_value(json!({
            "controller": "index",
            "action": "ping",
        }))
        .unwrap();

        assert!(request.params.is_empty());
        assert!(request.headers.is_empty());
        assert!(request.cookies.is_empty());
    }
}
