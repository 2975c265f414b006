//! Per-request state handed to hooks and actions.

use serde_json::{Map, Value};

use crate::auth::AuthSession;
use crate::protocol::{InboundRequest, Responder};

/// Everything a hook or action may look at once the request passed the
/// access checks and the gate.
pub struct ActionContext<'a> {
    /// The request with filtered parameters.
    pub request: &'a InboundRequest,
    /// Permission path, `controller/action`.
    pub path: &'a str,
    /// Lowercased action name.
    pub action: &'a str,
    pub auth: &'a dyn AuthSession,
    pub responder: &'a Responder,
}

impl ActionContext<'_> {
    pub fn params(&self) -> &Map<String, Value> {
        &self.request.params
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.request.param_str(key)
    }

    /// Identity of the logged-in user, if any.
    pub fn user(&self) -> Option<&str> {
        self.auth.identity()
    }
}
