//! In-memory token store.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::{AuthProvider, AuthSession};

/// One token and what it grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub user_id: String,
    /// Permission paths. `*` grants everything, `controller/*` grants every
    /// action of a controller.
    #[serde(default)]
    pub rules: Vec<String>,
}

/// Static token table loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct TokenAuth {
    grants: Arc<HashMap<String, TokenGrant>>,
}

impl TokenAuth {
    pub fn new(grants: impl IntoIterator<Item = TokenGrant>) -> Self {
        let grants = grants
            .into_iter()
            .map(|grant| (grant.token.clone(), grant))
            .collect();
        Self {
            grants: Arc::new(grants),
        }
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl AuthProvider for TokenAuth {
    fn session(&self) -> Box<dyn AuthSession> {
        Box::new(TokenSession {
            grants: Arc::clone(&self.grants),
            request_uri: String::new(),
            grant: None,
        })
    }
}

struct TokenSession {
    grants: Arc<HashMap<String, TokenGrant>>,
    request_uri: String,
    grant: Option<TokenGrant>,
}

impl AuthSession for TokenSession {
    fn set_request_uri(&mut self, path: &str) {
        self.request_uri = path.to_lowercase();
    }

    fn init(&mut self, token: &str) -> bool {
        self.grant = if token.is_empty() {
            None
        } else {
            self.grants.get(token).cloned()
        };
        if self.grant.is_none() && !token.is_empty() {
            debug!("Unknown session token");
        }
        self.grant.is_some()
    }

    fn is_login(&self) -> bool {
        self.grant.is_some()
    }

    fn matches(&self, patterns: &[String], path: Option<&str>) -> bool {
        let target = path.unwrap_or(self.request_uri.as_str()).to_lowercase();
        let action = target.rsplit('/').next().unwrap_or(target.as_str());

        patterns.iter().any(|pattern| {
            let pattern = pattern.trim().to_lowercase();
            pattern == "*" || pattern == action || pattern == target
        })
    }

    fn check(&self, path: &str) -> bool {
        let Some(grant) = &self.grant else {
            return false;
        };
        let path = path.to_lowercase();

        grant.rules.iter().any(|rule| {
            let rule = rule.trim().to_lowercase();
            match rule.strip_suffix('*') {
                Some("") => true,
                Some(prefix) if prefix.ends_with('/') => path.starts_with(prefix),
                _ => rule == path,
            }
        })
    }

    fn identity(&self) -> Option<&str> {
        self.grant.as_ref().map(|grant| grant.user_id.as_str())
    }
}
