//! Interface to the session/permission collaborator.

/// Per-request view of the session and permission store.
///
/// The gateway only asks it whether the current action needs a login and
/// whether the logged-in identity may call it; how tokens map to users and
/// rules is the implementation's business.
pub trait AuthSession: Send {
    /// Record the permission path of the current request.
    fn set_request_uri(&mut self, path: &str);

    /// Resolve `token` into a session. Returns whether a session was found.
    fn init(&mut self, token: &str) -> bool;

    /// Whether `init` found a session.
    fn is_login(&self) -> bool;

    /// Whether `path` (or the current request URI) is listed in `patterns`.
    fn matches(&self, patterns: &[String], path: Option<&str>) -> bool;

    /// Whether the logged-in identity may call `path`.
    fn check(&self, path: &str) -> bool;

    /// Identity of the logged-in user, if any.
    fn identity(&self) -> Option<&str> {
        None
    }
}

/// Factory for [`AuthSession`]s, shared across requests.
pub trait AuthProvider: Send + Sync {
    fn session(&self) -> Box<dyn AuthSession>;
}
