//! Action trait definition.

use crate::protocol::Flow;

use super::ActionContext;

/// A business endpoint behind the gateway.
///
/// An action answers by returning `Err(ctx.responder.success(..))` (or any
/// other [`Halt`](crate::protocol::Halt)); returning `Ok(())` yields an
/// empty 200 response.
///
/// # Example
///
/// ```ignore
/// pub struct ProfileAction;
///
/// impl Action for ProfileAction {
///     fn path(&self) -> &'static str {
///         "user/profile"
///     }
///
///     fn execute(&self, ctx: &ActionContext<'_>) -> Flow {
///         let user = ctx.user().unwrap_or_default();
///         Err(ctx.responder.success("ok", Some(serde_json::json!({"user": user}))))
///     }
/// }
/// ```
pub trait Action: Send + Sync {
    /// Routing path, `controller/action`, lowercase.
    fn path(&self) -> &'static str;

    /// Run the action.
    ///
    /// Note: This is called from a blocking context via `spawn_blocking`.
    fn execute(&self, ctx: &ActionContext<'_>) -> Flow;
}
