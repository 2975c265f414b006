//! Actions and hooks shipped with the gateway.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::hooks::{Hook, HookRegistry};
use crate::protocol::Flow;

use super::{Action, ActionContext};

/// Health check. Usually listed in `no_need_login`.
pub struct PingAction;

impl Action for PingAction {
    fn path(&self) -> &'static str {
        "index/ping"
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> Flow {
        Err(ctx.responder.success("pong", Some(json!({ "pong": true }))))
    }
}

/// Echoes the verified parameters back, minus the signature.
pub struct EchoAction {
    signature_field: String,
}

impl EchoAction {
    pub fn new(signature_field: impl Into<String>) -> Self {
        Self {
            signature_field: signature_field.into(),
        }
    }
}

impl Action for EchoAction {
    fn path(&self) -> &'static str {
        "index/echo"
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> Flow {
        let mut params = ctx.params().clone();
        params.remove(&self.signature_field);

        Err(ctx.responder.success(
            "ok",
            Some(json!({
                "user_id": ctx.user(),
                "params": Value::Object(params),
            })),
        ))
    }
}

/// Logs every action that reaches the hook stage.
pub struct LogActionHook;

impl Hook for LogActionHook {
    fn run(&self, ctx: &ActionContext<'_>) -> Flow {
        info!(
            path = ctx.path,
            user = ctx.user().unwrap_or("-"),
            params = ctx.params().len(),
            "Action invoked"
        );
        Ok(())
    }
}

/// Built-in actions.
pub fn builtin_actions(signature_field: &str) -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(PingAction),
        Arc::new(EchoAction::new(signature_field)),
    ]
}

/// Built-in hooks, keyed by the name used in `[[hooks]] method`.
pub fn builtin_hooks() -> HookRegistry {
    let mut hooks = HookRegistry::new();
    hooks.insert("log_action".to_string(), Arc::new(LogActionHook) as Arc<dyn Hook>);
    hooks
}
