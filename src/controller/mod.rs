//! Actions and the pipeline that guards them.

mod builtin;
mod context;
mod pipeline;
mod registry;
mod traits;

pub use builtin::{builtin_actions, builtin_hooks, EchoAction, LogActionHook, PingAction};
pub use context::ActionContext;
pub use pipeline::{AccessRules, ApiController, ApiControllerBuilder, ResponseSettings};
pub use registry::ActionRegistry;
pub use traits::Action;
