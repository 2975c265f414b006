//! Before-action hooks.
//!
//! Hooks are declared by name with optional `only` / `except` action
//! filters and resolved against a [`HookRegistry`] at startup.

mod dispatcher;
mod spec;

pub use dispatcher::{hook_fn, Hook, HookDispatcher, HookRegistry};
pub use spec::{ActionList, HookFilter, HookOptions, HookSpec};
