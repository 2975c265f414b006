//! Runs configured hooks before an action.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::controller::ActionContext;
use crate::error::{ActionErrorKind, GatewayError};
use crate::protocol::Flow;

use super::HookSpec;

/// A before-action hook. Returning `Err(Halt)` stops the request.
pub trait Hook: Send + Sync {
    fn run(&self, ctx: &ActionContext<'_>) -> Flow;
}

impl<F> Hook for F
where
    F: Fn(&ActionContext<'_>) -> Flow + Send + Sync,
{
    fn run(&self, ctx: &ActionContext<'_>) -> Flow {
        self(ctx)
    }
}

/// Wrap a closure as a shareable hook.
pub fn hook_fn<F>(f: F) -> Arc<dyn Hook>
where
    F: Fn(&ActionContext<'_>) -> Flow + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Named hooks available to configuration.
pub type HookRegistry = HashMap<String, Arc<dyn Hook>>;

/// Hooks resolved against a registry, in declaration order.
#[derive(Clone, Default)]
pub struct HookDispatcher {
    bound: Vec<(HookSpec, Arc<dyn Hook>)>,
}

impl HookDispatcher {
    /// Resolve every spec against `registry`. An unknown method name is an
    /// error.
    pub fn bind(specs: &[HookSpec], registry: &HookRegistry) -> Result<Self, GatewayError> {
        let bound = specs
            .iter()
            .map(|spec| {
                registry
                    .get(&spec.method)
                    .map(|hook| (spec.clone(), Arc::clone(hook)))
                    .ok_or_else(|| GatewayError::Action {
                        kind: ActionErrorKind::UnknownHook {
                            method: spec.method.clone(),
                        },
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { bound })
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Run applicable hooks in order, stopping at the first halt.
    pub fn dispatch(&self, ctx: &ActionContext<'_>) -> Flow {
        for (spec, hook) in &self.bound {
            if !spec.applies_to(ctx.action) {
                trace!(hook = %spec.method, action = ctx.action, "Hook skipped");
                continue;
            }

            debug!(hook = %spec.method, action = ctx.action, "Running hook");
            hook.run(ctx)?;
        }

        Ok(())
    }
}
