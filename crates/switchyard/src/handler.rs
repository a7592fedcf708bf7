//! Handler chains.
//!
//! A handler receives the request context and returns `true` to let the
//! chain continue or `false` to stop it. Chains run strictly in
//! registration order.

use std::sync::Arc;

use crate::context::Context;

/// A request handler.
///
/// Implemented for any `Fn(&mut Context) -> bool` closure, and by the
/// file-serving handlers [`crate::FileHandler`] and
/// [`crate::CacheHandler`].
pub trait Handler: Send + Sync {
    /// Handle one request. Return `false` to stop the current chain.
    fn handle(&self, ctx: &mut Context) -> bool;
}

impl<F> Handler for F
where
    F: Fn(&mut Context) -> bool + Send + Sync,
{
    fn handle(&self, ctx: &mut Context) -> bool {
        self(ctx)
    }
}

/// An ordered list of handlers; non-empty on a terminal tree node.
pub type HandlerChain = Vec<Arc<dyn Handler>>;

/// Wrap a closure as a shareable handler.
pub fn handler<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(&mut Context) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Run a chain in order; stops at the first `false`.
///
/// Returns whether the chain ran to completion.
pub(crate) fn run_chain(chain: &[Arc<dyn Handler>], ctx: &mut Context) -> bool {
    for h in chain {
        if !h.handle(ctx) {
            return false;
        }
    }
    true
}
