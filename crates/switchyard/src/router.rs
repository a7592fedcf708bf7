//! Method and path dispatchers.
//!
//! [`MethodRouter`] keeps one dispatch tree per HTTP method and is the
//! usual front door for applications. [`PathRouter`] keeps a single tree
//! and ignores the method, which suits gateway-style forwarding.
//!
//! Both drive the same chain order per request: the before chain, then
//! the matched route's chain (or the not-found chain), then the after
//! chain. Each chain stops at the first handler returning `false`; a
//! `false` from a before handler skips matching entirely and goes
//! straight to the after chain.
//!
//! Registration and removal are not safe against in-flight dispatch;
//! build routes up front or serialize mutations externally.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use switchyard_http::{Method, Request, Response};

use crate::context::{Context, ContextPool};
use crate::error::{FileTreeError, RouteError};
use crate::files::{CacheHandler, FileHandler};
use crate::handler::{run_chain, Handler, HandlerChain};
use crate::pattern::clean;
use crate::tree::{RouteId, RouteTree};

/// Router dispatching on HTTP method and URL path.
///
/// ```
/// use switchyard::{handler, MethodRouter};
/// use switchyard_http::{Method, Request, StatusCode};
///
/// let mut router = MethodRouter::new();
/// router
///     .add_get("/hello/:", [handler(|ctx| {
///         let name = ctx.param(0).unwrap_or("world").to_owned();
///         ctx.write_html(StatusCode::OK, &format!("hi {name}"));
///         true
///     })])
///     .unwrap();
///
/// let response = router.serve(Request::new(Method::Get, "/hello/ada"));
/// assert_eq!(response.body(), b"hi ada");
/// ```
pub struct MethodRouter {
    trees: [RouteTree; Method::COUNT],
    before: HandlerChain,
    not_found: HandlerChain,
    after: HandlerChain,
    pool: ContextPool,
}

impl Default for MethodRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRouter {
    /// Create a router with nine empty dispatch trees.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trees: std::array::from_fn(|_| RouteTree::new()),
            before: Vec::new(),
            not_found: Vec::new(),
            after: Vec::new(),
            pool: ContextPool::new(),
        }
    }

    /// Replace the chain run before matching.
    pub fn set_before(&mut self, chain: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.before = chain.into_iter().collect();
    }

    /// Replace the chain run when no route matches.
    pub fn set_not_found(&mut self, chain: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.not_found = chain.into_iter().collect();
    }

    /// Replace the chain run after the match phase.
    pub fn set_after(&mut self, chain: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.after = chain.into_iter().collect();
    }

    /// Register a handler chain for `(method, pattern)`.
    ///
    /// The method string is resolved through [`Method::from_token`].
    /// Registering the same pattern again replaces its chain.
    ///
    /// # Errors
    ///
    /// Fails on an unrecognized method or an invalid pattern; the tree
    /// is left untouched on failure.
    pub fn add(
        &mut self,
        method: &str,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        let method = Method::from_token(method).ok_or_else(|| RouteError::invalid_method(method))?;
        self.add_to(method, pattern, handlers)
    }

    /// Register a GET route.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add_get(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        self.add_to(Method::Get, pattern, handlers)
    }

    /// Register a HEAD route.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add_head(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        self.add_to(Method::Head, pattern, handlers)
    }

    /// Register a POST route.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add_post(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        self.add_to(Method::Post, pattern, handlers)
    }

    /// Register a PUT route.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add_put(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        self.add_to(Method::Put, pattern, handlers)
    }

    /// Register a PATCH route.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add_patch(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        self.add_to(Method::Patch, pattern, handlers)
    }

    /// Register a DELETE route.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add_delete(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        self.add_to(Method::Delete, pattern, handlers)
    }

    /// Register a CONNECT route.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add_connect(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        self.add_to(Method::Connect, pattern, handlers)
    }

    /// Register an OPTIONS route.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add_options(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        self.add_to(Method::Options, pattern, handlers)
    }

    /// Register a TRACE route.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add_trace(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        self.add_to(Method::Trace, pattern, handlers)
    }

    fn add_to(
        &mut self,
        method: Method,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        let tree = &mut self.trees[method.index()];
        let id = tree.insert(pattern)?;
        *tree.chain_mut(id) = handlers.into_iter().collect();
        debug!(method = method.as_str(), pattern, "route registered");
        Ok(id)
    }

    /// Register every file under `file_path` as a route below `route`.
    ///
    /// A single file becomes one route; a directory is walked
    /// recursively. Extensions listed in `strip_extensions` (with or
    /// without the leading dot) are cut off the route, so `index.html`
    /// can be served as `index`. With `cache` set, file contents are
    /// loaded now and served from memory by [`CacheHandler`]; otherwise
    /// [`FileHandler`] reads from disk per request.
    ///
    /// # Errors
    ///
    /// Fails on filesystem errors or when a generated route cannot be
    /// registered.
    pub fn add_file_tree(
        &mut self,
        method: &str,
        route: &str,
        file_path: impl AsRef<Path>,
        cache: bool,
        strip_extensions: &[&str],
    ) -> Result<(), FileTreeError> {
        let method =
            Method::from_token(method).ok_or_else(|| RouteError::invalid_method(method))?;
        self.add_file_tree_inner(method, route, file_path.as_ref(), cache, strip_extensions)
    }

    fn add_file_tree_inner(
        &mut self,
        method: Method,
        route: &str,
        file_path: &Path,
        cache: bool,
        strip_extensions: &[&str],
    ) -> Result<(), FileTreeError> {
        let metadata = std::fs::metadata(file_path)?;
        if !metadata.is_dir() {
            let mut route = route;
            for ext in strip_extensions {
                if ext.is_empty() {
                    continue;
                }
                let suffix = ext.strip_prefix('.').unwrap_or(ext);
                if let Some(stripped) = route
                    .strip_suffix(suffix)
                    .and_then(|r| r.strip_suffix('.'))
                {
                    route = stripped;
                }
            }
            if cache {
                let handler = CacheHandler::from_file(file_path)?;
                self.add_to(method, route, [Arc::new(handler) as Arc<dyn Handler>])?;
            } else {
                let handler = FileHandler::new(file_path);
                self.add_to(method, route, [Arc::new(handler) as Arc<dyn Handler>])?;
            }
            return Ok(());
        }
        for entry in std::fs::read_dir(file_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let child_route = clean(&format!("{route}/{name}"));
            self.add_file_tree_inner(
                method,
                &child_route,
                &entry.path(),
                cache,
                strip_extensions,
            )?;
        }
        Ok(())
    }

    /// Look up the terminal node registered for `(method, pattern)`.
    #[must_use]
    pub fn route(&self, method: &str, pattern: &str) -> Option<RouteId> {
        let method = Method::from_token(method)?;
        self.trees[method.index()].find(pattern)
    }

    /// Remove `(method, pattern)`. Returns `false` if it was not
    /// registered or the method is unrecognized.
    pub fn remove(&mut self, method: &str, pattern: &str) -> bool {
        let Some(method) = Method::from_token(method) else {
            return false;
        };
        let removed = self.trees[method.index()].remove(pattern);
        if removed {
            debug!(method = method.as_str(), pattern, "route removed");
        }
        removed
    }

    /// The dispatch tree for `method`.
    #[must_use]
    pub fn tree(&self, method: Method) -> &RouteTree {
        &self.trees[method.index()]
    }

    /// Mutable access to the dispatch tree for `method`.
    ///
    /// Used together with the [`RouteId`] returned by registration to
    /// replace a route's handlers in place.
    pub fn tree_mut(&mut self, method: Method) -> &mut RouteTree {
        &mut self.trees[method.index()]
    }

    /// Dispatch one request through the hook and handler chains.
    #[must_use]
    pub fn serve(&self, request: Request) -> Response {
        let mut ctx = self.pool.get();
        ctx.begin(request);
        if run_chain(&self.before, &mut ctx) {
            let tree = &self.trees[ctx.request().method().index()];
            serve_match_phase(tree, &self.not_found, &mut ctx);
        }
        run_chain(&self.after, &mut ctx);
        let response = ctx.finish();
        self.pool.put(ctx);
        response
    }
}

/// Router dispatching on URL path only.
///
/// Holds a single tree shared by all methods; everything else works
/// like [`MethodRouter`].
pub struct PathRouter {
    tree: RouteTree,
    before: HandlerChain,
    not_found: HandlerChain,
    after: HandlerChain,
    pool: ContextPool,
}

impl Default for PathRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl PathRouter {
    /// Create a router with one empty dispatch tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: RouteTree::new(),
            before: Vec::new(),
            not_found: Vec::new(),
            after: Vec::new(),
            pool: ContextPool::new(),
        }
    }

    /// Replace the chain run before matching.
    pub fn set_before(&mut self, chain: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.before = chain.into_iter().collect();
    }

    /// Replace the chain run when no route matches.
    pub fn set_not_found(&mut self, chain: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.not_found = chain.into_iter().collect();
    }

    /// Replace the chain run after the match phase.
    pub fn set_after(&mut self, chain: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.after = chain.into_iter().collect();
    }

    /// Register a handler chain for `pattern`, ignoring methods.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern; the tree is left untouched.
    pub fn add(
        &mut self,
        pattern: &str,
        handlers: impl IntoIterator<Item = Arc<dyn Handler>>,
    ) -> Result<RouteId, RouteError> {
        let id = self.tree.insert(pattern)?;
        *self.tree.chain_mut(id) = handlers.into_iter().collect();
        debug!(pattern, "route registered");
        Ok(id)
    }

    /// Look up the terminal node registered for `pattern`.
    #[must_use]
    pub fn route(&self, pattern: &str) -> Option<RouteId> {
        self.tree.find(pattern)
    }

    /// Remove `pattern`. Returns `false` if it was not registered.
    pub fn remove(&mut self, pattern: &str) -> bool {
        let removed = self.tree.remove(pattern);
        if removed {
            debug!(pattern, "route removed");
        }
        removed
    }

    /// The dispatch tree.
    #[must_use]
    pub fn tree(&self) -> &RouteTree {
        &self.tree
    }

    /// Mutable access to the dispatch tree.
    pub fn tree_mut(&mut self) -> &mut RouteTree {
        &mut self.tree
    }

    /// Dispatch one request through the hook and handler chains.
    #[must_use]
    pub fn serve(&self, request: Request) -> Response {
        let mut ctx = self.pool.get();
        ctx.begin(request);
        if run_chain(&self.before, &mut ctx) {
            serve_match_phase(&self.tree, &self.not_found, &mut ctx);
        }
        run_chain(&self.after, &mut ctx);
        let response = ctx.finish();
        self.pool.put(ctx);
        response
    }
}

/// Run the matched route's chain, or the not-found chain.
fn serve_match_phase(tree: &RouteTree, not_found: &[Arc<dyn Handler>], ctx: &mut Context) {
    let matched = ctx.match_against(tree);
    match matched {
        Some(id) if !tree.chain(id).is_empty() => {
            trace!(path = ctx.request().path(), pattern = tree.pattern(id), "matched");
            run_chain(tree.chain(id), ctx);
        }
        _ => {
            trace!(path = ctx.request().path(), "no route matched");
            run_chain(not_found, ctx);
        }
    }
}
