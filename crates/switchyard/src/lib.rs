//! Radix-tree HTTP router.
//!
//! Patterns mix literal segments, positional `:` parameters and a
//! trailing `*` catch-all:
//!
//! - `/users` matches byte for byte;
//! - `/users/:` captures one segment (a name after `:` is allowed and
//!   ignored — captures are positional);
//! - `/files/*` captures the whole remainder, slashes included.
//!
//! [`MethodRouter`] keeps one compressed prefix tree per HTTP method;
//! [`PathRouter`] keeps a single tree for gateway-style forwarding.
//! Matching walks the tree once, left to right, without allocating;
//! captured values are byte ranges into the request path, exposed
//! through [`Context::param`].
//!
//! # Example
//!
//! ```
//! use switchyard::{handler, MethodRouter};
//! use switchyard_http::{Method, Request, StatusCode};
//!
//! let mut router = MethodRouter::new();
//! router
//!     .add_get("/users/:", [handler(|ctx| {
//!         let id = ctx.param(0).unwrap_or("").to_owned();
//!         ctx.write_html(StatusCode::OK, &id);
//!         true
//!     })])
//!     .unwrap();
//!
//! let response = router.serve(Request::new(Method::Get, "/users/42"));
//! assert_eq!(response.body(), b"42");
//! ```
//!
//! Registration and removal are not safe against concurrent dispatch;
//! set routes up before serving, or guard the router with an external
//! read-write lock and mutate only while no requests are in flight.

#![warn(unsafe_code)]

mod context;
mod error;
mod files;
mod handler;
mod pattern;
mod router;
mod tree;

pub use context::{Context, ContextPool, PageData, PageQuery};
pub use error::{FileTreeError, RouteError};
pub use files::{CacheHandler, FileHandler};
pub use handler::{handler, Handler, HandlerChain};
pub use pattern::{clean, split_pattern, PatternToken};
pub use router::{MethodRouter, PathRouter};
pub use tree::{ParamSpan, RouteId, RouteTree};
