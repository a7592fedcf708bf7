//! Pooled per-request context.
//!
//! A [`Context`] carries one request/response pair through a handler
//! chain, along with the captured route parameters, optional user data
//! and a scratch buffer. Contexts are recycled through a [`ContextPool`]
//! so steady-state dispatch does not allocate.

use std::any::Any;

use md5::{Digest, Md5};
use parking_lot::Mutex;
use serde::Serialize;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use switchyard_http::{Method, Request, Response, StatusCode};

use crate::tree::{ParamSpan, RouteId, RouteTree};

/// Alphabet for [`Context::random_string`]: digits, then lowercase, then
/// uppercase letters.
const RANDOM_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Per-request state handed to every handler in a chain.
pub struct Context {
    request: Request,
    response: Response,
    params: Vec<ParamSpan>,
    data: Option<Box<dyn Any + Send>>,
    buffer: Vec<u8>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a fresh context with a placeholder request.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request: Request::new(Method::Get, "/"),
            response: Response::new(),
            params: Vec::new(),
            data: None,
            buffer: Vec::new(),
        }
    }

    /// Load a request, clearing all per-request state.
    ///
    /// Capture-list and buffer capacity is retained across reuse.
    pub(crate) fn begin(&mut self, request: Request) {
        self.request = request;
        self.response.reset();
        self.params.clear();
        self.data = None;
        self.buffer.clear();
    }

    /// Take the finished response out of the context.
    pub(crate) fn finish(&mut self) -> Response {
        std::mem::take(&mut self.response)
    }

    /// Match this context's request path against a tree, recording
    /// captures.
    pub(crate) fn match_against(&mut self, tree: &RouteTree) -> Option<RouteId> {
        let Self {
            request, params, ..
        } = self;
        tree.lookup(request.path(), params)
    }

    /// The request being handled.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Mutable access to the request.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The response under construction.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the response.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Number of captured route parameters.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// A captured parameter value, in left-to-right pattern order.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&str> {
        let &(start, end) = self.params.get(index)?;
        self.request.path().get(start..end)
    }

    /// Iterate the captured parameter values in order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        let path = self.request.path();
        self.params
            .iter()
            .filter_map(move |&(start, end)| path.get(start..end))
    }

    /// User data kept alive for the rest of the chain.
    #[must_use]
    pub fn data(&self) -> Option<&(dyn Any + Send)> {
        self.data.as_deref()
    }

    /// Store user data, replacing any previous value.
    pub fn set_data(&mut self, data: impl Any + Send) {
        self.data = Some(Box::new(data));
    }

    /// Downcast the stored user data.
    #[must_use]
    pub fn data_as<T: Any>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref()
    }

    /// The scratch buffer; cleared between requests.
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    /// Serialize `value` as the JSON response body with the given status.
    ///
    /// # Errors
    ///
    /// Returns the serialization error; the response is left untouched
    /// in that case.
    pub fn write_json<T: Serialize>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> serde_json::Result<()> {
        let body = serde_json::to_vec(value)?;
        self.response.set_status(status);
        self.response
            .headers_mut()
            .insert("content-type", b"application/json".to_vec());
        self.response.set_body(body);
        Ok(())
    }

    /// Write an HTML response body with the given status.
    pub fn write_html(&mut self, status: StatusCode, text: &str) {
        self.response.set_status(status);
        self.response
            .headers_mut()
            .insert("content-type", b"text/html; charset=utf-8".to_vec());
        self.response.set_body(text.as_bytes().to_vec());
    }

    /// The bearer token from the `Authorization` header, if present.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.request
            .headers()
            .get_str("authorization")?
            .strip_prefix("Bearer ")
    }

    /// Parse pagination query parameters into `query`.
    ///
    /// Recognized parameters: `order`, `sort`, `begin`, `total`; absent
    /// ones leave the corresponding field unchanged.
    ///
    /// # Errors
    ///
    /// Returns the name of the first numeric parameter that failed to
    /// parse.
    pub fn parse_page_query(&self, query: &mut PageQuery) -> Result<(), &'static str> {
        if let Some(order) = self.request.query_value("order") {
            if !order.is_empty() {
                query.order = order.to_owned();
            }
        }
        if let Some(sort) = self.request.query_value("sort") {
            if !sort.is_empty() {
                query.sort = sort.to_owned();
            }
        }
        if let Some(begin) = self.request.query_value("begin") {
            if !begin.is_empty() {
                query.begin = begin.parse().map_err(|_| "begin")?;
            }
        }
        if let Some(total) = self.request.query_value("total") {
            if !total.is_empty() {
                query.total = total.parse().map_err(|_| "total")?;
            }
        }
        Ok(())
    }

    /// A random string of `n` characters from `[0-9a-zA-Z]`.
    #[must_use]
    pub fn random_string(&self, n: usize) -> String {
        random_from(RANDOM_ALPHABET, n)
    }

    /// A random string of `n` decimal digits.
    #[must_use]
    pub fn random_digits(&self, n: usize) -> String {
        random_from(&RANDOM_ALPHABET[..10], n)
    }

    /// Hex-encoded MD5 digest of `s`.
    #[must_use]
    pub fn md5_hex(&self, s: &str) -> String {
        hex::encode(Md5::digest(s.as_bytes()))
    }

    /// Hex-encoded SHA-1 digest of `s`.
    #[must_use]
    pub fn sha1_hex(&self, s: &str) -> String {
        hex::encode(Sha1::digest(s.as_bytes()))
    }

    /// Hex-encoded SHA-256 digest of `s`.
    #[must_use]
    pub fn sha256_hex(&self, s: &str) -> String {
        hex::encode(Sha256::digest(s.as_bytes()))
    }

    /// Hex-encoded SHA-512 digest of `s`.
    #[must_use]
    pub fn sha512_hex(&self, s: &str) -> String {
        hex::encode(Sha512::digest(s.as_bytes()))
    }
}

fn random_from(alphabet: &[u8], n: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
        .collect()
}

/// Pagination conditions parsed from the query string.
///
/// `"/users?order=id&sort=desc&begin=1&total=10"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageQuery {
    /// Field name used to sort the data.
    pub order: String,
    /// `asc` or `desc`.
    pub sort: String,
    /// Offset of the first row.
    pub begin: i64,
    /// Number of rows requested.
    pub total: i64,
}

/// JSON envelope for a page of results.
#[derive(Debug, Clone, Serialize)]
pub struct PageData<T> {
    /// Total number of rows available.
    pub total: i64,
    /// The rows of this page.
    pub data: T,
}

/// LIFO free-list of contexts shared by a router's workers.
pub struct ContextPool {
    stack: Mutex<Vec<Context>>,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
        }
    }

    /// Pop a recycled context, or create a fresh one.
    #[must_use]
    pub fn get(&self) -> Context {
        self.stack.lock().pop().unwrap_or_default()
    }

    /// Return a context for reuse.
    pub fn put(&self, ctx: Context) {
        self.stack.lock().push(ctx);
    }

    /// Number of idle contexts in the pool.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.stack.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_slice_the_request_path() {
        let mut ctx = Context::new();
        ctx.begin(Request::new(Method::Get, "/users/42/posts/7"));
        let mut tree = RouteTree::new();
        tree.insert("/users/:/posts/:").unwrap();
        assert!(ctx.match_against(&tree).is_some());

        assert_eq!(ctx.param_count(), 2);
        assert_eq!(ctx.param(0), Some("42"));
        assert_eq!(ctx.param(1), Some("7"));
        assert_eq!(ctx.param(2), None);
        assert_eq!(ctx.params().collect::<Vec<_>>(), vec!["42", "7"]);
    }

    #[test]
    fn begin_clears_previous_request_state() {
        let mut ctx = Context::new();
        ctx.begin(Request::new(Method::Get, "/a/1"));
        let mut tree = RouteTree::new();
        tree.insert("/a/:").unwrap();
        assert!(ctx.match_against(&tree).is_some());
        ctx.set_data(7_u32);
        ctx.buffer_mut().extend_from_slice(b"scratch");
        ctx.response_mut().set_status(StatusCode::NOT_FOUND);

        ctx.begin(Request::new(Method::Get, "/b"));
        assert_eq!(ctx.param_count(), 0);
        assert!(ctx.data().is_none());
        assert_eq!(ctx.response().status(), StatusCode::OK);
    }

    #[test]
    fn data_downcasts() {
        let mut ctx = Context::new();
        ctx.set_data(String::from("session"));
        assert_eq!(ctx.data_as::<String>().map(String::as_str), Some("session"));
        assert!(ctx.data_as::<u32>().is_none());
    }

    #[test]
    fn write_json_sets_status_and_body() {
        let mut ctx = Context::new();
        ctx.write_json(StatusCode::OK, &json!({"n": 1})).unwrap();
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().body(), br#"{"n":1}"#);
        assert_eq!(
            ctx.response().headers().get_str("content-type"),
            Some("application/json")
        );
    }

    #[test]
    fn write_html_sets_content_type() {
        let mut ctx = Context::new();
        ctx.write_html(StatusCode::NOT_FOUND, "<h1>404</h1>");
        assert_eq!(ctx.response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ctx.response().headers().get_str("content-type"),
            Some("text/html; charset=utf-8")
        );
    }

    #[test]
    fn bearer_token_requires_scheme_prefix() {
        let mut ctx = Context::new();
        ctx.begin(Request::new(Method::Get, "/").header("Authorization", b"Bearer abc".to_vec()));
        assert_eq!(ctx.bearer_token(), Some("abc"));

        ctx.begin(Request::new(Method::Get, "/").header("Authorization", b"Basic abc".to_vec()));
        assert_eq!(ctx.bearer_token(), None);

        ctx.begin(Request::new(Method::Get, "/"));
        assert_eq!(ctx.bearer_token(), None);
    }

    #[test]
    fn page_query_parses_known_fields() {
        let mut ctx = Context::new();
        ctx.begin(Request::new(
            Method::Get,
            "/users?order=id&sort=desc&begin=1&total=10",
        ));
        let mut query = PageQuery::default();
        ctx.parse_page_query(&mut query).unwrap();
        assert_eq!(query.order, "id");
        assert_eq!(query.sort, "desc");
        assert_eq!(query.begin, 1);
        assert_eq!(query.total, 10);
    }

    #[test]
    fn page_query_names_the_bad_field() {
        let mut ctx = Context::new();
        ctx.begin(Request::new(Method::Get, "/users?begin=x"));
        let mut query = PageQuery::default();
        assert_eq!(ctx.parse_page_query(&mut query), Err("begin"));

        ctx.begin(Request::new(Method::Get, "/users?total=1e3"));
        assert_eq!(ctx.parse_page_query(&mut query), Err("total"));
    }

    #[test]
    fn page_query_leaves_absent_fields_alone() {
        let mut ctx = Context::new();
        ctx.begin(Request::new(Method::Get, "/users?sort=asc"));
        let mut query = PageQuery {
            order: "id".to_owned(),
            sort: "desc".to_owned(),
            begin: 5,
            total: 20,
        };
        ctx.parse_page_query(&mut query).unwrap();
        assert_eq!(query.order, "id");
        assert_eq!(query.sort, "asc");
        assert_eq!(query.begin, 5);
    }

    #[test]
    fn page_data_serializes_flat() {
        let page = PageData {
            total: 2,
            data: vec!["a", "b"],
        };
        assert_eq!(
            serde_json::to_string(&page).unwrap(),
            r#"{"total":2,"data":["a","b"]}"#
        );
    }

    #[test]
    fn random_strings_have_requested_length_and_alphabet() {
        let ctx = Context::new();
        let s = ctx.random_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.bytes().all(|b| RANDOM_ALPHABET.contains(&b)));

        let d = ctx.random_digits(16);
        assert_eq!(d.len(), 16);
        assert!(d.bytes().all(|b| b.is_ascii_digit()));

        assert_eq!(ctx.random_string(0), "");
    }

    #[test]
    fn digest_helpers_match_known_vectors() {
        let ctx = Context::new();
        assert_eq!(ctx.md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(ctx.sha1_hex(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(
            ctx.sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            ctx.sha512_hex(""),
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
             47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        );
    }

    #[test]
    fn pool_recycles_lifo() {
        let pool = ContextPool::new();
        assert_eq!(pool.idle(), 0);
        let mut ctx = pool.get();
        ctx.set_data(1_u8);
        pool.put(ctx);
        assert_eq!(pool.idle(), 1);

        // Reuse hands back the same context; begin() wipes it.
        let mut ctx = pool.get();
        assert_eq!(pool.idle(), 0);
        ctx.begin(Request::new(Method::Get, "/"));
        assert!(ctx.data().is_none());
    }
}
