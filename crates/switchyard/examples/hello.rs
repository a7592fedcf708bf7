//! Minimal switchyard setup: a couple of routes, a parameter capture
//! and a not-found chain, exercised without a server in front.
//!
//! ```bash
//! cargo run --example hello
//! ```

use switchyard::{handler, MethodRouter};
use switchyard_http::{Method, Request, StatusCode};

fn main() {
    let mut router = MethodRouter::new();

    router
        .add_get("/", [handler(|ctx| {
            ctx.write_html(StatusCode::OK, "welcome");
            true
        })])
        .expect("register /");

    router
        .add_get("/hello/:", [handler(|ctx| {
            let name = ctx.param(0).unwrap_or("world").to_owned();
            ctx.write_html(StatusCode::OK, &format!("hello, {name}"));
            true
        })])
        .expect("register /hello/:");

    router.set_not_found([handler(|ctx| {
        ctx.write_html(StatusCode::NOT_FOUND, "no such page");
        true
    })]);

    for path in ["/", "/hello/ada", "/missing"] {
        let response = router.serve(Request::new(Method::Get, path));
        println!(
            "GET {path} -> {} {}",
            response.status(),
            String::from_utf8_lossy(response.body())
        );
    }
}
