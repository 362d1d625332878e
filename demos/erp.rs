//! A toy ERP front end: one HTML page, a guarded sales-order chain, a news
//! chain, a body re-read example and a not-found chain.
//!
//! Run with:
//!   RUST_LOG=info,baton=debug cargo run --example erp
//!
//! Optionally point `BATON_CONFIG` at a TOML file (see `baton::Config`) and
//! `BATON_STATIC_DIR` at the directory served under `/static/` (default
//! `demos/static`).
//!
//! Try:
//!   curl http://localhost:8080/
//!   curl http://localhost:8080/Example --data '{"Name":"asdf2"}'
//!   curl -H 'Host: erp.local' -H 'Authorization: user1' \
//!        http://localhost:8080/SalOrder/42 \
//!        --data '{"DealerName":"acme","IDShipAddr":7,"Price":9.5}'
//!   curl -H 'Host: erp.local' -H 'Authorization: user2' http://localhost:8080/SalOrder/42
//!   curl -H 'Host: erp.local' --compressed http://localhost:8080/News
//!   curl http://localhost:8080/static/debug.js

use baton::{Accumulator, Chain, Config, Method, Request, Response, Router, Server, StatusCode, Step, files};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), baton::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var_os("BATON_CONFIG") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let static_dir = std::env::var_os("BATON_STATIC_DIR").unwrap_or_else(|| "demos/static".into());
    info!(dir = ?static_dir, "serving static files");

    let app = Router::new()
        .on(Method::GET, "/", home)
        .any("/Example", unchecked(read_twice))
        .any("/static/{*path}", files::serve_dir(static_dir))
        .host("erp.local", |routes| {
            routes
                .any("/SalOrder/{IDSalOrder}", checked(sal_order))
                .any("/News", unchecked(news))
        })
        .fallback(unchecked(not_found));

    Server::new(config).serve(app).await
}

/// A chain with no authorization step.
fn unchecked(step: impl Step) -> Chain {
    Chain::new().step(step)
}

/// A chain that rejects unauthorized users before `step` runs.
fn checked(step: impl Step) -> Chain {
    unchecked(step).prepend(authenticate)
}

// GET / — not a chain, just a page.
async fn home(req: Request) -> Response {
    info!(host = req.host().unwrap_or(""), "home");
    Response::html(
        r#"<html>
  <head>
    <script src="https://code.jquery.com/jquery-2.x-git.min.js"></script>
    <script src="static/debug.js"></script>
  </head>
  <body>
    <select id="User">
      <option value="user1">User1</option>
      <option value="user2">User2</option>
      <option value="user3">User3</option>
    </select>
    <button id="SalOrderBtn">SalOrder</button>
    <button id="NewsBtn">News</button>
  </body>
</html>"#,
    )
}

fn authenticate(req: &Request, acc: &mut Accumulator) {
    let user = req.header("authorization").unwrap_or("");
    info!(user, "authorization");

    if matches!(user, "user2" | "user3") {
        acc.set_status(StatusCode::FORBIDDEN);
        acc.add_error("You do not have the permission");
    }
}

#[derive(Deserialize)]
struct SalOrder {
    #[serde(rename = "DealerName")]
    dealer_name: String,
    #[serde(rename = "IDShipAddr")]
    id_ship_addr: i64,
    #[serde(rename = "Price")]
    price: f64,
}

fn sal_order(req: &Request, acc: &mut Accumulator) {
    let Some(order) = acc.report(req.body().decode_json::<SalOrder>()) else { return };

    info!(
        dealer = %order.dealer_name,
        ship_addr = order.id_ship_addr,
        price = order.price,
        "sales order",
    );
    acc.put_data("IDSalOrder", req.param("IDSalOrder").unwrap_or_default());
}

#[derive(Serialize)]
struct News {
    #[serde(rename = "Subject")]
    subject: &'static str,
    #[serde(rename = "Author")]
    author: &'static str,
    #[serde(rename = "Body")]
    body: &'static str,
}

fn news(_req: &Request, acc: &mut Accumulator) {
    let item = News {
        subject: "Hello World",
        author: "Jun",
        body: "This is a Hello World message",
    };
    let merged = acc.put_obj(&item);
    acc.report(merged);
}

#[derive(Deserialize)]
struct Person {
    #[serde(rename = "Name")]
    name: String,
}

// The same body, decoded twice.
fn read_twice(req: &Request, acc: &mut Accumulator) {
    let Some(first) = acc.report(req.body().decode_json::<Person>()) else { return };
    let Some(second) = acc.report(req.body().decode_json::<Person>()) else { return };
    acc.put_data("First", first.name);
    acc.put_data("Second", second.name);
}

fn not_found(_req: &Request, acc: &mut Accumulator) {
    acc.set_status(StatusCode::NOT_FOUND);
    acc.add_error("404 page not found");
}
