//! End-to-end: a real server on an ephemeral port, driven over raw TCP.

use std::io::Read;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use baton::{Accumulator, Chain, Config, Method, Request, Response, Router, Server, StatusCode};
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Deserialize)]
struct Person {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct SalOrder {
    #[serde(rename = "DealerName")]
    dealer_name: String,
    #[serde(rename = "IDShipAddr")]
    id_ship_addr: i64,
    #[serde(rename = "Price")]
    price: f64,
}

fn authcheck(req: &Request, acc: &mut Accumulator) {
    if matches!(req.header("authorization"), Some("user2" | "user3")) {
        acc.set_status(StatusCode::FORBIDDEN);
        acc.add_error("You do not have the permission");
    }
}

fn sal_order(req: &Request, acc: &mut Accumulator) {
    if acc.report(req.body().decode_json::<SalOrder>()).is_some() {
        acc.put_data("IDSalOrder", req.param("IDSalOrder").unwrap_or_default());
    }
}

fn read_twice(req: &Request, acc: &mut Accumulator) {
    let Some(first) = acc.report(req.body().decode_json::<Person>()) else { return };
    let Some(second) = acc.report(req.body().decode_json::<Person>()) else { return };
    acc.put_data("first", first.name);
    acc.put_data("second", second.name);
}

fn long_news(_req: &Request, acc: &mut Accumulator) {
    acc.put_data("Body", "This is a Hello World message. ".repeat(100));
}

fn not_found(_req: &Request, acc: &mut Accumulator) {
    acc.set_status(StatusCode::NOT_FOUND);
    acc.add_error("404 page not found");
}

async fn home(_req: Request) -> Response {
    Response::html("<html><body>erp</body></html>")
}

fn app() -> Router {
    Router::new()
        .on(Method::GET, "/", home)
        .on(Method::POST, "/Example", Chain::new().step(read_twice))
        .on(Method::GET, "/Empty", Chain::new())
        .host("erp.local", |r| {
            r.any("/SalOrder/{IDSalOrder}", Chain::new().step(sal_order).prepend(authcheck))
                .any("/News", Chain::new().step(long_news))
        })
        .fallback(Chain::new().step(not_found))
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), baton::Error>>,
}

async fn start(router: Router) -> Running {
    start_with(router, Config::default()).await
}

async fn start_with(router: Router, config: Config) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let server = Server::new(config);
    let handle = tokio::spawn(server.serve_listener(listener, router, async move {
        let _ = stopped.await;
    }));

    Running { addr, stop, handle }
}

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn send(addr: SocketAddr, method: &str, path: &str, headers: &[(&str, &str)], body: &str) -> Reply {
    let mut raw = format!("{method} {path} HTTP/1.1\r\nconnection: close\r\ncontent-length: {}\r\n", body.len());
    if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("host")) {
        raw.push_str("host: localhost\r\n");
    }
    for (k, v) in headers {
        raw.push_str(&format!("{k}: {v}\r\n"));
    }
    raw.push_str("\r\n");
    raw.push_str(body);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    read_reply(&mut stream).await
}

async fn read_reply(stream: &mut TcpStream) -> Reply {
    let mut bytes = Vec::new();
    timeout(Duration::from_secs(10), stream.read_to_end(&mut bytes))
        .await
        .expect("no reply within 10s")
        .unwrap();

    let split = bytes.windows(4).position(|w| w == b"\r\n\r\n").expect("no header terminator");
    let head = String::from_utf8(bytes[..split].to_vec()).unwrap();
    let body = bytes[split + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status = lines.next().unwrap().split(' ').nth(1).unwrap().parse().unwrap();
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect();

    Reply { status, headers, body }
}

#[tokio::test]
async fn body_is_decoded_twice_by_one_step() {
    let server = start(app()).await;

    let reply = send(server.addr, "POST", "/Example", &[], r#"{"Name":"asdf2"}"#).await;
    assert_eq!(reply.status, 200);
    let json = reply.json();
    assert_eq!(json["data"]["first"], "asdf2");
    assert_eq!(json["data"]["second"], "asdf2");
    assert_eq!(json["err_count"], 0);
}

#[tokio::test]
async fn forbidden_user_short_circuits_before_business_step() {
    let server = start(app()).await;

    let reply = send(
        server.addr,
        "POST",
        "/SalOrder/42",
        &[("host", "erp.local"), ("authorization", "user2")],
        r#"{"DealerName":"acme","IDShipAddr":7,"Price":9.5}"#,
    )
    .await;

    assert_eq!(reply.status, 403);
    let json = reply.json();
    assert_eq!(json["errors"], serde_json::json!(["You do not have the permission"]));
    assert_eq!(json["err_count"], 1);
    assert_eq!(json["data"], serde_json::json!({}));
}

#[tokio::test]
async fn permitted_user_reaches_business_step() {
    let server = start(app()).await;

    let reply = send(
        server.addr,
        "POST",
        "/SalOrder/42",
        &[("host", "erp.local:8080"), ("authorization", "user1")],
        r#"{"DealerName":"acme","IDShipAddr":7,"Price":9.5}"#,
    )
    .await;

    assert_eq!(reply.status, 200);
    assert_eq!(reply.json()["data"]["IDSalOrder"], "42");
}

#[tokio::test]
async fn malformed_body_is_reported_not_fatal() {
    let server = start(app()).await;

    let reply = send(server.addr, "POST", "/Example", &[], "{not-json}").await;
    assert_eq!(reply.status, 400);
    let json = reply.json();
    assert_eq!(json["err_count"], 1);
    assert!(json["errors"][0].as_str().unwrap().starts_with("decode: "));

    // The server is still up.
    let reply = send(server.addr, "GET", "/", &[], "").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.header("content-type"), Some("text/html; charset=utf-8"));
}

#[tokio::test]
async fn empty_chain_returns_empty_accumulator() {
    let server = start(app()).await;

    let reply = send(server.addr, "GET", "/Empty", &[], "").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.json(), serde_json::json!({"data": {}, "errors": [], "err_count": 0}));
}

#[tokio::test]
async fn unmatched_paths_and_hosts_hit_the_fallback() {
    let server = start(app()).await;

    let reply = send(server.addr, "GET", "/News", &[("host", "elsewhere.local")], "").await;
    assert_eq!(reply.status, 404);
    assert_eq!(reply.json()["errors"][0], "404 page not found");
}

#[tokio::test]
async fn no_fallback_means_plain_404() {
    let server = start(Router::new()).await;

    let reply = send(server.addr, "GET", "/anything", &[], "").await;
    assert_eq!(reply.status, 404);
    assert_eq!(reply.json()["errors"][0], "404 page not found");
}

#[tokio::test]
async fn large_responses_are_gzipped_on_request() {
    let server = start(app()).await;
    let headers = [("host", "erp.local"), ("accept-encoding", "gzip")];

    let reply = send(server.addr, "GET", "/News", &headers, "").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.header("content-encoding"), Some("gzip"));

    let mut plain = String::new();
    GzDecoder::new(&reply.body[..]).read_to_string(&mut plain).unwrap();
    let json: Value = serde_json::from_str(&plain).unwrap();
    assert!(json["data"]["Body"].as_str().unwrap().starts_with("This is a Hello World"));

    let reply = send(server.addr, "GET", "/News", &[("host", "erp.local")], "").await;
    assert_eq!(reply.header("content-encoding"), None);
    assert_eq!(reply.json()["err_count"], 0);
}

#[tokio::test]
async fn shutdown_signal_stops_the_server() {
    let server = start(app()).await;
    let reply = send(server.addr, "GET", "/", &[], "").await;
    assert_eq!(reply.status, 200);

    server.stop.send(()).unwrap();
    server.handle.await.unwrap().unwrap();

    assert!(TcpStream::connect(server.addr).await.is_err());
}

/// Sends the head of a request that promises a 10-byte body, plus the first
/// few of those bytes.
async fn send_partial(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /Example HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\ncontent-length: 10\r\n\r\n{\"Na")
        .await
        .unwrap();
    stream
}

#[tokio::test]
async fn stalled_body_gets_request_timeout() {
    let config = Config { read_timeout_secs: 1, ..Config::default() };
    let server = start_with(app(), config).await;

    let started = Instant::now();
    let mut stream = send_partial(server.addr).await;
    let reply = read_reply(&mut stream).await;

    assert_eq!(reply.status, 408);
    assert_eq!(reply.json()["errors"], serde_json::json!(["request body timed out"]));
    assert_eq!(reply.json()["err_count"], 1);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn connection_cut_mid_body_gets_bad_request() {
    let server = start(app()).await;

    let mut stream = send_partial(server.addr).await;
    stream.shutdown().await.unwrap();
    let reply = read_reply(&mut stream).await;

    assert_eq!(reply.status, 400);
    assert_eq!(reply.json()["err_count"], 1);
    assert!(reply.json()["errors"][0].as_str().unwrap().starts_with("io: "));

    // The server is still up.
    let reply = send(server.addr, "POST", "/Example", &[], r#"{"Name":"asdf2"}"#).await;
    assert_eq!(reply.status, 200);
}

fn slow_step(_req: &Request, acc: &mut Accumulator) {
    std::thread::sleep(Duration::from_secs(3));
    acc.put_data("late", true);
}

async fn slow_page(_req: Request) -> Response {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Response::text("late")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_handlers_get_service_unavailable() {
    let router = Router::new()
        .on(Method::GET, "/chain", Chain::new().step(slow_step))
        .on(Method::GET, "/page", slow_page)
        .on(Method::GET, "/", home);
    let config = Config { write_timeout_secs: 1, ..Config::default() };
    let server = start_with(router, config).await;

    for path in ["/chain", "/page"] {
        let started = Instant::now();
        let reply = send(server.addr, "GET", path, &[], "").await;

        assert_eq!(reply.status, 503, "{path}");
        assert_eq!(reply.json()["errors"], serde_json::json!(["handler timed out"]));
        assert!(started.elapsed() < Duration::from_secs(3), "{path}");
    }

    // A blocked chain step does not hold up other requests.
    let started = Instant::now();
    let (slow, fast) = tokio::join!(
        send(server.addr, "GET", "/chain", &[], ""),
        send(server.addr, "GET", "/", &[], ""),
    );
    assert_eq!(slow.status, 503);
    assert_eq!(fast.status, 200);
    assert!(started.elapsed() < Duration::from_secs(3));
}
