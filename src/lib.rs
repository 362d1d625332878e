//! # baton
//!
//! Buffered request bodies and short-circuiting handler chains on hyper.
//!
//! A request comes in, its body is read once into a [`RawBody`], and a
//! [`Chain`] of small synchronous [`Step`]s runs against it. Every step
//! shares one [`Accumulator`]: it can add output fields, or report an error
//! that stops the chain right after it. Whatever the accumulator holds at the
//! end is the JSON response.
//!
//! ```text
//! request ─▶ Router ─▶ RawBody::capture ─▶ step 1 ─▶ step 2 ─▶ … ─▶ Accumulator ─▶ gzip? ─▶ response
//!                                             │ error     │ error
//!                                             └───────────┴──────────▶ Accumulator ─▶ …
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use baton::{Accumulator, Chain, Method, Request, Router, Server, StatusCode};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Person {
//!     #[serde(rename = "Name")]
//!     name: String,
//! }
//!
//! fn authcheck(req: &Request, acc: &mut Accumulator) {
//!     if req.header("authorization").is_none() {
//!         acc.set_status(StatusCode::UNAUTHORIZED);
//!         acc.add_error("You do not have the permission");
//!     }
//! }
//!
//! fn greet(req: &Request, acc: &mut Accumulator) {
//!     // The body can be decoded by any number of steps.
//!     if let Some(person) = acc.report(req.body().decode_json::<Person>()) {
//!         acc.put_data("greeting", format!("hello {}", person.name));
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), baton::Error> {
//!     let app = Router::new()
//!         .on(Method::POST, "/greet", Chain::new().step(authcheck).step(greet));
//!
//!     Server::bind("0.0.0.0:8080")?.serve(app).await
//! }
//! ```

mod accumulator;
mod body;
mod chain;
mod config;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod compression;
pub mod files;

pub use accumulator::Accumulator;
pub use body::{RawBody, buffer};
pub use chain::{Chain, Step};
pub use compression::{CompressionConfig, Encoding};
pub use config::Config;
pub use error::{DecodeError, Error};
pub use handler::Handler;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Router, Routes};
pub use server::Server;

pub use http::{Method, StatusCode};
