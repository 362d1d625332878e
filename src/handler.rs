//! Route handlers and type erasure.
//!
//! A route can point at two kinds of target:
//!
//! - a plain `async fn(Request) -> impl IntoResponse`, for endpoints that
//!   build their own response (an HTML page, a health probe), and
//! - a [`Chain`](crate::Chain) of synchronous steps sharing one
//!   [`Accumulator`](crate::Accumulator).
//!
//! The router stores both behind the same trait object:
//!
//! ```text
//! async fn home(req: Request) -> Response { … }   Chain::new().step(auth)
//!        ↓ router.on(GET, "/", home)                    ↓ router.on(POST, "/SalOrder/{id}", chain)
//! Arc::new(FnHandler(home))                       Arc::new(chain)
//!        ↘                                              ↙
//!              BoxedHandler = Arc<dyn ErasedHandler>
//!                         ↓  handler.call(req)
//!                      BoxFuture → Response
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::chain::Chain;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route target.
///
/// You never implement this yourself. It is satisfied by [`Chain`] and by any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// The trait is sealed via the private `Sealed` supertrait.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Async functions ───────────────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete async function to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

// ── Chains ────────────────────────────────────────────────────────────────────

impl private::Sealed for Chain {}

impl Handler for Chain {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

/// Steps are synchronous and may block, so the chain runs on tokio's
/// blocking pool. The work happens inside the returned future, which keeps
/// the server's write deadline in charge of it.
impl ErasedHandler for Chain {
    fn call(&self, req: Request) -> BoxFuture {
        let chain = self.clone();
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || chain.run(&req)).await {
                Ok(acc) => acc.into_response(),
                Err(e) => {
                    error!("chain task failed: {e}");
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        })
    }
}
