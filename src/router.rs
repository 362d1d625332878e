//! Radix-tree request router with host scoping.
//!
//! One matchit tree per method, plus one tree for method-agnostic routes, per
//! host scope. Lookup walks from the most specific table to the least:
//!
//! ```text
//! host-scoped  METHOD tree → host-scoped  any tree
//!   → any-host METHOD tree → any-host any tree → fallback → 404
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};

/// Route table for one host scope.
///
/// Obtained inside [`Router::host`]; the top-level [`Router`] forwards its own
/// `on` / `any` calls to the table that matches every host.
#[derive(Default)]
pub struct Routes {
    by_method: HashMap<Method, MatchitRouter<BoxedHandler>>,
    any: MatchitRouter<BoxedHandler>,
}

impl Routes {
    /// Register a handler for a method + path pair.
    ///
    /// # Panics
    ///
    /// Panics if `path` is malformed or conflicts with an existing route.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        insert(self.by_method.entry(method).or_default(), path, handler);
        self
    }

    /// Register a handler for `path` regardless of method.
    pub fn any(mut self, path: &str, handler: impl Handler) -> Self {
        insert(&mut self.any, path, handler);
        self
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let matched = self
            .by_method
            .get(method)
            .and_then(|tree| tree.at(path).ok())
            .or_else(|| self.any.at(path).ok())?;

        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((Arc::clone(matched.value), params))
    }
}

fn insert(tree: &mut MatchitRouter<BoxedHandler>, path: &str, handler: impl Handler) {
    tree.insert(path, handler.into_boxed_handler())
        .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
}

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Path parameters use `{name}` syntax, catch-alls `{*name}`:
///
/// ```rust,no_run
/// # use baton::{Accumulator, Chain, Method, Request, Response, Router};
/// # async fn home(_: Request) -> Response { Response::text("") }
/// # fn authcheck(_: &Request, _: &mut Accumulator) {}
/// # fn sal_order(_: &Request, _: &mut Accumulator) {}
/// # fn not_found(_: &Request, _: &mut Accumulator) {}
/// Router::new()
///     .on(Method::GET, "/", home)
///     .host("erp.local", |routes| {
///         routes.any("/SalOrder/{IDSalOrder}", Chain::new().step(authcheck).step(sal_order))
///     })
///     .fallback(Chain::new().step(not_found));
/// ```
#[derive(Default)]
pub struct Router {
    hosts: HashMap<String, Routes>,
    any_host: Routes,
    fallback: Option<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair on every host.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.any_host = self.any_host.on(method, path, handler);
        self
    }

    /// Register a handler for `path` on every host, regardless of method.
    pub fn any(mut self, path: &str, handler: impl Handler) -> Self {
        self.any_host = self.any_host.any(path, handler);
        self
    }

    /// Register routes that only match requests for `host` (compared without
    /// port, case-insensitively). Calling it twice for the same host adds to
    /// the same table.
    pub fn host(mut self, host: &str, build: impl FnOnce(Routes) -> Routes) -> Self {
        let key = host.to_ascii_lowercase();
        let routes = self.hosts.remove(&key).unwrap_or_default();
        self.hosts.insert(key, build(routes));
        self
    }

    /// Handler for requests no route matches. Without one they get `404`.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = Some(handler.into_boxed_handler());
        self
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        host: Option<&str>,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let scoped = host.and_then(|h| self.hosts.get(&h.to_ascii_lowercase()));

        scoped
            .into_iter()
            .chain(std::iter::once(&self.any_host))
            .find_map(|routes| routes.lookup(method, path))
            .or_else(|| {
                self.fallback
                    .as_ref()
                    .map(|handler| (Arc::clone(handler), HashMap::new()))
            })
    }
}
