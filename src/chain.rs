//! Ordered, short-circuiting handler chains.
//!
//! A [`Chain`] is a list of [`Step`]s run one after another against a single
//! [`Accumulator`]:
//!
//! ```text
//! PENDING ──▶ RUNNING(0) ──ok──▶ RUNNING(1) ──ok──▶ … ──▶ DONE
//!                 │                  │
//!                 └──── error ───────┴──────────────────▶ DONE
//! ```
//!
//! After every step the chain checks [`Accumulator::err_count`]. The first
//! step to report an error is the last step to run; whatever earlier steps
//! wrote stays in the output.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::accumulator::Accumulator;
use crate::request::Request;

/// One unit of per-request logic.
///
/// Any `Fn(&Request, &mut Accumulator)` is a step. Implement the trait
/// directly when a step carries configuration:
///
/// ```rust
/// use baton::{Accumulator, Request, Step};
///
/// struct RequireHeader(&'static str);
///
/// impl Step for RequireHeader {
///     fn call(&self, req: &Request, acc: &mut Accumulator) {
///         if req.header(self.0).is_none() {
///             acc.add_error(format!("missing header {}", self.0));
///         }
///     }
/// }
/// ```
///
/// A step must not assume it is first or last in its chain.
pub trait Step: Send + Sync + 'static {
    fn call(&self, req: &Request, acc: &mut Accumulator);
}

impl<F> Step for F
where
    F: Fn(&Request, &mut Accumulator) + Send + Sync + 'static,
{
    fn call(&self, req: &Request, acc: &mut Accumulator) {
        self(req, acc)
    }
}

/// An ordered list of steps sharing one accumulator per request.
///
/// Build it once at startup and register it on the
/// [`Router`](crate::Router) like any other handler. Cloning shares the
/// steps.
#[derive(Clone, Default)]
pub struct Chain {
    steps: Vec<Arc<dyn Step>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step. Returns `self` for chaining.
    pub fn step(mut self, step: impl Step) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Puts a step in front of every existing one, e.g. an authorization
    /// check guarding the business steps.
    pub fn prepend(mut self, step: impl Step) -> Self {
        self.steps.insert(0, Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the steps against a fresh accumulator and returns it.
    ///
    /// Stops after the first step that leaves `err_count() > 0`; later steps
    /// are never called. An empty chain returns an untouched accumulator.
    pub fn run(&self, req: &Request) -> Accumulator {
        let mut acc = Accumulator::new();

        for (index, step) in self.steps.iter().enumerate() {
            trace!(index, path = req.path(), "running step");
            step.call(req, &mut acc);

            if acc.has_errors() {
                debug!(
                    index,
                    skipped = self.steps.len() - index - 1,
                    errors = acc.err_count(),
                    path = req.path(),
                    "chain short-circuited",
                );
                return acc;
            }
        }

        debug!(steps = self.steps.len(), path = req.path(), "chain completed");
        acc
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("steps", &self.steps.len()).finish()
    }
}
