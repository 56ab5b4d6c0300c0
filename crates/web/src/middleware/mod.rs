//! Middleware: functions wrapping handlers.
//!
//! The effective handler of a route is composed once, at bind time:
//! engine middleware first, then group middleware (outer group first), then
//! route middleware, then the handler. Entry order follows registration
//! order; exit order is the reverse.

mod adapter;
mod logger;

pub use adapter::{raw_adapter, RawHandler, RawMiddleware};
pub use logger::RequestLogger;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::handler::{ArcHandler, Handler};

/// A unary function wrapping a handler. Implementations call
/// `next.run(ctx)` to continue the chain, or write a response and return
/// without calling it to short-circuit.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error>;
}

pub type ArcMiddleware = Arc<dyn Middleware>;

/// The remainder of a chain.
#[derive(Clone)]
pub struct Next {
    inner: ArcHandler,
}

impl Next {
    pub(crate) fn new(inner: ArcHandler) -> Self {
        Self { inner }
    }

    pub async fn run(&self, ctx: Context) -> Result<(), Error> {
        self.inner.handle(ctx).await
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Next")
    }
}

/// Middleware from an async closure: `from_fn(|ctx, next| async move { ... })`.
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    FnMiddleware { f }
}

pub struct FnMiddleware<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        (self.f)(ctx, next).await
    }
}

struct Wrapped {
    middleware: ArcMiddleware,
    next: Next,
}

#[async_trait]
impl Handler for Wrapped {
    async fn handle(&self, ctx: Context) -> Result<(), Error> {
        self.middleware.handle(ctx, self.next.clone()).await
    }
}

/// Compose `middlewares` around `handler`, outermost first.
pub fn compose(middlewares: &[ArcMiddleware], handler: ArcHandler) -> ArcHandler {
    let mut composed = handler;
    for middleware in middlewares.iter().rev() {
        composed = Arc::new(Wrapped {
            middleware: Arc::clone(middleware),
            next: Next::new(composed),
        });
    }
    composed
}
