//! Handler traits and function adapters.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;

/// A request handler: receives the context, writes its response through it,
/// and returns an error only for failures the framework should render.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: Context) -> Result<(), Error>;
}

pub type ArcHandler = Arc<dyn Handler>;

/// Wrap an async function or closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    FnHandler { f }
}

pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    async fn handle(&self, ctx: Context) -> Result<(), Error> {
        (self.f)(ctx).await
    }
}
