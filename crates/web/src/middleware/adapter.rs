//! Bridge for middleware written against the raw request/response pair.
//!
//! A [`RawMiddleware`] wraps a `RawHandler` exactly like tower-style HTTP
//! middleware. The adapter is a one-way bridge: the typed chain continues
//! inside the innermost raw handler, and the live [`Context`] is carried
//! around the raw chain so store values written by typed middleware before
//! the bridge stay observable after it. Typed errors are parked in a slot
//! and re-raised once the raw chain returns.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::sync::{Arc, Mutex};

use super::{ArcMiddleware, Middleware, Next};
use crate::body::ResponseBody;
use crate::context::Context;
use crate::error::Error;

/// A handler over the raw request/response pair.
pub type RawHandler =
    Arc<dyn Fn(Request<Bytes>) -> BoxFuture<'static, Response<ResponseBody>> + Send + Sync>;

/// Standard `handler -> handler` middleware over the raw pair.
pub trait RawMiddleware: Send + Sync {
    fn wrap(&self, next: RawHandler) -> RawHandler;
}

impl<F> RawMiddleware for F
where
    F: Fn(RawHandler) -> RawHandler + Send + Sync,
{
    fn wrap(&self, next: RawHandler) -> RawHandler {
        self(next)
    }
}

/// Adapt a [`RawMiddleware`] into the typed chain.
pub fn raw_adapter<M: RawMiddleware + 'static>(middleware: M) -> ArcMiddleware {
    Arc::new(RawAdapter { middleware: Arc::new(middleware) })
}

struct RawAdapter {
    middleware: Arc<dyn RawMiddleware>,
}

#[async_trait]
impl Middleware for RawAdapter {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        let error_slot: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));

        // innermost raw handler: re-enter the typed chain on the live context
        let inner: RawHandler = {
            let ctx = ctx.clone();
            let next = next.clone();
            let slot = Arc::clone(&error_slot);
            Arc::new(move |_request| {
                let ctx = ctx.clone();
                let next = next.clone();
                let slot = Arc::clone(&slot);
                Box::pin(async move {
                    if let Err(e) = next.run(ctx.clone()).await {
                        *slot.lock().expect("error slot poisoned") = Some(e);
                    }
                    ctx.take_response()
                })
            })
        };

        let chain = self.middleware.wrap(inner);
        let response = (chain.as_ref())(rebuild_request(&ctx)).await;
        ctx.install_response(response);

        let parked = error_slot.lock().expect("error slot poisoned").take();
        match parked {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn rebuild_request(ctx: &Context) -> Request<Bytes> {
    let mut builder = Request::builder()
        .method(ctx.method().clone())
        .uri(ctx.uri().clone())
        .version(ctx.version());
    if let Some(headers) = builder.headers_mut() {
        *headers = ctx.headers().clone();
    }
    builder
        .body(ctx.body().clone())
        .expect("request rebuild cannot fail")
}
