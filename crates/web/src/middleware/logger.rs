use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

use super::{Middleware, Next};
use crate::context::Context;
use crate::error::Error;

/// Logs one line per request: method, path, status, body bytes, latency.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestLogger;

#[async_trait]
impl Middleware for RequestLogger {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        let started = Instant::now();
        let method = ctx.method().clone();
        let path = ctx.path().to_string();

        let result = next.run(ctx.clone()).await;

        info!(
            method = %method,
            path = %path,
            status = ctx.status().as_u16(),
            bytes = ctx.bytes_written(),
            latency_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        result
    }
}
