//! HTTP basic authentication.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::StatusCode;
use tracing::debug;

use crate::context::Context;
use crate::error::Error;
use crate::middleware::{Middleware, Next};

/// Basic-auth middleware with constant-time credential comparison.
///
/// On success the username is stored in the context under `context_key`
/// (default `"user"`).
#[derive(Debug, Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
    realm: String,
    context_key: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            realm: "Restricted".to_string(),
            context_key: "user".to_string(),
        }
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    fn check(&self, header: &str) -> Option<String> {
        let encoded = header.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;

        let user_ok = constant_time_eq(user.as_bytes(), self.username.as_bytes());
        let password_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        if user_ok && password_ok {
            Some(user.to_string())
        } else {
            None
        }
    }

    fn challenge(&self, ctx: &Context) {
        ctx.set_header("www-authenticate", &format!("Basic realm=\"{}\"", self.realm));
        ctx.abort_with_status(StatusCode::UNAUTHORIZED);
    }
}

#[async_trait]
impl Middleware for BasicAuth {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        let Some(header) = ctx.header("authorization").map(str::to_string) else {
            debug!("basic auth: missing authorization header");
            self.challenge(&ctx);
            return Ok(());
        };

        match self.check(&header) {
            Some(user) => {
                ctx.set(self.context_key.clone(), user);
                next.run(ctx).await
            }
            None => {
                debug!("basic auth: bad credentials");
                self.challenge(&ctx);
                Ok(())
            }
        }
    }
}

/// Compare without early exit; length difference still fails.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    let len = a.len().min(b.len());
    for i in 0..len {
        diff |= (a[i] ^ b[i]) as usize;
    }
    diff == 0
}
