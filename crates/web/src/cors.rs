//! Cross-origin resource sharing.
//!
//! One middleware handles both simple requests (response headers) and
//! preflights (`OPTIONS` + `Access-Control-Request-Method`, answered 204
//! without invoking the handler chain). `Origin` and the two
//! `Access-Control-Request-*` headers are appended to `Vary`.

use async_trait::async_trait;
use http::header::{HeaderValue, VARY};
use http::{Method, StatusCode};

use crate::context::Context;
use crate::error::Error;
use crate::middleware::{Middleware, Next};

/// CORS configuration. `allow_origins` supports the `*` wildcard; when
/// credentials are allowed the wildcard is rejected at bind time.
#[derive(Debug, Clone)]
pub struct Cors {
    pub(crate) allow_origins: Vec<String>,
    pub(crate) allow_methods: Vec<Method>,
    pub(crate) allow_headers: Vec<String>,
    pub(crate) expose_headers: Vec<String>,
    pub(crate) allow_credentials: bool,
    pub(crate) max_age: Option<u64>,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: Vec::new(),
            allow_headers: Vec::new(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age: None,
        }
    }
}

impl Cors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_origins(mut self, origins: &[&str]) -> Self {
        self.allow_origins = origins.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn allow_methods(mut self, methods: &[Method]) -> Self {
        self.allow_methods = methods.to_vec();
        self
    }

    pub fn allow_headers(mut self, headers: &[&str]) -> Self {
        self.allow_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn expose_headers(mut self, headers: &[&str]) -> Self {
        self.expose_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.allow_credentials && self.allow_origins.iter().any(|o| o == "*") {
            return Err(Error::config(
                "CORS: credentials cannot be combined with the * origin",
            ));
        }
        Ok(())
    }

    pub(crate) fn origin_allowed(&self, origin: &str) -> bool {
        self.allow_origins.iter().any(|o| o == "*" || o == origin)
    }

    pub(crate) fn methods_value(&self) -> Option<String> {
        if self.allow_methods.is_empty() {
            None
        } else {
            Some(
                self.allow_methods
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        }
    }

    pub(crate) fn headers_value(&self) -> Option<String> {
        if self.allow_headers.is_empty() {
            None
        } else {
            Some(self.allow_headers.join(", "))
        }
    }
}

pub(crate) struct CorsMiddleware {
    pub config: Cors,
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        let origin = ctx.header("origin").map(str::to_string);
        let request_method = ctx.header("access-control-request-method").map(str::to_string);
        let is_preflight = ctx.method() == Method::OPTIONS && request_method.is_some();

        if is_preflight {
            append_vary(&ctx, "Origin");
            append_vary(&ctx, "Access-Control-Request-Method");
            append_vary(&ctx, "Access-Control-Request-Headers");
        } else {
            append_vary(&ctx, "Origin");
        }

        let Some(origin) = origin else {
            // same-origin or non-browser traffic
            return next.run(ctx).await;
        };

        if !self.config.origin_allowed(&origin) {
            if is_preflight {
                ctx.abort_with_status(StatusCode::FORBIDDEN);
                return Ok(());
            }
            return next.run(ctx).await;
        }

        ctx.set_header("access-control-allow-origin", &origin);
        if self.config.allow_credentials {
            ctx.set_header("access-control-allow-credentials", "true");
        }
        if !self.config.expose_headers.is_empty() {
            ctx.set_header(
                "access-control-expose-headers",
                &self.config.expose_headers.join(", "),
            );
        }

        if is_preflight {
            // configured values win; otherwise reflect what was requested
            let methods = self
                .config
                .methods_value()
                .or(request_method)
                .unwrap_or_default();
            if !methods.is_empty() {
                ctx.set_header("access-control-allow-methods", &methods);
            }

            let headers = self.config.headers_value().or_else(|| {
                ctx.header("access-control-request-headers").map(str::to_string)
            });
            if let Some(headers) = headers {
                if !headers.is_empty() {
                    ctx.set_header("access-control-allow-headers", &headers);
                }
            }

            if let Some(max_age) = self.config.max_age {
                ctx.set_header("access-control-max-age", &max_age.to_string());
            }

            ctx.abort_with_status(StatusCode::NO_CONTENT);
            return Ok(());
        }

        next.run(ctx).await
    }
}

fn append_vary(ctx: &Context, value: &'static str) {
    ctx.append_header(VARY, HeaderValue::from_static(value));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::compose;
    use bytes::Bytes;
    use http::Request;
    use std::sync::Arc;

    fn chain(config: Cors) -> crate::handler::ArcHandler {
        let handler = Arc::new(handler_fn(|ctx: Context| async move {
            ctx.text(StatusCode::OK, "ok");
            Ok(())
        }));
        compose(&[Arc::new(CorsMiddleware { config })], handler)
    }

    fn preflight(origin: &str) -> Request<Bytes> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/books")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "x-custom, content-type")
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn preflight_from_allowed_origin_is_204_with_reflected_headers() {
        let handler = chain(Cors::new().allow_origins(&["https://app.example"]));
        let ctx = Context::from_request(preflight("https://app.example"));
        handler.handle(ctx.clone()).await.unwrap();

        let response = ctx.take_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://app.example"
        );
        // nothing configured: the requested method and headers are mirrored
        assert_eq!(
            response.headers().get("access-control-allow-methods").unwrap(),
            "POST"
        );
        assert_eq!(
            response.headers().get("access-control-allow-headers").unwrap(),
            "x-custom, content-type"
        );

        let vary: Vec<_> = response.headers().get_all(VARY).iter().collect();
        assert_eq!(
            vary,
            vec!["Origin", "Access-Control-Request-Method", "Access-Control-Request-Headers"]
        );
    }

    #[tokio::test]
    async fn simple_request_gets_origin_echo_and_vary() {
        let handler = chain(
            Cors::new()
                .allow_origins(&["https://app.example"])
                .expose_headers(&["x-total-count"]),
        );
        let request = Request::builder()
            .method(Method::GET)
            .uri("/books")
            .header("origin", "https://app.example")
            .body(Bytes::new())
            .unwrap();
        let ctx = Context::from_request(request);
        handler.handle(ctx.clone()).await.unwrap();

        let response = ctx.take_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://app.example"
        );
        assert_eq!(
            response.headers().get("access-control-expose-headers").unwrap(),
            "x-total-count"
        );
        assert_eq!(response.headers().get(VARY).unwrap(), "Origin");
    }

    #[tokio::test]
    async fn preflight_from_disallowed_origin_is_403() {
        let handler = chain(Cors::new().allow_origins(&["https://app.example"]));
        let ctx = Context::from_request(preflight("https://evil.example"));
        handler.handle(ctx.clone()).await.unwrap();
        assert_eq!(ctx.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn configured_methods_and_headers_win_over_reflection() {
        let handler = chain(
            Cors::new()
                .allow_origins(&["*"])
                .allow_methods(&[Method::GET, Method::POST])
                .allow_headers(&["content-type"])
                .max_age(600),
        );
        let ctx = Context::from_request(preflight("https://anywhere.example"));
        handler.handle(ctx.clone()).await.unwrap();

        let response = ctx.take_response();
        assert_eq!(
            response.headers().get("access-control-allow-methods").unwrap(),
            "GET, POST"
        );
        assert_eq!(
            response.headers().get("access-control-allow-headers").unwrap(),
            "content-type"
        );
        assert_eq!(response.headers().get("access-control-max-age").unwrap(), "600");
    }

    #[test]
    fn wildcard_with_credentials_is_a_config_error() {
        assert!(Cors::new().allow_credentials(true).validate().is_err());
        assert!(Cors::new()
            .allow_origins(&["https://app.example"])
            .allow_credentials(true)
            .validate()
            .is_ok());
    }
}
