//! A declarative HTTP application framework on top of `trellis-http`.
//!
//! Trellis gives a server process a routing table with groups and
//! middleware, type-directed request binding and validation, basic/JWT
//! authentication and CORS primitives, and an OpenAPI 3.0 document generated
//! from the route table and served next to the API.
//!
//! # Example
//!
//! ```no_run
//! use http::StatusCode;
//! use trellis_web::{handler_fn, Context, Engine, Error};
//!
//! async fn hello(ctx: Context) -> Result<(), Error> {
//!     let name = ctx.query("name").unwrap_or_else(|| "world".to_string());
//!     ctx.json(StatusCode::OK, &serde_json::json!({ "hello": name }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let mut engine = Engine::new().address(":8080");
//!
//!     engine.get("/hello", handler_fn(hello));
//!
//!     let mut api = engine.group("/api");
//!     let mut v1 = api.group("/v1");
//!     v1.get("/hello", handler_fn(hello));
//!
//!     engine.bind()?.serve().await
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Engine`] collects routes, groups, middleware and options, then
//!   freezes into an [`App`] that serves.
//! - [`Context`] is the per-request handle: request accessors, a concurrent
//!   key/value store, and the response builders.
//! - [`bind::Payload`] + [`validate`] drive `ctx.bind::<T>()`: multi-source
//!   extraction with tag-driven validation.
//! - [`auth`] provides basic auth and JWT verification with a claims
//!   expression language; [`cors::Cors`] the cross-origin policy.
//! - [`openapi`] derives the spec from the route table at bind time.

pub mod auth;
pub mod bind;
pub mod cors;
pub mod middleware;
pub mod openapi;
pub mod respond;
pub mod sse;
pub mod validate;

mod body;
mod context;
mod engine;
mod error;
mod files;
mod group;
mod handler;
mod negotiate;
mod path;
mod render;
mod route;
mod router;

pub use bind::{BindingSpec, FieldKind, FieldSpec, Payload, Rules, ScalarKind, Source};
pub use body::ResponseBody;
pub use context::{Context, FormFile, Store};
pub use cors::Cors;
pub use engine::{App, Engine, TlsConfig};
pub use error::{Error, ErrorBody};
pub use group::Group;
pub use handler::{handler_fn, ArcHandler, FnHandler, Handler};
pub use negotiate::Negotiated;
pub use openapi::{ApiType, OpenApi, Schema};
pub use path::normalize;
pub use render::{Renderer, TemplateRenderer};
pub use respond::{Respond, RespondSpec};
pub use route::{ResponseMeta, Route, RouteMethod, SecurityRequirement};
pub use validate::Format;

pub use trellis_macros::{ApiType, Payload, Respond};
