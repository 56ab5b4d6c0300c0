//! Route descriptors and their fluent metadata.

use http::Method;

use crate::bind::{BindingSpec, Payload};
use crate::handler::ArcHandler;
use crate::middleware::ArcMiddleware;
use crate::openapi::{ApiType, Schema};

pub(crate) type RouteId = usize;
pub(crate) type GroupId = usize;

/// Deferred schema construction, resolved when the document is assembled.
pub type SchemaFn = fn() -> Schema;

/// Method matcher: a concrete verb, or the `any` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Any,
    Verb(Method),
}

impl std::fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteMethod::Any => f.write_str("ANY"),
            RouteMethod::Verb(method) => write!(f, "{method}"),
        }
    }
}

/// A response documented on a route, keyed by status code.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: u16,
    pub schema: Option<SchemaFn>,
    pub description: String,
}

/// A security requirement attached to a route or group.
#[derive(Debug, Clone)]
pub struct SecurityRequirement {
    pub scheme: String,
    pub scopes: Vec<String>,
}

/// The minimal descriptor of a reachable endpoint. Mutated only during
/// configuration; frozen when the engine binds.
pub struct Route {
    pub(crate) id: RouteId,
    pub(crate) method: RouteMethod,
    /// Canonical path used for dispatch.
    pub(crate) path: String,
    /// The pattern as authored (type annotations preserved for OpenAPI).
    pub(crate) raw_path: String,
    pub(crate) handler: ArcHandler,
    pub(crate) middlewares: Vec<ArcMiddleware>,

    pub(crate) name: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) summary: Option<String>,
    pub(crate) description: Option<String>,

    pub(crate) request_binding: Option<&'static BindingSpec>,
    pub(crate) request_schema: Option<SchemaFn>,
    pub(crate) responses: Vec<ResponseMeta>,
    pub(crate) response_headers: Vec<(String, String)>,
    pub(crate) security: Vec<SecurityRequirement>,

    pub(crate) disabled: bool,
    pub(crate) deprecated: bool,
    pub(crate) hidden: bool,
    pub(crate) internal: bool,

    /// Ids of every group this route was registered through, outermost
    /// first. Disabling any of them disables the route.
    pub(crate) groups: Vec<GroupId>,
}

impl Route {
    pub(crate) fn new(
        id: RouteId,
        method: RouteMethod,
        path: String,
        raw_path: String,
        handler: ArcHandler,
    ) -> Self {
        Self {
            id,
            method,
            path,
            raw_path,
            handler,
            middlewares: Vec::new(),
            name: None,
            tags: Vec::new(),
            summary: None,
            description: None,
            request_binding: None,
            request_schema: None,
            responses: Vec::new(),
            response_headers: Vec::new(),
            security: Vec::new(),
            disabled: false,
            deprecated: false,
            hidden: false,
            internal: false,
            groups: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &RouteMethod {
        &self.method
    }

    // ---- fluent metadata ---------------------------------------------------

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn summary(&mut self, summary: impl Into<String>) -> &mut Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.push(tag.into());
        self
    }

    /// Append a route-local middleware (innermost position).
    pub fn with(&mut self, middleware: ArcMiddleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn deprecated(&mut self) -> &mut Self {
        self.deprecated = true;
        self
    }

    /// Hide from the OpenAPI document without disabling dispatch.
    pub fn hidden(&mut self) -> &mut Self {
        self.hidden = true;
        self
    }

    pub fn internal(&mut self) -> &mut Self {
        self.internal = true;
        self
    }

    /// A disabled route responds 404 without invoking its handler.
    pub fn disable(&mut self) -> &mut Self {
        self.disabled = true;
        self
    }

    /// Declare the request input shape: parameters and body schema for the
    /// OpenAPI document come from its binding descriptor.
    pub fn request<T: Payload + ApiType>(&mut self) -> &mut Self {
        self.request_binding = Some(T::binding());
        self.request_schema = Some(T::schema as SchemaFn);
        self
    }

    /// Document a response body for a status code.
    pub fn response<T: ApiType>(&mut self, status: u16) -> &mut Self {
        self.responses.push(ResponseMeta {
            status,
            schema: Some(T::schema as SchemaFn),
            description: String::new(),
        });
        self
    }

    /// Document a schema-less response (status only).
    pub fn response_status(&mut self, status: u16, description: impl Into<String>) -> &mut Self {
        self.responses.push(ResponseMeta { status, schema: None, description: description.into() });
        self
    }

    /// Document a response header.
    pub fn response_header(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> &mut Self {
        self.response_headers.push((name.into(), description.into()));
        self
    }

    /// Attach a security requirement (scheme name + scopes).
    pub fn security(&mut self, scheme: impl Into<String>, scopes: &[&str]) -> &mut Self {
        self.security.push(SecurityRequirement {
            scheme: scheme.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        });
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("disabled", &self.disabled)
            .finish()
    }
}
