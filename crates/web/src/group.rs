//! Route groups: a path prefix plus a middleware scope.
//!
//! A group is a builder over the engine. Every route added through it lands
//! on the engine with the joined path and the group's middleware prefixed to
//! the route's own. Subgroups inherit the parent's stack by value; later
//! parent mutations do not reach children already created. Disabling a
//! group disables every route registered through it (transitively).

use http::Method;
use std::sync::Arc;

use crate::engine::Engine;
use crate::handler::{ArcHandler, Handler};
use crate::middleware::{ArcMiddleware, Middleware};
use crate::path;
use crate::route::{GroupId, Route, RouteMethod, SecurityRequirement};

pub struct Group<'e> {
    engine: &'e mut Engine,
    id: GroupId,
    /// Group ids from the root down to this group (self last).
    ancestry: Vec<GroupId>,
    prefix: String,
    middlewares: Vec<ArcMiddleware>,
    tags: Vec<String>,
    security: Vec<SecurityRequirement>,
}

impl<'e> Group<'e> {
    pub(crate) fn root(engine: &'e mut Engine, prefix: &str) -> Self {
        let id = engine.allocate_group();
        Self {
            engine,
            id,
            ancestry: vec![id],
            prefix: path::normalize(prefix),
            middlewares: Vec::new(),
            tags: Vec::new(),
            security: Vec::new(),
        }
    }

    /// Open a nested group. The child copies this group's middleware stack,
    /// tags and security requirements at creation time.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        let id = self.engine.allocate_group();
        let mut ancestry = self.ancestry.clone();
        ancestry.push(id);
        Group {
            engine: &mut *self.engine,
            id,
            ancestry,
            prefix: path::join(&self.prefix, prefix),
            middlewares: self.middlewares.clone(),
            tags: self.tags.clone(),
            security: self.security.clone(),
        }
    }

    /// Append a middleware to this group's stack. Applies only to routes
    /// (and subgroups) created afterwards.
    pub fn wrap(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn wrap_arc(&mut self, middleware: ArcMiddleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Tag every route subsequently registered through this group.
    pub fn tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.push(tag.into());
        self
    }

    /// Require a security scheme on every route subsequently registered
    /// through this group.
    pub fn security(&mut self, scheme: impl Into<String>, scopes: &[&str]) -> &mut Self {
        self.security.push(SecurityRequirement {
            scheme: scheme.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Disable every route registered through this group, including routes
    /// of subgroups. They respond 404 once the engine binds.
    pub fn disable(&mut self) -> &mut Self {
        self.engine.disabled_groups.insert(self.id);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    // ---- registration ------------------------------------------------------

    pub fn handle(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> &mut Route {
        self.register(RouteMethod::Verb(method), pattern, Arc::new(handler))
    }

    pub fn any(&mut self, pattern: &str, handler: impl Handler + 'static) -> &mut Route {
        self.register(RouteMethod::Any, pattern, Arc::new(handler))
    }

    pub fn get(&mut self, pattern: &str, handler: impl Handler + 'static) -> &mut Route {
        self.handle(Method::GET, pattern, handler)
    }

    pub fn post(&mut self, pattern: &str, handler: impl Handler + 'static) -> &mut Route {
        self.handle(Method::POST, pattern, handler)
    }

    pub fn put(&mut self, pattern: &str, handler: impl Handler + 'static) -> &mut Route {
        self.handle(Method::PUT, pattern, handler)
    }

    pub fn delete(&mut self, pattern: &str, handler: impl Handler + 'static) -> &mut Route {
        self.handle(Method::DELETE, pattern, handler)
    }

    pub fn patch(&mut self, pattern: &str, handler: impl Handler + 'static) -> &mut Route {
        self.handle(Method::PATCH, pattern, handler)
    }

    pub fn head(&mut self, pattern: &str, handler: impl Handler + 'static) -> &mut Route {
        self.handle(Method::HEAD, pattern, handler)
    }

    pub fn options(&mut self, pattern: &str, handler: impl Handler + 'static) -> &mut Route {
        self.handle(Method::OPTIONS, pattern, handler)
    }

    fn register(&mut self, method: RouteMethod, pattern: &str, handler: ArcHandler) -> &mut Route {
        let joined = path::join(&self.prefix, pattern);
        self.engine.register(
            method,
            &joined,
            handler,
            self.middlewares.clone(),
            self.ancestry.clone(),
            self.tags.clone(),
            self.security.clone(),
        )
    }
}

impl std::fmt::Debug for Group<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("prefix", &self.prefix)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}
