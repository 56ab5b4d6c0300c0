//! Method + path dispatch.
//!
//! During configuration, routes live in a [`RouteTable`]: a path-keyed map
//! of method entries, append-only. `Engine::bind` freezes the table into a
//! [`RouterIndex`] backed by a `matchit` tree; dispatch on the hot path is
//! lock-free reads only.

use http::Method;
use std::collections::{BTreeMap, HashMap};

use crate::error::Error;
use crate::path::CATCH_ALL;
use crate::route::{Route, RouteId, RouteMethod};

/// Configuration-phase route registry.
#[derive(Default)]
pub(crate) struct RouteTable {
    pub routes: Vec<Route>,
    pub paths: BTreeMap<String, PathMethods>,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct PathMethods {
    pub verbs: HashMap<Method, RouteId>,
    pub any: Option<RouteId>,
}

impl PathMethods {
    /// Verbs registered at this path, sorted for stable `Allow` headers.
    pub fn allowed(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.verbs.keys().cloned().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

impl RouteTable {
    pub fn insert(&mut self, route: Route) -> Result<RouteId, Error> {
        let id = route.id;
        debug_assert_eq!(id, self.routes.len());

        let entry = self.paths.entry(route.path.clone()).or_default();
        match &route.method {
            RouteMethod::Any => {
                if entry.any.is_some() {
                    return Err(Error::config(format!(
                        "duplicate ANY route for {}",
                        route.path
                    )));
                }
                entry.any = Some(id);
            }
            RouteMethod::Verb(method) => {
                if entry.verbs.contains_key(method) {
                    return Err(Error::config(format!(
                        "duplicate route {method} {}",
                        route.path
                    )));
                }
                entry.verbs.insert(method.clone(), id);
            }
        }

        self.routes.push(route);
        Ok(id)
    }

    pub fn route(&self, id: RouteId) -> &Route {
        &self.routes[id]
    }

    pub fn route_mut(&mut self, id: RouteId) -> &mut Route {
        &mut self.routes[id]
    }
}

/// Frozen dispatch index.
pub(crate) struct RouterIndex {
    inner: matchit::Router<PathEntry>,
}

#[derive(Debug, Clone)]
pub(crate) struct PathEntry {
    pub canonical: String,
    pub methods: PathMethods,
}

/// The outcome of matching one request.
pub(crate) enum Dispatch {
    /// A route matched; captures are `(name, value)` pairs.
    Route { id: RouteId, params: Vec<(String, String)> },
    /// The path exists but not with this method.
    MethodMiss { allowed: Vec<Method> },
    /// No path matched.
    PathMiss,
}

impl RouterIndex {
    pub fn build(paths: &BTreeMap<String, PathMethods>) -> Result<Self, Error> {
        let mut inner = matchit::Router::new();
        for (canonical, methods) in paths {
            let pattern = to_matchit(canonical);
            inner
                .insert(
                    pattern,
                    PathEntry { canonical: canonical.clone(), methods: methods.clone() },
                )
                .map_err(|e| Error::config(format!("conflicting route {canonical}: {e}")))?;
        }
        Ok(Self { inner })
    }

    pub fn dispatch(&self, method: &Method, path: &str) -> Dispatch {
        let Ok(matched) = self.inner.at(path) else {
            return Dispatch::PathMiss;
        };

        let params: Vec<(String, String)> = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let entry = matched.value;
        if let Some(&id) = entry.methods.verbs.get(method) {
            return Dispatch::Route { id, params };
        }
        // HEAD falls back to GET per common router behavior
        if *method == Method::HEAD {
            if let Some(&id) = entry.methods.verbs.get(&Method::GET) {
                return Dispatch::Route { id, params };
            }
        }
        if let Some(id) = entry.methods.any {
            return Dispatch::Route { id, params };
        }
        Dispatch::MethodMiss { allowed: entry.methods.allowed() }
    }

    /// Whether the slash-twin of `path` would match (strict-slash redirect).
    pub fn twin_matches(&self, path: &str) -> Option<String> {
        let twin = if let Some(stripped) = path.strip_suffix('/') {
            if stripped.is_empty() {
                return None;
            }
            stripped.to_string()
        } else {
            format!("{path}/")
        };
        if self.inner.at(&twin).is_ok() {
            Some(twin)
        } else {
            None
        }
    }
}

/// Canonical form → matchit syntax: `{name}` is shared, the catch-all
/// `{any:.*}` becomes `{*any}`.
fn to_matchit(canonical: &str) -> String {
    match canonical.strip_suffix(CATCH_ALL) {
        Some(prefix) => format!("{prefix}{{*any}}"),
        None => canonical.to_string(),
    }
}
