//! The engine: configuration, binding, and serving.
//!
//! An [`Engine`] is the mutable configuration phase: routes, groups,
//! middleware, options. [`Engine::bind`] freezes it into an [`App`] (spec
//! built, chains composed, dispatch index constructed) and the app serves
//! until shut down. Binding consumes the engine, so the route table is
//! immutable while serving by construction.

use bytes::Bytes;
use http::header::{ALLOW, LOCATION};
use http::{Method, Request, Response, StatusCode};
use std::collections::HashSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::body::ResponseBody;
use crate::context::{Context, RuntimeConfig};
use crate::cors::{Cors, CorsMiddleware};
use crate::error::{Error, ErrorBody};
use crate::group::Group;
use crate::handler::{handler_fn, ArcHandler, Handler};
use crate::middleware::{compose, ArcMiddleware, Middleware};
use crate::openapi::{build_document, docs_html, OpenApi};
use crate::path;
use crate::render::Renderer;
use crate::route::{GroupId, Route, RouteId, RouteMethod, SecurityRequirement};
use crate::router::{Dispatch, RouteTable, RouterIndex};

/// TLS listener settings (PEM files). Runs as a second listener next to the
/// plain one.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub address: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// CA bundle for mutual TLS.
    pub ca_path: Option<PathBuf>,
    pub client_auth: bool,
}

impl TlsConfig {
    pub fn new(address: impl Into<String>, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            address: address.into(),
            cert_path: cert.into(),
            key_path: key.into(),
            ca_path: None,
            client_auth: false,
        }
    }

    pub fn client_auth(mut self, ca: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(ca.into());
        self.client_auth = true;
        self
    }
}

/// The root container during configuration.
pub struct Engine {
    pub(crate) table: RouteTable,
    pub(crate) middlewares: Vec<ArcMiddleware>,
    pub(crate) disabled_groups: HashSet<GroupId>,
    pub(crate) next_group_id: GroupId,

    address: String,
    read_timeout: Option<Duration>,
    shutdown_timeout: Duration,
    body_limit: usize,
    multipart_cap: usize,
    strict_slash: bool,
    debug: bool,
    validation_status: StatusCode,
    cors: Option<Cors>,
    renderer: Option<Arc<dyn Renderer>>,
    openapi: Option<OpenApi>,
    no_route: Option<ArcHandler>,
    no_method: Option<ArcHandler>,
    tls: Option<TlsConfig>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            table: RouteTable::default(),
            middlewares: Vec::new(),
            disabled_groups: HashSet::new(),
            next_group_id: 0,
            address: ":8080".to_string(),
            read_timeout: None,
            shutdown_timeout: Duration::from_secs(10),
            body_limit: 4 * 1024 * 1024,
            multipart_cap: 8 * 1024 * 1024,
            strict_slash: true,
            debug: false,
            validation_status: StatusCode::BAD_REQUEST,
            cors: None,
            renderer: None,
            openapi: None,
            no_route: None,
            no_method: None,
            tls: None,
        }
    }

    // ---- options (chained mutators) ---------------------------------------

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Maximum request body size; larger payloads fail with 413.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Memory cap for multipart form parsing.
    pub fn multipart_memory(mut self, bytes: usize) -> Self {
        self.multipart_cap = bytes;
        self
    }

    /// Treat `/foo` and `/foo/` as equivalent by redirecting to the
    /// registered twin. On by default.
    pub fn strict_slash(mut self, enabled: bool) -> Self {
        self.strict_slash = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Status for validation failures: 400 (default) or 422.
    pub fn validation_status(mut self, status: StatusCode) -> Self {
        self.validation_status = status;
        self
    }

    pub fn cors(mut self, cors: Cors) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn openapi(mut self, openapi: OpenApi) -> Self {
        self.openapi = Some(openapi);
        self
    }

    /// Override the 404 response.
    pub fn no_route(mut self, handler: impl Handler + 'static) -> Self {
        self.no_route = Some(Arc::new(handler));
        self
    }

    /// Override the 405 response.
    pub fn no_method(mut self, handler: impl Handler + 'static) -> Self {
        self.no_method = Some(Arc::new(handler));
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    // ---- registration ------------------------------------------------------

    /// Append a global middleware (outermost position, registration order).
    pub fn wrap(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn wrap_arc(&mut self, middleware: ArcMiddleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Register a route. Panics on duplicate method+path registration;
    /// route wiring errors are caught at startup, like a conflicting
    /// pattern.
    pub fn handle(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler + 'static,
    ) -> &mut Route {
        self.register(
            RouteMethod::Verb(method),
            pattern,
            Arc::new(handler),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
    }

    /// Register a route matching every verb.
    pub fn any(&mut self, pattern: &str, handler: impl Handler + 'static) -> &mut Route {
        self.register(
            RouteMethod::Any,
            pattern,
            Arc::new(handler),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
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

    /// Open a route group under `prefix`.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group::root(self, prefix)
    }

    pub(crate) fn allocate_group(&mut self) -> GroupId {
        let id = self.next_group_id;
        self.next_group_id += 1;
        id
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn register(
        &mut self,
        method: RouteMethod,
        pattern: &str,
        handler: ArcHandler,
        middlewares: Vec<ArcMiddleware>,
        groups: Vec<GroupId>,
        tags: Vec<String>,
        security: Vec<SecurityRequirement>,
    ) -> &mut Route {
        let canonical = path::normalize(pattern);
        let id = self.table.routes.len();
        let mut route = Route::new(id, method, canonical, pattern.to_string(), handler);
        route.middlewares = middlewares;
        route.groups = groups;
        route.tags = tags;
        route.security = security;

        match self.table.insert(route) {
            Ok(id) => self.table.route_mut(id),
            Err(e) => panic!("route registration failed: {e}"),
        }
    }

    // ---- binding -----------------------------------------------------------

    /// Freeze the configuration: propagate group disables, wire the
    /// auto-registered routes (CORS preflight, OpenAPI), compose every
    /// middleware chain, and build the dispatch index.
    pub fn bind(mut self) -> Result<App, Error> {
        // group disables propagate to every route registered through them
        let disabled_groups = self.disabled_groups.clone();
        for route in &mut self.table.routes {
            if route.groups.iter().any(|g| disabled_groups.contains(g)) {
                route.disabled = true;
            }
        }

        if let Some(cors) = &self.cors {
            cors.validate()?;
        }

        let mut docs = None;
        let openapi_doc = match &self.openapi {
            Some(config) => {
                let config = config.clone();
                let document =
                    Arc::new(build_document(&self.table.routes, &|r| r.disabled, &config));
                self.register_openapi_routes(&config, Arc::clone(&document));
                if config.serve_docs {
                    docs = Some(DocsEndpoint {
                        prefix: config.docs_prefix.clone(),
                        shell: docs_html(&config.spec_path),
                    });
                }
                Some(document)
            }
            None => None,
        };

        if self.cors.is_some() {
            self.register_preflight_routes();
        }

        if self.debug {
            for route in &self.table.routes {
                info!(method = %route.method, path = %route.path, disabled = route.disabled, "route");
            }
        }

        // composition order: CORS, then engine middleware, then group+route
        // middleware (already flattened per route), then the handler
        let mut global: Vec<ArcMiddleware> = Vec::new();
        if let Some(cors) = self.cors.clone() {
            global.push(Arc::new(CorsMiddleware { config: cors }));
        }
        global.extend(self.middlewares.iter().cloned());

        let mut composed: Vec<ArcHandler> = Vec::with_capacity(self.table.routes.len());
        for route in &self.table.routes {
            let mut chain = global.clone();
            chain.extend(route.middlewares.iter().cloned());
            composed.push(compose(&chain, Arc::clone(&route.handler)));
        }

        let index = RouterIndex::build(&self.table.paths)?;

        Ok(App {
            shared: Arc::new(AppShared {
                index,
                routes: self.table.routes,
                composed,
                runtime: Arc::new(RuntimeConfig {
                    multipart_cap: self.multipart_cap,
                    renderer: self.renderer,
                }),
                address: self.address,
                read_timeout: self.read_timeout,
                shutdown_timeout: self.shutdown_timeout,
                body_limit: self.body_limit,
                strict_slash: self.strict_slash,
                validation_status: self.validation_status,
                no_route: self.no_route,
                no_method: self.no_method,
                tls: self.tls,
                openapi_doc,
                docs,
            }),
        })
    }

    /// One OPTIONS route per path (CORS enabled), answering with the union
    /// of registered methods. Preflights are short-circuited by the CORS
    /// middleware before reaching the handler.
    fn register_preflight_routes(&mut self) {
        let pending: Vec<(String, String)> = self
            .table
            .paths
            .iter()
            .filter(|(_, methods)| {
                !methods.verbs.contains_key(&Method::OPTIONS) && methods.any.is_none()
            })
            .map(|(path, methods)| {
                let mut allowed: Vec<String> =
                    methods.allowed().iter().map(|m| m.to_string()).collect();
                allowed.push(Method::OPTIONS.to_string());
                (path.clone(), allowed.join(", "))
            })
            .collect();

        for (pattern, allow) in pending {
            self.handle(
                Method::OPTIONS,
                &pattern,
                handler_fn(move |ctx: Context| {
                    let allow = allow.clone();
                    async move {
                        ctx.set_header("allow", &allow);
                        ctx.abort_with_status(StatusCode::NO_CONTENT);
                        Ok(())
                    }
                }),
            )
            .hidden();
        }
    }

    fn register_openapi_routes(&mut self, config: &OpenApi, document: Arc<serde_json::Value>) {
        let spec_path = config.spec_path.clone();
        self.get(
            &spec_path,
            handler_fn(move |ctx: Context| {
                let document = Arc::clone(&document);
                async move {
                    ctx.json(StatusCode::OK, document.as_ref())?;
                    Ok(())
                }
            }),
        )
        .hidden();

    }
}

/// The docs UI, served ahead of the router: the bare prefix permanently
/// redirects to the slash form, which serves the embedded shell.
struct DocsEndpoint {
    prefix: String,
    shell: String,
}

pub(crate) struct AppShared {
    index: RouterIndex,
    routes: Vec<Route>,
    composed: Vec<ArcHandler>,
    runtime: Arc<RuntimeConfig>,
    address: String,
    read_timeout: Option<Duration>,
    shutdown_timeout: Duration,
    body_limit: usize,
    strict_slash: bool,
    validation_status: StatusCode,
    no_route: Option<ArcHandler>,
    no_method: Option<ArcHandler>,
    tls: Option<TlsConfig>,
    openapi_doc: Option<Arc<serde_json::Value>>,
    docs: Option<DocsEndpoint>,
}

/// A bound application: immutable route table, composed chains, frozen
/// OpenAPI document.
#[derive(Clone)]
pub struct App {
    shared: Arc<AppShared>,
}

impl App {
    /// Dispatch one request. This is the transport entry point, also usable
    /// directly in tests.
    pub async fn dispatch(&self, request: Request<Bytes>) -> Response<ResponseBody> {
        dispatch_shared(&self.shared, request).await
    }

    /// Serve until the process is killed.
    pub async fn serve(self) -> Result<(), Error> {
        self.serve_with_shutdown(CancellationToken::new()).await
    }

    /// Serve until `shutdown` fires, then drain in-flight connections within
    /// the shutdown timeout.
    pub async fn serve_with_shutdown(self, shutdown: CancellationToken) -> Result<(), Error> {
        let address = parse_address(&self.shared.address)?;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| Error::config(format!("bind {address}: {e}")))?;
        info!(%address, "listening");

        let mut tasks = JoinSet::new();

        if let Some(tls) = self.shared.tls.clone() {
            let shared = Arc::clone(&self.shared);
            let token = shutdown.clone();
            tasks.spawn(async move {
                if let Err(e) = serve_tls_listener(shared, tls, token).await {
                    error!("tls listener failed: {e}");
                }
            });
        }

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("shutdown requested, draining connections");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, _peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    let service = Arc::new(AppService { shared: Arc::clone(&self.shared) });
                    let limits = self.limits();
                    let token = shutdown.child_token();
                    tasks.spawn(async move {
                        let (reader, writer) = stream.into_split();
                        let connection = trellis_http::connection::HttpConnection::new(
                            reader, writer, limits,
                        )
                        .with_shutdown(token);
                        if let Err(e) = connection.process(service).await {
                            warn!("connection error: {e}");
                        }
                    });
                }
            }
        }

        drop(listener);
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.shared.shutdown_timeout, drain).await.is_err() {
            warn!("shutdown timeout elapsed with connections still open");
            tasks.abort_all();
        }
        Ok(())
    }

    fn limits(&self) -> trellis_http::protocol::Limits {
        let mut limits =
            trellis_http::protocol::Limits::default().max_body_bytes(self.shared.body_limit);
        if let Some(timeout) = self.shared.read_timeout {
            limits = limits.read_timeout(timeout);
        }
        limits
    }

    /// The frozen OpenAPI document, when generation is enabled.
    pub fn openapi_document(&self) -> Option<Arc<serde_json::Value>> {
        self.shared.openapi_doc.clone()
    }
}

struct AppService {
    shared: Arc<AppShared>,
}

#[async_trait::async_trait]
impl trellis_http::handler::Handler<Bytes> for AppService {
    type RespBody = ResponseBody;
    type Error = Infallible;

    async fn call(&self, req: Request<Bytes>) -> Result<Response<ResponseBody>, Self::Error> {
        Ok(dispatch_shared(&self.shared, req).await)
    }
}

async fn dispatch_shared(shared: &Arc<AppShared>, request: Request<Bytes>) -> Response<ResponseBody> {
    let method = request.method().clone();
    let request_path = request.uri().path().to_string();

    if let Some(docs) = &shared.docs {
        if method == Method::GET && request_path == docs.prefix {
            let slashed = format!("{}/", docs.prefix);
            let mut response = Response::new(ResponseBody::empty());
            *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
            if let Ok(value) = slashed.parse() {
                response.headers_mut().insert(LOCATION, value);
            }
            return response;
        }
        if method == Method::GET && request_path == format!("{}/", docs.prefix) {
            let mut response =
                Response::new(ResponseBody::once(Bytes::from(docs.shell.clone())));
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/html; charset=utf-8"),
            );
            return response;
        }
    }

    match shared.index.dispatch(&method, &request_path) {
        Dispatch::Route { id, params } => {
            if shared.routes[id].disabled {
                return not_found(shared, request).await;
            }
            run_route(shared, id, params, request).await
        }
        Dispatch::PathMiss => {
            if shared.strict_slash {
                if let Some(twin) = shared.index.twin_matches(&request_path) {
                    return redirect_response(&twin, request.uri().query());
                }
            }
            not_found(shared, request).await
        }
        Dispatch::MethodMiss { allowed } => method_not_allowed(shared, request, allowed).await,
    }
}

async fn run_route(
    shared: &Arc<AppShared>,
    id: RouteId,
    params: Vec<(String, String)>,
    request: Request<Bytes>,
) -> Response<ResponseBody> {
    let ctx = Context::build(request, params, Arc::clone(&shared.runtime));
    match shared.composed[id].handle(ctx.clone()).await {
        Ok(()) => ctx.take_response(),
        Err(e) => {
            let status = e.status(shared.validation_status);
            if status.is_server_error() {
                error!(route = %shared.routes[id].path, "handler error: {e}");
            }
            error_response(status, &e.to_string())
        }
    }
}

async fn not_found(shared: &Arc<AppShared>, request: Request<Bytes>) -> Response<ResponseBody> {
    match &shared.no_route {
        Some(handler) => run_fallback(shared, handler, request, StatusCode::NOT_FOUND).await,
        None => error_response(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn method_not_allowed(
    shared: &Arc<AppShared>,
    request: Request<Bytes>,
    allowed: Vec<Method>,
) -> Response<ResponseBody> {
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let mut response = match &shared.no_method {
        Some(handler) => {
            run_fallback(shared, handler, request, StatusCode::METHOD_NOT_ALLOWED).await
        }
        None => error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
    };
    if let Ok(value) = allow.parse() {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

async fn run_fallback(
    shared: &Arc<AppShared>,
    handler: &ArcHandler,
    request: Request<Bytes>,
    default_status: StatusCode,
) -> Response<ResponseBody> {
    let ctx = Context::build(request, Vec::new(), Arc::clone(&shared.runtime));
    ctx.set_status(default_status);
    match handler.handle(ctx.clone()).await {
        Ok(()) => ctx.take_response(),
        Err(e) => error_response(e.status(shared.validation_status), &e.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<ResponseBody> {
    let body = ErrorBody::new(status, message);
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    let mut response = Response::new(ResponseBody::once(Bytes::from(bytes)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

fn redirect_response(path: &str, query: Option<&str>) -> Response<ResponseBody> {
    let location = match query {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut response = Response::new(ResponseBody::empty());
    *response.status_mut() = StatusCode::PERMANENT_REDIRECT;
    if let Ok(value) = location.parse() {
        response.headers_mut().insert(LOCATION, value);
    }
    response
}

/// `host:port`; empty host binds all interfaces, port 0 is rejected.
fn parse_address(address: &str) -> Result<SocketAddr, Error> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| Error::config(format!("invalid address {address:?}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::config(format!("invalid port in {address:?}")))?;
    if port == 0 {
        return Err(Error::config("port 0 is not allowed"));
    }
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    format!("{host}:{port}")
        .parse()
        .map_err(|_| Error::config(format!("invalid address {address:?}")))
}

async fn serve_tls_listener(
    shared: Arc<AppShared>,
    tls: TlsConfig,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let acceptor = build_tls_acceptor(&tls)?;
    let address = parse_address(&tls.address)?;
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| Error::config(format!("bind tls {address}: {e}")))?;
    info!(%address, "tls listening");

    let limits = {
        let mut limits =
            trellis_http::protocol::Limits::default().max_body_bytes(shared.body_limit);
        if let Some(timeout) = shared.read_timeout {
            limits = limits.read_timeout(timeout);
        }
        limits
    };

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, _peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("tls accept failed: {e}");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let service = Arc::new(AppService { shared: Arc::clone(&shared) });
                let token = shutdown.child_token();
                tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(tls_stream) => tls_stream,
                        Err(e) => {
                            warn!("tls handshake failed: {e}");
                            return;
                        }
                    };
                    let (reader, writer) = tokio::io::split(tls_stream);
                    let connection =
                        trellis_http::connection::HttpConnection::new(reader, writer, limits)
                            .with_shutdown(token);
                    if let Err(e) = connection.process(service).await {
                        warn!("tls connection error: {e}");
                    }
                });
            }
        }
    }
    Ok(())
}

fn build_tls_acceptor(tls: &TlsConfig) -> Result<tokio_rustls::TlsAcceptor, Error> {
    use tokio_rustls::rustls::{self, pki_types};

    let cert_file = std::fs::File::open(&tls.cert_path)
        .map_err(|e| Error::config(format!("tls cert {}: {e}", tls.cert_path.display())))?;
    let certs: Vec<pki_types::CertificateDer<'static>> =
        rustls_pemfile::certs(&mut std::io::BufReader::new(cert_file))
            .collect::<Result<_, _>>()
            .map_err(|e| Error::config(format!("tls cert parse: {e}")))?;

    let key_file = std::fs::File::open(&tls.key_path)
        .map_err(|e| Error::config(format!("tls key {}: {e}", tls.key_path.display())))?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))
        .map_err(|e| Error::config(format!("tls key parse: {e}")))?
        .ok_or_else(|| Error::config("tls key file contains no private key"))?;

    let builder = rustls::ServerConfig::builder();
    let config = if tls.client_auth {
        let ca_path = tls
            .ca_path
            .as_ref()
            .ok_or_else(|| Error::config("client auth requires a CA bundle"))?;
        let ca_file = std::fs::File::open(ca_path)
            .map_err(|e| Error::config(format!("tls ca {}: {e}", ca_path.display())))?;
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut std::io::BufReader::new(ca_file)) {
            let cert = cert.map_err(|e| Error::config(format!("tls ca parse: {e}")))?;
            roots
                .add(cert)
                .map_err(|e| Error::config(format!("tls ca: {e}")))?;
        }
        let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| Error::config(format!("client verifier: {e}")))?;
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    }
    .with_single_cert(certs, key)
    .map_err(|e| Error::config(format!("tls config: {e}")))?;

    Ok(tokio_rustls::TlsAcceptor::from(Arc::new(config)))
}
