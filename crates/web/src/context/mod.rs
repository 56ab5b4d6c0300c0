//! The per-request context handed to handlers and middleware.
//!
//! A [`Context`] is a cheap handle (cloning shares state). It exposes the
//! request (params, query, headers, cookies, forms, body), a concurrent
//! key/value store, and the response builders. Handlers write their response
//! through the context and return `Result<(), Error>`.

mod response;
mod store;

pub use store::Store;

pub(crate) use response::ResponseState;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use http::header::{HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE, COOKIE, LOCATION};
use http::{HeaderMap, Method, Request, StatusCode, Uri, Version};
use http_body_util::StreamBody;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::bind::{self, Payload};
use crate::body::ResponseBody;
use crate::error::{Error, ErrorBody};
use crate::files;
use crate::render::{self, Renderer};
use crate::respond::{self, Respond};
use crate::sse::Event;

/// Engine-level knobs the context needs at request time.
pub(crate) struct RuntimeConfig {
    pub multipart_cap: usize,
    pub renderer: Option<Arc<dyn Renderer>>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { multipart_cap: 8 * 1024 * 1024, renderer: None }
    }
}

pub(crate) struct RequestData {
    head: http::request::Parts,
    body: Bytes,
    params: Vec<(String, String)>,
    cancel: CancellationToken,
    form: tokio::sync::OnceCell<FormData>,
}

#[derive(Debug, Default)]
pub(crate) struct FormData {
    values: Vec<(String, String)>,
    files: Vec<FormFile>,
}

/// One uploaded file from a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct FormFile {
    pub name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

struct ContextInner {
    req: Arc<RequestData>,
    store: Store,
    response: Arc<Mutex<ResponseState>>,
    config: Arc<RuntimeConfig>,
}

/// See the module docs. Clones share all state; [`Context::copy`] detaches
/// the store.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn build(
        request: Request<Bytes>,
        params: Vec<(String, String)>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        let (mut head, body) = request.into_parts();
        let cancel = head
            .extensions
            .remove::<CancellationToken>()
            .unwrap_or_default();
        Self {
            inner: Arc::new(ContextInner {
                req: Arc::new(RequestData {
                    head,
                    body,
                    params,
                    cancel,
                    form: tokio::sync::OnceCell::new(),
                }),
                store: Store::new(),
                response: Arc::new(Mutex::new(ResponseState::new())),
                config,
            }),
        }
    }

    /// Build a context straight from a request, with default configuration
    /// and no path captures. Intended for handler unit tests.
    pub fn from_request(request: Request<Bytes>) -> Self {
        Self::build(request, Vec::new(), Arc::new(RuntimeConfig::default()))
    }

    /// Like [`Context::from_request`], with path captures.
    pub fn from_request_with_params(
        request: Request<Bytes>,
        params: Vec<(String, String)>,
    ) -> Self {
        Self::build(request, params, Arc::new(RuntimeConfig::default()))
    }

    /// An independent store sharing the request and response handles.
    ///
    /// The copy sees the values present at copy time; later writes on either
    /// side are not visible to the other.
    pub fn copy(&self) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                req: Arc::clone(&self.inner.req),
                store: Store::from_map(self.inner.store.snapshot()),
                response: Arc::clone(&self.inner.response),
                config: Arc::clone(&self.inner.config),
            }),
        }
    }

    // ---- request accessors -------------------------------------------------

    pub fn method(&self) -> &Method {
        &self.inner.req.head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.req.head.uri
    }

    pub fn path(&self) -> &str {
        self.inner.req.head.uri.path()
    }

    pub fn version(&self) -> Version {
        self.inner.req.head.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.req.head.headers
    }

    /// First value of a request header, as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.req.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.inner.req.body
    }

    /// The request content type without parameters (`application/json`).
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    /// A path capture by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner
            .req
            .params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First query value for `name`.
    pub fn query(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// All query values for `name`: repeated parameters are merged and each
    /// value is additionally split on commas.
    pub fn query_array(&self, name: &str) -> Vec<String> {
        self.query_pairs()
            .into_iter()
            .filter(|(k, _)| k == name)
            .flat_map(|(_, v)| {
                v.split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub(crate) fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(query) = self.inner.req.head.uri.query() else {
            return Vec::new();
        };
        serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default()
    }

    /// A request cookie by name.
    pub fn cookie(&self, name: &str) -> Option<String> {
        for value in self.inner.req.head.headers.get_all(COOKIE) {
            let Ok(text) = value.to_str() else { continue };
            for pair in text.split(';') {
                let mut parts = pair.trim().splitn(2, '=');
                if parts.next() == Some(name) {
                    return Some(parts.next().unwrap_or("").to_string());
                }
            }
        }
        None
    }

    /// A form value (url-encoded or multipart), parsed lazily and cached.
    pub async fn form_value(&self, name: &str) -> Result<Option<String>, Error> {
        let form = self.form().await?;
        Ok(form
            .values
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone()))
    }

    /// An uploaded file from a multipart body.
    pub async fn form_file(&self, name: &str) -> Result<Option<FormFile>, Error> {
        let form = self.form().await?;
        Ok(form.files.iter().find(|f| f.name == name).cloned())
    }

    pub(crate) async fn form(&self) -> Result<&FormData, Error> {
        let req = &self.inner.req;
        let cap = self.inner.config.multipart_cap;
        let content_type = self.header(CONTENT_TYPE.as_str()).unwrap_or("").to_string();
        req.form
            .get_or_try_init(|| parse_form(content_type, req.body.clone(), cap))
            .await
    }

    // ---- store -------------------------------------------------------------

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn set<V: std::any::Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        self.inner.store.set(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
        self.inner.store.get(key)
    }

    pub fn get_string(&self, key: &str) -> String {
        self.inner.store.get_string(key)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.inner.store.get_bool(key)
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.inner.store.get_int(key)
    }

    pub fn get_f64(&self, key: &str) -> f64 {
        self.inner.store.get_f64(key)
    }

    pub fn get_time(&self, key: &str) -> DateTime<Utc> {
        self.inner.store.get_time(key)
    }

    // ---- cancellation ------------------------------------------------------

    /// The transport's cancellation signal for this request.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.req.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.req.cancel.is_cancelled()
    }

    // ---- binding -----------------------------------------------------------

    /// Bind and validate the declared input shape from this request.
    pub async fn bind<T: Payload>(&self) -> Result<T, Error> {
        bind::bind_payload(self).await
    }

    // ---- response builders -------------------------------------------------

    fn response(&self) -> MutexGuard<'_, ResponseState> {
        self.inner.response.lock().expect("response lock poisoned")
    }

    /// Set the response status. Idempotent no-op once the header block is
    /// committed.
    pub fn set_status(&self, status: StatusCode) {
        self.response().set_status(status);
    }

    pub fn status(&self) -> StatusCode {
        self.response().status()
    }

    /// Cumulative body bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.response().bytes_written()
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.response().insert_header(name, value);
    }

    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.response().append_header(name, value);
    }

    /// Set a response header from text, ignoring invalid values.
    pub fn set_header(&self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
        {
            self.response().insert_header(name, value);
        }
    }

    pub(crate) fn set_content_type(&self, value: &str) {
        self.response().content_type(value);
    }

    pub(crate) fn write_bytes(&self, bytes: &[u8]) {
        self.response().write(bytes);
    }

    /// Write raw bytes with an explicit content type.
    pub fn data(&self, status: StatusCode, content_type: &str, bytes: &[u8]) {
        let mut response = self.response();
        response.set_status(status);
        response.content_type(content_type);
        response.write(bytes);
    }

    pub fn json<T: Serialize>(&self, status: StatusCode, value: &T) -> Result<(), Error> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::encode(e.to_string()))?;
        self.data(status, "application/json; charset=utf-8", &bytes);
        Ok(())
    }

    pub fn xml<T: Serialize>(&self, status: StatusCode, value: &T) -> Result<(), Error> {
        let text = quick_xml::se::to_string(value).map_err(|e| Error::encode(e.to_string()))?;
        self.data(status, "application/xml; charset=utf-8", text.as_bytes());
        Ok(())
    }

    pub fn yaml<T: Serialize>(&self, status: StatusCode, value: &T) -> Result<(), Error> {
        let text = serde_yaml::to_string(value).map_err(|e| Error::encode(e.to_string()))?;
        self.data(status, "application/yaml; charset=utf-8", text.as_bytes());
        Ok(())
    }

    pub fn text(&self, status: StatusCode, body: impl AsRef<str>) {
        self.data(status, "text/plain; charset=utf-8", body.as_ref().as_bytes());
    }

    pub fn html_body(&self, status: StatusCode, body: impl AsRef<str>) {
        self.data(status, "text/html; charset=utf-8", body.as_ref().as_bytes());
    }

    /// Render a template file with the built-in engine.
    pub async fn html<T: Serialize>(&self, status: StatusCode, file: &str, data: &T) -> Result<(), Error> {
        let source = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| Error::config(format!("template {file}: {e}")))?;
        let data = serde_json::to_value(data).map_err(|e| Error::encode(e.to_string()))?;
        let html = render::render_template(&source, &data)?;
        self.html_body(status, html);
        Ok(())
    }

    /// Render an inline template with the built-in engine.
    pub fn html_view<T: Serialize>(&self, status: StatusCode, source: &str, data: &T) -> Result<(), Error> {
        let data = serde_json::to_value(data).map_err(|e| Error::encode(e.to_string()))?;
        let html = render::render_template(source, &data)?;
        self.html_body(status, html);
        Ok(())
    }

    /// Render a named template through the configured renderer.
    pub fn render<T: Serialize>(&self, status: StatusCode, name: &str, data: &T) -> Result<(), Error> {
        let renderer = self.inner.config.renderer.clone().ok_or(Error::NoRenderer)?;
        let data = serde_json::to_value(data).map_err(|e| Error::encode(e.to_string()))?;
        let html = renderer.render(name, &data, self)?;
        self.html_body(status, html);
        Ok(())
    }

    /// Respond based on the value's declared shape (headers, cookies,
    /// `status`, `body` encoded per the `Accept` header).
    pub fn respond<T: Respond>(&self, value: &T) -> Result<(), Error> {
        respond::write_respond(self, value)
    }

    pub fn redirect(&self, status: StatusCode, location: &str) -> Result<(), Error> {
        let value = HeaderValue::from_str(location)
            .map_err(|e| Error::encode(format!("invalid location: {e}")))?;
        let mut response = self.response();
        response.set_status(status);
        response.insert_header(LOCATION, value);
        response.write_header();
        Ok(())
    }

    /// Serve a file from disk with a content type inferred from its
    /// extension.
    pub async fn serve_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound,
            _ => Error::Io(e),
        })?;
        self.data(StatusCode::OK, files::content_type_for(path), &bytes);
        Ok(())
    }

    /// Serve a file as an attachment download.
    pub async fn serve_file_download(
        &self,
        path: impl AsRef<Path>,
        file_name: &str,
    ) -> Result<(), Error> {
        self.serve_file(path.as_ref()).await?;
        let value = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
            .map_err(|e| Error::encode(e.to_string()))?;
        self.insert_header(
            HeaderName::from_static("content-disposition"),
            value,
        );
        Ok(())
    }

    /// Write one SSE event into the buffered response.
    pub fn sse_event(&self, event: Event) -> Result<(), Error> {
        let mut response = self.response();
        response.content_type(mime::TEXT_EVENT_STREAM.as_ref());
        response.write(event.encode().as_bytes());
        Ok(())
    }

    /// Stream SSE events until the source ends or the request is cancelled.
    pub fn sse_stream<S>(&self, events: S)
    where
        S: futures::Stream<Item = Event> + Send + 'static,
    {
        let cancel = self.cancellation();
        let frames = events
            .take_until(async move { cancel.cancelled_owned().await })
            .map(|event| Ok(http_body::Frame::data(Bytes::from(event.encode()))));
        let body = ResponseBody::stream(StreamBody::new(frames));

        let mut response = self.response();
        response.content_type(mime::TEXT_EVENT_STREAM.as_ref());
        if let Ok(value) = HeaderValue::from_str("no-cache") {
            response.insert_header(CACHE_CONTROL, value);
        }
        response.set_stream(body);
    }

    /// Write only a status code.
    pub fn abort_with_status(&self, status: StatusCode) {
        let mut response = self.response();
        response.set_status(status);
        response.write_header();
    }

    /// Write a structured `{code, message, details}` error body.
    pub fn abort_with_error(&self, status: StatusCode, message: impl Into<String>) {
        let body = ErrorBody::new(status, message);
        let _ = self.json(status, &body);
    }

    pub(crate) fn accept_header(&self) -> Option<&str> {
        self.header(ACCEPT.as_str())
    }

    // ---- dispatch plumbing -------------------------------------------------

    pub(crate) fn take_response(&self) -> http::Response<ResponseBody> {
        self.response().take_response()
    }

    pub(crate) fn install_response(&self, response: http::Response<ResponseBody>) {
        self.response().install(response);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("path", &self.path())
            .finish()
    }
}

async fn parse_form(content_type: String, body: Bytes, cap: usize) -> Result<FormData, Error> {
    let media = content_type.split(';').next().unwrap_or("").trim();

    if media.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        let values = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&body)
            .map_err(|e| Error::bind("form", e.to_string()))?;
        return Ok(FormData { values, files: Vec::new() });
    }

    if media.eq_ignore_ascii_case("multipart/form-data") {
        let boundary = multer::parse_boundary(&content_type)
            .map_err(|e| Error::bind("form", format!("bad multipart boundary: {e}")))?;
        let stream = futures::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut form = FormData::default();
        let mut total = 0usize;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| Error::bind("form", e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(|m| m.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| Error::bind("form", e.to_string()))?;

            total += data.len();
            if total > cap {
                return Err(Error::PayloadTooLarge);
            }

            match file_name {
                Some(file_name) => form.files.push(FormFile { name, file_name, content_type, data }),
                None => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    form.values.push((name, text));
                }
            }
        }
        return Ok(form);
    }

    // not a form request; expose nothing rather than failing
    Ok(FormData::default())
}

impl FormData {
    pub(crate) fn values(&self) -> &[(String, String)] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<Bytes> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("cookie", "session=abc; theme=dark")
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn reads_query_and_query_array() {
        let ctx = Context::from_request(request("/api/users?q=Hello&tags=a,b&tags=c"));
        assert_eq!(ctx.query("q").as_deref(), Some("Hello"));
        assert_eq!(ctx.query_array("tags"), vec!["a", "b", "c"]);
        assert!(ctx.query("missing").is_none());
        assert!(ctx.query_array("missing").is_empty());
    }

    #[test]
    fn reads_cookies() {
        let ctx = Context::from_request(request("/"));
        assert_eq!(ctx.cookie("session").as_deref(), Some("abc"));
        assert_eq!(ctx.cookie("theme").as_deref(), Some("dark"));
        assert!(ctx.cookie("none").is_none());
    }

    #[test]
    fn reads_params() {
        let ctx = Context::from_request_with_params(
            request("/api/v1/users/1"),
            vec![("version".into(), "v1".into()), ("id".into(), "1".into())],
        );
        assert_eq!(ctx.param("version"), Some("v1"));
        assert_eq!(ctx.param("id"), Some("1"));
        assert!(ctx.param("missing").is_none());
    }

    #[test]
    fn copy_detaches_the_store_but_shares_the_response() {
        let ctx = Context::from_request(request("/"));
        ctx.set("shared", "before".to_string());

        let copy = ctx.copy();
        assert_eq!(copy.get_string("shared"), "before");

        ctx.set("after", 1i64);
        assert_eq!(copy.get_int("after"), 0, "copy must not see later writes");
        copy.set("own", true);
        assert!(!ctx.get_bool("own"));

        copy.text(StatusCode::CREATED, "done");
        assert_eq!(ctx.status(), StatusCode::CREATED, "response handle is shared");
    }

    #[test]
    fn status_is_idempotent_after_first_write() {
        let ctx = Context::from_request(request("/"));
        ctx.text(StatusCode::ACCEPTED, "one");
        ctx.set_status(StatusCode::IM_A_TEAPOT);
        assert_eq!(ctx.status(), StatusCode::ACCEPTED);
        assert_eq!(ctx.bytes_written(), 3);
    }

    #[tokio::test]
    async fn parses_urlencoded_forms() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Bytes::from_static(b"name=ada&zip=1010"))
            .unwrap();
        let ctx = Context::from_request(request);
        assert_eq!(ctx.form_value("name").await.unwrap().as_deref(), Some("ada"));
        assert_eq!(ctx.form_value("zip").await.unwrap().as_deref(), Some("1010"));
        assert!(ctx.form_value("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn parses_multipart_forms() {
        let body = concat!(
            "--XBOUND\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
            "Trellis\r\n",
            "--XBOUND\r\n",
            "Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "file-contents\r\n",
            "--XBOUND--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header("content-type", "multipart/form-data; boundary=XBOUND")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap();
        let ctx = Context::from_request(request);

        assert_eq!(ctx.form_value("title").await.unwrap().as_deref(), Some("Trellis"));
        let file = ctx.form_file("doc").await.unwrap().expect("file present");
        assert_eq!(file.file_name, "a.txt");
        assert_eq!(&file.data[..], b"file-contents");
    }

    #[test]
    fn json_builder_sets_type_and_counts_bytes() {
        let ctx = Context::from_request(request("/"));
        ctx.json(StatusCode::OK, &serde_json::json!({"ok": true})).unwrap();
        let response = ctx.take_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
    }
}
