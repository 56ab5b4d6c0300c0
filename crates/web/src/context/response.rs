//! Buffered response state behind the context.
//!
//! Mirrors a classic response writer: the header block (status + headers) is
//! committed at most once, the body accumulates in a buffer (or switches to a
//! stream exactly once), and the written byte count is tracked.

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Response, StatusCode};

use crate::body::ResponseBody;

pub struct ResponseState {
    status: StatusCode,
    wrote_header: bool,
    headers: HeaderMap,
    body: BodyState,
    bytes_written: u64,
}

enum BodyState {
    Buffer(BytesMut),
    Stream(Option<ResponseBody>),
}

impl ResponseState {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            wrote_header: false,
            headers: HeaderMap::new(),
            body: BodyState::Buffer(BytesMut::new()),
            bytes_written: 0,
        }
    }

    /// Set the status code. A no-op once the header block is committed.
    pub fn set_status(&mut self, status: StatusCode) {
        if !self.wrote_header {
            self.status = status;
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Commit the header block. Idempotent.
    pub fn write_header(&mut self) {
        self.wrote_header = true;
    }

    pub fn header_written(&self) -> bool {
        self.wrote_header
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    pub fn content_type(&mut self, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(CONTENT_TYPE, value);
        }
    }

    /// Append bytes to the buffered body, committing the header block first.
    pub fn write(&mut self, bytes: &[u8]) {
        self.write_header();
        if let BodyState::Buffer(buffer) = &mut self.body {
            buffer.extend_from_slice(bytes);
            self.bytes_written += bytes.len() as u64;
        }
    }

    /// Replace the body with a stream. Anything buffered so far is dropped;
    /// callers only switch before writing.
    pub fn set_stream(&mut self, body: ResponseBody) {
        self.write_header();
        self.body = BodyState::Stream(Some(body));
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.body, BodyState::Stream(_))
    }

    /// Drain into an `http::Response`, leaving the state reset.
    pub fn take_response(&mut self) -> Response<ResponseBody> {
        let status = self.status;
        let headers = std::mem::take(&mut self.headers);
        let body = match &mut self.body {
            BodyState::Buffer(buffer) => ResponseBody::once(std::mem::take(buffer).freeze()),
            BodyState::Stream(stream) => stream.take().unwrap_or_else(ResponseBody::empty),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    /// Install an externally produced response (used by the raw-middleware
    /// bridge when the standard chain hands back a replacement).
    pub fn install(&mut self, response: Response<ResponseBody>) {
        let (parts, body) = response.into_parts();
        self.status = parts.status;
        self.headers = parts.headers;
        self.wrote_header = true;
        match body.into_buffered() {
            // re-buffer so later writes can keep appending
            Ok(bytes) => {
                self.bytes_written = bytes.len() as u64;
                self.body = BodyState::Buffer(BytesMut::from(&bytes[..]));
            }
            Err(stream) => self.body = BodyState::Stream(Some(stream)),
        }
    }
}

impl Default for ResponseState {
    fn default() -> Self {
        Self::new()
    }
}
