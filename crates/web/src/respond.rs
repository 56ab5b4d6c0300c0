//! Shape-directed responses.
//!
//! `Context::respond` takes a value whose declared shape says which fields
//! become response headers or cookies, which one carries the status, and
//! which one is the body. The body is encoded per the request's `Accept`
//! header (JSON default, XML/YAML/plain-text on request).

use http::header::{HeaderName, HeaderValue, SET_COOKIE};
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::context::Context;
use crate::error::Error;
use crate::negotiate;

/// Field roles for a respondable shape. Produced by
/// `#[derive(Respond)]` or built by hand.
#[derive(Debug, Clone, Copy)]
pub struct RespondSpec {
    /// Field carrying the status code; defaults to 200 when absent or unset.
    pub status_field: Option<&'static str>,
    /// Field carrying the body. When `None`, a field named `body` is used if
    /// present, otherwise the whole remaining object is the body.
    pub body_field: Option<&'static str>,
    /// `(field, header-name)` pairs emitted as response headers.
    pub header_fields: &'static [(&'static str, &'static str)],
    /// `(field, cookie-name)` pairs emitted as `Set-Cookie` headers.
    pub cookie_fields: &'static [(&'static str, &'static str)],
}

impl RespondSpec {
    pub const EMPTY: RespondSpec = RespondSpec {
        status_field: None,
        body_field: None,
        header_fields: &[],
        cookie_fields: &[],
    };
}

/// A value that can be written with [`Context::respond`].
pub trait Respond: Serialize {
    fn respond_spec() -> &'static RespondSpec;
}

pub(crate) fn write_respond<T: Respond>(ctx: &Context, value: &T) -> Result<(), Error> {
    let spec = T::respond_spec();
    let mut value = serde_json::to_value(value).map_err(|e| Error::encode(e.to_string()))?;

    let mut status = StatusCode::OK;
    let body = match value.as_object_mut() {
        Some(object) => {
            if let Some(field) = spec.status_field {
                if let Some(raw) = object.remove(field) {
                    if let Some(code) = raw.as_u64() {
                        status = StatusCode::from_u16(code as u16)
                            .map_err(|_| Error::encode(format!("invalid status code {code}")))?;
                    }
                }
            }
            for (field, header) in spec.header_fields {
                if let Some(raw) = object.remove(*field) {
                    let text = scalar_text(&raw);
                    if text.is_empty() {
                        continue;
                    }
                    let name = HeaderName::from_bytes(header.as_bytes())
                        .map_err(|e| Error::encode(e.to_string()))?;
                    let header_value =
                        HeaderValue::from_str(&text).map_err(|e| Error::encode(e.to_string()))?;
                    ctx.insert_header(name, header_value);
                }
            }
            for (field, cookie) in spec.cookie_fields {
                if let Some(raw) = object.remove(*field) {
                    let text = scalar_text(&raw);
                    if text.is_empty() {
                        continue;
                    }
                    let header_value = HeaderValue::from_str(&format!("{cookie}={text}; Path=/"))
                        .map_err(|e| Error::encode(e.to_string()))?;
                    ctx.append_header(SET_COOKIE, header_value);
                }
            }

            match spec.body_field {
                Some(field) => object.remove(field).unwrap_or(Value::Null),
                None => match object.remove("body") {
                    Some(body) => body,
                    None => Value::Object(std::mem::take(object)),
                },
            }
        }
        None => value,
    };

    let kind = negotiate::negotiate(ctx.accept_header());
    let encoded = negotiate::encode(&body, kind)?;
    ctx.set_status(status);
    ctx.set_content_type(kind.content_type());
    ctx.write_bytes(&encoded);
    Ok(())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
