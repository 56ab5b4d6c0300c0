//! Request binding.
//!
//! A [`Payload`] declares, field by field, where its data comes from (path,
//! query, header, cookie, form, or the request body), how to coerce it, and
//! which validation rules apply. `Context::bind` walks the descriptor,
//! assembles a JSON object, validates each field as it lands, and finally
//! deserializes into the target type.
//!
//! Descriptors are usually produced by `#[derive(Payload)]`; the const
//! builder methods on [`FieldSpec`] and [`Rules`] are the explicit
//! alternative.

mod body;
mod coerce;

pub(crate) use body::decode_body;

use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::Error;
use crate::validate::{self, Format};

/// Where a field's value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Path,
    Query,
    Header,
    Cookie,
    Form,
    Body,
}

/// Scalar coercion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Int,
    UInt,
    Float,
    Bool,
}

/// The declared shape of one field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Scalar(ScalarKind),
    List(ScalarKind),
    /// A nested structure (body fields only); recursion reuses the nested
    /// descriptor for coercion and validation.
    Nested(fn() -> &'static BindingSpec),
    /// Raw JSON value, no coercion.
    Value,
}

/// Tag-driven validation constraints for one field.
#[derive(Debug, Clone, Copy)]
pub struct Rules {
    pub required: bool,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub multiple_of: Option<f64>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,
    pub pattern: Option<&'static str>,
    pub format: Option<Format>,
    pub one_of: Option<&'static [&'static str]>,
}

impl Rules {
    pub const fn none() -> Self {
        Self {
            required: false,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            multiple_of: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            pattern: None,
            format: None,
            one_of: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub const fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    pub const fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub const fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub const fn multiple_of(mut self, of: f64) -> Self {
        self.multiple_of = Some(of);
        self
    }

    pub const fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub const fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub const fn unique_items(mut self) -> Self {
        self.unique_items = true;
        self
    }

    pub const fn pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub const fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub const fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.one_of = Some(values);
        self
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::none()
    }
}

/// One field of a [`BindingSpec`].
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Target field name (what the deserializer expects).
    pub name: &'static str,
    /// Source key; empty means "same as `name`".
    pub key: &'static str,
    pub source: Source,
    pub kind: FieldKind,
    /// Fallback literal applied when no source produced a value.
    pub default: Option<&'static str>,
    pub rules: Rules,
}

impl FieldSpec {
    pub const fn new(name: &'static str, source: Source, kind: FieldKind) -> Self {
        Self { name, key: "", source, kind, default: None, rules: Rules::none() }
    }

    pub const fn key(mut self, key: &'static str) -> Self {
        self.key = key;
        self
    }

    pub const fn default_value(mut self, literal: &'static str) -> Self {
        self.default = Some(literal);
        self
    }

    pub const fn rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub(crate) fn source_key(&self) -> &'static str {
        if self.key.is_empty() {
            self.name
        } else {
            self.key
        }
    }

    pub(crate) fn is_list(&self) -> bool {
        matches!(self.kind, FieldKind::List(_))
    }
}

/// The full binding descriptor of an input shape.
#[derive(Debug)]
pub struct BindingSpec {
    pub fields: &'static [FieldSpec],
}

impl BindingSpec {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    pub(crate) fn body_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.source == Source::Body)
    }

    pub(crate) fn scalar_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.source != Source::Body)
    }
}

/// An input shape bindable from a request.
pub trait Payload: serde::de::DeserializeOwned {
    fn binding() -> &'static BindingSpec;
}

pub(crate) async fn bind_payload<T: Payload>(ctx: &Context) -> Result<T, Error> {
    let spec = T::binding();
    let object = bind_object(ctx, spec).await?;
    serde_json::from_value(Value::Object(object))
        .map_err(|e| Error::bind("payload", e.to_string()))
}

async fn bind_object(ctx: &Context, spec: &BindingSpec) -> Result<Map<String, Value>, Error> {
    let mut object = Map::new();

    // the body decodes once; fields pick their keys out of it
    let body_field_count = spec.body_fields().count();
    let decoded_body = if body_field_count > 0 && !ctx.body().is_empty() {
        Some(decode_body(ctx).await?)
    } else {
        None
    };

    for field in spec.fields {
        let bound = match field.source {
            Source::Body => bind_body_field(field, decoded_body.as_ref(), body_field_count)?,
            _ => bind_scalar_field(ctx, field).await?,
        };

        match bound {
            Some(value) => {
                validate::validate_field(field.name, &value, &field.rules)?;
                if let FieldKind::Nested(nested) = field.kind {
                    validate::validate_object(field.name, &value, nested())?;
                }
                object.insert(field.name.to_string(), value);
            }
            None => {
                if field.rules.required {
                    return Err(Error::validation(
                        field.name,
                        "required",
                        format!("{} is required", field.name),
                    ));
                }
                // absent optional lists deserialize as empty; absence stays
                // distinct from invalidity, so no rules run on them
                if field.is_list() {
                    object.insert(field.name.to_string(), Value::Array(Vec::new()));
                }
            }
        }
    }

    Ok(object)
}

/// A single structured body field receives the whole decoded body; scalar
/// body fields each pick their key out of the decoded object.
fn bind_body_field(
    field: &FieldSpec,
    decoded: Option<&Value>,
    body_field_count: usize,
) -> Result<Option<Value>, Error> {
    let Some(decoded) = decoded else {
        return default_value(field);
    };

    let takes_whole_body =
        body_field_count == 1 && matches!(field.kind, FieldKind::Nested(_) | FieldKind::Value);
    let mut value = if takes_whole_body {
        decoded.clone()
    } else {
        match decoded.as_object().and_then(|object| object.get(field.source_key())) {
            Some(value) if !value.is_null() => value.clone(),
            _ => return default_value(field),
        }
    };

    // XML and form trees decode with string leaves; coerce to the declared
    // shape (harmless for already-typed JSON/YAML values)
    match field.kind {
        FieldKind::Nested(nested) => coerce::coerce_tree(&mut value, nested()),
        FieldKind::Scalar(kind) => {
            if let Value::String(raw) = &value {
                if !matches!(kind, ScalarKind::String) {
                    value = coerce::coerce_scalar(kind, raw)
                        .map_err(|reason| Error::bind(field.name, reason))?;
                }
            }
        }
        FieldKind::List(kind) => {
            if !value.is_array() {
                value = Value::Array(vec![value]);
            }
            if let Value::Array(items) = &mut value {
                for item in items {
                    if let Value::String(raw) = item {
                        if !matches!(kind, ScalarKind::String) {
                            *item = coerce::coerce_scalar(kind, raw)
                                .map_err(|reason| Error::bind(field.name, reason))?;
                        }
                    }
                }
            }
        }
        FieldKind::Value => {}
    }

    Ok(Some(value))
}

async fn bind_scalar_field(ctx: &Context, field: &FieldSpec) -> Result<Option<Value>, Error> {
    let key = field.source_key();

    let raws: Vec<String> = match field.source {
        Source::Path => ctx.param(key).map(str::to_string).into_iter().collect(),
        Source::Query => {
            if field.is_list() {
                ctx.query_array(key)
            } else {
                ctx.query(key).into_iter().collect()
            }
        }
        Source::Header => split_list(field, ctx.header(key).map(str::to_string)),
        Source::Cookie => split_list(field, ctx.cookie(key)),
        Source::Form => {
            let form = ctx.form().await?;
            let values: Vec<String> = form
                .values()
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .collect();
            if field.is_list() {
                values
                    .iter()
                    .flat_map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string))
                    .collect()
            } else {
                values.into_iter().take(1).collect()
            }
        }
        Source::Body => unreachable!("body fields bound separately"),
    };

    if raws.is_empty() {
        return default_value(field);
    }
    coerce::coerce_field(field, raws).map(Some)
}

/// Comma-split a single raw value when the field expects a list.
fn split_list(field: &FieldSpec, raw: Option<String>) -> Vec<String> {
    match raw {
        Some(value) if field.is_list() => value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(value) => vec![value],
        None => Vec::new(),
    }
}

fn default_value(field: &FieldSpec) -> Result<Option<Value>, Error> {
    match field.default {
        Some(literal) => {
            let raws = if field.is_list() {
                literal
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            } else {
                vec![literal.to_string()]
            };
            coerce::coerce_field(field, raws).map(Some)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Format;
    use bytes::Bytes;
    use http::{Method, Request};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct SearchInput {
        q: String,
        tags: Vec<String>,
        page: i64,
        trace: Option<String>,
    }

    static SEARCH_SPEC: BindingSpec = BindingSpec::new(&[
        FieldSpec::new("q", Source::Query, FieldKind::Scalar(ScalarKind::String))
            .rules(Rules::none().required()),
        FieldSpec::new("tags", Source::Query, FieldKind::List(ScalarKind::String)),
        FieldSpec::new("page", Source::Query, FieldKind::Scalar(ScalarKind::Int))
            .default_value("1"),
        FieldSpec::new("trace", Source::Header, FieldKind::Scalar(ScalarKind::String))
            .key("x-trace-id"),
    ]);

    impl Payload for SearchInput {
        fn binding() -> &'static BindingSpec {
            &SEARCH_SPEC
        }
    }

    fn get(uri: &str) -> Context {
        Context::from_request(
            Request::builder()
                .method(Method::GET)
                .uri(uri)
                .header("x-trace-id", "t-1")
                .body(Bytes::new())
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn binds_query_header_and_defaults() {
        let ctx = get("/search?q=Hello&tags=a,b&tags=c");
        let input: SearchInput = bind_payload(&ctx).await.unwrap();
        assert_eq!(
            input,
            SearchInput {
                q: "Hello".into(),
                tags: vec!["a".into(), "b".into(), "c".into()],
                page: 1,
                trace: Some("t-1".into()),
            }
        );
    }

    #[tokio::test]
    async fn missing_required_query_is_an_error() {
        let ctx = get("/search?tags=a");
        let err = bind_payload::<SearchInput>(&ctx).await.unwrap_err();
        match err {
            Error::Validation { field, rule, .. } => {
                assert_eq!(field, "q");
                assert_eq!(rule, "required");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn coercion_failure_names_the_field() {
        let ctx = get("/search?q=x&page=notanumber");
        let err = bind_payload::<SearchInput>(&ctx).await.unwrap_err();
        match err {
            Error::Bind { field, .. } => assert_eq!(field, "page"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[derive(Debug, Deserialize)]
    struct Registration {
        user: RegistrationUser,
    }

    #[derive(Debug, Deserialize)]
    struct RegistrationUser {
        email: String,
        age: i64,
    }

    static USER_SPEC: BindingSpec = BindingSpec::new(&[
        FieldSpec::new("email", Source::Body, FieldKind::Scalar(ScalarKind::String))
            .rules(Rules::none().required().format(Format::Email)),
        FieldSpec::new("age", Source::Body, FieldKind::Scalar(ScalarKind::Int))
            .rules(Rules::none().min(18)),
    ]);

    fn user_spec() -> &'static BindingSpec {
        &USER_SPEC
    }

    static REGISTRATION_SPEC: BindingSpec = BindingSpec::new(&[FieldSpec::new(
        "user",
        Source::Body,
        FieldKind::Nested(user_spec),
    )
    .rules(Rules::none().required())]);

    impl Payload for Registration {
        fn binding() -> &'static BindingSpec {
            &REGISTRATION_SPEC
        }
    }

    fn post_json(body: &'static str) -> Context {
        Context::from_request(
            Request::builder()
                .method(Method::POST)
                .uri("/register")
                .header("content-type", "application/json")
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn binds_and_validates_nested_json_bodies() {
        let ctx = post_json(r#"{"email": "a@example.com", "age": 30}"#);
        let registration: Registration = bind_payload(&ctx).await.unwrap();
        assert_eq!(registration.user.email, "a@example.com");
        assert_eq!(registration.user.age, 30);
    }

    #[tokio::test]
    async fn invalid_email_in_body_fails_with_format_rule() {
        let ctx = post_json(r#"{"email": "not-an-email", "age": 30}"#);
        let err = bind_payload::<Registration>(&ctx).await.unwrap_err();
        match err {
            Error::Validation { field, message, .. } => {
                assert_eq!(field, "user.email");
                assert_eq!(message, "invalid email format");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_content_type_is_415() {
        let ctx = Context::from_request(
            Request::builder()
                .method(Method::POST)
                .uri("/register")
                .header("content-type", "application/msgpack")
                .body(Bytes::from_static(b"\x81"))
                .unwrap(),
        );
        let err = bind_payload::<Registration>(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn binds_xml_bodies_with_coercion() {
        let ctx = Context::from_request(
            Request::builder()
                .method(Method::POST)
                .uri("/register")
                .header("content-type", "application/xml")
                .body(Bytes::from_static(
                    b"<user><email>a@example.com</email><age>30</age></user>",
                ))
                .unwrap(),
        );
        let registration: Registration = bind_payload(&ctx).await.unwrap();
        assert_eq!(registration.user.age, 30);
    }

    #[derive(Debug, Deserialize)]
    struct Tagged {
        tags: Vec<String>,
        count: i64,
    }

    static TAGGED_SPEC: BindingSpec = BindingSpec::new(&[
        FieldSpec::new("tags", Source::Body, FieldKind::List(ScalarKind::String)),
        FieldSpec::new("count", Source::Body, FieldKind::Scalar(ScalarKind::Int)),
    ]);

    impl Payload for Tagged {
        fn binding() -> &'static BindingSpec {
            &TAGGED_SPEC
        }
    }

    #[tokio::test]
    async fn xml_repeated_elements_bind_as_lists() {
        let ctx = Context::from_request(
            Request::builder()
                .method(Method::POST)
                .uri("/tagged")
                .header("content-type", "application/xml")
                .body(Bytes::from_static(
                    b"<t><tags>a</tags><tags>b</tags><count>2</count></t>",
                ))
                .unwrap(),
        );
        let tagged: Tagged = bind_payload(&ctx).await.unwrap();
        assert_eq!(tagged.tags, vec!["a", "b"]);
        assert_eq!(tagged.count, 2);
    }

    #[tokio::test]
    async fn xml_single_element_still_binds_as_a_list() {
        let ctx = Context::from_request(
            Request::builder()
                .method(Method::POST)
                .uri("/tagged")
                .header("content-type", "application/xml")
                .body(Bytes::from_static(b"<t><tags>only</tags><count>1</count></t>"))
                .unwrap(),
        );
        let tagged: Tagged = bind_payload(&ctx).await.unwrap();
        assert_eq!(tagged.tags, vec!["only"]);
    }

    #[tokio::test]
    async fn binds_yaml_bodies() {
        let ctx = Context::from_request(
            Request::builder()
                .method(Method::POST)
                .uri("/register")
                .header("content-type", "application/yaml")
                .body(Bytes::from_static(b"email: a@example.com\nage: 30\n"))
                .unwrap(),
        );
        let registration: Registration = bind_payload(&ctx).await.unwrap();
        assert_eq!(registration.user.email, "a@example.com");
    }
}
