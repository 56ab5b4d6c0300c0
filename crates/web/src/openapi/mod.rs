//! OpenAPI 3.0 document generation.
//!
//! Runs once, at bind time: walks every enabled, non-hidden route, derives
//! path/query/header/cookie parameters and request/response schemas, interns
//! recurring object shapes in the component registry, and assembles the
//! final document. The result is frozen and served verbatim at the
//! configured spec path.

mod schema;

pub use schema::{ApiType, Property, Schema, SchemaType};

pub(crate) use schema::ComponentRegistry;

use serde_json::{json, Map, Value};

use crate::bind::{FieldKind, FieldSpec, ScalarKind, Source};
use crate::path::{param_names, segment_type_annotation, CATCH_ALL};
use crate::route::{Route, RouteMethod};

/// OpenAPI configuration: document metadata plus the auto-registered
/// endpoints (`/openapi.json`, the docs UI prefix).
#[derive(Debug, Clone)]
pub struct OpenApi {
    pub(crate) title: String,
    pub(crate) version: String,
    pub(crate) description: Option<String>,
    pub(crate) servers: Vec<String>,
    pub(crate) security_schemes: Vec<(String, Value)>,
    pub(crate) spec_path: String,
    pub(crate) docs_prefix: String,
    pub(crate) serve_docs: bool,
}

impl Default for OpenApi {
    fn default() -> Self {
        Self {
            title: "API".to_string(),
            version: "0.1.0".to_string(),
            description: None,
            servers: Vec::new(),
            security_schemes: Vec::new(),
            spec_path: "/openapi.json".to_string(),
            docs_prefix: "/docs".to_string(),
            serve_docs: true,
        }
    }
}

impl OpenApi {
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self { title: title.into(), version: version.into(), ..Self::default() }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn server(mut self, url: impl Into<String>) -> Self {
        self.servers.push(url.into());
        self
    }

    pub fn security_scheme(mut self, name: impl Into<String>, scheme: Value) -> Self {
        self.security_schemes.push((name.into(), scheme));
        self
    }

    pub fn spec_path(mut self, path: impl Into<String>) -> Self {
        self.spec_path = path.into();
        self
    }

    pub fn docs_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.docs_prefix = prefix.into();
        self
    }

    pub fn without_docs_ui(mut self) -> Self {
        self.serve_docs = false;
        self
    }
}

/// Assemble the document. `is_disabled` folds in group-disable state.
pub(crate) fn build_document(
    routes: &[Route],
    is_disabled: &dyn Fn(&Route) -> bool,
    config: &OpenApi,
) -> Value {
    let mut registry = ComponentRegistry::new();
    let mut paths: Map<String, Value> = Map::new();
    let mut bearer_seen = false;

    for route in routes {
        if is_disabled(route) || route.hidden || route.internal {
            continue;
        }

        let path_key = document_path(&route.path);
        let operation = operation_json(route, &mut registry, &mut bearer_seen);

        let entry = paths
            .entry(path_key)
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(entry) = entry.as_object_mut() else { continue };
        for method in operation_methods(&route.method) {
            entry.insert(method.to_string(), operation.clone());
        }
    }

    let mut document = Map::new();
    document.insert("openapi".into(), json!("3.0.3"));

    let mut info = Map::new();
    info.insert("title".into(), json!(config.title));
    info.insert("version".into(), json!(config.version));
    if let Some(description) = &config.description {
        info.insert("description".into(), json!(description));
    }
    document.insert("info".into(), Value::Object(info));

    if !config.servers.is_empty() {
        let servers: Vec<Value> = config.servers.iter().map(|url| json!({"url": url})).collect();
        document.insert("servers".into(), Value::Array(servers));
    }

    document.insert("paths".into(), Value::Object(paths));

    let mut components = Map::new();
    let schemas = registry.into_components();
    if !schemas.is_empty() {
        components.insert("schemas".into(), Value::Object(schemas));
    }

    let mut schemes = Map::new();
    for (name, scheme) in &config.security_schemes {
        schemes.insert(name.clone(), scheme.clone());
    }
    if bearer_seen && schemes.is_empty() {
        schemes.insert(
            "BearerAuth".into(),
            json!({"type": "http", "scheme": "bearer", "bearerFormat": "JWT"}),
        );
    }
    if !schemes.is_empty() {
        components.insert("securitySchemes".into(), Value::Object(schemes));
    }

    if !components.is_empty() {
        document.insert("components".into(), Value::Object(components));
    }

    Value::Object(document)
}

fn operation_methods(method: &RouteMethod) -> Vec<&'static str> {
    match method {
        RouteMethod::Verb(verb) => match verb.as_str() {
            "GET" => vec!["get"],
            "POST" => vec!["post"],
            "PUT" => vec!["put"],
            "DELETE" => vec!["delete"],
            "PATCH" => vec!["patch"],
            "HEAD" => vec!["head"],
            "OPTIONS" => vec!["options"],
            "TRACE" => vec!["trace"],
            _ => vec![],
        },
        RouteMethod::Any => vec!["get", "post", "put", "delete", "patch"],
    }
}

fn operation_json(route: &Route, registry: &mut ComponentRegistry, bearer_seen: &mut bool) -> Value {
    let mut operation = Map::new();

    let operation_id = route.name.clone().unwrap_or_else(|| {
        format!(
            "{}_{}",
            route.method.to_string().to_lowercase(),
            route
                .path
                .trim_matches('/')
                .replace(['/', '{', '}'], "_")
                .trim_matches('_')
        )
    });
    operation.insert("operationId".into(), json!(operation_id));

    if let Some(summary) = &route.summary {
        operation.insert("summary".into(), json!(summary));
    }
    if let Some(description) = &route.description {
        operation.insert("description".into(), json!(description));
    }
    if !route.tags.is_empty() {
        operation.insert("tags".into(), json!(route.tags));
    }
    if route.deprecated {
        operation.insert("deprecated".into(), json!(true));
    }

    let parameters = parameters_json(route, registry);
    if !parameters.is_empty() {
        operation.insert("parameters".into(), Value::Array(parameters));
    }

    if let Some(body) = request_body_json(route, registry) {
        operation.insert("requestBody".into(), body);
    }

    operation.insert("responses".into(), responses_json(route, registry));

    if !route.security.is_empty() {
        let requirements: Vec<Value> = route
            .security
            .iter()
            .map(|requirement| {
                *bearer_seen = true;
                json!({requirement.scheme.clone(): requirement.scopes})
            })
            .collect();
        operation.insert("security".into(), Value::Array(requirements));
    }

    Value::Object(operation)
}

fn parameters_json(route: &Route, registry: &mut ComponentRegistry) -> Vec<Value> {
    let mut parameters = Vec::new();

    // path parameters, inferred from the canonical pattern
    for name in param_names(&route.path) {
        let schema = path_param_schema(&route.raw_path, &name);
        parameters.push(json!({
            "name": name,
            "in": "path",
            "required": true,
            "schema": registry.convert(&schema),
        }));
    }

    // query/header/cookie parameters from the declared binding
    if let Some(binding) = route.request_binding {
        for field in binding.scalar_fields() {
            let location = match field.source {
                Source::Query => "query",
                Source::Header => "header",
                Source::Cookie => "cookie",
                // path params are covered above; forms ride in the body
                _ => continue,
            };
            parameters.push(json!({
                "name": field.source_key(),
                "in": location,
                "required": field.rules.required,
                "schema": registry.convert(&field_schema(field)),
            }));
        }
    }

    parameters
}

fn request_body_json(route: &Route, registry: &mut ComponentRegistry) -> Option<Value> {
    let binding = route.request_binding?;
    let schema_fn = route.request_schema?;
    let body_fields: Vec<&FieldSpec> = binding.body_fields().collect();
    if body_fields.is_empty() {
        return None;
    }

    let full = schema_fn();
    let schema = if body_fields.len() == binding.fields.len() {
        // everything binds from the body: the payload type IS the body
        full
    } else if body_fields.len() == 1 {
        // the single body field's own schema is the request body
        full.properties
            .iter()
            .find(|p| p.name == body_fields[0].name)
            .map(|p| p.schema.clone())
            .unwrap_or(full)
    } else {
        let mut narrowed = Schema::anonymous_object();
        for field in &body_fields {
            if let Some(property) = full.properties.iter().find(|p| p.name == field.name) {
                narrowed.push_property(property.clone());
            }
        }
        narrowed
    };

    let required = body_fields.iter().any(|f| f.rules.required);
    Some(json!({
        "required": required,
        "content": {"application/json": {"schema": registry.convert(&schema)}},
    }))
}

fn responses_json(route: &Route, registry: &mut ComponentRegistry) -> Value {
    let mut responses = Map::new();

    for meta in &route.responses {
        let status = meta.status.to_string();
        let description = if meta.description.is_empty() {
            http::StatusCode::from_u16(meta.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Response")
                .to_string()
        } else {
            meta.description.clone()
        };

        let mut response = Map::new();
        response.insert("description".into(), json!(description));
        if let Some(schema_fn) = meta.schema {
            let converted = registry.convert(&schema_fn());
            response.insert("content".into(), json!({"application/json": {"schema": converted}}));
        }
        if !route.response_headers.is_empty() {
            let mut headers = Map::new();
            for (name, description) in &route.response_headers {
                headers.insert(
                    name.clone(),
                    json!({"description": description, "schema": {"type": "string"}}),
                );
            }
            response.insert("headers".into(), Value::Object(headers));
        }
        responses.insert(status, Value::Object(response));
    }

    if responses.is_empty() {
        responses.insert("200".into(), json!({"description": "OK"}));
    }

    Value::Object(responses)
}

/// Infer a path parameter's schema: an explicit `:type` annotation wins,
/// then naming conventions (`id` → uuid string, numeric/time/boolean
/// keywords), defaulting to string.
fn path_param_schema(raw_path: &str, name: &str) -> Schema {
    if let Some(annotation) = segment_type_annotation(raw_path, name) {
        return match annotation.as_str() {
            "int" | "int32" | "int64" | "integer" => Schema::integer(),
            "float" | "double" | "number" => Schema::number(),
            "bool" | "boolean" => Schema::boolean(),
            "uuid" => Schema::string().format("uuid"),
            "date" => Schema::string().format("date"),
            "datetime" | "date-time" => Schema::string().format("date-time"),
            _ => Schema::string(),
        };
    }

    let lower = name.to_ascii_lowercase();
    if lower == "id" || lower.ends_with("_id") {
        return Schema::string().format("uuid");
    }
    const NUMERIC: &[&str] = &["page", "limit", "offset", "count", "size", "num", "index", "year"];
    if NUMERIC.iter().any(|k| lower == *k || lower.ends_with(&format!("_{k}"))) {
        return Schema::integer();
    }
    if lower.contains("date") || lower.contains("time") {
        return Schema::string().format("date-time");
    }
    if lower.starts_with("is_") || lower.starts_with("has_") || lower == "enabled" || lower == "active" {
        return Schema::boolean();
    }
    Schema::string()
}

fn field_schema(field: &FieldSpec) -> Schema {
    let base = |kind: ScalarKind| match kind {
        ScalarKind::String => {
            let mut schema = Schema::string();
            if let Some(format) = field.rules.format {
                schema = schema.format(format_name(format));
            }
            if let Some(values) = field.rules.one_of {
                schema = schema.enumeration(values);
            }
            schema
        }
        ScalarKind::Int | ScalarKind::UInt => Schema::integer(),
        ScalarKind::Float => Schema::number(),
        ScalarKind::Bool => Schema::boolean(),
    };

    match field.kind {
        FieldKind::Scalar(kind) => base(kind),
        FieldKind::List(kind) => Schema::array(base(kind)),
        FieldKind::Value => Schema::any(),
        FieldKind::Nested(_) => Schema::anonymous_object(),
    }
}

fn format_name(format: crate::validate::Format) -> &'static str {
    use crate::validate::Format;
    match format {
        Format::Email => "email",
        Format::DateTime => "date-time",
        Format::Date => "date",
        Format::Duration => "duration",
        Format::Ipv4 => "ipv4",
        Format::Ipv6 => "ipv6",
        Format::Uuid => "uuid",
        Format::Regex => "regex",
    }
}

/// Canonical path → document path (`{any:.*}` → `{any}`).
fn document_path(canonical: &str) -> String {
    match canonical.strip_suffix(CATCH_ALL) {
        Some(prefix) => format!("{prefix}{{any}}"),
        None => canonical.to_string(),
    }
}

/// The embedded docs shell: fetches the served spec into Swagger UI.
pub(crate) fn docs_html(spec_path: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>API Documentation</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {{
      SwaggerUIBundle({{ url: "{spec_path}", dom_id: "#swagger-ui" }});
    }};
  </script>
</body>
</html>
"##
    )
}
