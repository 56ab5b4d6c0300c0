//! JSON Schema construction and deduplication.
//!
//! [`ApiType`] is the schema-derivation trait: scalars, containers and
//! chrono/uuid types ship impls, structs get theirs from
//! `#[derive(ApiType)]`. The [`ComponentRegistry`] replaces structurally
//! recurring object schemas with `$ref`s into `components.schemas`.

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl SchemaType {
    fn as_str(self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Integer => "integer",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
        }
    }
}

/// One property of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub schema: Schema,
    /// Optional properties stay out of the `required` list.
    pub optional: bool,
    pub description: Option<String>,
}

/// A language-neutral schema shape, converted to OpenAPI JSON on assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub title: Option<String>,
    pub ty: SchemaType,
    pub format: Option<String>,
    pub description: Option<String>,
    pub nullable: bool,
    pub properties: Vec<Property>,
    pub items: Option<Box<Schema>>,
    /// Open object (string-keyed map).
    pub additional: Option<Box<Schema>>,
    pub enumeration: Vec<String>,
}

impl Schema {
    fn of(ty: SchemaType) -> Self {
        Self {
            title: None,
            ty,
            format: None,
            description: None,
            nullable: false,
            properties: Vec::new(),
            items: None,
            additional: None,
            enumeration: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        let mut schema = Self::of(SchemaType::Array);
        schema.items = Some(Box::new(items));
        schema
    }

    pub fn object(title: impl Into<String>) -> Self {
        let mut schema = Self::of(SchemaType::Object);
        schema.title = Some(title.into());
        schema
    }

    pub fn anonymous_object() -> Self {
        Self::of(SchemaType::Object)
    }

    /// String-keyed map with uniform values.
    pub fn map(values: Schema) -> Self {
        let mut schema = Self::of(SchemaType::Object);
        schema.additional = Some(Box::new(values));
        schema
    }

    /// Completely untyped value.
    pub fn any() -> Self {
        let mut schema = Self::of(SchemaType::Object);
        schema.additional = Some(Box::new(Schema::of(SchemaType::Object)));
        schema
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn enumeration(mut self, values: &[&str]) -> Self {
        self.enumeration = values.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.push(Property {
            name: name.into(),
            schema,
            optional: false,
            description: None,
        });
        self
    }

    pub fn optional_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.push(Property {
            name: name.into(),
            schema,
            optional: true,
            description: None,
        });
        self
    }

    pub fn push_property(&mut self, property: Property) {
        self.properties.push(property);
    }

    /// The dedup signature: title + type + required set + property names.
    pub(crate) fn signature(&self) -> String {
        let mut required: Vec<&str> = self
            .properties
            .iter()
            .filter(|p| !p.optional)
            .map(|p| p.name.as_str())
            .collect();
        required.sort_unstable();
        let mut names: Vec<&str> = self.properties.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        format!(
            "{}|{}|{}|{}",
            self.title.as_deref().unwrap_or(""),
            self.ty.as_str(),
            required.join(","),
            names.join(",")
        )
    }
}

/// A type whose schema can be derived for the OpenAPI document.
pub trait ApiType {
    fn schema() -> Schema;
}

macro_rules! scalar_api_type {
    ($ty:ty => $ctor:ident $(, $format:literal)?) => {
        impl ApiType for $ty {
            fn schema() -> Schema {
                Schema::$ctor()$(.format($format))?
            }
        }
    };
}

scalar_api_type!(String => string);
scalar_api_type!(bool => boolean);
scalar_api_type!(i8 => integer);
scalar_api_type!(i16 => integer);
scalar_api_type!(i32 => integer, "int32");
scalar_api_type!(i64 => integer, "int64");
scalar_api_type!(isize => integer, "int64");
scalar_api_type!(u8 => integer);
scalar_api_type!(u16 => integer);
scalar_api_type!(u32 => integer, "int32");
scalar_api_type!(u64 => integer, "int64");
scalar_api_type!(usize => integer, "int64");
scalar_api_type!(f32 => number, "float");
scalar_api_type!(f64 => number, "double");

impl<T: ApiType> ApiType for Option<T> {
    fn schema() -> Schema {
        T::schema().nullable()
    }
}

impl<T: ApiType> ApiType for Vec<T> {
    fn schema() -> Schema {
        Schema::array(T::schema())
    }
}

impl<T: ApiType> ApiType for HashMap<String, T> {
    fn schema() -> Schema {
        Schema::map(T::schema())
    }
}

impl<T: ApiType> ApiType for BTreeMap<String, T> {
    fn schema() -> Schema {
        Schema::map(T::schema())
    }
}

impl ApiType for Value {
    fn schema() -> Schema {
        Schema::any()
    }
}

impl ApiType for () {
    fn schema() -> Schema {
        Schema::anonymous_object()
    }
}

impl<Tz: chrono::TimeZone> ApiType for chrono::DateTime<Tz> {
    fn schema() -> Schema {
        Schema::string().format("date-time")
    }
}

impl ApiType for chrono::NaiveDate {
    fn schema() -> Schema {
        Schema::string().format("date")
    }
}

impl ApiType for uuid::Uuid {
    fn schema() -> Schema {
        Schema::string().format("uuid")
    }
}

/// Replaces recurring object schemas with component references.
///
/// Structural equality is approximated by the signature (title, type,
/// required set, property-name set); matching shapes reuse one component.
#[derive(Default)]
pub(crate) struct ComponentRegistry {
    components: Vec<(String, Value)>,
    by_signature: HashMap<String, String>,
    used_names: HashSet<String>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a schema to JSON, interning object shapes as components and
    /// returning `$ref`s for them.
    pub fn convert(&mut self, schema: &Schema) -> Value {
        match schema.ty {
            SchemaType::Object if schema.additional.is_none() && !schema.properties.is_empty() => {
                let signature = schema.signature();
                if let Some(name) = self.by_signature.get(&signature) {
                    return reference(name);
                }
                let name = self.coin_name(schema, &signature);
                self.by_signature.insert(signature, name.clone());

                let body = self.object_json(schema);
                self.components.push((name.clone(), body));
                reference(&name)
            }
            _ => self.inline_json(schema),
        }
    }

    fn coin_name(&mut self, schema: &Schema, signature: &str) -> String {
        let base = match &schema.title {
            Some(title) if !title.is_empty() => title.clone(),
            _ => format!("Schema{}", content_hash(signature)),
        };
        let name = if self.used_names.contains(&base) {
            format!("{base}{}", content_hash(signature))
        } else {
            base
        };
        self.used_names.insert(name.clone());
        name
    }

    fn object_json(&mut self, schema: &Schema) -> Value {
        let mut body = Map::new();
        if let Some(title) = &schema.title {
            body.insert("title".into(), json!(title));
        }
        body.insert("type".into(), json!("object"));
        if let Some(description) = &schema.description {
            body.insert("description".into(), json!(description));
        }

        let mut properties = Map::new();
        let mut required = Vec::new();
        for property in &schema.properties {
            let mut converted = self.convert(&property.schema);
            if let (Some(description), Some(object)) =
                (&property.description, converted.as_object_mut())
            {
                object.entry("description").or_insert_with(|| json!(description));
            }
            properties.insert(property.name.clone(), converted);
            if !property.optional {
                required.push(json!(property.name));
            }
        }
        body.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            body.insert("required".into(), Value::Array(required));
        }
        Value::Object(body)
    }

    fn inline_json(&mut self, schema: &Schema) -> Value {
        let mut body = Map::new();
        body.insert("type".into(), json!(schema.ty.as_str()));
        if let Some(format) = &schema.format {
            body.insert("format".into(), json!(format));
        }
        if let Some(description) = &schema.description {
            body.insert("description".into(), json!(description));
        }
        if schema.nullable {
            body.insert("nullable".into(), json!(true));
        }
        if !schema.enumeration.is_empty() {
            body.insert("enum".into(), json!(schema.enumeration));
        }
        if let Some(items) = &schema.items {
            let converted = self.convert(items);
            body.insert("items".into(), converted);
        }
        if let Some(additional) = &schema.additional {
            if additional.ty == SchemaType::Object && additional.properties.is_empty() {
                body.insert("additionalProperties".into(), json!(true));
            } else {
                let converted = self.convert(additional);
                body.insert("additionalProperties".into(), converted);
            }
        }
        if schema.ty == SchemaType::Object && !schema.properties.is_empty() {
            // object with properties but without component interning
            // (only reachable for nullable-wrapped anonymous shapes)
            let mut properties = Map::new();
            for property in &schema.properties {
                let converted = self.convert(&property.schema);
                properties.insert(property.name.clone(), converted);
            }
            body.insert("properties".into(), Value::Object(properties));
        }
        Value::Object(body)
    }

    /// The interned components, in first-registration order.
    pub fn into_components(self) -> Map<String, Value> {
        let mut map = Map::new();
        for (name, body) in self.components {
            map.insert(name, body);
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

fn reference(name: &str) -> Value {
    json!({"$ref": format!("#/components/schemas/{name}")})
}

/// Deterministic short hash for anonymous component names.
fn content_hash(signature: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    signature.hash(&mut hasher);
    format!("{:08x}", hasher.finish() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_schema() -> Schema {
        Schema::object("Book")
            .property("title", Schema::string())
            .property("year", Schema::integer())
            .optional_property("isbn", Schema::string())
    }

    #[test]
    fn identical_shapes_share_one_component() {
        let mut registry = ComponentRegistry::new();
        let first = registry.convert(&book_schema());
        let second = registry.convert(&book_schema());

        assert_eq!(first, second);
        assert_eq!(first["$ref"], "#/components/schemas/Book");

        let components = registry.into_components();
        assert_eq!(components.len(), 1);
        assert!(components.contains_key("Book"));
    }

    #[test]
    fn component_records_required_and_properties() {
        let mut registry = ComponentRegistry::new();
        registry.convert(&book_schema());
        let components = registry.into_components();
        let book = &components["Book"];

        assert_eq!(book["type"], "object");
        assert_eq!(book["required"], json!(["title", "year"]));
        assert_eq!(book["properties"]["year"]["type"], "integer");
    }

    #[test]
    fn different_shapes_with_same_title_get_distinct_names() {
        let mut registry = ComponentRegistry::new();
        registry.convert(&book_schema());
        let other = Schema::object("Book").property("completely", Schema::string());
        let converted = registry.convert(&other);

        let reference = converted["$ref"].as_str().unwrap();
        assert_ne!(reference, "#/components/schemas/Book");

        let components = registry.into_components();
        assert_eq!(components.len(), 2);
    }

    #[test]
    fn untitled_objects_get_hash_names() {
        let mut registry = ComponentRegistry::new();
        let anonymous = Schema::anonymous_object().property("x", Schema::integer());
        let converted = registry.convert(&anonymous);
        let reference = converted["$ref"].as_str().unwrap();
        assert!(reference.starts_with("#/components/schemas/Schema"));
    }

    #[test]
    fn arrays_and_maps_inline_with_item_refs() {
        let mut registry = ComponentRegistry::new();
        let list = Schema::array(book_schema());
        let converted = registry.convert(&list);
        assert_eq!(converted["type"], "array");
        assert_eq!(converted["items"]["$ref"], "#/components/schemas/Book");

        let map = Schema::map(Schema::integer());
        let converted = registry.convert(&map);
        assert_eq!(converted["additionalProperties"]["type"], "integer");
    }

    #[test]
    fn derived_scalar_schemas() {
        assert_eq!(i64::schema().ty, SchemaType::Integer);
        assert_eq!(f64::schema().format.as_deref(), Some("double"));
        assert!(Option::<String>::schema().nullable);
        assert_eq!(Vec::<bool>::schema().ty, SchemaType::Array);
        assert_eq!(
            chrono::DateTime::<chrono::Utc>::schema().format.as_deref(),
            Some("date-time")
        );
        assert_eq!(uuid::Uuid::schema().format.as_deref(), Some("uuid"));
    }
}
