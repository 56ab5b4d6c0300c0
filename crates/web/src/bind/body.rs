//! Body decoding for bound fields, selected by `Content-Type`.

use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::Error;

/// Decode the request body by `Content-Type` into a JSON value. XML and
/// form bodies decode with string leaves; the caller coerces them against
/// the declared field shapes.
pub(crate) async fn decode_body(ctx: &Context) -> Result<Value, Error> {
    // absent content type defaults to JSON
    let media = ctx.content_type().unwrap_or("application/json").to_ascii_lowercase();
    let body = ctx.body();

    match media.as_str() {
        "application/json" | "text/json" => serde_json::from_slice::<Value>(body)
            .map_err(|e| Error::bind("body", format!("invalid json body: {e}"))),

        "application/xml" | "text/xml" => {
            let text = std::str::from_utf8(body)
                .map_err(|_| Error::bind("body", "xml body is not utf-8"))?;
            xml_to_value(text).map_err(|e| Error::bind("body", e))
        }

        "application/yaml" | "application/x-yaml" | "text/yaml" => {
            serde_yaml::from_slice::<Value>(body)
                .map_err(|e| Error::bind("body", format!("invalid yaml body: {e}")))
        }

        "application/x-www-form-urlencoded" => {
            let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
                .map_err(|e| Error::bind("body", format!("invalid form body: {e}")))?;
            Ok(pairs_to_value(&pairs))
        }

        "multipart/form-data" => {
            let form = ctx.form().await?;
            Ok(pairs_to_value(form.values()))
        }

        other => Err(Error::UnsupportedMediaType(other.to_string())),
    }
}

/// Collect form pairs into an object; repeated keys become arrays.
fn pairs_to_value(pairs: &[(String, String)]) -> Value {
    let mut object = Map::new();
    for (key, value) in pairs {
        match object.get_mut(key) {
            None => {
                object.insert(key.clone(), Value::String(value.clone()));
            }
            Some(Value::Array(items)) => items.push(Value::String(value.clone())),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value.clone())]);
            }
        }
    }
    Value::Object(object)
}

/// Convert an XML document into a JSON value: child elements become object
/// entries (repeated names become arrays), text-only elements become
/// strings. Attributes and the root element name are discarded.
pub(crate) fn xml_to_value(input: &str) -> Result<Value, String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(input);
    loop {
        match reader.read_event().map_err(|e| format!("invalid xml: {e}"))? {
            Event::Start(start) => {
                let name = start.name().as_ref().to_vec();
                return parse_element(&mut reader, &name);
            }
            Event::Decl(_) | Event::Comment(_) | Event::Text(_) | Event::PI(_) => continue,
            Event::Empty(_) => return Ok(Value::Object(Map::new())),
            Event::Eof => return Err("empty xml document".to_string()),
            _ => return Err("unexpected xml structure".to_string()),
        }
    }
}

fn parse_element(reader: &mut quick_xml::Reader<&[u8]>, name: &[u8]) -> Result<Value, String> {
    use quick_xml::events::Event;

    let mut children: Map<String, Value> = Map::new();
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(|e| format!("invalid xml: {e}"))? {
            Event::Start(start) => {
                let child_name = start.name().as_ref().to_vec();
                let value = parse_element(reader, &child_name)?;
                insert_child(&mut children, &child_name, value);
            }
            Event::Empty(empty) => {
                let child_name = empty.name().as_ref().to_vec();
                insert_child(&mut children, &child_name, Value::String(String::new()));
            }
            Event::Text(t) => {
                let chunk = t.unescape().map_err(|e| format!("invalid xml text: {e}"))?;
                text.push_str(chunk.trim());
            }
            Event::CData(cdata) => {
                text.push_str(&String::from_utf8_lossy(&cdata));
            }
            Event::End(end) if end.name().as_ref() == name => break,
            Event::End(_) => return Err("mismatched closing tag".to_string()),
            Event::Eof => return Err("unexpected end of xml".to_string()),
            _ => continue,
        }
    }

    if children.is_empty() {
        Ok(Value::String(text))
    } else {
        Ok(Value::Object(children))
    }
}

fn insert_child(children: &mut Map<String, Value>, name: &[u8], value: Value) {
    let key = String::from_utf8_lossy(name).into_owned();
    match children.get_mut(&key) {
        None => {
            children.insert(key, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}
