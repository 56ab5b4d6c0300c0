//! `Accept`-header content negotiation for structured responses.
//!
//! JSON is the default; XML, YAML and plain text are offered when the client
//! prefers them. Quality weights are honored, unknown types fall through.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiated {
    Json,
    Xml,
    Yaml,
    Text,
}

impl Negotiated {
    pub fn content_type(self) -> &'static str {
        match self {
            Negotiated::Json => "application/json; charset=utf-8",
            Negotiated::Xml => "application/xml; charset=utf-8",
            Negotiated::Yaml => "application/yaml; charset=utf-8",
            Negotiated::Text => "text/plain; charset=utf-8",
        }
    }
}

/// Pick the response encoding for an `Accept` header value.
pub fn negotiate(accept: Option<&str>) -> Negotiated {
    let Some(accept) = accept else {
        return Negotiated::Json;
    };

    let mut ranges: Vec<(f32, Negotiated)> = Vec::new();
    for (position, item) in accept.split(',').enumerate() {
        let mut parts = item.split(';');
        let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let mut quality = 1.0f32;
        for param in parts {
            let param = param.trim();
            if let Some(q) = param.strip_prefix("q=") {
                quality = q.parse().unwrap_or(1.0);
            }
        }
        let negotiated = match media.as_str() {
            "application/json" | "text/json" | "*/*" | "application/*" => Negotiated::Json,
            "application/xml" | "text/xml" => Negotiated::Xml,
            "application/yaml" | "application/x-yaml" | "text/yaml" => Negotiated::Yaml,
            "text/plain" => Negotiated::Text,
            _ => continue,
        };
        // stable order: higher q first, earlier position wins ties
        ranges.push((quality - position as f32 * 1e-4, negotiated));
    }

    ranges
        .into_iter()
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, negotiated)| negotiated)
        .unwrap_or(Negotiated::Json)
}

/// Encode a JSON value in the negotiated representation.
pub fn encode(value: &serde_json::Value, kind: Negotiated) -> Result<Vec<u8>, Error> {
    match kind {
        Negotiated::Json => serde_json::to_vec(value).map_err(|e| Error::encode(e.to_string())),
        Negotiated::Xml => quick_xml::se::to_string_with_root("response", value)
            .map(String::into_bytes)
            .map_err(|e| Error::encode(e.to_string())),
        Negotiated::Yaml => serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| Error::encode(e.to_string())),
        Negotiated::Text => match value {
            serde_json::Value::String(s) => Ok(s.clone().into_bytes()),
            other => Ok(other.to_string().into_bytes()),
        },
    }
}
