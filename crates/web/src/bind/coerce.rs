//! String-to-typed coercion for scalar sources and defaults.

use serde_json::{Number, Value};

use super::{FieldKind, FieldSpec, ScalarKind};
use crate::error::Error;

pub(crate) fn coerce_field(field: &FieldSpec, raws: Vec<String>) -> Result<Value, Error> {
    match field.kind {
        FieldKind::Scalar(kind) => {
            let raw = raws.first().map(String::as_str).unwrap_or("");
            coerce_scalar(kind, raw).map_err(|reason| Error::bind(field.name, reason))
        }
        FieldKind::List(kind) => {
            let mut items = Vec::with_capacity(raws.len());
            for raw in &raws {
                items.push(coerce_scalar(kind, raw).map_err(|reason| Error::bind(field.name, reason))?);
            }
            Ok(Value::Array(items))
        }
        FieldKind::Value => {
            let raw = raws.first().map(String::as_str).unwrap_or("");
            Ok(Value::String(raw.to_string()))
        }
        FieldKind::Nested(_) => Err(Error::bind(
            field.name,
            "nested shapes can only bind from the request body",
        )),
    }
}

pub(crate) fn coerce_scalar(kind: ScalarKind, raw: &str) -> Result<Value, String> {
    match kind {
        ScalarKind::String => Ok(Value::String(raw.to_string())),
        ScalarKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(|n| Value::Number(Number::from(n)))
            .map_err(|_| format!("cannot parse {raw:?} as integer")),
        ScalarKind::UInt => raw
            .trim()
            .parse::<u64>()
            .map(|n| Value::Number(Number::from(n)))
            .map_err(|_| format!("cannot parse {raw:?} as unsigned integer")),
        ScalarKind::Float => {
            let parsed: f64 = raw
                .trim()
                .parse()
                .map_err(|_| format!("cannot parse {raw:?} as number"))?;
            Number::from_f64(parsed)
                .map(Value::Number)
                .ok_or_else(|| format!("{raw:?} is not a finite number"))
        }
        ScalarKind::Bool => match raw.trim() {
            "true" | "TRUE" | "True" | "1" => Ok(Value::Bool(true)),
            "false" | "FALSE" | "False" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("cannot parse {raw:?} as boolean")),
        },
    }
}

/// Best-effort conversion of a string-leafed tree (XML, forms) into the
/// shapes a nested descriptor declares. Unknown keys are left as-is.
pub(crate) fn coerce_tree(value: &mut Value, spec: &'static super::BindingSpec) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    for field in spec.fields {
        let Some(entry) = object.get_mut(field.name) else {
            continue;
        };
        match field.kind {
            FieldKind::Scalar(kind) => {
                if let Value::String(raw) = entry {
                    if let Ok(coerced) = coerce_scalar(kind, raw) {
                        *entry = coerced;
                    }
                }
            }
            FieldKind::List(kind) => {
                // single element trees decode as a lone value; wrap it
                if !entry.is_array() {
                    *entry = Value::Array(vec![entry.take()]);
                }
                if let Value::Array(items) = entry {
                    for item in items {
                        if let Value::String(raw) = item {
                            if let Ok(coerced) = coerce_scalar(kind, raw) {
                                *item = coerced;
                            }
                        }
                    }
                }
            }
            FieldKind::Nested(nested) => coerce_tree(entry, nested()),
            FieldKind::Value => {}
        }
    }
}
