//! The tag-driven validation engine.
//!
//! Runs over the JSON value a field was bound to, immediately after binding.
//! Every rule is pure and deterministic; errors always name the offending
//! field and the failing rule. Nested structures recurse with dot-prefixed
//! field names.

mod format;

pub use format::Format;

use serde_json::Value;

use crate::bind::{BindingSpec, Rules};
use crate::error::Error;

/// Validate one bound value against its rules.
pub(crate) fn validate_field(name: &str, value: &Value, rules: &Rules) -> Result<(), Error> {
    if rules.required && is_zero_value(value) {
        return Err(Error::validation(name, "required", format!("{name} is required")));
    }

    if let Some(number) = as_f64(value) {
        if let Some(min) = rules.min {
            if number < min as f64 {
                return Err(Error::validation(
                    name,
                    "min",
                    format!("{name} must be at least {min}"),
                ));
            }
        }
        if let Some(max) = rules.max {
            if number > max as f64 {
                return Err(Error::validation(
                    name,
                    "max",
                    format!("{name} must be at most {max}"),
                ));
            }
        }
        if let Some(of) = rules.multiple_of {
            let quotient = number / of;
            if (quotient - quotient.round()).abs() > 1e-9 {
                return Err(Error::validation(
                    name,
                    "multipleOf",
                    format!("{name} must be a multiple of {of}"),
                ));
            }
        }
    }

    if let Value::String(text) = value {
        let length = text.chars().count();
        if let Some(min) = rules.min_length {
            if length < min {
                return Err(Error::validation(
                    name,
                    "minLength",
                    format!("{name} must be at least {min} characters"),
                ));
            }
        }
        if let Some(max) = rules.max_length {
            if length > max {
                return Err(Error::validation(
                    name,
                    "maxLength",
                    format!("{name} must be at most {max} characters"),
                ));
            }
        }

        // absence is distinct from invalidity: empty optional strings skip
        // format, pattern and enum checks
        let skip_content_checks = text.is_empty() && !rules.required;
        if !skip_content_checks {
            if let Some(pattern) = rules.pattern {
                let re = regex::Regex::new(pattern)
                    .map_err(|e| Error::config(format!("invalid pattern for {name}: {e}")))?;
                if !re.is_match(text) {
                    return Err(Error::validation(
                        name,
                        "pattern",
                        format!("{name} must match pattern {pattern}"),
                    ));
                }
            }
            if let Some(fmt) = rules.format {
                if fmt == Format::Regex && rules.pattern.is_none() {
                    return Err(Error::config(format!(
                        "format=regex on {name} requires a companion pattern"
                    )));
                }
                if let Err(message) = format::check(fmt, text) {
                    return Err(Error::validation(name, fmt.rule_name(), message));
                }
            }
            if let Some(allowed) = rules.one_of {
                if !text.is_empty() && !allowed.contains(&text.as_str()) {
                    return Err(Error::validation(
                        name,
                        "enum",
                        format!("{name} must be one of: {}", allowed.join(", ")),
                    ));
                }
            }
        }
    }

    if let Value::Array(items) = value {
        if let Some(min) = rules.min_items {
            if items.len() < min {
                return Err(Error::validation(
                    name,
                    "minItems",
                    format!("{name} must have at least {min} items"),
                ));
            }
        }
        if let Some(max) = rules.max_items {
            if items.len() > max {
                return Err(Error::validation(
                    name,
                    "maxItems",
                    format!("{name} must have at most {max} items"),
                ));
            }
        }
        if rules.unique_items {
            let mut seen = std::collections::HashSet::new();
            for item in items {
                if !seen.insert(item.to_string()) {
                    return Err(Error::validation(
                        name,
                        "uniqueItems",
                        format!("{name} must not contain duplicates"),
                    ));
                }
            }
        }
        if let Some(allowed) = rules.one_of {
            for item in items {
                if let Value::String(text) = item {
                    if !text.is_empty() && !allowed.contains(&text.as_str()) {
                        return Err(Error::validation(
                            name,
                            "enum",
                            format!("{name} must only contain: {}", allowed.join(", ")),
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Recursively validate an object against a nested descriptor, prefixing
/// field names with `prefix` in dot notation.
pub(crate) fn validate_object(
    prefix: &str,
    value: &Value,
    spec: &'static BindingSpec,
) -> Result<(), Error> {
    let Some(object) = value.as_object() else {
        return Ok(());
    };

    for field in spec.fields {
        let full_name = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };

        match object.get(field.name) {
            None | Some(Value::Null) => {
                if field.rules.required {
                    return Err(Error::validation(
                        full_name.clone(),
                        "required",
                        format!("{full_name} is required"),
                    ));
                }
            }
            Some(child) => {
                validate_field(&full_name, child, &field.rules)?;
                if let crate::bind::FieldKind::Nested(nested) = field.kind {
                    validate_object(&full_name, child, nested())?;
                }
            }
        }
    }
    Ok(())
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// The type's zero value fails `required`: null, empty string, zero numbers,
/// `false`, and empty arrays.
fn is_zero_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Bool(b) => !b,
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}
