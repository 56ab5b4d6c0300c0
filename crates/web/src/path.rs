//! Route pattern normalization.
//!
//! User-authored patterns arrive in several dialects (`:name`, `:name:type`,
//! `{name}`, `{name:type}`, trailing `*` / `*name` wildcards). Dispatch and
//! OpenAPI generation both work off one canonical form: plain segments,
//! `{name}` captures, and at most one terminal `{any:.*}` catch-all.

/// The canonical catch-all segment a trailing wildcard normalizes to.
pub const CATCH_ALL: &str = "{any:.*}";

/// Canonicalize a route pattern.
///
/// Rules, in order:
/// 1. prepend `/` when missing, collapse runs of `/`
/// 2. a trailing `/*` or `/*name` becomes `/{any:.*}` (the authored name is
///    discarded; only a terminal wildcard is meaningful)
/// 3. `:name`, `:name:type`, `{name}` and `{name:type}` all become `{name}`
/// 4. the empty pattern becomes `/`
///
/// Any well-formed UTF-8 pattern succeeds; conflicting registrations are the
/// router's problem, not the normalizer's.
pub fn normalize(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 1);
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return "/".to_string();
    }

    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        out.push('/');
        if i == last && segment.starts_with('*') {
            out.push_str(CATCH_ALL);
            break;
        }
        out.push_str(&normalize_segment(segment));
    }
    out
}

fn normalize_segment(segment: &str) -> String {
    if let Some(rest) = segment.strip_prefix(':') {
        // `:name` or `:name:type`
        let name = rest.split(':').next().unwrap_or(rest);
        return format!("{{{name}}}");
    }
    if segment.starts_with('{') && segment.ends_with('}') {
        let inner = &segment[1..segment.len() - 1];
        // already canonical catch-all (re-normalization must be a no-op)
        if let Some(name) = inner.strip_suffix(":.*") {
            if segment == CATCH_ALL || !name.is_empty() {
                return segment.to_string();
            }
        }
        let name = inner.split(':').next().unwrap_or(inner);
        return format!("{{{name}}}");
    }
    segment.to_string()
}

/// The `:type` annotation a segment was authored with, if any.
///
/// The annotation is stripped from the canonical form but still informs
/// OpenAPI parameter schemas, so it is recovered from the raw pattern.
pub fn segment_type_annotation(raw_pattern: &str, param: &str) -> Option<String> {
    for segment in raw_pattern.split('/') {
        let inner = if let Some(rest) = segment.strip_prefix(':') {
            rest
        } else if segment.starts_with('{') && segment.ends_with('}') {
            &segment[1..segment.len() - 1]
        } else {
            continue;
        };
        let mut parts = inner.splitn(2, ':');
        let name = parts.next().unwrap_or("");
        if name == param {
            if let Some(annotation) = parts.next() {
                if annotation != ".*" && !annotation.is_empty() {
                    return Some(annotation.to_string());
                }
            }
            return None;
        }
    }
    None
}

/// Names of the `{name}` captures in a canonical path, in order.
pub fn param_names(canonical: &str) -> Vec<String> {
    canonical
        .split('/')
        .filter_map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') {
                let inner = &segment[1..segment.len() - 1];
                let name = inner.split(':').next().unwrap_or(inner);
                Some(name.to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Join a group prefix with a child path using single-slash separation.
pub fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }
    } else {
        format!("{prefix}/{path}")
    }
}
