//! Virtual path normalization and prefix matching.
//!
//! Normalization is pure and idempotent; it never consults the host
//! filesystem. A query suffix (`?...`) is carried through untouched so that
//! search paths such as `/toolfs/rag/query?text=x` keep their parameters.

/// Canonicalize a virtual path.
///
/// Backslashes become `/`, consecutive slashes collapse to one, a trailing
/// `/` is removed unless the path is exactly `/`, and a leading `./` is
/// stripped. Only the portion before the first `?` is rewritten.
pub fn normalize(path: &str) -> String {
    let (stem, query) = split_query(path);

    if is_canonical(stem) {
        return path.to_owned();
    }

    let mut out = String::with_capacity(stem.len());
    let mut last_slash = false;
    for ch in stem.chars() {
        let ch = if ch == '\\' { '/' } else { ch };
        if ch == '/' {
            if !last_slash {
                out.push('/');
            }
            last_slash = true;
        } else {
            out.push(ch);
            last_slash = false;
        }
    }

    if let Some(rest) = out.strip_prefix("./") {
        out = rest.to_owned();
    }

    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }

    if let Some(query) = query {
        out.push_str(query);
    }
    out
}

/// Split a path into its normalizable stem and an optional `?...` suffix.
pub fn split_query(path: &str) -> (&str, Option<&str>) {
    match path.find('?') {
        Some(idx) => (&path[..idx], Some(&path[idx..])),
        None => (path, None),
    }
}

/// One-pass check for an already-canonical stem.
fn is_canonical(stem: &str) -> bool {
    if stem.starts_with("./") {
        return false;
    }
    let bytes = stem.as_bytes();
    let mut prev_slash = false;
    for (idx, b) in bytes.iter().enumerate() {
        match b {
            b'\\' => return false,
            b'/' => {
                if prev_slash {
                    return false;
                }
                if idx == bytes.len() - 1 && stem.len() > 1 {
                    return false;
                }
                prev_slash = true;
            }
            _ => prev_slash = false,
        }
    }
    true
}

/// Component-wise prefix test: `/a` prefixes `/a` and `/a/b` but not `/ab`.
///
/// The query suffix of `path`, if any, never participates in matching.
pub fn is_path_prefix(prefix: &str, path: &str) -> bool {
    let (stem, _) = split_query(path);
    if prefix == "/" {
        return stem.starts_with('/');
    }
    if !stem.starts_with(prefix) {
        return false;
    }
    stem.len() == prefix.len() || stem.as_bytes()[prefix.len()] == b'/'
}

/// The remainder of `path` under `prefix`, without a leading slash.
///
/// A query suffix stays attached to the remainder, so
/// `relative_to("/toolfs/rag", "/toolfs/rag/query?q=x")` is `query?q=x`.
pub fn relative_to(prefix: &str, path: &str) -> String {
    let rest = &path[prefix.len().min(path.len())..];
    rest.trim_start_matches('/').to_owned()
}
