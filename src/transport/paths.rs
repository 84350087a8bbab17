//! Path-boundary matching for the cross-origin allow-list.

/// True iff `path` equals `prefix` exactly, or starts with `prefix` followed
/// immediately by a path separator.
///
/// A bare `starts_with` would let `/mcp-admin` ride on an allow-listed
/// `/mcp`; the boundary check closes that bypass. A prefix that already ends
/// in `/` is matched as-is without re-adding a separator.
pub fn path_matches(path: &str, prefix: &str) -> bool {
    if prefix.ends_with('/') {
        return path.starts_with(prefix);
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Immutable set of path prefixes permitted to receive cross-origin
/// headers. Fixed at startup, read-only at request time.
#[derive(Debug, Clone)]
pub struct PathAllowList {
    prefixes: Vec<String>,
}

impl PathAllowList {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path_matches(path, prefix))
    }
}
