//! Templated declared-operation path matching (C9, pure half).
//!
//! A `*` segment in a declared path becomes `[^/]+`; the resulting regex is
//! anchored only at the start, matching the upstream catalog's own
//! prefix-match behavior — a template like `/v1/users/*` also matches
//! `/v1/users/42/sub`, not just `/v1/users/42`. This is carried forward as
//! observed, not tightened, since nothing in the design calls it a defect.

use regex::Regex;

/// Builds a prefix-anchored regex for a declared operation path containing
/// `*` wildcards. Returns `None` if the template has no wildcard — callers
/// should fall back to a literal equality check in that case.
pub fn build_path_pattern(template: &str) -> Option<Regex> {
    if !template.contains('*') {
        return None;
    }
    let mut pattern = String::from("^");
    for (i, part) in template.split('*').enumerate() {
        if i > 0 {
            pattern.push_str("[^/]+");
        }
        pattern.push_str(&regex::escape(part));
    }
    Regex::new(&pattern).ok()
}

/// A compiled declared-operation path matcher: either a wildcard regex or a
/// literal path to compare by equality.
pub enum PathMatcher {
    Literal(String),
    Pattern(Regex),
}

impl PathMatcher {
    pub fn compile(template: &str) -> Self {
        match build_path_pattern(template) {
            Some(re) => PathMatcher::Pattern(re),
            None => PathMatcher::Literal(template.to_string()),
        }
    }

    pub fn is_match(&self, path: &str) -> bool {
        match self {
            PathMatcher::Literal(lit) => lit == path,
            PathMatcher::Pattern(re) => re.is_match(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_path_requires_exact_match() {
        let matcher = PathMatcher::compile("/v1/users");
        assert!(matcher.is_match("/v1/users"));
        assert!(!matcher.is_match("/v1/users/42"));
    }

    #[test]
    fn wildcard_segment_matches_single_path_component() {
        let matcher = PathMatcher::compile("/v1/users/*");
        assert!(matcher.is_match("/v1/users/42"));
        assert!(!matcher.is_match("/v1/users"));
    }

    #[test]
    fn wildcard_pattern_is_prefix_anchored_only() {
        let matcher = PathMatcher::compile("/v1/users/*");
        assert!(matcher.is_match("/v1/users/42/extra"));
    }
}
