//! Route matching logic.
//!
//! # Responsibilities
//! - Match the request method (exact, or `*` for any)
//! - Match the request path segment by segment
//! - Bind placeholder segments to their values
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Trailing slashes are significant: `/content` and `/content/` differ
//! - A placeholder matches exactly one non-empty segment
//! - No regex to guarantee O(n) matching

use axum::http::Method;

/// Matches the request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    Any,
    Exact(Method),
}

impl MethodMatcher {
    /// Parse a configured method. `*` and `ANY` match every method.
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "*" | "ANY" => Some(Self::Any),
            _ => Method::from_bytes(upper.as_bytes()).ok().map(Self::Exact),
        }
    }

    pub fn matches(&self, method: &Method) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == method,
        }
    }
}

impl std::fmt::Display for MethodMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(m) => write!(f, "{}", m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Values bound to placeholder segments, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A compiled path template such as `/api/content/{id}`.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = raw
            .split('/')
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if !name.is_empty() => Segment::Placeholder(name.to_string()),
                _ => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { raw, segments }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a full request path. Returns the bound placeholders on success.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = Vec::new();
        let mut parts = path.split('/');

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Placeholder(_) if part.is_empty() => return None,
                Segment::Placeholder(name) => params.push((name.clone(), part.to_string())),
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(PathParams(params))
    }

    /// True when both patterns accept exactly the same paths (placeholder names aside).
    pub fn same_shape(&self, other: &PathPattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    (Segment::Placeholder(_), Segment::Placeholder(_)) => true,
                    _ => false,
                })
    }

    /// Rebuild the path from the template segments. Placeholders take their
    /// bound values in pattern order, falling back to a lookup by name.
    /// Bound values are inserted verbatim and never re-scanned.
    pub fn render(&self, params: &PathParams) -> String {
        let mut bound = params.iter();
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(lit) => lit.clone(),
                Segment::Placeholder(name) => bound
                    .next()
                    .filter(|(k, _)| *k == name.as_str())
                    .map(|(_, v)| v)
                    .or_else(|| params.get(name))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{{{name}}}")),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        let p = PathPattern::parse("/api/users/login");
        assert_eq!(p.matches("/api/users/login"), Some(PathParams::default()));
        assert!(p.matches("/api/users/Login").is_none()); // Case sensitive
        assert!(p.matches("/api/users").is_none());
        assert!(p.matches("/api/users/login/extra").is_none());
    }

    #[test]
    fn test_trailing_slash_is_distinct() {
        let p = PathPattern::parse("/api/content");
        assert!(p.matches("/api/content").is_some());
        assert!(p.matches("/api/content/").is_none());

        let slash = PathPattern::parse("/api/content/");
        assert!(slash.matches("/api/content/").is_some());
        assert!(slash.matches("/api/content").is_none());
    }

    #[test]
    fn test_placeholder_binds() {
        let p = PathPattern::parse("/api/recommendations/{userId}");
        let params = p.matches("/api/recommendations/u-17").unwrap();
        assert_eq!(params.get("userId"), Some("u-17"));

        // Placeholders never match an empty segment
        assert!(PathPattern::parse("/api/content/{id}").matches("/api/content/").is_none());
    }

    #[test]
    fn test_render_substitutes_first_occurrence() {
        let p = PathPattern::parse("/api/content/{id}");
        let params: PathParams = [("id", "42")].into_iter().collect();
        assert_eq!(p.render(&params), "/api/content/42");

        let twice = PathPattern::parse("/a/{id}/b/{id}");
        let params = twice.matches("/a/1/b/2").unwrap();
        assert_eq!(twice.render(&params), "/a/1/b/2");
    }

    #[test]
    fn test_render_does_not_rescan_bound_values() {
        let p = PathPattern::parse("/a/{x}/{y}");
        let params = p.matches("/a/{y}/q").unwrap();
        assert_eq!(params.get("x"), Some("{y}"));
        assert_eq!(p.render(&params), "/a/{y}/q");

        let unbound = PathPattern::parse("/a/{x}");
        assert_eq!(unbound.render(&PathParams::default()), "/a/{x}");
    }

    #[test]
    fn test_same_shape_ignores_placeholder_names() {
        let a = PathPattern::parse("/api/content/{id}");
        let b = PathPattern::parse("/api/content/{contentId}");
        let c = PathPattern::parse("/api/content/latest");
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }

    #[test]
    fn test_method_matcher() {
        let get = MethodMatcher::parse("get").unwrap();
        assert!(get.matches(&Method::GET));
        assert!(!get.matches(&Method::POST));
        assert!(MethodMatcher::parse("*").unwrap().matches(&Method::DELETE));
        assert!(MethodMatcher::parse("GE T").is_none());
    }
}
