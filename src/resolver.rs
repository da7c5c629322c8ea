//! Pluggable target resolution.
//!
//! A [`Provider`](crate::Provider) maps each request to a [`Target`] through
//! a [`TargetResolver`]. The default is the provider's own
//! [`RouteManager`]; [`RegexTargetResolver`] maps raw regular expressions
//! instead.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::request::RequestContext;
use crate::route_manager::RouteManager;
use crate::target::{Target, TargetType};

/// Maps a request to the target it addresses. `None` means no match; the
/// provider answers such requests with 404.
pub trait TargetResolver: Send + Sync {
    fn resolve(&self, request: &RequestContext) -> Option<Target>;
}

impl TargetResolver for RouteManager {
    fn resolve(&self, request: &RequestContext) -> Option<Target> {
        RouteManager::resolve(self, request)
    }
}

struct RegexTarget {
    regex: Regex,
    target_type: TargetType,
    fields: Vec<String>,
}

/// Resolves targets by matching the whole target path (query stripped)
/// against regular expressions, tried in registration order.
///
/// Named capture groups become target parameters. Unnamed groups can be
/// named positionally with [`pattern_with_fields`](Self::pattern_with_fields):
/// the n-th field names group n.
///
/// ```
/// use abdera::{RegexTargetResolver, TargetType};
///
/// let resolver = RegexTargetResolver::new()
///     .pattern(r"/", TargetType::Service)?
///     .pattern(r"/(?P<collection>[^/;?]+)", TargetType::Collection)?
///     .pattern_with_fields(r"/([^/;?]+)/([^/;?]+)", TargetType::Entry, &["collection", "entry"])?;
/// # Ok::<(), abdera::Error>(())
/// ```
#[derive(Default)]
pub struct RegexTargetResolver {
    targets: Vec<RegexTarget>,
}

impl RegexTargetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pattern` for `target_type`. Fails with
    /// [`Error::InvalidRoute`] if the expression does not compile.
    pub fn pattern(self, pattern: &str, target_type: TargetType) -> Result<Self> {
        self.pattern_with_fields(pattern, target_type, &[])
    }

    pub fn pattern_with_fields(mut self, pattern: &str, target_type: TargetType, fields: &[&str]) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| Error::InvalidRoute {
            pattern: pattern.to_owned(),
            reason: e.to_string(),
        })?;
        let fields = fields.iter().map(|f| (*f).to_owned()).collect();
        self.targets.push(RegexTarget { regex, target_type, fields });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn resolve_path(&self, path: &str) -> Option<Target> {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        let (found, captures) = self.targets.iter().find_map(|t| t.regex.captures(path).map(|c| (t, c)))?;

        let mut params = HashMap::new();
        for name in found.regex.capture_names().flatten() {
            if let Some(value) = captures.name(name) {
                params.insert(name.to_owned(), value.as_str().to_owned());
            }
        }
        for (i, field) in found.fields.iter().enumerate() {
            if let Some(value) = captures.get(i + 1) {
                params.insert(field.clone(), value.as_str().to_owned());
            }
        }
        debug!(path, target_type = %found.target_type, pattern = found.regex.as_str(), "regex target");
        Some(Target::new(found.target_type.clone(), path).with_params(params))
    }
}

impl TargetResolver for RegexTargetResolver {
    fn resolve(&self, request: &RequestContext) -> Option<Target> {
        self.resolve_path(request.target_path())
    }
}

impl std::fmt::Debug for RegexTargetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.targets.iter().map(|t| (t.regex.as_str(), &t.target_type))).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> RegexTargetResolver {
        RegexTargetResolver::new()
            .pattern("/", TargetType::Service)
            .and_then(|r| r.pattern(r"/(?P<collection>[^/;?]+)", TargetType::Collection))
            .and_then(|r| r.pattern_with_fields(r"/([^/;?]+)/([^/;?]+)", TargetType::Entry, &["collection", "entry"]))
            .unwrap()
    }

    #[test]
    fn named_groups_and_fields_become_parameters() {
        let resolver = resolver();
        assert_eq!(resolver.len(), 3);

        let target = resolver.resolve_path("/posts?page=2").unwrap();
        assert_eq!(target.target_type(), &TargetType::Collection);
        assert_eq!(target.identity(), "/posts");
        assert_eq!(target.parameter("collection"), Some("posts"));

        let target = resolver.resolve_path("/posts/42").unwrap();
        assert_eq!(target.target_type(), &TargetType::Entry);
        assert_eq!(target.parameter("collection"), Some("posts"));
        assert_eq!(target.parameter("entry"), Some("42"));

        assert_eq!(resolver.resolve_path("/").unwrap().target_type(), &TargetType::Service);
    }

    #[test]
    fn patterns_match_whole_paths_in_order() {
        let resolver = RegexTargetResolver::new()
            .pattern("/search/.*", TargetType::named("search"))
            .and_then(|r| r.pattern("/.*", TargetType::Collection))
            .unwrap();
        assert_eq!(resolver.resolve_path("/search/atom").unwrap().target_type(), &TargetType::named("search"));
        assert_eq!(resolver.resolve_path("/x/search/atom").unwrap().target_type(), &TargetType::Collection);
        assert!(self::resolver().resolve_path("/a/b/c").is_none());
    }

    #[test]
    fn bad_expressions_are_rejected() {
        let err = RegexTargetResolver::new().pattern("/(", TargetType::Service).unwrap_err();
        assert!(matches!(err, Error::InvalidRoute { ref pattern, .. } if pattern == "/("));
    }

    #[test]
    fn route_managers_resolve_through_the_trait() {
        let routes = RouteManager::new().add_route("feed", "/:collection", TargetType::Collection).unwrap();
        let resolver: &dyn TargetResolver = &routes;
        let req = RequestContext::builder().uri("/posts").build();
        assert_eq!(resolver.resolve(&req).unwrap().route_key(), Some("feed"));
    }
}
