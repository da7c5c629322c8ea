//! The resolved identity of a request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::CollectionAdapter;

/// What kind of resource a request addresses.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum TargetType {
    Service,
    Collection,
    Entry,
    Media,
    Categories,
    NotFound,
    Unknown,
    /// A user-registered type. Names are stored upper-cased.
    Custom(String),
}

impl TargetType {
    /// Looks up a type by name. Built-in names map to the built-in variants;
    /// anything else becomes [`TargetType::Custom`].
    pub fn named(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "SERVICE"    => Self::Service,
            "COLLECTION" => Self::Collection,
            "ENTRY"      => Self::Entry,
            "MEDIA"      => Self::Media,
            "CATEGORIES" => Self::Categories,
            "NOT_FOUND"  => Self::NotFound,
            "UNKNOWN"    => Self::Unknown,
            _            => Self::Custom(upper),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Service    => "SERVICE",
            Self::Collection => "COLLECTION",
            Self::Entry      => "ENTRY",
            Self::Media      => "MEDIA",
            Self::Categories => "CATEGORIES",
            Self::NotFound   => "NOT_FOUND",
            Self::Unknown    => "UNKNOWN",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A request mapped onto a route: its type, the path it matched, the route
/// key and the variables parsed out of the path.
#[derive(Clone)]
pub struct Target {
    target_type: TargetType,
    identity: String,
    route_key: Option<String>,
    params: HashMap<String, String>,
    adapter: Option<Arc<dyn CollectionAdapter>>,
}

impl Target {
    pub fn new(target_type: TargetType, identity: impl Into<String>) -> Self {
        Self {
            target_type,
            identity: identity.into(),
            route_key: None,
            params: HashMap::new(),
            adapter: None,
        }
    }

    /// The target for a path no route matched.
    pub fn not_found(identity: impl Into<String>) -> Self {
        Self::new(TargetType::NotFound, identity)
    }

    pub fn with_route_key(mut self, key: impl Into<String>) -> Self {
        self.route_key = Some(key.into());
        self
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn CollectionAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn target_type(&self) -> &TargetType { &self.target_type }
    pub fn identity(&self) -> &str { &self.identity }
    pub fn route_key(&self) -> Option<&str> { self.route_key.as_deref() }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// A path variable parsed from the request URI.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The collection adapter bound to the route that produced this target.
    pub fn adapter(&self) -> Option<&Arc<dyn CollectionAdapter>> {
        self.adapter.as_ref()
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("target_type", &self.target_type)
            .field("identity", &self.identity)
            .field("route_key", &self.route_key)
            .field("params", &self.params)
            .field("adapter", &self.adapter.as_ref().map(|a| a.href().to_owned()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_types_map_to_builtins() {
        assert_eq!(TargetType::named("entry"), TargetType::Entry);
        assert_eq!(TargetType::named("Not_Found"), TargetType::NotFound);
        assert_eq!(TargetType::named("search"), TargetType::Custom("SEARCH".into()));
        assert_eq!(TargetType::named("search").to_string(), "SEARCH");
    }

    #[test]
    fn parameters_come_from_params() {
        let mut params = HashMap::new();
        params.insert("entry".to_owned(), "1".to_owned());
        let target = Target::new(TargetType::Entry, "/feed/1")
            .with_route_key("entry")
            .with_params(params);
        assert_eq!(target.parameter("entry"), Some("1"));
        assert_eq!(target.parameter("collection"), None);
        assert_eq!(target.route_key(), Some("entry"));
        assert!(target.adapter().is_none());
    }
}
