//! Entity tags (RFC 9110 §8.8.3).

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::Error;

/// A strong, weak or wildcard (`*`) entity tag.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct EntityTag {
    tag: String,
    weak: bool,
    wild: bool,
}

impl EntityTag {
    /// A strong tag with the given opaque value. The value must not contain `"`.
    pub fn strong(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), weak: false, wild: false }
    }

    pub fn weak(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), weak: true, wild: false }
    }

    pub fn wildcard() -> Self {
        Self { tag: "*".to_owned(), weak: false, wild: true }
    }

    /// Derives a strong tag from the hex SHA-256 of `material`, in order.
    ///
    /// Adapters typically feed it a resource name and a last-modified stamp.
    pub fn generate<I, S>(material: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut hasher = Sha256::new();
        for part in material {
            hasher.update(part.as_ref());
        }
        let tag = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>();
        Self::strong(tag)
    }

    /// A derived tag for a variant of the same resource: `"tag-label"`.
    pub fn variation(&self, label: &str) -> Self {
        Self { tag: format!("{}-{label}", self.tag), weak: self.weak, wild: false }
    }

    pub fn tag(&self) -> &str { &self.tag }
    pub fn is_weak(&self) -> bool { self.weak }
    pub fn is_wild(&self) -> bool { self.wild }

    /// Strong comparison: both strong with identical values. Wildcards
    /// compare equal to everything.
    pub fn strong_eq(&self, other: &Self) -> bool {
        self.wild || other.wild || (!self.weak && !other.weak && self.tag == other.tag)
    }

    /// Weak comparison: identical values regardless of weakness.
    pub fn weak_eq(&self, other: &Self) -> bool {
        self.wild || other.wild || self.tag == other.tag
    }

    /// True if `self` matches any tag in `tags`.
    pub fn matches_any(&self, tags: &[EntityTag], weak: bool) -> bool {
        if self.wild && !tags.is_empty() {
            return true;
        }
        tags.iter().any(|t| if weak { self.weak_eq(t) } else { self.strong_eq(t) })
    }

    /// Parses a comma-separated list such as an `If-None-Match` value.
    pub fn parse_list(value: &str) -> Result<Vec<EntityTag>, Error> {
        let mut tags = Vec::new();
        let mut rest = value.trim();
        while !rest.is_empty() {
            let end = if rest.starts_with('*') {
                1
            } else {
                let open = rest.find('"').ok_or_else(|| invalid(value))?;
                let close = rest[open + 1..].find('"').ok_or_else(|| invalid(value))?;
                open + close + 2
            };
            tags.push(rest[..end].parse()?);
            rest = rest[end..].trim_start();
            rest = match rest.strip_prefix(',') {
                Some(r) => r.trim_start(),
                None if rest.is_empty() => rest,
                None => return Err(invalid(value)),
            };
        }
        Ok(tags)
    }

    /// Renders a list of tags separated by `, `.
    pub fn join(tags: &[EntityTag]) -> String {
        tags.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
}

fn invalid(value: &str) -> Error {
    Error::InvalidHeader { name: "ETag", reason: format!("invalid entity tag `{value}`") }
}

impl FromStr for EntityTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(Self::wildcard());
        }
        let (weak, quoted) = match s.strip_prefix("W/").or_else(|| s.strip_prefix("w/")) {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let tag = quoted
            .strip_prefix('"')
            .and_then(|q| q.strip_suffix('"'))
            .filter(|t| !t.contains('"'))
            .ok_or_else(|| invalid(s))?;
        Ok(Self { tag: tag.to_owned(), weak, wild: false })
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wild {
            return f.write_str("*");
        }
        if self.weak {
            f.write_str("W/")?;
        }
        write!(f, "\"{}\"", self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render() {
        let strong: EntityTag = "\"abc\"".parse().unwrap();
        assert!(!strong.is_weak());
        assert_eq!(strong.to_string(), "\"abc\"");

        let weak: EntityTag = "W/\"abc\"".parse().unwrap();
        assert!(weak.is_weak());
        assert_eq!(weak.to_string(), "W/\"abc\"");

        assert!("*".parse::<EntityTag>().unwrap().is_wild());
        assert!("abc".parse::<EntityTag>().is_err());
        assert!("X/\"abc\"".parse::<EntityTag>().is_err());
    }

    #[test]
    fn parse_list_handles_commas_inside_quotes() {
        let tags = EntityTag::parse_list("\"a,b\" ,W/\"c\", *").unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].tag(), "a,b");
        assert!(tags[1].is_weak());
        assert!(tags[2].is_wild());
        assert!(EntityTag::parse_list("\"a\" \"b\"").is_err());
        assert!(EntityTag::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn strong_and_weak_comparison() {
        let a = EntityTag::strong("1");
        let wa = EntityTag::weak("1");
        assert!(a.strong_eq(&a));
        assert!(!a.strong_eq(&wa));
        assert!(a.weak_eq(&wa));
        assert!(a.strong_eq(&EntityTag::wildcard()));
        assert!(a.matches_any(&[EntityTag::strong("2"), wa.clone()], true));
        assert!(!a.matches_any(&[EntityTag::strong("2"), wa], false));
    }

    #[test]
    fn generated_tags_are_stable() {
        let a = EntityTag::generate(["entry-1", "2024-01-01T00:00:00Z"]);
        let b = EntityTag::generate(["entry-1", "2024-01-01T00:00:00Z"]);
        let c = EntityTag::generate(["entry-1", "2024-01-02T00:00:00Z"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.tag().len(), 64);
        assert_eq!(a.variation("gzip").tag(), format!("{}-gzip", a.tag()));
    }
}
