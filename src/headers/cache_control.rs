//! `Cache-Control` directives (RFC 9111 §5.2, RFC 5861).

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s*([\w\-]+)\s*(?:=\s*(\d+|"(?:[^"\\]|\\.)*"|[^\s,]+))?\s*,?"#)
        .expect("static regex")
});

/// A parsed or programmatically built `Cache-Control` value.
///
/// Numeric directives are `None` when absent. Unknown directives survive a
/// parse/render cycle through [`extensions`](Self::extensions).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheControl {
    pub no_cache: bool,
    pub no_cache_headers: Vec<String>,
    pub no_store: bool,
    pub no_transform: bool,
    pub public: bool,
    pub private: bool,
    pub private_headers: Vec<String>,
    pub must_revalidate: bool,
    pub proxy_revalidate: bool,
    pub only_if_cached: bool,
    pub max_age: Option<u64>,
    pub s_max_age: Option<u64>,
    pub max_stale: Option<u64>,
    pub min_fresh: Option<u64>,
    pub stale_if_error: Option<u64>,
    pub stale_while_revalidate: Option<u64>,
    pub extensions: Vec<(String, Option<String>)>,
}

impl CacheControl {
    pub fn no_cache() -> Self {
        Self { no_cache: true, ..Self::default() }
    }

    pub fn no_store() -> Self {
        Self { no_store: true, ..Self::default() }
    }

    pub fn max_age(seconds: u64) -> Self {
        Self { max_age: Some(seconds), ..Self::default() }
    }

    pub fn public() -> Self {
        Self { public: true, ..Self::default() }
    }

    pub fn private() -> Self {
        Self { private: true, ..Self::default() }
    }
}

fn header_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| super::unquote(v).split(',').map(|h| h.trim().to_owned()).filter(|h| !h.is_empty()).collect())
        .unwrap_or_default()
}

fn seconds(name: &str, value: Option<&str>) -> Result<Option<u64>, Error> {
    match value {
        Some(v) => super::unquote(v).parse().map(Some).map_err(|_| Error::InvalidHeader {
            name: "Cache-Control",
            reason: format!("`{name}` expects delta-seconds, got `{v}`"),
        }),
        None => Ok(None),
    }
}

impl FromStr for CacheControl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cc = Self::default();
        for caps in DIRECTIVE.captures_iter(s) {
            let name = caps[1].to_ascii_lowercase();
            let value = caps.get(2).map(|m| m.as_str());
            match name.as_str() {
                "no-cache" => {
                    cc.no_cache = true;
                    cc.no_cache_headers = header_list(value);
                }
                "private" => {
                    cc.private = true;
                    cc.private_headers = header_list(value);
                }
                "no-store"               => cc.no_store = true,
                "no-transform"           => cc.no_transform = true,
                "public"                 => cc.public = true,
                "must-revalidate"        => cc.must_revalidate = true,
                "proxy-revalidate"       => cc.proxy_revalidate = true,
                "only-if-cached"         => cc.only_if_cached = true,
                "max-age"                => cc.max_age = seconds(&name, value)?,
                "s-maxage"               => cc.s_max_age = seconds(&name, value)?,
                "max-stale"              => cc.max_stale = seconds(&name, value)?,
                "min-fresh"              => cc.min_fresh = seconds(&name, value)?,
                "stale-if-error"         => cc.stale_if_error = seconds(&name, value)?,
                "stale-while-revalidate" => cc.stale_while_revalidate = seconds(&name, value)?,
                _ => cc.extensions.push((caps[1].to_owned(), value.map(super::unquote))),
            }
        }
        Ok(cc)
    }
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        let with_headers = |name: &str, headers: &[String]| {
            if headers.is_empty() {
                name.to_owned()
            } else {
                format!("{name}={}", super::quoted(&headers.join(",")))
            }
        };
        if self.private {
            parts.push(with_headers("private", &self.private_headers));
        }
        if self.public {
            parts.push("public".to_owned());
        }
        if self.no_cache {
            parts.push(with_headers("no-cache", &self.no_cache_headers));
        }
        for (set, name) in [
            (self.no_store, "no-store"),
            (self.no_transform, "no-transform"),
            (self.only_if_cached, "only-if-cached"),
            (self.must_revalidate, "must-revalidate"),
            (self.proxy_revalidate, "proxy-revalidate"),
        ] {
            if set {
                parts.push(name.to_owned());
            }
        }
        for (value, name) in [
            (self.max_age, "max-age"),
            (self.s_max_age, "s-maxage"),
            (self.max_stale, "max-stale"),
            (self.min_fresh, "min-fresh"),
            (self.stale_if_error, "stale-if-error"),
            (self.stale_while_revalidate, "stale-while-revalidate"),
        ] {
            if let Some(v) = value {
                parts.push(format!("{name}={v}"));
            }
        }
        for (name, value) in &self.extensions {
            match value {
                Some(v) if !v.is_empty() => parts.push(format!("{name}={}", super::quoted_if_not_token(v))),
                _ => parts.push(name.clone()),
            }
        }
        f.write_str(&parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_numbers() {
        let cc: CacheControl = "public, max-age=60, must-revalidate, stale-if-error=30".parse().unwrap();
        assert!(cc.public);
        assert!(cc.must_revalidate);
        assert_eq!(cc.max_age, Some(60));
        assert_eq!(cc.stale_if_error, Some(30));
        assert!(!cc.no_cache);
    }

    #[test]
    fn parses_header_lists_and_extensions() {
        let cc: CacheControl = r#"no-cache="Set-Cookie, Foo", community="UCI", x-ttl=5"#.parse().unwrap();
        assert!(cc.no_cache);
        assert_eq!(cc.no_cache_headers, vec!["Set-Cookie", "Foo"]);
        assert_eq!(cc.extensions, vec![
            ("community".to_owned(), Some("UCI".to_owned())),
            ("x-ttl".to_owned(), Some("5".to_owned())),
        ]);
    }

    #[test]
    fn renders_in_canonical_order() {
        let cc = CacheControl {
            no_store: true,
            private: true,
            max_age: Some(0),
            s_max_age: Some(10),
            ..CacheControl::default()
        };
        assert_eq!(cc.to_string(), "private, no-store, max-age=0, s-maxage=10");
        assert_eq!(CacheControl::no_cache().to_string(), "no-cache");
    }

    #[test]
    fn quoted_values_survive_a_round_trip() {
        let cc = CacheControl {
            no_cache: true,
            no_cache_headers: vec!["X-\"Odd\"".to_owned()],
            extensions: vec![
                ("x-note".to_owned(), Some(r#"say "hi" \ bye"#.to_owned())),
                ("x-ttl".to_owned(), Some("5".to_owned())),
            ],
            ..CacheControl::default()
        };
        let rendered = cc.to_string();
        assert_eq!(rendered, r#"no-cache="X-\"Odd\"", x-note="say \"hi\" \\ bye", x-ttl=5"#);
        assert_eq!(rendered.parse::<CacheControl>().unwrap(), cc);
    }

    #[test]
    fn rejects_non_numeric_max_age() {
        assert!("max-age=soon".parse::<CacheControl>().is_err());
    }
}
