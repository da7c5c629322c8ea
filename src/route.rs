//! Rails-style path templates.
//!
//! A template such as `/:collection/:entry;categories` mixes literal text
//! with variables written `:name`, `*name` or `:(name)`. The parenthesised
//! form lets a variable be followed directly by word characters. Variable
//! values never span the URI delimiters (`: / ? # [ ] @ ! $ & ' ( ) * + , ; =`),
//! so a variable always stays inside one path segment.

use std::collections::HashMap;
use std::sync::LazyLock;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use regex::Regex;
use url::form_urlencoded;

use crate::error::{Error, Result};

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[*:]\(?[0-9a-zA-Z]+\)?").expect("static regex")
});

const VALUE_MATCH: &str = r"([^:/?#\[\]@!$&'()*+,;=]+)";
const VALUE_PARSE: &str = r"([^:/?#\[\]@!$&'()*+,;=]*)";

/// Characters escaped when a value is substituted into the path. `%` is left
/// alone so already-encoded values pass through unchanged.
const PATH_VALUE: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'#').add(b'<').add(b'>').add(b'?')
    .add(b'`').add(b'{').add(b'}').add(b'/').add(b';').add(b'\\');

#[derive(Clone, Debug)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A compiled path template.
#[derive(Clone, Debug)]
pub struct Route {
    key: String,
    pattern: String,
    segments: Vec<Segment>,
    variables: Vec<String>,
    matcher: Regex,
    parser: Regex,
    defaults: HashMap<String, String>,
    requirements: Vec<(String, Regex)>,
}

impl Route {
    /// Compiles `pattern` into a route named `key`.
    pub fn new(key: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let mut segments = Vec::new();
        let mut last = 0;
        for token in VARIABLE.find_iter(&pattern) {
            if token.start() > last {
                segments.push(Segment::Literal(pattern[last..token.start()].to_owned()));
            }
            let name = token.as_str()[1..].trim_start_matches('(').trim_end_matches(')');
            segments.push(Segment::Var(name.to_owned()));
            last = token.end();
        }
        if last < pattern.len() {
            segments.push(Segment::Literal(pattern[last..].to_owned()));
        }

        let mut variables: Vec<String> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Var(name) => Some(name.clone()),
                Segment::Literal(_) => None,
            })
            .collect();
        variables.sort();
        variables.dedup();

        let matcher = compile(&pattern, &segments, VALUE_MATCH)?;
        let parser = compile(&pattern, &segments, VALUE_PARSE)?;
        Ok(Self {
            key: key.into(),
            pattern,
            segments,
            variables,
            matcher,
            parser,
            defaults: HashMap::new(),
            requirements: Vec::new(),
        })
    }

    /// Value substituted by [`expand`](Self::expand) when a variable is not
    /// supplied.
    pub fn with_default(mut self, var: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(var.into(), value.into());
        self
    }

    /// Restricts `var` to values matching `regex` in full.
    pub fn with_requirement(mut self, var: impl Into<String>, regex: &str) -> Result<Self> {
        let compiled = Regex::new(&format!("^(?:{regex})$")).map_err(|e| Error::InvalidRoute {
            pattern: self.pattern.clone(),
            reason: e.to_string(),
        })?;
        self.requirements.push((var.into(), compiled));
        Ok(self)
    }

    pub fn key(&self) -> &str { &self.key }
    pub fn pattern(&self) -> &str { &self.pattern }

    /// Variable names, sorted and deduplicated.
    pub fn variables(&self) -> &[String] { &self.variables }

    pub fn default_value(&self, var: &str) -> Option<&str> {
        self.defaults.get(var).map(String::as_str)
    }

    /// True if the whole of `path` fits the template and every requirement
    /// holds.
    pub fn matches(&self, path: &str) -> bool {
        if !self.matcher.is_match(path) {
            return false;
        }
        if self.requirements.is_empty() {
            return true;
        }
        let vars = self.parse(path);
        self.requirements
            .iter()
            .all(|(var, regex)| vars.get(var).is_none_or(|value| regex.is_match(value)))
    }

    /// Extracts variable values from `path`. Empty values are omitted, and a
    /// path that does not fit yields an empty map.
    pub fn parse(&self, path: &str) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        let Some(caps) = self.parser.captures(path) else {
            return vars;
        };
        let names = self.segments.iter().filter_map(|s| match s {
            Segment::Var(name) => Some(name),
            Segment::Literal(_) => None,
        });
        for (name, value) in names.zip(caps.iter().skip(1)) {
            match value.map(|m| m.as_str()) {
                Some(v) if !v.is_empty() => {
                    vars.insert(name.clone(), v.to_owned());
                }
                _ => {}
            }
        }
        vars
    }

    /// Substitutes `params` into the template.
    ///
    /// Missing or empty variables fall back to the route default, then to
    /// the empty string. Parameters that are not route variables are
    /// appended as a query string in the order given. A leading `:` on a
    /// parameter name is ignored.
    pub fn expand<I, K, V>(&self, params: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim_start_matches(':').to_owned(), v.as_ref().to_owned()))
            .collect();
        let lookup = |var: &str| {
            params
                .iter()
                .find(|(k, v)| k == var && !v.is_empty())
                .map(|(_, v)| v.as_str())
                .or_else(|| self.default_value(var))
        };

        let mut out = String::with_capacity(self.pattern.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(name) => {
                    if let Some(value) = lookup(name) {
                        out.extend(utf8_percent_encode(value, PATH_VALUE));
                    }
                }
            }
        }

        let mut query = form_urlencoded::Serializer::new(String::new());
        let mut has_query = false;
        for (name, value) in &params {
            if self.variables.binary_search(name).is_err() {
                query.append_pair(name, value);
                has_query = true;
            }
        }
        if has_query {
            out.push('?');
            out.push_str(&query.finish());
        }
        out
    }
}

fn compile(pattern: &str, segments: &[Segment], value: &str) -> Result<Regex> {
    let mut source = String::from("^");
    for segment in segments {
        match segment {
            Segment::Literal(text) => source.push_str(&regex::escape(text)),
            Segment::Var(_) => source.push_str(value),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| Error::InvalidRoute {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [(&str, &str); 0] = [];

    #[test]
    fn simple_route() {
        let route = Route::new("feed", "/:collection").unwrap();
        assert_eq!(route.expand([("collection", "test")]), "/test");
        assert!(route.matches("/foo"));
        assert!(!route.matches("/foo/test"));
        assert!(!route.matches("foo"));
        assert_eq!(route.parse("/test").get("collection").map(String::as_str), Some("test"));
    }

    #[test]
    fn static_route() {
        let route = Route::new("feed", "/feed").unwrap();
        assert_eq!(route.expand(NONE), "/feed");
        assert!(route.matches("/feed"));
        assert!(!route.matches("/feed/test"));
        assert!(route.parse("/test").is_empty());
    }

    #[test]
    fn two_path_route() {
        let route = Route::new("entry", "/:collection/:entry").unwrap();
        assert_eq!(route.expand([("collection", "c"), ("entry", "e")]), "/c/e");
        assert!(!route.matches("/foo"));
        assert!(route.matches("/foo/test"));
        assert!(!route.matches("/foo/test/bar"));

        let vars = route.parse("/1/2");
        assert_eq!(vars["collection"], "1");
        assert_eq!(vars["entry"], "2");

        let vars = route.parse("/1/");
        assert_eq!(vars["collection"], "1");
        assert!(!vars.contains_key("entry"));
    }

    #[test]
    fn defaults_fill_missing_variables() {
        let route = Route::new("entry", "/:collection/:entry").unwrap().with_default("collection", "c");
        assert_eq!(route.expand([("entry", "e")]), "/c/e");
    }

    #[test]
    fn dashed_route() {
        let route = Route::new("entry", ":collection/:entry-:foo").unwrap().with_default("foo", "f");
        assert_eq!(route.expand([("collection", "c"), ("entry", "e")]), "c/e-f");
        assert!(route.matches("1/2-3"));
        assert!(!route.matches("1/2-"));
        assert!(!route.matches("1/-"));
    }

    #[test]
    fn literals_at_both_ends() {
        let route = Route::new("entry", "/base/:collection/:entry;categories").unwrap();
        assert!(route.matches("/base/test/123;categories"));
        assert!(!route.matches("/base/test/123"));
        let vars = route.parse("/base/1/2;categories");
        assert_eq!(vars["collection"], "1");
        assert_eq!(vars["entry"], "2");
    }

    #[test]
    fn delimiters_end_variables() {
        let route = Route::new("entry", "/base/:collection/:entry").unwrap();
        assert!(!route.matches("/base/test/123;categories"));

        let route = Route::new("collection", "/base/:collection/").unwrap();
        assert!(route.matches("/base/test/"));
        assert!(!route.matches("/base/test/123/"));
        assert_eq!(route.parse("/base/test/")["collection"], "test");
    }

    #[test]
    fn parenthesised_variables() {
        let route = Route::new("archive", "/:(year)x:(month)").unwrap();
        assert_eq!(route.variables(), ["month", "year"]);
        assert_eq!(route.expand([("year", "2024"), ("month", "05")]), "/2024x05");
        assert!(route.matches("/2024x05"));
    }

    #[test]
    fn extra_params_become_the_query_string() {
        let route = Route::new("feed", "/:collection").unwrap();
        let url = route.expand([(":collection", "posts"), ("page", "2"), ("q", "a b")]);
        assert_eq!(url, "/posts?page=2&q=a+b");
        assert_eq!(route.expand([("collection", "a b")]), "/a%20b");
    }

    #[test]
    fn requirements_restrict_values() {
        let route = Route::new("entry", "/:collection/:entry")
            .unwrap()
            .with_requirement("entry", r"\d+")
            .unwrap();
        assert!(route.matches("/posts/42"));
        assert!(!route.matches("/posts/latest"));
        assert!(Route::new("bad", "/:x").unwrap().with_requirement("x", "(").is_err());
    }
}
