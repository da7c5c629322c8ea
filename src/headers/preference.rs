//! `Prefer` and `Preference-Applied` (RFC 7240).

use std::fmt;

use super::{decode_ext_value, encode_ext_value, is_token, needs_ext_value, quoted_if_not_token, unquote};

/// A single preference: `token[=value](;param[=value])*`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Preference {
    token: String,
    value: Option<String>,
    params: Vec<(String, Option<String>)>,
}

impl Preference {
    pub const RETURN_NO_CONTENT: &'static str = "return-no-content";
    pub const RETURN_ACCEPTED: &'static str = "return-accepted";
    pub const RETURN_CONTENT: &'static str = "return-content";
    pub const RETURN_STATUS: &'static str = "return-status";
    pub const RETURN: &'static str = "return";

    /// A bare preference. The token is lower-cased.
    pub fn new(token: &str) -> Self {
        Self { token: token.to_ascii_lowercase(), value: None, params: Vec::new() }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_param(mut self, name: &str, value: Option<&str>) -> Self {
        self.params.push((name.to_ascii_lowercase(), value.map(str::to_owned)));
        self
    }

    /// `return=minimal` from the final RFC.
    pub fn return_minimal() -> Self {
        Self::new(Self::RETURN).with_value("minimal")
    }

    /// `return=representation` from the final RFC.
    pub fn return_representation() -> Self {
        Self::new(Self::RETURN).with_value("representation")
    }

    pub fn token(&self) -> &str { &self.token }
    pub fn value(&self) -> Option<&str> { self.value.as_deref() }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn matches(&self, token: &str) -> bool {
        self.token.eq_ignore_ascii_case(token)
    }

    /// Parses a `Prefer` header. Malformed members are skipped.
    pub fn parse(header: &str) -> Vec<Preference> {
        split_outside_quotes(header, ',')
            .into_iter()
            .filter_map(|member| {
                let mut parts = split_outside_quotes(&member, ';').into_iter();
                let mut pref = parse_pair(&parts.next()?).map(|(token, value)| Preference {
                    token,
                    value,
                    params: Vec::new(),
                })?;
                pref.params = parts.filter_map(|p| parse_pair(&p)).collect();
                Some(pref)
            })
            .collect()
    }

    /// True if any preference in `prefs` carries `token`.
    pub fn contains(prefs: &[Preference], token: &str) -> bool {
        prefs.iter().any(|p| p.matches(token))
    }

    /// Renders a list as a single header value.
    pub fn join(prefs: &[Preference]) -> String {
        prefs.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
    }
}

fn parse_pair(s: &str) -> Option<(String, Option<String>)> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (name, value) = match s.split_once('=') {
        Some((n, v)) => (n.trim(), Some(v.trim())),
        None => (s, None),
    };
    let (name, ext) = match name.strip_suffix('*') {
        Some(n) => (n, true),
        None => (name, false),
    };
    if !is_token(name) {
        return None;
    }
    let value = value.map(|v| if ext { decode_ext_value(v) } else { unquote(v) });
    Some((name.to_ascii_lowercase(), value))
}

pub(super) fn split_outside_quotes(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' && quoted {
            escaped = true;
        } else if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            out.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn write_pair(f: &mut fmt::Formatter<'_>, name: &str, value: Option<&str>) -> fmt::Result {
    f.write_str(name)?;
    match value {
        Some(v) if needs_ext_value(v) => write!(f, "*={}", encode_ext_value(v)),
        Some(v) => write!(f, "={}", quoted_if_not_token(v)),
        None => Ok(()),
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_pair(f, &self.token, self.value.as_deref())?;
        for (name, value) in &self.params {
            f.write_str(";")?;
            write_pair(f, name, value.as_deref())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tokens_values_and_params() {
        let prefs = Preference::parse(r#"return-no-content, wait=10, foo="a;b";bar=1, Return=minimal"#);
        assert_eq!(prefs.len(), 4);
        assert!(prefs[0].matches(Preference::RETURN_NO_CONTENT));
        assert_eq!(prefs[1].value(), Some("10"));
        assert_eq!(prefs[2].value(), Some("a;b"));
        assert_eq!(prefs[2].param("bar"), Some("1"));
        assert_eq!(prefs[3].token(), "return");
        assert_eq!(prefs[3].value(), Some("minimal"));
    }

    #[test]
    fn renders_with_quoting_only_when_needed() {
        let pref = Preference::new("Foo").with_value("two words").with_param("x", Some("1"));
        assert_eq!(pref.to_string(), r#"foo="two words";x=1"#);
        assert_eq!(Preference::return_minimal().to_string(), "return=minimal");
        let joined = Preference::join(&[Preference::new("a"), Preference::new("b")]);
        assert_eq!(joined, "a,b");
    }

    #[test]
    fn contains_is_case_insensitive() {
        let prefs = Preference::parse("RETURN-NO-CONTENT");
        assert!(Preference::contains(&prefs, "return-no-content"));
        assert!(!Preference::contains(&prefs, "return-content"));
    }
}
