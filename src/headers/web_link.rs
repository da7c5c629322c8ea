//! The `Link` header (RFC 8288).

use std::fmt;

use super::preference::split_outside_quotes;
use super::{decode_ext_value, encode_ext_value, needs_ext_value, quoted_if_not_token, unquote};
use crate::error::Error;

/// A single web link: `<target>; rel=...; title=...`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WebLink {
    href: String,
    rel: Vec<String>,
    anchor: Option<String>,
    rev: Vec<String>,
    hreflang: Option<String>,
    media: Vec<String>,
    title: Option<String>,
    media_type: Option<String>,
    params: Vec<(String, String)>,
}

const RESERVED: [&str; 7] = ["rel", "anchor", "rev", "hreflang", "media", "title", "type"];

impl WebLink {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into(), ..Self::default() }
    }

    pub fn with_rel(href: impl Into<String>, rel: &str) -> Self {
        Self::new(href).rel(rel)
    }

    /// Adds a relation type. Duplicates are ignored.
    pub fn rel(mut self, rel: &str) -> Self {
        push_unique(&mut self.rel, rel);
        self
    }

    pub fn rev(mut self, rev: &str) -> Self {
        push_unique(&mut self.rev, rev);
        self
    }

    pub fn anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }

    pub fn hreflang(mut self, lang: impl Into<String>) -> Self {
        self.hreflang = Some(lang.into());
        self
    }

    pub fn media(mut self, media: &str) -> Self {
        push_unique(&mut self.media, &media.to_ascii_lowercase());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Sets an extension parameter. Reserved names (`rel`, `title`, ...) are
    /// rejected; use their dedicated setters.
    pub fn param(mut self, name: &str, value: impl Into<String>) -> Result<Self, Error> {
        let name = name.to_ascii_lowercase();
        if RESERVED.contains(&name.as_str()) {
            return Err(Error::InvalidHeader {
                name: "Link",
                reason: format!("`{name}` is a reserved link parameter"),
            });
        }
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        Ok(self)
    }

    pub fn href(&self) -> &str { &self.href }
    pub fn rels(&self) -> &[String] { &self.rel }
    pub fn revs(&self) -> &[String] { &self.rev }
    pub fn anchor_ref(&self) -> Option<&str> { self.anchor.as_deref() }
    pub fn hreflang_ref(&self) -> Option<&str> { self.hreflang.as_deref() }
    pub fn medias(&self) -> &[String] { &self.media }
    pub fn title_ref(&self) -> Option<&str> { self.title.as_deref() }
    pub fn media_type_ref(&self) -> Option<&str> { self.media_type.as_deref() }

    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn has_rel(&self, rel: &str) -> bool {
        self.rel.iter().any(|r| r.eq_ignore_ascii_case(rel))
    }

    /// Parses a `Link` header value holding one or more links.
    pub fn parse(header: &str) -> Result<Vec<WebLink>, Error> {
        let mut links = Vec::new();
        let mut rest = header.trim();
        while !rest.is_empty() {
            let open = rest.strip_prefix('<').ok_or_else(|| invalid(header))?;
            let close = open.find('>').ok_or_else(|| invalid(header))?;
            let mut link = WebLink::new(open[..close].trim());
            let after = &open[close + 1..];

            // Parameters run to the next comma that is outside quotes.
            let end = next_link_boundary(after);
            for param in split_outside_quotes(&after[..end], ';') {
                link.apply_param(param.trim(), header)?;
            }
            links.push(link);

            rest = after[end..].trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        }
        Ok(links)
    }

    fn apply_param(&mut self, param: &str, header: &str) -> Result<(), Error> {
        if param.is_empty() {
            return Ok(());
        }
        let (name, value) = param.split_once('=').unwrap_or((param, ""));
        let name = name.trim();
        let (name, ext) = match name.strip_suffix('*') {
            Some(n) => (n.trim(), true),
            None => (name, false),
        };
        let raw = value.trim();
        let value = if ext { decode_ext_value(raw) } else { unquote(raw) };
        match name.to_ascii_lowercase().as_str() {
            "rel" => value.split_whitespace().for_each(|v| push_unique(&mut self.rel, v)),
            "rev" => value.split_whitespace().for_each(|v| push_unique(&mut self.rev, v)),
            "media" => value
                .split_whitespace()
                .for_each(|v| push_unique(&mut self.media, &v.to_ascii_lowercase())),
            "anchor" => {
                let anchor = raw.strip_prefix('<').and_then(|a| a.strip_suffix('>'));
                self.anchor = Some(anchor.map_or(value.clone(), str::to_owned));
            }
            "hreflang" => self.hreflang = Some(value),
            "title" => self.title = Some(value),
            "type" => self.media_type = Some(value),
            "" => return Err(invalid(header)),
            other => self.params.push((other.to_owned(), value)),
        }
        Ok(())
    }

    /// Renders links separated by `, `.
    pub fn join(links: &[WebLink]) -> String {
        links.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_owned());
    }
}

fn next_link_boundary(s: &str) -> usize {
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' && quoted {
            escaped = true;
        } else if c == '"' {
            quoted = !quoted;
        } else if c == ',' && !quoted {
            return i;
        }
    }
    s.len()
}

fn invalid(header: &str) -> Error {
    Error::InvalidHeader { name: "Link", reason: format!("malformed link `{header}`") }
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, values: &[String]) -> fmt::Result {
    match values {
        [] => Ok(()),
        [one] => write!(f, ";{name}={}", quoted_if_not_token(one)),
        many => write!(f, ";{name}=\"{}\"", many.join(" ")),
    }
}

fn write_text(f: &mut fmt::Formatter<'_>, name: &str, value: &str) -> fmt::Result {
    if needs_ext_value(value) {
        write!(f, ";{name}*={}", encode_ext_value(value))
    } else {
        write!(f, ";{name}={}", quoted_if_not_token(value))
    }
}

impl fmt::Display for WebLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.href)?;
        write_list(f, "rel", &self.rel)?;
        if let Some(anchor) = &self.anchor {
            write!(f, ";anchor=<{anchor}>")?;
        }
        write_list(f, "rev", &self.rev)?;
        if let Some(lang) = &self.hreflang {
            write!(f, ";hreflang={lang}")?;
        }
        write_list(f, "media", &self.media)?;
        if let Some(title) = &self.title {
            write_text(f, "title", title)?;
        }
        if let Some(media_type) = &self.media_type {
            write!(f, ";type={}", quoted_if_not_token(media_type))?;
        }
        for (name, value) in &self.params {
            write_text(f, name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_rel_and_title() {
        let link = WebLink::with_rel("http://example.org/feed?page=2", "next").title("Page 2");
        assert_eq!(link.to_string(), r#"<http://example.org/feed?page=2>;rel=next;title="Page 2""#);

        let multi = WebLink::new("/a").rel("edit").rel("alternate").rel("edit");
        assert_eq!(multi.to_string(), r#"</a>;rel="edit alternate""#);
    }

    #[test]
    fn renders_non_ascii_title_as_ext_value() {
        let link = WebLink::new("/a").title("caf\u{e9}");
        assert_eq!(link.to_string(), "</a>;title*=UTF-8''caf%C3%A9");
    }

    #[test]
    fn parses_multiple_links() {
        let links = WebLink::parse(
            r#"<http://example.org/1>; rel="next alternate"; title="a, b", </2>;rel=prev;anchor=<#x>;foo=bar"#,
        )
        .unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].href(), "http://example.org/1");
        assert_eq!(links[0].rels(), ["next", "alternate"]);
        assert_eq!(links[0].title_ref(), Some("a, b"));
        assert!(links[1].has_rel("PREV"));
        assert_eq!(links[1].anchor_ref(), Some("#x"));
        assert_eq!(links[1].get_param("foo"), Some("bar"));
    }

    #[test]
    fn parses_ext_value_titles() {
        let links = WebLink::parse("</a>; title*=UTF-8'de'n%c3%a4chstes").unwrap();
        assert_eq!(links[0].title_ref(), Some("n\u{e4}chstes"));
    }

    #[test]
    fn rejects_reserved_params_and_garbage() {
        assert!(WebLink::new("/a").param("rel", "x").is_err());
        assert!(WebLink::new("/a").param("x-custom", "1").is_ok());
        assert!(WebLink::parse("no brackets").is_err());
    }
}
