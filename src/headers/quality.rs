//! q-valued header lists (`Accept`, `Accept-Language`, ...).

use std::cmp::Ordering;
use std::fmt;

/// A token from a content negotiation header with its q-value clamped to
/// `0.0..=1.0`. Non-finite values become `0`.
#[derive(Clone, Debug, PartialEq)]
pub struct QToken {
    token: String,
    q: f64,
}

impl QToken {
    pub fn new(token: impl Into<String>, q: f64) -> Self {
        let q = if q.is_finite() { q.clamp(0.0, 1.0) } else { 0.0 };
        Self { token: token.into(), q }
    }

    pub fn token(&self) -> &str { &self.token }
    pub fn q(&self) -> f64 { self.q }

    /// A token with `q=0` is explicitly refused by the client.
    pub fn is_acceptable(&self) -> bool {
        self.q > 0.0
    }
}

impl fmt::Display for QToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Splits `header` into tokens ordered by descending q-value. Ties keep
/// header order. Parameters other than `q` stay attached to the token; an
/// unparseable q-value counts as `0`.
pub fn order_by_q(header: &str) -> Vec<QToken> {
    let mut tokens: Vec<QToken> = header
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|member| {
            let mut q = 1.0;
            let mut kept = Vec::new();
            for (i, part) in member.split(';').map(str::trim).enumerate() {
                match part.split_once('=') {
                    Some((name, value)) if i > 0 && name.trim().eq_ignore_ascii_case("q") => {
                        q = value.trim().parse().ok().filter(|q: &f64| q.is_finite()).unwrap_or(0.0);
                    }
                    _ if part.is_empty() => {}
                    _ => kept.push(part),
                }
            }
            QToken::new(kept.join(";"), q)
        })
        .collect();
    tokens.sort_by(|a, b| b.q.partial_cmp(&a.q).unwrap_or(Ordering::Equal));
    tokens
}

fn essence(media_type: &str) -> (String, String) {
    let base = media_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match base.split_once('/') {
        Some((kind, sub)) => (kind.trim().to_owned(), sub.trim().to_owned()),
        None => (base, String::new()),
    }
}

/// True if `range` (possibly `*/*` or `type/*`) covers `media_type`.
/// Parameters on either side are ignored.
pub fn media_type_matches(range: &str, media_type: &str) -> bool {
    let (rt, rs) = essence(range);
    let (mt, ms) = essence(media_type);
    (rt == "*" || rt == mt) && (rs == "*" || rs == ms)
}

/// True for `application/atom+xml`, with or without a `type` parameter.
pub fn is_atom(media_type: &str) -> bool {
    let (kind, sub) = essence(media_type);
    kind == "application" && sub == "atom+xml"
}
