//! HTTP method as a typed enum.
//!
//! Covers the methods an AtomPub server dispatches on. Anything else (WebDAV
//! verbs, custom extensions) stays an [`http::Method`] on the request and is
//! routed to [`CollectionAdapter::extension_request`](crate::CollectionAdapter::extension_request).

use std::fmt;
use std::str::FromStr;

/// A method the request processors know how to dispatch.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Method {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
        }
    }

    /// Safe methods do not change server state (RFC 9110 §9.2.1).
    pub fn is_safe(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Trace)
    }

    /// Repeating an idempotent request has the same effect as sending it once.
    pub fn is_idempotent(self) -> bool {
        self.is_safe() || matches!(self, Self::Put | Self::Delete)
    }

    /// Maps a wire method onto a known method. Wire methods are
    /// case-sensitive, so `get` is an extension method and yields `None`.
    pub fn from_http(method: &http::Method) -> Option<Self> {
        match *method {
            http::Method::DELETE  => Some(Self::Delete),
            http::Method::GET     => Some(Self::Get),
            http::Method::HEAD    => Some(Self::Head),
            http::Method::OPTIONS => Some(Self::Options),
            http::Method::PATCH   => Some(Self::Patch),
            http::Method::POST    => Some(Self::Post),
            http::Method::PUT     => Some(Self::Put),
            http::Method::TRACE   => Some(Self::Trace),
            _                     => None,
        }
    }

    pub fn to_http(self) -> http::Method {
        match self {
            Self::Delete  => http::Method::DELETE,
            Self::Get     => http::Method::GET,
            Self::Head    => http::Method::HEAD,
            Self::Options => http::Method::OPTIONS,
            Self::Patch   => http::Method::PATCH,
            Self::Post    => http::Method::POST,
            Self::Put     => http::Method::PUT,
            Self::Trace   => http::Method::TRACE,
        }
    }
}

/// Parses a method name. Case-insensitive, since override headers such as
/// `X-HTTP-Method-Override` are frequently sent in lowercase.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            _         => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
