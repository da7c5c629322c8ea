//! Conditional request evaluation (RFC 9110 §13.2.2).

use std::time::SystemTime;

use http::Method;
use tracing::debug;

use crate::headers::EntityTag;
use crate::helper;
use crate::request::RequestContext;
use crate::response::ResponseContext;

/// Evaluates the request's preconditions against the current state of the
/// target resource.
///
/// `etag` and `last_modified` describe the current representation; pass
/// `None` for both when the resource does not exist. Returns the response
/// to send instead of performing the method (`304` or `412`), or `None`
/// when the request should proceed.
pub fn evaluate(
    request: &RequestContext,
    etag: Option<&EntityTag>,
    last_modified: Option<SystemTime>,
) -> Option<ResponseContext> {
    let read = matches!(*request.method(), Method::GET | Method::HEAD);
    let exists = etag.is_some() || last_modified.is_some();

    if let Some(tags) = request.if_match() {
        let matched = match etag {
            Some(current) => tags.iter().any(|t| t.strong_eq(current)),
            None => exists && tags.iter().any(EntityTag::is_wild),
        };
        if !matched {
            debug!("If-Match failed");
            return Some(helper::precondition_failed("If-Match precondition failed"));
        }
    } else if let (Some(since), Some(modified)) = (request.if_unmodified_since(), last_modified) {
        if !helper::before_or_equal(modified, since) {
            debug!("If-Unmodified-Since failed");
            return Some(helper::precondition_failed("resource was modified"));
        }
    }

    if let Some(tags) = request.if_none_match() {
        let matched = match etag {
            Some(current) => tags.iter().any(|t| t.weak_eq(current)),
            None => exists && tags.iter().any(EntityTag::is_wild),
        };
        if matched {
            if read {
                return Some(not_modified(etag, last_modified));
            }
            debug!("If-None-Match failed");
            return Some(helper::precondition_failed("If-None-Match precondition failed"));
        }
    } else if read {
        if let (Some(since), Some(modified)) = (request.if_modified_since(), last_modified) {
            if helper::before_or_equal(modified, since) {
                return Some(not_modified(etag, last_modified));
            }
        }
    }

    None
}

fn not_modified(etag: Option<&EntityTag>, last_modified: Option<SystemTime>) -> ResponseContext {
    let mut builder = ResponseContext::builder().status(http::StatusCode::NOT_MODIFIED);
    if let Some(tag) = etag {
        builder = builder.entity_tag(tag);
    }
    if let Some(time) = last_modified {
        builder = builder.last_modified(time);
    }
    builder.no_body()
}
