//! Workspaces, collection lookup and the AtomPub service document.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::adapter::{CategoriesInfo, CollectionAdapter};
use crate::helper::escape;
use crate::request::RequestContext;

pub const APP_NS: &str = "http://www.w3.org/2007/app";
pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// A titled group of collections.
#[derive(Clone)]
pub struct WorkspaceInfo {
    title: String,
    collections: Vec<Arc<dyn CollectionAdapter>>,
}

impl WorkspaceInfo {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), collections: Vec::new() }
    }

    pub fn with_collection(mut self, adapter: Arc<dyn CollectionAdapter>) -> Self {
        self.collections.push(adapter);
        self
    }

    pub fn title(&self) -> &str { &self.title }
    pub fn collections(&self) -> &[Arc<dyn CollectionAdapter>] { &self.collections }
}

impl std::fmt::Debug for WorkspaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hrefs: Vec<&str> = self.collections.iter().map(|c| c.href()).collect();
        f.debug_struct("WorkspaceInfo").field("title", &self.title).field("collections", &hrefs).finish()
    }
}

/// Knows the provider's workspaces and which adapter serves a request.
pub trait WorkspaceManager: Send + Sync {
    fn workspaces(&self, request: &RequestContext) -> &[WorkspaceInfo];

    fn collection_adapter(&self, request: &RequestContext) -> Option<Arc<dyn CollectionAdapter>>;
}

/// A fixed list of workspaces.
///
/// An adapter bound to the matching route wins. Otherwise the collection
/// whose href is the longest prefix of the target path serves the request.
#[derive(Clone, Debug, Default)]
pub struct DefaultWorkspaceManager {
    workspaces: Vec<WorkspaceInfo>,
}

impl DefaultWorkspaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, workspace: WorkspaceInfo) -> Self {
        self.workspaces.push(workspace);
        self
    }
}

fn normalized_href(href: &str) -> String {
    format!("/{}", href.trim_matches('/'))
}

fn prefix_len(path: &str, href: &str) -> Option<usize> {
    let href = normalized_href(href);
    let rest = path.strip_prefix(href.as_str())?;
    (rest.is_empty() || href == "/" || rest.starts_with(['/', ';', '?'])).then_some(href.len())
}

impl WorkspaceManager for DefaultWorkspaceManager {
    fn workspaces(&self, _request: &RequestContext) -> &[WorkspaceInfo] {
        &self.workspaces
    }

    fn collection_adapter(&self, request: &RequestContext) -> Option<Arc<dyn CollectionAdapter>> {
        if let Some(adapter) = request.target().and_then(|t| t.adapter()) {
            return Some(Arc::clone(adapter));
        }
        let path = request.target_path();
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        self.workspaces
            .iter()
            .flat_map(|w| w.collections.iter())
            .filter_map(|c| prefix_len(path, c.href()).map(|len| (len, c)))
            .max_by_key(|(len, _)| *len)
            .map(|(_, c)| Arc::clone(c))
    }
}

/// The collection's href as the client should use it: absolute hrefs pass
/// through, relative ones are placed under the context path.
pub fn collection_href(request: &RequestContext, href: &str) -> String {
    if href.contains("://") {
        href.to_owned()
    } else {
        format!("{}{}", request.context_path(), normalized_href(href))
    }
}

fn write_categories(out: &mut String, info: &CategoriesInfo, request: &RequestContext) {
    if let Some(href) = &info.href {
        let _ = write!(out, "<categories href=\"{}\"/>", escape(&collection_href(request, href)));
        return;
    }
    out.push_str("<categories");
    if info.fixed {
        out.push_str(" fixed=\"yes\"");
    }
    if let Some(scheme) = &info.scheme {
        let _ = write!(out, " scheme=\"{}\"", escape(scheme));
    }
    out.push('>');
    for category in &info.categories {
        let _ = write!(out, "<atom:category term=\"{}\"", escape(&category.term));
        if let Some(scheme) = &category.scheme {
            let _ = write!(out, " scheme=\"{}\"", escape(scheme));
        }
        if let Some(label) = &category.label {
            let _ = write!(out, " label=\"{}\"", escape(label));
        }
        out.push_str("/>");
    }
    out.push_str("</categories>");
}

/// Renders the service document for `workspaces`.
pub fn service_document(request: &RequestContext, workspaces: &[WorkspaceInfo]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    let _ = write!(out, "<service xmlns=\"{APP_NS}\" xmlns:atom=\"{ATOM_NS}\">");
    for workspace in workspaces {
        let _ = write!(out, "<workspace><atom:title type=\"text\">{}</atom:title>", escape(workspace.title()));
        for collection in workspace.collections() {
            let _ = write!(
                out,
                "<collection href=\"{}\"><atom:title type=\"text\">{}</atom:title>",
                escape(&collection_href(request, collection.href())),
                escape(collection.title()),
            );
            for accept in collection.accepts() {
                let _ = write!(out, "<accept>{}</accept>", escape(&accept));
            }
            for categories in collection.categories() {
                write_categories(&mut out, &categories, request);
            }
            out.push_str("</collection>");
        }
        out.push_str("</workspace>");
    }
    out.push_str("</service>");
    out
}
