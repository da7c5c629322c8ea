//! # abdera
//!
//! A toolkit for AtomPub (RFC 5023) servers.
//!
//! An incoming request is mapped to a [`Target`] by a [`TargetResolver`]
//! (the [`RouteManager`] unless another is configured),
//! dispatched by a [`Provider`] to the [`RequestProcessor`] for the target's
//! type, and from there to a [`CollectionAdapter`]. Adapters answer with a
//! [`ResponseContext`] carrying the status, the headers AtomPub clients rely
//! on (ETag, Cache-Control, Last-Modified, Location, Slug, Link,
//! Preference-Applied, Allow) and the body.
//!
//! The HTTP side is a hyper server with graceful shutdown and a radix-tree
//! [`Router`] that mounts providers next to plain handlers.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use abdera::{MemoryCollection, Provider, RequestContext, Router, Server, WorkspaceInfo};
//! use abdera::middleware::Trace;
//!
//! #[tokio::main]
//! async fn main() -> abdera::Result<()> {
//!     let provider = Provider::builder("/")
//!         .workspace(WorkspaceInfo::new("Blog").with_collection(Arc::new(MemoryCollection::new("posts", "Posts"))))
//!         .filter(Trace)
//!         .build()?;
//!
//!     let app = Router::new()
//!         .on(http::Method::GET, "/healthz", healthz)
//!         .mount("/atom", Arc::new(provider));
//!
//!     Server::bind("0.0.0.0:8080")?.serve(app).await
//! }
//!
//! async fn healthz(_: RequestContext) -> &'static str {
//!     "ok"
//! }
//! ```

mod adapter;
mod error;
mod handler;
mod method;
mod processor;
mod provider;
mod request;
mod resolver;
mod response;
mod route;
mod route_manager;
mod router;
mod server;
mod target;
mod workspace;

pub mod adapters;
pub mod conditional;
pub mod config;
pub mod headers;
pub mod helper;
pub mod middleware;

pub use adapter::{
    ACCEPT_ENTRY, CategoriesAdapter, CategoriesInfo, CategoryInfo, CollectionAdapter, MediaCollectionAdapter,
    Transactional,
};
pub use adapters::MemoryCollection;
pub use error::{Error, Result};
pub use handler::Handler;
pub use headers::{CacheControl, EntityTag, Preference, WebLink};
pub use method::Method;
pub use processor::{
    CategoriesRequestProcessor, CollectionRequestProcessor, EntryRequestProcessor, MediaRequestProcessor,
    RequestProcessor, ServiceRequestProcessor,
};
pub use provider::{PrincipalSubjectResolver, Provider, ProviderBuilder, SubjectResolver};
pub use request::{RequestContext, RequestContextBuilder, Subject};
pub use resolver::{RegexTargetResolver, TargetResolver};
pub use response::{ContentType, IntoResponse, ResponseBuilder, ResponseContext};
pub use route::Route;
pub use route_manager::RouteManager;
pub use router::Router;
pub use server::{DEFAULT_MAX_BODY, Server};
pub use target::{Target, TargetType};
pub use workspace::{
    APP_NS, ATOM_NS, DefaultWorkspaceManager, WorkspaceInfo, WorkspaceManager, collection_href, service_document,
};
