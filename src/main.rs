//! `abdera-server [config.toml]`
//!
//! Serves the in-memory collections declared in the config file. Without a
//! file, one workspace with a single `feed` collection is served.

use std::sync::Arc;

use abdera::config::{self, CollectionConfig, ServerConfig, WorkspaceConfig};
use abdera::{RequestContext, Router, Server};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => config::load(&path)?,
        None => fallback_config(),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind = %config.bind,
        base = %config.base,
        workspaces = config.workspaces.len(),
        "configuration loaded"
    );

    let provider = config.build_provider()?;
    let app = Router::new()
        .on(http::Method::GET, "/healthz", healthz)
        .mount(&config.base, Arc::new(provider));

    Server::bind(&config.bind)?.max_body(config.max_body).serve(app).await?;
    Ok(())
}

async fn healthz(_: RequestContext) -> &'static str {
    "ok"
}

fn fallback_config() -> ServerConfig {
    ServerConfig {
        workspaces: vec![WorkspaceConfig {
            title: "Main".to_owned(),
            collections: vec![CollectionConfig {
                href: "feed".to_owned(),
                title: "Feed".to_owned(),
                ..CollectionConfig::default()
            }],
        }],
        ..ServerConfig::default()
    }
}
