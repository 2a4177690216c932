use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError};

use crate::config::Config;
use crate::service::DiscussionService;
use crate::storage::FileStorage;

mod error;
mod discussions;
mod ping;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Clone)]
pub struct ApiContext {
    service: Arc<DiscussionService<FileStorage>>,
}

pub async fn serve(config: Config, service: DiscussionService<FileStorage>) -> anyhow::Result<()> {
    let ctx = ApiContext { service: Arc::new(service) };
    let app = api_router()
        .layer(CorsLayer::new().allow_methods(Any).allow_headers(Any).allow_origin(Any))
        .layer(ServiceBuilder::new().layer(Extension(ctx)).layer(TraceLayer::new_for_http()),
    );

    let addr = config.http.listen_addr;
    let listener = tokio::net::TcpListener::bind(&addr).await
        .with_context(|| format!("failed to bind to {}", addr))?;
    info!("listening on {}", &addr);
    axum::serve(listener, app).await.context("error running HTTP server")
}

fn api_router() -> Router {
    ping::router()
        .merge(discussions::router())
}
