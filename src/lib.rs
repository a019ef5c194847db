use axum::{
    http::Request,
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod config;
pub mod openid;
pub mod proxy;

use auth::TokenVerifier;
use config::Config;
use openid::{JwksVerifier, OpenIDError};
use proxy::Proxy;

/// Everything a request needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Proxy,
    /// `None` when authentication is disabled.
    pub verifier: Option<Arc<dyn TokenVerifier>>,
}

/// Connects to the identity provider (unless auth is disabled) and builds
/// the router.
pub async fn app(config: &Config) -> Result<Router, OpenIDError> {
    let verifier = match &config.identity {
        Some(identity) => {
            let verifier = JwksVerifier::connect(identity.clone()).await?;
            verifier.spawn_refresh();
            Some(verifier as Arc<dyn TokenVerifier>)
        }
        None => {
            tracing::warn!("authentication disabled, /api accepts unauthenticated requests");
            None
        }
    };

    Ok(router(AppState {
        proxy: Proxy::new(config.file_server.clone()),
        verifier,
    }))
}

pub fn router(state: AppState) -> Router {
    let api = match state.verifier {
        Some(verifier) => api::router().layer(middleware::from_fn_with_state(
            verifier,
            auth::require_auth,
        )),
        None => api::router(),
    };

    Router::new()
        .nest("/api", api)
        .fallback(proxy::forward)
        .layer(middleware::from_fn(log_request))
        .with_state(state.proxy)
}

async fn log_request<B>(req: Request<B>, next: Next<B>) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    tracing::debug!("{} {} {}", method, uri, response.status());
    response
}
