use axum::{http::HeaderValue, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::JwtVerifier;
use crate::config::Settings;
use crate::middleware::{request_id_layer, request_span, X_REQUEST_ID};
use crate::routes;
use crate::services::Services;

/// Shared application state
pub struct AppState {
    pub services: Services,
    pub settings: Settings,
    pub jwt: JwtVerifier,
}

impl AppState {
    pub fn new(services: Services, settings: Settings) -> Arc<Self> {
        let jwt = JwtVerifier::new(
            &settings.jwt_secret,
            settings.jwt_issuer.as_deref(),
            &settings.jwt_audience,
        );

        Arc::new(Self {
            services,
            settings,
            jwt,
        })
    }
}

/// Bid, job and review bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // DEBUG spans keep per-request overhead off the INFO level
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(request_span::<axum::body::Body>)
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static(X_REQUEST_ID),
        ]))
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
