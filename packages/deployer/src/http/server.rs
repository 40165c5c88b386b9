use axum::{
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utils::{
    context::AppContext,
    http::{BearerAuth, JwtAuth},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use wildmatch::WildMatch;

use crate::{config::Config, dispatcher::DispatcherHandle};

use super::{
    handlers::{
        handle_info, handle_job_status, handle_networks, handle_not_found, handle_submit_job,
        handle_verify_contract, openapi::ApiDoc,
    },
    state::HttpState,
};

const AUTH_REALM: &str = "contract-deployer";

/// Serves until the context is killed, then finishes in-flight requests and returns
pub async fn serve(
    ctx: AppContext,
    config: Config,
    dispatcher: DispatcherHandle,
) -> anyhow::Result<()> {
    let (host, port) = (config.host.clone(), config.port);

    let router = make_router(config, dispatcher);

    let listener = tokio::net::TcpListener::bind(&format!("{}:{}", host, port)).await?;

    tracing::info!("Http server starting on: {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            ctx.wait_killed().await;
            tracing::debug!("Http server shutting down");
        })
        .await?;

    Ok(())
}

// this is called from serve and tests
pub fn make_router(config: Config, dispatcher: DispatcherHandle) -> axum::Router {
    let bearer_token = config.bearer_token.clone();
    let jwt_secret = config.jwt_secret.clone();
    let cors = cors_layer(&config);
    let state = HttpState::new(config, dispatcher);

    // public routes
    let public = axum::Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/info", get(handle_info))
        .route("/networks", get(handle_networks))
        .fallback(handle_not_found)
        .with_state(state.clone());

    // job routes, config rejects having both auth modes
    let protected = axum::Router::new()
        .route("/verify-contract", post(handle_verify_contract))
        .route("/jobs", post(handle_submit_job))
        .route("/job/{job_id}", get(handle_job_status))
        .with_state(state);

    let protected = match (jwt_secret, bearer_token) {
        (Some(secret), _) => protected.layer(middleware::from_fn_with_state(
            JwtAuth::new(&secret, AUTH_REALM),
            utils::http::require_jwt,
        )),
        (None, Some(token)) => protected.layer(middleware::from_fn_with_state(
            BearerAuth::new(token, AUTH_REALM),
            utils::http::require_bearer,
        )),
        (None, None) => protected,
    };

    let mut router = public.merge(protected).layer(TraceLayer::new_for_http());

    if let Some(cors) = cors {
        router = router.layer(cors);
    }

    router
}

fn cors_layer(config: &Config) -> Option<CorsLayer> {
    if config.cors_allowed_origins.is_empty() {
        None
    } else {
        let allowed_origins: Vec<WildMatch> = config
            .cors_allowed_origins
            .iter()
            .map(|s| WildMatch::new(s))
            .collect();

        Some(
            CorsLayer::new()
                // a predicate allows wildcard patterns such as https://*.example.com
                .allow_origin(tower_http::cors::AllowOrigin::predicate(
                    move |origin, _parts| {
                        origin
                            .to_str()
                            .map(|origin| {
                                allowed_origins
                                    .iter()
                                    .any(|allowed_origin| allowed_origin.matches(origin))
                            })
                            .unwrap_or(false)
                    },
                ))
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
    }
}
