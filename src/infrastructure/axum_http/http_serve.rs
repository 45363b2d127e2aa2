use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    middleware::from_fn_with_state,
    response::Response,
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::{
    LatencyUnit,
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, error, info};

use crate::{
    domain::repositories::datasets::DatasetRepository,
    infrastructure::axum_http::{default_routers, middleware, routers},
    startup::AppContext,
};

/// Assembles the router and the full request pipeline. Layers are listed
/// innermost first.
pub fn build_app<T>(context: &AppContext, dataset_repository: Arc<T>) -> Result<Router>
where
    T: DatasetRepository + Send + Sync + 'static,
{
    let body_limit = context.config.server.body_limit_bytes;

    let status_router = Router::new()
        .route(default_routers::STATUS_PATH, get(default_routers::status))
        .with_state(context.clone());

    let app = Router::new()
        .merge(status_router)
        .merge(routers::datasets::routes(dataset_repository))
        .fallback(default_routers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(from_fn_with_state(
            context.readiness.clone(),
            middleware::readiness_gate,
        ))
        .layer(CatchPanicLayer::custom(middleware::handle_panic))
        .layer(from_fn_with_state(
            context.config.stage.clone(),
            middleware::error_handler,
        ))
        .layer(axum::middleware::from_fn(middleware::strong_etag))
        .layer(from_fn_with_state(
            context.telemetry.clone(),
            middleware::capture_request,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::LAST_MODIFIED,
            |_: &Response| middleware::last_modified_now(),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(middleware::ALLOW_HEADERS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(middleware::ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(middleware::ALLOW_ORIGIN),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        );

    Ok(app)
}

pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", listener.local_addr()?.port());
    Ok(listener)
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
