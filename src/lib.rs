pub mod clients;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod queries;
pub mod services;
pub mod state;

pub use config::Config;
pub use database::{DbConn, DbPool};
pub use error::{Error, Result};
pub use state::AppState;

/// Load configuration from environment variables
pub fn load_config() -> Result<Config> {
    Ok(Config::load()?)
}

/// Initialize tracing subscriber with environment filter
///
/// Reads the RUST_LOG environment variable to set the log level and
/// defaults to "info" when it is not set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

use axum::{
    Router,
    extract::Request,
    http::HeaderName,
    middleware as axum_middleware,
    middleware::Next,
    response::Response,
    routing::{delete, get, post, put},
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::middleware::auth::auth_middleware;
use secrecy::ExposeSecret;

/// Middleware to add request ID to response headers
async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            let id = Uuid::now_v7().to_string();
            if let Ok(value) = id.parse() {
                req.headers_mut()
                    .insert(HeaderName::from_static("x-request-id"), value);
            }
            id
        });

    let mut response = next.run(req).await;
    if let Ok(value) = request_id.parse() {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), value);
    }

    response
}

/// Create API v1 routes
///
/// Reused by the main server and test apps so the surface stays
/// consistent. Everything except the health probe sits behind the session
/// auth middleware.
pub fn create_api_router(state: AppState) -> Router<AppState> {
    let authed = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .nest("/conversations", conversations_router())
        .nest("/system_messages", system_messages_router())
        .nest("/vector-files", vector_files_router())
        .nest(
            "/session-attachments",
            Router::new()
                .route(
                    "/upload",
                    post(handlers::session_attachments::upload_session_attachment),
                )
                .route(
                    "/{id}/remove",
                    delete(handlers::session_attachments::remove_session_attachment),
                ),
        )
        .route("/scraper/extract", post(handlers::web_scraper::extract_content))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(authed)
}

fn conversations_router() -> Router<AppState> {
    use handlers::conversations as h;
    Router::new()
        .route("/", get(h::list_conversations))
        .route("/active", get(h::get_active_conversation))
        .route("/reset", post(h::reset_conversation))
        .route("/folders", get(h::get_folders))
        .route("/folders", post(h::create_folder))
        .route("/folders/{folder_id}/conversations", get(h::get_folder_conversations))
        .route(
            "/folders/{folder_id}/conversations",
            post(h::create_conversation_in_folder),
        )
        .route("/{id}", get(h::get_conversation))
        .route("/{id}", delete(h::delete_conversation))
        .route("/{id}/update_title", post(h::update_conversation_title))
}

fn system_messages_router() -> Router<AppState> {
    use handlers::system_messages as h;
    Router::new()
        .route("/", post(h::create_system_message))
        .route("/", get(h::list_system_messages))
        .route("/default-model", get(h::get_default_model))
        .route("/{id}", get(h::get_system_message))
        .route("/{id}", put(h::update_system_message))
        .route("/{id}", delete(h::delete_system_message))
        .route("/{id}/toggle-search", post(h::toggle_search))
}

fn vector_files_router() -> Router<AppState> {
    use handlers::vector_files as h;
    Router::new()
        .route("/upload", post(h::upload_file))
        .route("/list/{system_message_id}", get(h::list_files))
        .route("/{id}/original", get(h::view_original_file))
        .route("/{id}/serve", get(h::serve_file))
        .route("/{id}/processed", get(h::view_processed_text))
        .route("/{id}", delete(h::remove_file))
}

/// Start the Axum API server
///
/// Connects the database pool, wires the application state, resolves the
/// vector index, and serves until a shutdown signal arrives.
pub async fn run_api_server(config: Config) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(config.database.url.expose_secret())
        .await
        .map_err(|e| Error::Internal(format!("Failed to connect to database: {}", e)))?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config, pool)?;
    app_state.init().await?;

    // The non-deletable default prompt template must exist before the
    // first request.
    {
        let mut conn = app_state.pool.acquire().await.map_err(Error::Sqlx)?;
        services::system_messages::ensure_default_exists(&mut conn).await?;
    }

    let api_routes = create_api_router(app_state.clone());

    let app = Router::new()
        .nest("/api/v1", api_routes)
        .route(
            "/ws/chat/status",
            get(handlers::chat::ws_chat_status).route_layer(axum_middleware::from_fn_with_state(
                app_state.clone(),
                auth_middleware,
            )),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(request_id_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<_>| {
                            let request_id = request
                                .headers()
                                .get("x-request-id")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("unknown");

                            tracing::info_span!(
                                "http_request",
                                method = %request.method(),
                                path = %request.uri().path(),
                                request_id = %request_id,
                            )
                        })
                        .on_request(
                            tower_http::trace::DefaultOnRequest::new().level(tracing::Level::DEBUG),
                        )
                        .on_response(
                            tower_http::trace::DefaultOnResponse::new()
                                .level(tracing::Level::DEBUG),
                        ),
                )
                .layer(SetResponseHeaderLayer::if_not_present(
                    axum::http::header::X_CONTENT_TYPE_OPTIONS,
                    axum::http::HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    axum::http::header::X_FRAME_OPTIONS,
                    axum::http::HeaderValue::from_static("DENY"),
                ))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(CompressionLayer::new()),
        )
        .with_state(app_state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        tracing::info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
