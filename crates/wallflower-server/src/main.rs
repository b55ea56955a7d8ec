use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use wallflower_api::middleware::require_auth;
use wallflower_api::{AppState, AppStateInner, conversations, crushes, walls};
use wallflower_gateway::{EventRouter, Registry, connection};
use wallflower_match::{LedgerConfig, MatchEngine};
use wallflower_types::api::Claims;

#[derive(Clone)]
struct ServerState {
    registry: Registry,
    router: EventRouter,
    engine: Arc<MatchEngine>,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallflower=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("WALLFLOWER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("WALLFLOWER_DB_PATH").unwrap_or_else(|_| "wallflower.db".into());
    let host = std::env::var("WALLFLOWER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("WALLFLOWER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let lock_hours: i64 = std::env::var("WALLFLOWER_CRUSH_LOCK_HOURS")
        .unwrap_or_else(|_| "4".into())
        .parse()?;
    let bypass_lock = matches!(
        std::env::var("WALLFLOWER_CRUSH_LOCK_BYPASS").as_deref(),
        Ok("1") | Ok("true")
    );

    // Init database and domain core
    let db = Arc::new(wallflower_db::Database::open(&PathBuf::from(&db_path))?);
    let engine = Arc::new(MatchEngine::new(
        db.clone(),
        LedgerConfig {
            withdraw_lock: chrono::Duration::hours(lock_hours),
            bypass_lock,
        },
    ));

    // Shared state
    let registry = Registry::new();
    let router = EventRouter::new(registry.clone(), engine.clone());
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        engine: engine.clone(),
        router: router.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    let state = ServerState {
        registry,
        router,
        engine,
        jwt_secret,
    };

    // Routes
    let protected_routes = Router::new()
        .route(
            "/walls/{wall_id}/crush",
            put(crushes::set_crush).delete(crushes::remove_crush),
        )
        .route("/walls/{wall_id}/admirers", get(crushes::admirers))
        .route("/walls/{wall_id}/members", get(walls::list_members))
        .route(
            "/walls/{wall_id}/confessions",
            get(walls::list_confessions).post(walls::post_confession),
        )
        .route(
            "/walls/{wall_id}/conversations",
            post(conversations::open_conversation),
        )
        .route(
            "/conversations/{conversation_id}",
            get(conversations::get_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(conversations::list_messages).post(conversations::send_message),
        )
        .route(
            "/conversations/{conversation_id}/status",
            put(conversations::update_status),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Wallflower server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayParams {
    token: String,
    wall_id: Uuid,
}

/// The push channel carries a (member, wall) identity pair. The token is
/// validated here at the upgrade layer, so the socket loop starts
/// pre-authenticated.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token_data = decode::<Claims>(
        &params.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let member_id = token_data.claims.sub;
    let wall_id = params.wall_id;

    let engine = state.engine.clone();
    let is_member = tokio::task::spawn_blocking(move || engine.is_wall_member(wall_id, member_id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if !is_member {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.registry, state.router, member_id, wall_id)
    }))
}
