use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use swaphub_api::middleware::require_auth;
use swaphub_api::{messages, reactions, sessions, AppState, AppStateInner};
use swaphub_gateway::{connection, RoomBroker};

#[derive(Clone)]
struct ServerState {
    broker: RoomBroker,
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
                .unwrap_or_else(|_| "swaphub=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("SWAPHUB_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("SWAPHUB_DB_PATH").unwrap_or_else(|_| "swaphub.db".into());
    let host = std::env::var("SWAPHUB_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("SWAPHUB_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = swaphub_store::Database::open(&PathBuf::from(&db_path))?;

    // Shared state: durable store for the REST side, one process-wide room
    // broker for the live side. The two never mix.
    let broker = RoomBroker::new();
    let app_state: AppState = Arc::new(AppStateInner { db });

    let state = ServerState {
        broker: broker.clone(),
        jwt_secret,
    };

    // Routes
    let api_routes = Router::new()
        .route("/groups/{group_id}/messages", get(messages::get_messages))
        .route("/groups/{group_id}/messages", post(messages::send_message))
        .route(
            "/groups/{group_id}/messages/unread-count",
            get(messages::unread_count),
        )
        .route("/messages/{message_id}", axum::routing::patch(messages::edit_message))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route(
            "/messages/{message_id}/reactions",
            post(reactions::add_reaction),
        )
        .route(
            "/messages/{message_id}/reactions",
            delete(reactions::remove_reaction),
        )
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/{session_id}", get(sessions::get_session))
        .route("/sessions/{session_id}", delete(sessions::delete_session))
        .route(
            "/sessions/by-room/{room_id}",
            get(sessions::get_session_by_room),
        )
        .route("/sessions/{session_id}/join", post(sessions::join_session))
        .route("/sessions/{session_id}/leave", post(sessions::leave_session))
        .route(
            "/sessions/{session_id}/canvas",
            axum::routing::put(sessions::save_canvas),
        )
        .route("/sessions/{session_id}/canvas", get(sessions::get_canvas))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/live", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(api_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("swaphub server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.broker, state.jwt_secret)
    })
}
