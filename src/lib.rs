// ====================================================================================
// src/lib.rs - 在线多人恐龙跑酷的权威对局服务器
// ====================================================================================
use axum::{
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub mod config;
pub mod error;
pub mod handler;
pub mod models;
pub mod outbound;
pub mod player;
pub mod registry;
pub mod room;
pub mod routes;
pub mod simulation;
pub mod state;

pub use config::Config;
pub use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    // 定义CORS策略
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public_dir = state.config.public_dir.clone();

    let router = Router::new()
        .route("/", get(routes::ws_handler))
        .route("/ws", get(routes::ws_handler))
        .route("/room/:room_id", get(routes::room_page))
        .route("/management/health", get(routes::health_check))
        .route("/management/rooms", get(routes::list_rooms))
        .route("/management/rooms/:room_id", delete(routes::close_room))
        .with_state(state);

    // 浏览器客户端的静态文件
    let router = match public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(cors)
}
