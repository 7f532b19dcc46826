// ====================================================================================
// src/routes.rs - HTTP路由处理
// ====================================================================================
use crate::{
    config::Config,
    error::AppError,
    handler,
    models::RoomSummary,
    registry::normalize_code,
    state::AppState,
};
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::{Html, IntoResponse, Response},
    Json,
};
use headers::HeaderMap;
use http::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

pub const ROOM_CLOSED_BY_SERVER: &str = "Room closed by server";

// 健康检查
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

// WebSocket处理器；浏览器直接连 ws://host/，普通 GET 则返回首页
pub async fn ws_handler(ws: Option<WebSocketUpgrade>, State(state): State<Arc<AppState>>) -> Response {
    let Some(ws) = ws else {
        return index_page(&state).await;
    };

    // 负载保护检查
    if state.total_connections.load(Ordering::Relaxed) >= state.config.max_connections {
        return AppError::ServiceUnavailable("Server is at its connection limit".to_string()).into_response();
    }

    ws.on_upgrade(move |socket| handler::handle_socket(socket, state))
}

// 房间链接 /room/:room_id 同样落到首页，由客户端解析房间码
pub async fn room_page(Path(room_id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    tracing::debug!("Serving room link for {}", normalize_code(&room_id));
    index_page(&state).await
}

async fn index_page(state: &AppState) -> Response {
    let Some(dir) = &state.config.public_dir else {
        return AppError::NotFound("Static client is not configured".to_string()).into_response();
    };
    let path = PathBuf::from(dir).join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            AppError::NotFound("index.html not found".to_string()).into_response()
        }
    }
}

// 查询所有房间
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomSummary>>, AppError> {
    check_auth(&headers, &state.config)?;
    Ok(Json(state.registry.summaries().await))
}

// 关闭房间
pub async fn close_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config)?;

    if room_id.trim().is_empty() {
        return Err(AppError::BadRequest("Room id is required".to_string()));
    }
    if state.registry.destroy_room(&room_id, ROOM_CLOSED_BY_SERVER).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Room {} not found", normalize_code(&room_id))))
    }
}

// 认证辅助函数；未配置 ADMIN_API_KEY 时管理接口关闭
fn check_auth(headers: &HeaderMap, config: &Config) -> Result<(), AppError> {
    if let (Some(expected), Some(key)) = (&config.admin_api_key, headers.get("X-Api-Key")) {
        if key.as_bytes() == expected.as_bytes() {
            return Ok(());
        }
    }
    Err(AppError::Unauthorized)
}
