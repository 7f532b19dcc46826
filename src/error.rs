// ====================================================================================
// src/error.rs - 自定义错误类型
// ====================================================================================
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// 协议层错误：只回给发起请求的连接，不改动房间状态
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Game already in progress")]
    GameInProgress,
    #[error("Room is full (max 20 players)")]
    RoomFull,
    #[error("Only the host can do that")]
    NotHost,
    #[error("Need at least 2 players")]
    InsufficientPlayers,
    #[error("Malformed message")]
    MalformedMessage,
    #[error("You are not in a room")]
    NotInRoom,
    #[error("Not allowed in the current room state")]
    WrongState,
    #[error("Invalid target player")]
    InvalidTarget,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: Invalid API Key")]
    Unauthorized,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} must be a valid number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}
