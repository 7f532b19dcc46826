// ====================================================================================
// src/main.rs - 应用入口
// ====================================================================================
use dino_jump_server::{build_router, AppState, Config};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志记录
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dino_jump_server=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env()?;
    let addr: SocketAddr = config.bind_address.parse()?;
    if let Some(dir) = &config.public_dir {
        tracing::info!("Serving static client from {}", dir);
    }
    if config.admin_api_key.is_none() {
        tracing::info!("ADMIN_API_KEY not set, management endpoints are disabled");
    }

    // 创建共享的应用状态
    let app_state = AppState::new(config);
    let app = build_router(app_state);

    // 启动服务器
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Dino Jump server listening on {}", addr);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
