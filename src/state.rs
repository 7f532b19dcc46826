// ====================================================================================
// src/state.rs - 共享应用状态
// ====================================================================================
use crate::{config::Config, registry::RoomRegistry};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub total_connections: Arc<AtomicU32>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(RoomRegistry::new(config.command_buffer)),
            total_connections: Arc::new(AtomicU32::new(0)),
            config,
        })
    }
}
