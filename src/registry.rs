// ====================================================================================
// src/registry.rs - 房间注册表：房间码 -> 房间处理器
// ====================================================================================
use crate::error::GameError;
use crate::handler;
use crate::models::{RoomCommand, RoomSummary};
use crate::outbound::OutboundSender;
use crate::player::PlayerId;
use crate::room::Room;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use uuid::Uuid;

const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const ROOM_CODE_LEN: usize = 6;

pub fn generate_room_code<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| char::from(ROOM_CODE_CHARS[rng.gen_range(0..ROOM_CODE_CHARS.len())]))
        .collect()
}

/// 加入时房间码不区分大小写
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

// 房间处理器的句柄，连接会话持有它的克隆
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub code: String,
    instance: Uuid,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// 处理器已退出时视为房间不存在
    pub async fn send(&self, command: RoomCommand) -> Result<(), GameError> {
        self.tx.send(command).await.map_err(|_| GameError::RoomNotFound)
    }

    pub async fn describe(&self) -> Option<RoomSummary> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(RoomCommand::Describe { response_tx }).await.ok()?;
        response_rx.await.ok()
    }
}

pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, RoomHandle>>,
    command_buffer: usize,
}

impl RoomRegistry {
    pub fn new(command_buffer: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            command_buffer,
        }
    }

    /// 生成不与现存房间冲突的房间码，房主占 0 号泳道，并启动房间处理器
    pub async fn create_room(
        self: &Arc<Self>,
        host_id: PlayerId,
        host_name: Option<String>,
        host_sender: OutboundSender,
    ) -> RoomHandle {
        let mut rooms = self.rooms.lock().await;
        let code = loop {
            let candidate = generate_room_code(&mut rand::thread_rng());
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let (tx, rx) = mpsc::channel(self.command_buffer);
        let handle = RoomHandle { code: code.clone(), instance: Uuid::new_v4(), tx };
        rooms.insert(code.clone(), handle.clone());

        let room = Room::new(code.clone(), host_id, host_name);
        let connections = HashMap::from([(host_id, host_sender)]);
        tokio::spawn(handler::room_message_loop(
            room,
            rx,
            connections,
            self.clone(),
            handle.instance,
        ));

        tracing::info!("Room {} created by {}", code, host_id);
        handle
    }

    pub async fn find_room(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.lock().await.get(&normalize_code(code)).cloned()
    }

    /// 从注册表移除并通知处理器停止；重复调用无副作用
    pub async fn destroy_room(&self, code: &str, reason: &str) -> bool {
        let handle = self.rooms.lock().await.remove(&normalize_code(code));
        match handle {
            Some(handle) => {
                let _ = handle.send(RoomCommand::Shutdown { reason: reason.to_string() }).await;
                tracing::info!("Room {} destroyed: {}", handle.code, reason);
                true
            }
            None => false,
        }
    }

    /// 处理器自行退出时调用，只移除同一实例，避免误删复用了房间码的新房间
    pub(crate) async fn release(&self, code: &str, instance: Uuid) {
        let mut rooms = self.rooms.lock().await;
        if rooms.get(code).is_some_and(|h| h.instance == instance) {
            rooms.remove(code);
            tracing::info!("Room {} removed from registry", code);
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn summaries(&self) -> Vec<RoomSummary> {
        // 先收集句柄再逐个查询，避免持锁等待
        let handles: Vec<RoomHandle> = self.rooms.lock().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(summary) = handle.describe().await {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }
}
