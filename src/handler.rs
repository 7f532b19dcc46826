// ====================================================================================
// src/handler.rs - 核心业务逻辑处理器：连接会话 + 房间处理循环
// ====================================================================================
use crate::{
    error::GameError,
    models::{ClientMessage, Outbound, PlayerAction, RoomCommand, ServerMessage},
    outbound::{self, Delivery, OutboundSender},
    player::PlayerId,
    registry::{RoomHandle, RoomRegistry},
    room::{Dispatch, Room},
    simulation::TICK_SECONDS,
    state::AppState,
};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

// RAII Guard for connection counting
struct ConnectionGuard {
    count: Arc<AtomicU32>,
}

impl ConnectionGuard {
    fn new(count: Arc<AtomicU32>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self { count }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }
}

/// 每个连接一份的会话记录，代替闭包里捕获的可变身份
pub struct Session {
    pub conn_id: Uuid,
    player_id: Option<PlayerId>,
    room: Option<RoomHandle>,
    sender: OutboundSender,
}

impl Session {
    pub fn new(conn_id: Uuid, sender: OutboundSender) -> Self {
        Self { conn_id, player_id: None, room: None, sender }
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.code.as_str())
    }

    /// 错误只发给请求者
    pub fn reply_error(&self, err: GameError) {
        tracing::debug!("conn {} rejected: {}", self.conn_id, err);
        self.sender.push(Outbound::Message(err.into()));
    }

    fn clear(&mut self) {
        self.player_id = None;
        self.room = None;
    }

    pub async fn handle(&mut self, msg: ClientMessage, registry: &Arc<RoomRegistry>) {
        match msg {
            ClientMessage::CreateRoom { name } => {
                self.leave_room().await;
                let player_id = Uuid::new_v4();
                let handle = registry.create_room(player_id, name, self.sender.clone()).await;
                self.player_id = Some(player_id);
                self.room = Some(handle);
            }
            ClientMessage::JoinRoom { room_id, name } => {
                self.leave_room().await;
                if let Err(err) = self.join_room(&room_id, name, registry).await {
                    self.reply_error(err);
                }
            }
            ClientMessage::LeaveRoom {} => self.leave_room().await,
            other => {
                if let Some(action) = other.into_action() {
                    self.forward(action).await;
                }
            }
        }
    }

    async fn join_room(
        &mut self,
        room_id: &str,
        name: Option<String>,
        registry: &Arc<RoomRegistry>,
    ) -> Result<(), GameError> {
        let handle = registry.find_room(room_id).await.ok_or(GameError::RoomNotFound)?;
        let player_id = Uuid::new_v4();
        let (response_tx, response_rx) = oneshot::channel();
        handle
            .send(RoomCommand::Join {
                player_id,
                name,
                sender: self.sender.clone(),
                response_tx,
            })
            .await?;
        // 处理器在回复前退出同样视为房间不存在
        response_rx.await.map_err(|_| GameError::RoomNotFound)??;

        tracing::debug!("conn {} joined room {} as {}", self.conn_id, handle.code, player_id);
        self.player_id = Some(player_id);
        self.room = Some(handle);
        Ok(())
    }

    async fn forward(&mut self, action: PlayerAction) {
        let (Some(player_id), Some(room)) = (self.player_id, self.room.as_ref()) else {
            self.reply_error(GameError::NotInRoom);
            return;
        };
        let sent = room.send(RoomCommand::Action { player_id, action }).await;
        if let Err(err) = sent {
            // 房间已被销毁
            self.clear();
            self.reply_error(err);
        }
    }

    /// 主动离开或断开连接时调用；房间已不存在时静默忽略
    pub async fn leave_room(&mut self) {
        if let (Some(player_id), Some(room)) = (self.player_id, self.room.as_ref()) {
            let _ = room.send(RoomCommand::Leave { player_id }).await;
        }
        self.clear();
    }
}

// 处理单个WebSocket连接
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let _conn_guard = ConnectionGuard::new(state.total_connections.clone());
    let conn_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = outbound::channel(state.config.outbound_buffer);

    tracing::debug!("conn {} opened", conn_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Message(msg) => {
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Failed to encode outbound message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let mut session = Session::new(conn_id, tx);

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                let msg = match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(msg)) => msg,
                };
                match ClientMessage::try_from(msg) {
                    Ok(client_msg) => session.handle(client_msg, &state.registry).await,
                    Err(err) => {
                        tracing::warn!("conn {} sent a malformed message", conn_id);
                        session.reply_error(err);
                    }
                }
            }
            // 写任务结束（被踢出或对端已断开）
            _ = &mut send_task => break,
        }
    }

    // 断开即离开
    session.leave_room().await;
    send_task.abort();
    tracing::debug!("conn {} closed", conn_id);
}

fn tick_period() -> Duration {
    Duration::from_secs_f64(TICK_SECONDS)
}

fn new_ticker() -> Interval {
    let period = tick_period();
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// 只有 playing 状态才有计时器；停止是立即且幂等的
fn sync_ticker(room: &Room, ticker: &mut Option<Interval>) {
    match (room.is_playing(), ticker.is_some()) {
        (true, false) => *ticker = Some(new_ticker()),
        (false, true) => *ticker = None,
        _ => {}
    }
}

// 房间的中央消息处理循环：命令和帧在同一任务里串行执行
pub async fn room_message_loop(
    mut room: Room,
    mut command_rx: mpsc::Receiver<RoomCommand>,
    mut connections: HashMap<PlayerId, OutboundSender>,
    registry: Arc<RoomRegistry>,
    instance: Uuid,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker: Option<Interval> = None;

    let welcome = room.welcome_host();
    deliver(&mut connections, vec![welcome]);

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else { break; };
                handle_command(command, &mut room, &mut connections);
            }
            _ = next_tick(&mut ticker) => {
                let dispatches = room.tick(&mut rng);
                deliver(&mut connections, dispatches);
            }
        }

        if room.is_closed() {
            break;
        }
        sync_ticker(&room, &mut ticker);
    }

    drop(ticker);
    registry.release(room.code(), instance).await;
    tracing::info!("Room {} handler shutting down.", room.code());
}

fn handle_command(
    command: RoomCommand,
    room: &mut Room,
    connections: &mut HashMap<PlayerId, OutboundSender>,
) {
    match command {
        RoomCommand::Join { player_id, name, sender, response_tx } => match room.join(player_id, name) {
            Ok(dispatches) => {
                connections.insert(player_id, sender);
                deliver(connections, dispatches);
                let _ = response_tx.send(Ok(()));
                tracing::debug!("Player {} joined room {}", player_id, room.code());
            }
            Err(err) => {
                let _ = response_tx.send(Err(err));
            }
        },
        RoomCommand::Leave { player_id } => {
            let dispatches = room.leave(player_id);
            connections.remove(&player_id);
            deliver(connections, dispatches);
            tracing::debug!("Player {} left room {}", player_id, room.code());
        }
        RoomCommand::Action { player_id, action } => match room.apply(player_id, action) {
            Ok(dispatches) => deliver(connections, dispatches),
            Err(err) => deliver(connections, vec![Dispatch::Direct(player_id, err.into())]),
        },
        RoomCommand::Describe { response_tx } => {
            let _ = response_tx.send(room.summary());
        }
        RoomCommand::Shutdown { reason } => {
            let dispatches = room.close(&reason);
            deliver(connections, dispatches);
        }
    }
}

// 按投递指令发送；慢连接只会丢 gameState 快照，不阻塞房间
fn deliver(connections: &mut HashMap<PlayerId, OutboundSender>, dispatches: Vec<Dispatch>) {
    for dispatch in dispatches {
        match dispatch {
            Dispatch::Broadcast(msg) => broadcast(connections, &msg, None),
            Dispatch::BroadcastExcept(player_id, msg) => broadcast(connections, &msg, Some(player_id)),
            Dispatch::Direct(player_id, msg) => {
                if let Some(sender) = connections.get(&player_id) {
                    push(player_id, sender, Outbound::Message(msg));
                }
            }
            Dispatch::Disconnect(player_id) => {
                if let Some(sender) = connections.remove(&player_id) {
                    push(player_id, &sender, Outbound::Close);
                }
            }
        }
    }
}

fn broadcast(
    connections: &HashMap<PlayerId, OutboundSender>,
    msg: &ServerMessage,
    exclude: Option<PlayerId>,
) {
    for (player_id, sender) in connections.iter() {
        if Some(*player_id) == exclude {
            continue;
        }
        push(*player_id, sender, Outbound::Message(msg.clone()));
    }
}

fn push(player_id: PlayerId, sender: &OutboundSender, outbound: Outbound) {
    if sender.push(outbound) == Delivery::Dropped {
        tracing::warn!("Snapshot queue full for player {}, dropping frame", player_id);
    }
}
