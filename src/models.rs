// ====================================================================================
// src/models.rs - 数据模型定义
// ====================================================================================
use crate::error::GameError;
use crate::outbound::OutboundSender;
use crate::player::PlayerId;
use crate::room::RoomState;
use crate::simulation::{CactusKind, LevelConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

// 客户端 -> 服务器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateRoom { name: Option<String> },
    JoinRoom { room_id: String, name: Option<String> },
    Ready {},
    SetDifficulty { level: i64 },
    KickPlayer { player_id: PlayerId },
    StartGame {},
    Jump {},
    RestartGame {},
    LeaveRoom {},
}

impl ClientMessage {
    /// 需要已在房间内才能执行的动作
    pub fn into_action(self) -> Option<PlayerAction> {
        match self {
            ClientMessage::Ready {} => Some(PlayerAction::ToggleReady),
            ClientMessage::SetDifficulty { level } => Some(PlayerAction::SetDifficulty(level)),
            ClientMessage::KickPlayer { player_id } => Some(PlayerAction::Kick(player_id)),
            ClientMessage::StartGame {} => Some(PlayerAction::StartGame),
            ClientMessage::Jump {} => Some(PlayerAction::Jump),
            ClientMessage::RestartGame {} => Some(PlayerAction::Restart),
            ClientMessage::CreateRoom { .. }
            | ClientMessage::JoinRoom { .. }
            | ClientMessage::LeaveRoom {} => None,
        }
    }
}

impl TryFrom<axum::extract::ws::Message> for ClientMessage {
    type Error = GameError;
    fn try_from(msg: axum::extract::ws::Message) -> Result<Self, Self::Error> {
        match msg {
            axum::extract::ws::Message::Text(text) => {
                serde_json::from_str(&text).map_err(|_| GameError::MalformedMessage)
            }
            _ => Err(GameError::MalformedMessage),
        }
    }
}

// 服务器 -> 客户端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    RoomCreated { room_id: String, player_id: PlayerId, players: Vec<PlayerInfo> },
    JoinedRoom {
        room_id: String,
        player_id: PlayerId,
        players: Vec<PlayerInfo>,
        is_host: bool,
        difficulty: u8,
    },
    PlayerJoined { players: Vec<PlayerInfo> },
    LobbyUpdate { players: Vec<PlayerInfo>, difficulty: u8 },
    PlayerLeft { player_id: PlayerId, players: Vec<PlayerInfo> },
    GameStart { config: LevelConfig, players: Vec<PlayerInfo> },
    GameState { elapsed_time: f64, players: Vec<PlayerState>, cacti: Vec<CactusState> },
    PlayerDied { player_id: PlayerId },
    GameOver { rankings: Vec<RankingEntry> },
    ReturnToLobby { players: Vec<PlayerInfo>, difficulty: u8 },
    Kicked,
    RoomClosed { reason: String },
    Error { message: String },
}

impl From<GameError> for ServerMessage {
    fn from(err: GameError) -> Self {
        ServerMessage::Error { message: err.to_string() }
    }
}

// 大厅列表项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub lane: usize,
    pub color: String,
    pub is_ready: bool,
    pub is_host: bool,
}

// 每帧广播的玩家状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub lane: usize,
    pub y: f64,
    pub ground_y: f64,
    pub is_jumping: bool,
    pub is_alive: bool,
    pub score: u32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CactusState {
    pub x: f64,
    pub width: f64,
    pub height: f64,
    #[serde(rename = "type")]
    pub kind: CactusKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub color: String,
}

// 管理接口的房间概要
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub state: RoomState,
    pub difficulty: u8,
    pub player_count: usize,
    pub created_at: i64,
}

// 房间内玩家动作
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerAction {
    ToggleReady,
    SetDifficulty(i64),
    Kick(PlayerId),
    StartGame,
    Jump,
    Restart,
}

// 发往连接写任务的帧
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close,
}

// 房间处理器的命令
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player_id: PlayerId,
        name: Option<String>,
        sender: OutboundSender,
        response_tx: oneshot::Sender<Result<(), GameError>>,
    },
    Leave { player_id: PlayerId },
    Action { player_id: PlayerId, action: PlayerAction },
    Describe { response_tx: oneshot::Sender<RoomSummary> },
    Shutdown { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn parses_client_messages() {
        let msg: ClientMessage =
            serde_json::from_value(json!({ "type": "joinRoom", "roomId": "ab12cd", "name": "Rex" })).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom { room_id: "ab12cd".into(), name: Some("Rex".into()) }
        );

        let msg: ClientMessage = serde_json::from_value(json!({ "type": "createRoom" })).unwrap();
        assert_eq!(msg, ClientMessage::CreateRoom { name: None });

        let msg: ClientMessage = serde_json::from_value(json!({ "type": "jump" })).unwrap();
        assert_eq!(msg.into_action(), Some(PlayerAction::Jump));
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(serde_json::from_value::<ClientMessage>(json!({ "type": "fly" })).is_err());
        assert!(serde_json::from_value::<ClientMessage>(json!({ "type": "setDifficulty" })).is_err());
        assert!(
            serde_json::from_value::<ClientMessage>(json!({ "type": "kickPlayer", "playerId": "nope" }))
                .is_err()
        );

        let binary = axum::extract::ws::Message::Binary(vec![1, 2, 3]);
        assert_eq!(ClientMessage::try_from(binary), Err(GameError::MalformedMessage));
        let text = axum::extract::ws::Message::Text("{not json".into());
        assert_eq!(ClientMessage::try_from(text), Err(GameError::MalformedMessage));
    }

    #[test]
    fn server_messages_use_wire_names() {
        let id = Uuid::nil();
        let value = serde_json::to_value(ServerMessage::PlayerLeft { player_id: id, players: vec![] }).unwrap();
        assert_eq!(value, json!({ "type": "playerLeft", "playerId": id.to_string(), "players": [] }));

        let value = serde_json::to_value(ServerMessage::Kicked).unwrap();
        assert_eq!(value, json!({ "type": "kicked" }));

        let value = serde_json::to_value(ServerMessage::GameStart {
            config: LevelConfig::for_difficulty(3),
            players: vec![],
        })
        .unwrap();
        assert_eq!(
            value,
            json!({ "type": "gameStart", "config": { "speed": 6.0, "cacti": 25, "levelTime": 60.0 }, "players": [] })
        );

        let cactus = CactusState { x: 850.0, width: 17.0, height: 35.0, kind: CactusKind::Small };
        assert_eq!(
            serde_json::to_value(cactus).unwrap(),
            json!({ "x": 850.0, "width": 17.0, "height": 35.0, "type": "small" })
        );
    }

    #[test]
    fn errors_render_as_error_messages() {
        let value = serde_json::to_value(ServerMessage::from(GameError::RoomFull)).unwrap();
        assert_eq!(value, json!({ "type": "error", "message": "Room is full (max 20 players)" }));
    }
}
