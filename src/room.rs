// ====================================================================================
// src/room.rs - 房间：成员、大厅控制、对局生命周期
// ====================================================================================
use crate::error::GameError;
use crate::models::{PlayerAction, PlayerInfo, RoomSummary, ServerMessage};
use crate::player::{Player, PlayerId, sanitize_name};
use crate::simulation::{MAX_DIFFICULTY, MIN_DIFFICULTY, Simulation};
use rand::Rng;
use serde::Serialize;

pub const MAX_PLAYERS: usize = 20;
pub const MIN_PLAYERS_TO_START: usize = 2;
pub const DEFAULT_DIFFICULTY: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    Lobby,
    Playing,
    GameOver,
}

/// 房间操作产生的投递指令，由房间处理器映射到各连接
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Broadcast(ServerMessage),
    BroadcastExcept(PlayerId, ServerMessage),
    Direct(PlayerId, ServerMessage),
    Disconnect(PlayerId),
}

#[derive(Debug)]
pub struct Room {
    code: String,
    host_id: PlayerId,
    state: RoomState,
    difficulty: u8,
    // 插入顺序即泳道顺序
    players: Vec<Player>,
    simulation: Option<Simulation>,
    created_at: i64,
    closed: bool,
}

impl Room {
    pub fn new(code: String, host_id: PlayerId, host_name: Option<String>) -> Self {
        let name = sanitize_name(host_name, || "Host".to_string());
        Self {
            code,
            host_id,
            state: RoomState::Lobby,
            difficulty: DEFAULT_DIFFICULTY,
            players: vec![Player::new(host_id, name, 0, true)],
            simulation: None,
            created_at: chrono::Utc::now().timestamp(),
            closed: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn host_id(&self) -> PlayerId {
        self.host_id
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn simulation(&self) -> Option<&Simulation> {
        self.simulation.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.state == RoomState::Playing
    }

    /// 房主离开或已无玩家时房间应被销毁
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn player_list(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(|p| p.info(self.host_id)).collect()
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.code.clone(),
            state: self.state,
            difficulty: self.difficulty,
            player_count: self.players.len(),
            created_at: self.created_at,
        }
    }

    /// 创建者收到的第一条消息
    pub fn welcome_host(&self) -> Dispatch {
        Dispatch::Direct(
            self.host_id,
            ServerMessage::RoomCreated {
                room_id: self.code.clone(),
                player_id: self.host_id,
                players: self.player_list(),
            },
        )
    }

    fn recompute_lanes(&mut self) {
        for (lane, player) in self.players.iter_mut().enumerate() {
            player.assign_lane(lane);
        }
    }

    fn require_host(&self, player_id: PlayerId) -> Result<(), GameError> {
        if player_id == self.host_id { Ok(()) } else { Err(GameError::NotHost) }
    }

    fn require_lobby(&self) -> Result<(), GameError> {
        if self.state == RoomState::Lobby { Ok(()) } else { Err(GameError::WrongState) }
    }

    pub fn join(&mut self, player_id: PlayerId, name: Option<String>) -> Result<Vec<Dispatch>, GameError> {
        if self.closed {
            return Err(GameError::RoomNotFound);
        }
        if self.state != RoomState::Lobby {
            return Err(GameError::GameInProgress);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::RoomFull);
        }
        if self.player(player_id).is_some() {
            return Err(GameError::InvalidTarget);
        }

        let lane = self.players.len();
        let name = sanitize_name(name, || format!("Player{}", lane + 1));
        self.players.push(Player::new(player_id, name, lane, false));
        self.recompute_lanes();

        let players = self.player_list();
        Ok(vec![
            Dispatch::Direct(
                player_id,
                ServerMessage::JoinedRoom {
                    room_id: self.code.clone(),
                    player_id,
                    players: players.clone(),
                    is_host: false,
                    difficulty: self.difficulty,
                },
            ),
            Dispatch::BroadcastExcept(player_id, ServerMessage::PlayerJoined { players }),
        ])
    }

    pub fn leave(&mut self, player_id: PlayerId) -> Vec<Dispatch> {
        let Some(index) = self.players.iter().position(|p| p.id == player_id) else {
            return Vec::new();
        };
        self.players.remove(index);

        if player_id == self.host_id {
            // 没有房主迁移，房主离开即解散
            return self.close("Host left");
        }

        self.recompute_lanes();
        vec![Dispatch::Broadcast(ServerMessage::PlayerLeft {
            player_id,
            players: self.player_list(),
        })]
    }

    /// 解散房间，通知剩下的所有连接
    pub fn close(&mut self, reason: &str) -> Vec<Dispatch> {
        self.simulation = None;
        self.closed = true;
        vec![Dispatch::Broadcast(ServerMessage::RoomClosed { reason: reason.to_string() })]
    }

    pub fn apply(&mut self, player_id: PlayerId, action: PlayerAction) -> Result<Vec<Dispatch>, GameError> {
        if self.player(player_id).is_none() {
            return Err(GameError::NotInRoom);
        }
        match action {
            PlayerAction::ToggleReady => self.toggle_ready(player_id),
            PlayerAction::SetDifficulty(level) => self.set_difficulty(player_id, level),
            PlayerAction::Kick(target) => self.kick(player_id, target),
            PlayerAction::StartGame => self.start_game(player_id),
            PlayerAction::Jump => self.jump(player_id),
            PlayerAction::Restart => self.restart(player_id),
        }
    }

    fn lobby_update(&self) -> Dispatch {
        Dispatch::Broadcast(ServerMessage::LobbyUpdate {
            players: self.player_list(),
            difficulty: self.difficulty,
        })
    }

    pub fn toggle_ready(&mut self, player_id: PlayerId) -> Result<Vec<Dispatch>, GameError> {
        self.require_lobby()?;
        let host_id = self.host_id;
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::NotInRoom)?;
        // 房主始终视为已准备
        player.is_ready = player_id == host_id || !player.is_ready;
        Ok(vec![self.lobby_update()])
    }

    pub fn set_difficulty(&mut self, player_id: PlayerId, level: i64) -> Result<Vec<Dispatch>, GameError> {
        self.require_host(player_id)?;
        self.require_lobby()?;
        let clamped = level.clamp(i64::from(MIN_DIFFICULTY), i64::from(MAX_DIFFICULTY));
        self.difficulty = u8::try_from(clamped).unwrap_or(DEFAULT_DIFFICULTY);
        Ok(vec![self.lobby_update()])
    }

    pub fn kick(&mut self, requester_id: PlayerId, target_id: PlayerId) -> Result<Vec<Dispatch>, GameError> {
        self.require_host(requester_id)?;
        if target_id == self.host_id || self.player(target_id).is_none() {
            return Err(GameError::InvalidTarget);
        }

        let mut dispatches = vec![
            Dispatch::Direct(target_id, ServerMessage::Kicked),
            Dispatch::Disconnect(target_id),
        ];
        dispatches.extend(self.leave(target_id));
        Ok(dispatches)
    }

    pub fn start_game(&mut self, requester_id: PlayerId) -> Result<Vec<Dispatch>, GameError> {
        self.require_host(requester_id)?;
        match self.state {
            RoomState::Lobby => {}
            RoomState::Playing => return Err(GameError::GameInProgress),
            RoomState::GameOver => return Err(GameError::WrongState),
        }
        if self.players.len() < MIN_PLAYERS_TO_START {
            return Err(GameError::InsufficientPlayers);
        }

        let simulation = Simulation::new(self.difficulty);
        let config = *simulation.config();
        self.simulation = Some(simulation);
        self.state = RoomState::Playing;
        for player in self.players.iter_mut() {
            player.reset_runtime();
        }

        tracing::info!("Room {} started at difficulty {}", self.code, self.difficulty);
        Ok(vec![Dispatch::Broadcast(ServerMessage::GameStart {
            config,
            players: self.player_list(),
        })])
    }

    pub fn jump(&mut self, player_id: PlayerId) -> Result<Vec<Dispatch>, GameError> {
        if self.state != RoomState::Playing {
            return Err(GameError::WrongState);
        }
        if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
            player.jump();
        }
        Ok(Vec::new())
    }

    pub fn restart(&mut self, requester_id: PlayerId) -> Result<Vec<Dispatch>, GameError> {
        self.require_host(requester_id)?;
        self.simulation = None;
        self.state = RoomState::Lobby;
        let host_id = self.host_id;
        for player in self.players.iter_mut() {
            player.is_ready = player.id == host_id;
        }
        Ok(vec![Dispatch::Broadcast(ServerMessage::ReturnToLobby {
            players: self.player_list(),
            difficulty: self.difficulty,
        })])
    }

    /// 推进一帧，返回本帧需要广播的消息
    pub fn tick<R: Rng>(&mut self, rng: &mut R) -> Vec<Dispatch> {
        if self.state != RoomState::Playing {
            return Vec::new();
        }
        let Some(simulation) = self.simulation.as_mut() else {
            return Vec::new();
        };

        let report = simulation.tick(&mut self.players, rng);
        let mut dispatches: Vec<Dispatch> = report
            .deaths
            .iter()
            .map(|&player_id| Dispatch::Broadcast(ServerMessage::PlayerDied { player_id }))
            .collect();

        if report.finished {
            dispatches.push(self.end_game());
            return dispatches;
        }

        dispatches.push(Dispatch::Broadcast(ServerMessage::GameState {
            elapsed_time: simulation.elapsed(),
            players: self.players.iter().map(Player::state).collect(),
            cacti: simulation.snapshot(),
        }));
        dispatches
    }

    fn end_game(&mut self) -> Dispatch {
        self.simulation = None;
        self.state = RoomState::GameOver;

        // 稳定排序，同分保持加入顺序
        let mut ranked: Vec<&Player> = self.players.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        let rankings = ranked.into_iter().map(Player::ranking).collect();

        tracing::info!("Room {} game over", self.code);
        Dispatch::Broadcast(ServerMessage::GameOver { rankings })
    }
}
