// ====================================================================================
// src/player.rs - 房间内的玩家（大厅信息 + 模拟运行时字段）
// ====================================================================================
use crate::models::{PlayerInfo, PlayerState, RankingEntry};
use crate::simulation::{DINO_HEIGHT, DINO_WIDTH, DINO_X, GRAVITY, Hitbox, JUMP_FORCE};
use uuid::Uuid;

pub type PlayerId = Uuid;

/// 按泳道索引分配的 20 种颜色
pub const PLAYER_COLORS: [&str; 20] = [
    "#2196F3", "#FF9800", "#4CAF50", "#9C27B0", "#F44336",
    "#00BCD4", "#E91E63", "#CDDC39", "#795548", "#607D8B",
    "#FF5722", "#3F51B5", "#009688", "#FFC107", "#673AB7",
    "#8BC34A", "#03A9F4", "#FFEB3B", "#FF4081", "#00E676",
];

const LANE_START_Y: f64 = 160.0;
const LANE_HEIGHT: f64 = 160.0;
const DINO_HITBOX_INSET: f64 = 5.0;
pub const MAX_NAME_LEN: usize = 16;

/// 泳道对应的地面线
pub fn lane_ground_y(lane: usize) -> f64 {
    LANE_START_Y + lane as f64 * LANE_HEIGHT
}

pub fn lane_color(lane: usize) -> &'static str {
    PLAYER_COLORS[lane % PLAYER_COLORS.len()]
}

/// 去掉首尾空白并截断，空名字回落到默认值
pub fn sanitize_name(name: Option<String>, fallback: impl FnOnce() -> String) -> String {
    let trimmed: String = name
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    if trimmed.is_empty() { fallback() } else { trimmed }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub lane: usize,
    pub color: &'static str,
    pub ground_y: f64,
    pub is_ready: bool,
    pub y: f64,
    pub velocity_y: f64,
    pub is_jumping: bool,
    pub is_alive: bool,
    pub score: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: String, lane: usize, is_ready: bool) -> Self {
        let mut player = Self {
            id,
            name,
            lane,
            color: lane_color(lane),
            ground_y: lane_ground_y(lane),
            is_ready,
            y: 0.0,
            velocity_y: 0.0,
            is_jumping: false,
            is_alive: true,
            score: 0,
        };
        player.assign_lane(lane);
        player
    }

    /// 泳道变化时颜色、地面线和站立位置一起重算
    pub fn assign_lane(&mut self, lane: usize) {
        self.lane = lane;
        self.color = lane_color(lane);
        self.ground_y = lane_ground_y(lane);
        self.y = self.rest_y();
        self.velocity_y = 0.0;
        self.is_jumping = false;
    }

    pub fn rest_y(&self) -> f64 {
        self.ground_y - DINO_HEIGHT
    }

    /// 开局前重置运行时字段
    pub fn reset_runtime(&mut self) {
        self.y = self.rest_y();
        self.velocity_y = 0.0;
        self.is_jumping = false;
        self.is_alive = true;
        self.score = 0;
    }

    /// 起跳；死亡或已在空中时忽略
    pub fn jump(&mut self) -> bool {
        if !self.is_alive || self.is_jumping {
            return false;
        }
        self.velocity_y = JUMP_FORCE;
        self.is_jumping = true;
        true
    }

    pub fn step_physics(&mut self) {
        if !self.is_alive || !self.is_jumping {
            return;
        }
        self.velocity_y += GRAVITY;
        self.y += self.velocity_y;

        let rest = self.rest_y();
        if self.y >= rest {
            self.y = rest;
            self.velocity_y = 0.0;
            self.is_jumping = false;
        }
    }

    pub fn hitbox(&self) -> Hitbox {
        Hitbox {
            x: DINO_X + DINO_HITBOX_INSET,
            y: self.y + DINO_HITBOX_INSET,
            width: DINO_WIDTH - DINO_HITBOX_INSET * 2.0,
            height: DINO_HEIGHT - DINO_HITBOX_INSET * 2.0,
        }
    }

    pub fn info(&self, host_id: PlayerId) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            name: self.name.clone(),
            lane: self.lane,
            color: self.color.to_string(),
            is_ready: self.is_ready,
            is_host: self.id == host_id,
        }
    }

    pub fn state(&self) -> PlayerState {
        PlayerState {
            id: self.id,
            name: self.name.clone(),
            lane: self.lane,
            y: self.y,
            ground_y: self.ground_y,
            is_jumping: self.is_jumping,
            is_alive: self.is_alive,
            score: self.score,
            color: self.color.to_string(),
        }
    }

    pub fn ranking(&self) -> RankingEntry {
        RankingEntry {
            id: self.id,
            name: self.name.clone(),
            score: self.score,
            color: self.color.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_drives_color_and_ground() {
        let player = Player::new(Uuid::new_v4(), "Rex".into(), 2, false);
        assert_eq!(player.color, "#4CAF50");
        assert_eq!(player.ground_y, 480.0);
        assert_eq!(player.y, 433.0);
    }

    #[test]
    fn jump_arc_lands_back_on_ground() {
        let mut player = Player::new(Uuid::new_v4(), "Rex".into(), 0, false);
        assert!(player.jump());
        assert!(!player.jump());

        let mut peak = player.y;
        for _ in 0..60 {
            player.step_physics();
            peak = peak.min(player.y);
        }
        assert!(!player.is_jumping);
        assert_eq!(player.y, player.rest_y());
        assert_eq!(player.velocity_y, 0.0);
        assert!(player.rest_y() - peak > 130.0);
    }

    #[test]
    fn dead_players_cannot_jump() {
        let mut player = Player::new(Uuid::new_v4(), "Rex".into(), 0, false);
        player.is_alive = false;
        assert!(!player.jump());
        assert!(!player.is_jumping);
    }

    #[test]
    fn names_are_trimmed_and_truncated() {
        assert_eq!(sanitize_name(Some("  Rex  ".into()), || "Host".into()), "Rex");
        assert_eq!(sanitize_name(Some("   ".into()), || "Host".into()), "Host");
        assert_eq!(sanitize_name(None, || "Player2".into()), "Player2");
        let long = sanitize_name(Some("abcdefghijklmnopqrstuvwxyz".into()), || "Host".into());
        assert_eq!(long.chars().count(), MAX_NAME_LEN);
    }
}
