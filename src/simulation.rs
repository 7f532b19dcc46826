// ====================================================================================
// src/simulation.rs - 权威物理模拟（固定帧率：物理 / 障碍生成 / 碰撞 / 计分）
// ====================================================================================
use crate::models::CactusState;
use crate::player::{Player, PlayerId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const TICK_RATE: u32 = 30;
/// 每帧推进的秒数，与浏览器端 `(1000 / 30) / 1000` 完全一致
pub const TICK_SECONDS: f64 = (1000.0 / TICK_RATE as f64) / 1000.0;
pub const LEVEL_TIME: f64 = 60.0;

pub const GRAVITY: f64 = 0.8;
pub const JUMP_FORCE: f64 = -15.0;
pub const DINO_WIDTH: f64 = 44.0;
pub const DINO_HEIGHT: f64 = 47.0;
pub const DINO_X: f64 = 50.0;

pub const MAX_CACTUS_WIDTH: f64 = 40.0;
const CACTUS_HITBOX_INSET: f64 = 3.0;
const TRACK_WIDTH: f64 = 800.0;
pub const SPAWN_X: f64 = TRACK_WIDTH + 50.0;
const DESPAWN_X: f64 = -50.0;
const EMPTY_TRACK_DISTANCE: f64 = 1000.0;
const SPAWN_CHANCE: f64 = 0.3;
const JUMP_DURATION: f64 = 0.6;
const FRAMES_PER_SECOND: f64 = 60.0;

pub const PASS_SCORE: u32 = 10;

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

/// 开局时从难度快照出的配置，本局内不可变
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelConfig {
    pub speed: f64,
    pub cacti: u32,
    pub level_time: f64,
}

impl LevelConfig {
    pub fn for_difficulty(level: u8) -> Self {
        let (speed, cacti) = match level.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY) {
            1 => (3.0, 15),
            2 => (4.5, 20),
            3 => (6.0, 25),
            4 => (7.5, 30),
            _ => (9.0, 35),
        };
        Self { speed, cacti, level_time: LEVEL_TIME }
    }
}

/// 跳跃弧线推出的最小安全间距，难度越高余量越小，下限 1.15 倍
pub fn min_gap(speed: f64, level: u8) -> f64 {
    let jump_distance = speed * FRAMES_PER_SECOND * JUMP_DURATION;
    let safety_margin = (1.5 - (f64::from(level) - 1.0) * 0.1).max(1.15);
    (jump_distance + DINO_WIDTH + MAX_CACTUS_WIDTH) * safety_margin
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CactusKind {
    Small,
    Tall,
    Double,
}

impl CactusKind {
    pub const ALL: [CactusKind; 3] = [CactusKind::Small, CactusKind::Tall, CactusKind::Double];

    pub fn width(self) -> f64 {
        match self {
            CactusKind::Small => 17.0,
            CactusKind::Tall => 25.0,
            CactusKind::Double => 40.0,
        }
    }

    pub fn height(self) -> f64 {
        match self {
            CactusKind::Small => 35.0,
            CactusKind::Tall => 50.0,
            CactusKind::Double => 35.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Hitbox {
    pub fn overlaps(&self, other: &Hitbox) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }
}

#[derive(Debug, Clone)]
pub struct Obstacle {
    pub x: f64,
    pub kind: CactusKind,
    passed_by: HashSet<PlayerId>,
}

impl Obstacle {
    pub fn new(x: f64, kind: CactusKind) -> Self {
        Self { x, kind, passed_by: HashSet::new() }
    }

    pub fn width(&self) -> f64 {
        self.kind.width()
    }

    pub fn height(&self) -> f64 {
        self.kind.height()
    }

    /// 仙人掌坐在评估玩家自己的地面线上
    pub fn hitbox_on(&self, ground_y: f64) -> Hitbox {
        Hitbox {
            x: self.x + CACTUS_HITBOX_INSET,
            y: ground_y - self.height() + CACTUS_HITBOX_INSET,
            width: self.width() - CACTUS_HITBOX_INSET * 2.0,
            height: self.height() - CACTUS_HITBOX_INSET * 2.0,
        }
    }

    /// 尾边首次越过玩家位置时记一次，之后恒为 false
    pub fn mark_passed(&mut self, player_id: PlayerId) -> bool {
        if self.x + self.width() >= DINO_X {
            return false;
        }
        self.passed_by.insert(player_id)
    }

    pub fn state(&self) -> CactusState {
        CactusState {
            x: self.x,
            width: self.width(),
            height: self.height(),
            kind: self.kind,
        }
    }
}

/// 单帧结果：本帧死亡的玩家，以及本局是否结束
#[derive(Debug, Default, PartialEq)]
pub struct TickReport {
    pub deaths: Vec<PlayerId>,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct Simulation {
    config: LevelConfig,
    difficulty: u8,
    elapsed: f64,
    obstacles: Vec<Obstacle>,
    spawned: u32,
}

impl Simulation {
    pub fn new(difficulty: u8) -> Self {
        let difficulty = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        Self::with_config(LevelConfig::for_difficulty(difficulty), difficulty)
    }

    pub fn with_config(config: LevelConfig, difficulty: u8) -> Self {
        Self {
            config,
            difficulty,
            elapsed: 0.0,
            obstacles: Vec::new(),
            spawned: 0,
        }
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn spawned(&self) -> u32 {
        self.spawned
    }

    pub fn min_gap(&self) -> f64 {
        min_gap(self.config.speed, self.difficulty)
    }

    fn distance_from_last(&self) -> f64 {
        self.obstacles
            .last()
            .map_or(EMPTY_TRACK_DISTANCE, |last| SPAWN_X - last.x)
    }

    pub fn can_spawn(&self) -> bool {
        self.distance_from_last() >= self.min_gap() && self.spawned < self.config.cacti
    }

    pub fn tick<R: Rng>(&mut self, players: &mut [Player], rng: &mut R) -> TickReport {
        let mut report = TickReport::default();

        self.elapsed += TICK_SECONDS;
        if self.elapsed >= self.config.level_time {
            report.finished = true;
            return report;
        }

        for player in players.iter_mut() {
            player.step_physics();
        }

        let speed = self.config.speed;
        for obstacle in self.obstacles.iter_mut() {
            obstacle.x -= speed;
        }
        self.obstacles.retain(|obstacle| obstacle.x >= DESPAWN_X);

        if self.can_spawn() && rng.gen_bool(SPAWN_CHANCE) {
            let kind = CactusKind::ALL[rng.gen_range(0..CactusKind::ALL.len())];
            self.obstacles.push(Obstacle::new(SPAWN_X, kind));
            self.spawned += 1;
        }

        for player in players.iter_mut().filter(|p| p.is_alive) {
            let hitbox = player.hitbox();
            for obstacle in self.obstacles.iter_mut() {
                if hitbox.overlaps(&obstacle.hitbox_on(player.ground_y)) {
                    player.is_alive = false;
                    report.deaths.push(player.id);
                    break;
                }
                if obstacle.mark_passed(player.id) {
                    player.score += PASS_SCORE;
                }
            }
        }

        report.finished = players.iter().all(|p| !p.is_alive);
        report
    }

    pub fn snapshot(&self) -> Vec<CactusState> {
        self.obstacles.iter().map(Obstacle::state).collect()
    }

    #[cfg(test)]
    pub(crate) fn insert_obstacle(&mut self, x: f64, kind: CactusKind) {
        self.obstacles.push(Obstacle::new(x, kind));
    }

    #[cfg(test)]
    pub(crate) fn set_elapsed(&mut self, elapsed: f64) {
        self.elapsed = elapsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use uuid::Uuid;

    fn two_players() -> Vec<Player> {
        vec![
            Player::new(Uuid::new_v4(), "a".into(), 0, true),
            Player::new(Uuid::new_v4(), "b".into(), 1, false),
        ]
    }

    fn quiet(config: LevelConfig) -> Simulation {
        Simulation::with_config(LevelConfig { cacti: 0, ..config }, 1)
    }

    #[test]
    fn difficulty_table() {
        let c = LevelConfig::for_difficulty(3);
        assert_eq!(c, LevelConfig { speed: 6.0, cacti: 25, level_time: 60.0 });
        assert_eq!(LevelConfig::for_difficulty(0), LevelConfig::for_difficulty(1));
        assert_eq!(LevelConfig::for_difficulty(9).speed, 9.0);
    }

    #[test]
    fn min_gap_clears_the_jump_arc() {
        let gap = min_gap(3.0, 1);
        assert!((gap - 288.0).abs() < 1e-9);
        assert!(gap > (3.0 * 60.0 * 0.6 + 44.0 + 40.0) * 1.15);

        // 高难度触底 1.15
        let hardest = min_gap(9.0, 5);
        assert!((hardest - (9.0 * 36.0 + 84.0) * 1.15).abs() < 1e-9);
    }

    #[test]
    fn spawns_respect_min_gap_and_target() {
        for difficulty in MIN_DIFFICULTY..=MAX_DIFFICULTY {
            let mut sim = Simulation::new(difficulty);
            let mut rng = StdRng::seed_from_u64(u64::from(difficulty));
            // 恐龙悬在画面外，永不碰撞，只有时间到才结束
            let mut players = vec![Player::new(Uuid::new_v4(), "ghost".into(), 0, true)];
            players[0].y = -10_000.0;
            let gap = sim.min_gap();
            loop {
                if sim.tick(&mut players, &mut rng).finished {
                    break;
                }
                for pair in sim.obstacles().windows(2) {
                    assert!(pair[1].x - pair[0].x >= gap - 1e-9);
                }
            }
            assert!(sim.spawned() <= sim.config().cacti);
            assert!(sim.spawned() > 0);
        }
    }

    #[test]
    fn obstacles_scroll_and_despawn() {
        let mut sim = quiet(LevelConfig::for_difficulty(1));
        sim.insert_obstacle(-48.0, CactusKind::Small);
        sim.insert_obstacle(400.0, CactusKind::Tall);
        let mut players = two_players();
        for p in players.iter_mut() {
            p.y = -10_000.0;
        }
        let mut rng = StdRng::seed_from_u64(1);
        sim.tick(&mut players, &mut rng);
        assert_eq!(sim.obstacles().len(), 1);
        assert_eq!(sim.obstacles()[0].x, 397.0);
    }

    #[test]
    fn pass_scores_once_per_player() {
        let mut sim = quiet(LevelConfig::for_difficulty(1));
        // 右边缘 51，碰撞盒 37..48，不与 55..89 的恐龙重叠
        sim.insert_obstacle(34.0, CactusKind::Small);
        let mut players = two_players();
        let mut rng = StdRng::seed_from_u64(7);

        sim.tick(&mut players, &mut rng);
        assert_eq!(players[0].score, PASS_SCORE);
        assert_eq!(players[1].score, PASS_SCORE);

        for _ in 0..5 {
            sim.tick(&mut players, &mut rng);
        }
        assert_eq!(players[0].score, PASS_SCORE);
        assert_eq!(players[1].score, PASS_SCORE);
    }

    #[test]
    fn right_edge_on_player_line_is_not_a_pass() {
        let mut sim = quiet(LevelConfig::for_difficulty(1));
        sim.insert_obstacle(36.0, CactusKind::Small);
        let mut players = two_players();
        let mut rng = StdRng::seed_from_u64(7);
        // 36 - 3 + 17 = 50，严格小于才算
        sim.tick(&mut players, &mut rng);
        assert_eq!(players[0].score, 0);
        sim.tick(&mut players, &mut rng);
        assert_eq!(players[0].score, PASS_SCORE);
    }

    #[test]
    fn collision_kills_only_the_grounded_player() {
        let mut sim = quiet(LevelConfig::for_difficulty(1));
        sim.insert_obstacle(63.0, CactusKind::Small);
        let mut players = two_players();
        players[1].is_jumping = true;
        players[1].y = players[1].rest_y() - 120.0;
        let mut rng = StdRng::seed_from_u64(3);

        let report = sim.tick(&mut players, &mut rng);
        assert_eq!(report.deaths, vec![players[0].id]);
        assert!(!report.finished);
        assert!(!players[0].is_alive);
        assert!(players[1].is_alive);
    }

    #[test]
    fn last_death_finishes_the_run() {
        let mut sim = quiet(LevelConfig::for_difficulty(1));
        sim.insert_obstacle(63.0, CactusKind::Double);
        let mut players = two_players();
        let mut rng = StdRng::seed_from_u64(3);
        let report = sim.tick(&mut players, &mut rng);
        assert_eq!(report.deaths.len(), 2);
        assert!(report.finished);
    }

    #[test]
    fn time_limit_ends_before_physics() {
        let mut sim = quiet(LevelConfig::for_difficulty(1));
        sim.insert_obstacle(63.0, CactusKind::Small);
        sim.set_elapsed(60.0 - TICK_SECONDS / 2.0);
        let mut players = two_players();
        let mut rng = StdRng::seed_from_u64(3);
        let report = sim.tick(&mut players, &mut rng);
        assert!(report.finished);
        assert!(report.deaths.is_empty());
        assert_eq!(sim.obstacles()[0].x, 63.0);
    }

    #[test]
    fn full_run_lasts_sixty_seconds() {
        let mut sim = quiet(LevelConfig::for_difficulty(2));
        let mut players = two_players();
        let mut rng = StdRng::seed_from_u64(11);
        let mut ticks = 0;
        while !sim.tick(&mut players, &mut rng).finished {
            ticks += 1;
        }
        assert!((1798..=1801).contains(&ticks), "ticks = {ticks}");
    }
}
