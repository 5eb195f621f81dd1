use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::ecs::{Entity, component_stores};
use crate::net::InputFlags;

component_stores! {
    position: Position,
    velocity: Velocity,
    hitbox: Hitbox,
    health: Health,
    kind: EntityKind,
    drawable: Drawable,
    controllable: Controllable,
    ai: AiController,
    projectile: Projectile,
    ballistic: Ballistic,
    contact_damage: ContactDamage,
    damage_cooldown: DamageCooldown,
    collision: Collision,
    bounty: Bounty,
    spawn_queue: SpawnQueue,
    despawn: Despawn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position(pub Vec2);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity(pub Vec2);

/// Axis-aligned box anchored at the entity's position (top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hitbox {
    pub size: Vec2,
    #[serde(default)]
    pub offset: Vec2,
}

impl Hitbox {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: Vec2::new(width, height),
            offset: Vec2::ZERO,
        }
    }

    pub fn bounds(&self, position: Vec2) -> (Vec2, Vec2) {
        let min = position + self.offset;
        (min, min + self.size)
    }

    pub fn overlaps(&self, position: Vec2, other: &Hitbox, other_position: Vec2) -> bool {
        let (a_min, a_max) = self.bounds(position);
        let (b_min, b_max) = other.bounds(other_position);
        a_min.x < b_max.x && a_max.x > b_min.x && a_min.y < b_max.y && a_max.y > b_min.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub hp: i32,
    pub max: i32,
}

impl Health {
    pub fn new(hp: i32) -> Self {
        Self { hp, max: hp }
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityKind {
    #[default]
    Unknown = 0,
    Player = 1,
    Enemy = 2,
    PlayerProjectile = 3,
    EnemyProjectile = 4,
    Obstacle = 5,
    Background = 6,
}

impl From<u8> for EntityKind {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Player,
            2 => Self::Enemy,
            3 => Self::PlayerProjectile,
            4 => Self::EnemyProjectile,
            5 => Self::Obstacle,
            6 => Self::Background,
            _ => Self::Unknown,
        }
    }
}

impl EntityKind {
    /// Whether contact from `self` hurts `target`.
    pub fn damages(self, target: EntityKind) -> bool {
        matches!(
            (self, target),
            (Self::Enemy, Self::Player)
                | (Self::EnemyProjectile, Self::Player)
                | (Self::Obstacle, Self::Player)
                | (Self::PlayerProjectile, Self::Enemy)
        )
    }

    pub fn is_projectile(self) -> bool {
        matches!(self, Self::PlayerProjectile | Self::EnemyProjectile)
    }

    /// Decorative kinds keep their mirror when briefly missing from a snapshot.
    pub fn survives_pruning(self) -> bool {
        self == Self::Background
    }
}

/// Render hint forwarded untouched to clients (sprite or platform variant).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Drawable {
    pub variant: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Controllable {
    pub player_id: u32,
    pub input: InputFlags,
    pub speed: f32,
    pub fire_cooldown: u32,
    pub last_shot: Option<u32>,
}

impl Controllable {
    pub fn new(player_id: u32, speed: f32, fire_cooldown: u32) -> Self {
        Self {
            player_id,
            input: InputFlags::empty(),
            speed,
            fire_cooldown,
            last_shot: None,
        }
    }

    pub fn can_fire(&self, tick: u32) -> bool {
        self.last_shot
            .is_none_or(|last| tick.wrapping_sub(last) >= self.fire_cooldown)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiController {
    pub behavior: String,
    pub state: AiState,
    pub spells: Vec<Spell>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AiState {
    pub spawn_tick: u32,
    pub origin: Vec2,
    pub speed: f32,
    pub phase: f32,
    pub counter: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spell {
    pub name: String,
    pub cooldown_ticks: u32,
    pub projectile_speed: f32,
    pub damage: i32,
    #[serde(default)]
    pub gravity: f32,
    #[serde(default = "Spell::default_lifetime")]
    pub lifetime_ticks: u32,
    #[serde(skip)]
    pub last_cast: Option<u32>,
}

impl Spell {
    fn default_lifetime() -> u32 {
        240
    }

    pub fn ready(&self, tick: u32) -> bool {
        self.last_cast
            .is_none_or(|last| tick.wrapping_sub(last) >= self.cooldown_ticks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projectile {
    pub damage: i32,
    pub ttl: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ballistic {
    pub gravity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactDamage(pub i32);

/// Minimum ticks between two hits landing on the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageCooldown {
    pub ticks: u32,
    pub last_hit: Option<u32>,
}

impl DamageCooldown {
    pub fn new(ticks: u32) -> Self {
        Self {
            ticks,
            last_hit: None,
        }
    }

    pub fn is_ready(&self, tick: u32) -> bool {
        self.last_hit
            .is_none_or(|last| tick.wrapping_sub(last) >= self.ticks)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collision {
    pub collided: bool,
    pub contacts: Vec<Entity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounty(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub kind: EntityKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub size: Vec2,
    pub damage: i32,
    pub gravity: f32,
    pub ttl: u32,
}

/// Spawns an entity asked for while stores were being iterated; drained by
/// the spawn system at the end of the step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnQueue(pub Vec<SpawnRequest>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Despawn;
