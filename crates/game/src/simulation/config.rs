use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::components::Spell;
use crate::net::DEFAULT_TICK_RATE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_rate: u32,
    pub world_width: f32,
    pub world_height: f32,
    pub player_speed: f32,
    pub player_hp: i32,
    pub player_size: Vec2,
    pub shot_cooldown_ticks: u32,
    pub projectile_speed: f32,
    pub projectile_damage: i32,
    pub projectile_ttl: u32,
    pub projectile_size: Vec2,
    pub damage_cooldown_ticks: u32,
    /// Distance past the left edge at which enemies wrap, and past the right
    /// edge where they reappear.
    pub wrap_margin: f32,
    pub spawn_interval_ticks: u32,
    pub max_enemies: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            world_width: 1920.0,
            world_height: 1080.0,
            player_speed: 420.0,
            player_hp: 3,
            player_size: Vec2::new(64.0, 32.0),
            shot_cooldown_ticks: 12,
            projectile_speed: 900.0,
            projectile_damage: 1,
            projectile_ttl: 180,
            projectile_size: Vec2::new(24.0, 8.0),
            damage_cooldown_ticks: 60,
            wrap_margin: 100.0,
            spawn_interval_ticks: 120,
            max_enemies: 24,
            seed: 0x5eed,
        }
    }
}

impl SimulationConfig {
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

/// Enemy archetype copied into components at spawn time. Loaders outside
/// the library fill these from data files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyDefinition {
    pub name: String,
    pub hp: i32,
    pub speed: f32,
    pub behavior: String,
    pub hitbox: Vec2,
    #[serde(default = "EnemyDefinition::default_contact_damage")]
    pub contact_damage: i32,
    #[serde(default)]
    pub bounty: u32,
    #[serde(default)]
    pub variant: u8,
    #[serde(default)]
    pub spells: Vec<Spell>,
}

impl EnemyDefinition {
    fn default_contact_damage() -> i32 {
        1
    }

    pub fn builtin() -> Vec<Self> {
        vec![
            Self {
                name: "grunt".into(),
                hp: 1,
                speed: 180.0,
                behavior: "straight".into(),
                hitbox: Vec2::new(48.0, 48.0),
                contact_damage: 1,
                bounty: 100,
                variant: 0,
                spells: Vec::new(),
            },
            Self {
                name: "weaver".into(),
                hp: 2,
                speed: 150.0,
                behavior: "sine".into(),
                hitbox: Vec2::new(48.0, 40.0),
                contact_damage: 1,
                bounty: 150,
                variant: 1,
                spells: Vec::new(),
            },
            Self {
                name: "gunner".into(),
                hp: 3,
                speed: 90.0,
                behavior: "shooter".into(),
                hitbox: Vec2::new(64.0, 56.0),
                contact_damage: 1,
                bounty: 250,
                variant: 2,
                spells: vec![Spell {
                    name: "shot".into(),
                    cooldown_ticks: 90,
                    projectile_speed: 420.0,
                    damage: 1,
                    gravity: 0.0,
                    lifetime_ticks: 240,
                    last_cast: None,
                }],
            },
            Self {
                name: "lobber".into(),
                hp: 4,
                speed: 70.0,
                behavior: "shooter".into(),
                hitbox: Vec2::new(72.0, 64.0),
                contact_damage: 2,
                bounty: 300,
                variant: 3,
                spells: vec![Spell {
                    name: "lob".into(),
                    cooldown_ticks: 150,
                    projectile_speed: 360.0,
                    damage: 1,
                    gravity: 480.0,
                    lifetime_ticks: 300,
                    last_cast: None,
                }],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_matches_tick_rate() {
        let config = SimulationConfig {
            tick_rate: 30,
            ..Default::default()
        };
        assert_eq!(config.dt(), 1.0 / 30.0);
    }

    #[test]
    fn builtin_enemies_have_unique_names() {
        let defs = EnemyDefinition::builtin();
        let mut names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), defs.len());
    }
}
