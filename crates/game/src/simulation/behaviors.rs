use std::collections::HashMap;

use glam::Vec2;
use rand::rngs::StdRng;

use crate::components::{AiState, EntityKind, SpawnRequest, Spell};

/// Everything a behavior may read or change for one entity on one tick.
pub struct BehaviorContext<'a> {
    pub tick: u32,
    pub dt: f32,
    pub position: Vec2,
    pub size: Vec2,
    pub velocity: &'a mut Vec2,
    pub state: &'a mut AiState,
    pub spells: &'a mut [Spell],
    pub targets: &'a [Vec2],
    pub rng: &'a mut StdRng,
    pub spawns: &'a mut Vec<SpawnRequest>,
}

impl BehaviorContext<'_> {
    pub fn center(&self) -> Vec2 {
        self.position + self.size * 0.5
    }

    pub fn nearest_target(&self) -> Option<Vec2> {
        let center = self.center();
        self.targets
            .iter()
            .copied()
            .min_by(|a, b| a.distance_squared(center).total_cmp(&b.distance_squared(center)))
    }

    /// Ticks since this entity was spawned.
    pub fn age(&self) -> u32 {
        self.tick.wrapping_sub(self.state.spawn_tick)
    }
}

pub type Behavior = fn(&mut BehaviorContext);

/// Behavior names mapped to their tick function.
#[derive(Clone, Default)]
pub struct BehaviorTable {
    behaviors: HashMap<String, Behavior>,
}

impl BehaviorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut table = Self::new();
        table
            .insert("straight", straight)
            .insert("sine", sine)
            .insert("shooter", shooter)
            .insert("idle", idle);
        table
    }

    pub fn insert(&mut self, name: impl Into<String>, behavior: Behavior) -> &mut Self {
        self.behaviors.insert(name.into(), behavior);
        self
    }

    pub fn get(&self, name: &str) -> Option<Behavior> {
        self.behaviors.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.behaviors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

impl std::fmt::Debug for BehaviorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.behaviors.keys().collect();
        names.sort();
        f.debug_struct("BehaviorTable").field("behaviors", &names).finish()
    }
}

pub fn idle(ctx: &mut BehaviorContext) {
    *ctx.velocity = Vec2::ZERO;
}

pub fn straight(ctx: &mut BehaviorContext) {
    *ctx.velocity = Vec2::new(-ctx.state.speed, 0.0);
}

const SINE_AMPLITUDE: f32 = 80.0;
const SINE_FREQUENCY: f32 = 2.5;

/// Drifts left while oscillating around the spawn height.
pub fn sine(ctx: &mut BehaviorContext) {
    // derivative of amplitude * sin(phase + t * freq)
    let t = ctx.age() as f32 * ctx.dt;
    let vy = SINE_AMPLITUDE * SINE_FREQUENCY * (ctx.state.phase + t * SINE_FREQUENCY).cos();
    *ctx.velocity = Vec2::new(-ctx.state.speed, vy);
}

/// Slow drift plus every ready spell cast at the nearest player.
pub fn shooter(ctx: &mut BehaviorContext) {
    *ctx.velocity = Vec2::new(-ctx.state.speed, 0.0);

    let origin = ctx.center();
    let aim = ctx
        .nearest_target()
        .map(|target| (target - origin).normalize_or(Vec2::NEG_X))
        .unwrap_or(Vec2::NEG_X);

    for spell in ctx.spells.iter_mut() {
        if !spell.ready(ctx.tick) {
            continue;
        }
        spell.last_cast = Some(ctx.tick);
        ctx.state.counter = ctx.state.counter.wrapping_add(1);

        let velocity = if spell.gravity > 0.0 {
            // arc upward toward the target side
            Vec2::new(aim.x.signum(), -1.0).normalize() * spell.projectile_speed
        } else {
            aim * spell.projectile_speed
        };

        ctx.spawns.push(SpawnRequest {
            kind: EntityKind::EnemyProjectile,
            position: origin,
            velocity,
            size: Vec2::splat(16.0),
            damage: spell.damage,
            gravity: spell.gravity,
            ttl: spell.lifetime_ticks,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    struct Fixture {
        velocity: Vec2,
        state: AiState,
        spells: Vec<Spell>,
        targets: Vec<Vec2>,
        rng: StdRng,
        spawns: Vec<SpawnRequest>,
    }

    impl Fixture {
        fn new(spells: Vec<Spell>, targets: Vec<Vec2>) -> Self {
            Self {
                velocity: Vec2::ZERO,
                state: AiState {
                    speed: 100.0,
                    ..Default::default()
                },
                spells,
                targets,
                rng: StdRng::seed_from_u64(1),
                spawns: Vec::new(),
            }
        }

        fn run(&mut self, behavior: Behavior, tick: u32) {
            let mut ctx = BehaviorContext {
                tick,
                dt: 1.0 / 60.0,
                position: Vec2::new(500.0, 300.0),
                size: Vec2::splat(20.0),
                velocity: &mut self.velocity,
                state: &mut self.state,
                spells: &mut self.spells,
                targets: &self.targets,
                rng: &mut self.rng,
                spawns: &mut self.spawns,
            };
            behavior(&mut ctx);
        }
    }

    fn spell(gravity: f32) -> Spell {
        Spell {
            name: "test".into(),
            cooldown_ticks: 30,
            projectile_speed: 200.0,
            damage: 1,
            gravity,
            lifetime_ticks: 60,
            last_cast: None,
        }
    }

    #[test]
    fn straight_moves_left() {
        let mut fx = Fixture::new(Vec::new(), Vec::new());
        fx.run(straight, 0);
        assert_eq!(fx.velocity, Vec2::new(-100.0, 0.0));
    }

    #[test]
    fn shooter_respects_spell_cooldown() {
        let mut fx = Fixture::new(vec![spell(0.0)], vec![Vec2::new(0.0, 310.0)]);

        fx.run(shooter, 10);
        fx.run(shooter, 20);
        fx.run(shooter, 40);

        assert_eq!(fx.spawns.len(), 2);
        assert!(fx.spawns[0].velocity.x < 0.0);
        assert_eq!(fx.spawns[0].kind, EntityKind::EnemyProjectile);
    }

    #[test]
    fn lobbed_shot_goes_up_and_carries_gravity() {
        let mut fx = Fixture::new(vec![spell(300.0)], Vec::new());
        fx.run(shooter, 0);

        let shot = fx.spawns[0];
        assert!(shot.velocity.y < 0.0);
        assert_eq!(shot.gravity, 300.0);
    }

    #[test]
    fn builtin_table_knows_builtin_behaviors() {
        let table = BehaviorTable::builtin();
        for name in ["straight", "sine", "shooter", "idle"] {
            assert!(table.contains(name), "{name}");
        }
        assert!(table.get("teleport").is_none());
    }
}
