mod behaviors;
mod config;
mod spawn;
pub mod systems;
mod tick;

use std::collections::HashSet;

pub use behaviors::{Behavior, BehaviorContext, BehaviorTable};
pub use config::{EnemyDefinition, SimulationConfig};
pub use spawn::{player_start, spawn_enemy, spawn_player, spawn_requested};
pub use tick::{FixedTimestep, MAX_FRAME_DELTA};

use crate::components::{
    AiController, Ballistic, Bounty, Collision, ContactDamage, Controllable, DamageCooldown,
    Despawn, Drawable, EntityKind, Health, Hitbox, Position, Projectile, SpawnQueue, Velocity,
};
use crate::ecs::{Entity, Registry, SystemContext};
use crate::net::{EventKind, GameEvent, InputFlags, Snapshot};
use crate::snapshot::build_snapshot;

pub fn register_components(registry: &mut Registry) {
    registry
        .register::<Position>()
        .register::<Velocity>()
        .register::<Hitbox>()
        .register::<Health>()
        .register::<EntityKind>()
        .register::<Drawable>()
        .register::<Controllable>()
        .register::<AiController>()
        .register::<Projectile>()
        .register::<Ballistic>()
        .register::<ContactDamage>()
        .register::<DamageCooldown>()
        .register::<Collision>()
        .register::<Bounty>()
        .register::<SpawnQueue>()
        .register::<Despawn>();
}

/// One authoritative game world: a registry with the step pipeline
/// installed, driven by a fixed timestep.
pub struct Simulation {
    registry: Registry,
    context: SystemContext,
    timestep: FixedTimestep,
    config: SimulationConfig,
    behaviors: BehaviorTable,
    enemies: Vec<EnemyDefinition>,
    generation: u64,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_parts(config, BehaviorTable::builtin(), EnemyDefinition::builtin())
    }

    pub fn with_parts(
        config: SimulationConfig,
        behaviors: BehaviorTable,
        enemies: Vec<EnemyDefinition>,
    ) -> Self {
        let registry = build_registry(&config, &behaviors, &enemies);
        let timestep = FixedTimestep::new(config.tick_rate);
        let context = SystemContext::new(timestep.dt(), config.seed);

        Self {
            registry,
            context,
            timestep,
            config,
            behaviors,
            enemies,
            generation: 0,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn tick(&self) -> u32 {
        self.context.tick
    }

    pub fn dt(&self) -> f32 {
        self.timestep.dt()
    }

    pub fn score(&self) -> u32 {
        self.context.score
    }

    pub fn update(&mut self, delta: f32) -> u32 {
        self.update_with(delta, |_| {})
    }

    /// Feeds a real frame delta and runs as many fixed steps as it covers,
    /// calling `after_step` after each one.
    pub fn update_with<F>(&mut self, delta: f32, mut after_step: F) -> u32
    where
        F: FnMut(&mut Self),
    {
        self.timestep.accumulate(delta);

        let mut ticks_run = 0;
        while self.timestep.consume_tick() {
            self.step();
            after_step(self);
            ticks_run += 1;
        }
        ticks_run
    }

    pub fn step(&mut self) {
        self.registry.run_systems(&mut self.context);
        self.context.tick = self.context.tick.wrapping_add(1);
    }

    /// Throws the world away and starts over with a fresh seed. Score and
    /// tick restart at zero.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.registry = build_registry(&self.config, &self.behaviors, &self.enemies);
        self.context = SystemContext::new(
            self.timestep.dt(),
            self.config.seed.wrapping_add(self.generation),
        );
        self.timestep.reset();
    }

    pub fn spawn_player(&mut self, player_id: u32, slot: u32) -> Entity {
        let entity = spawn_player(&mut self.registry, &self.config, player_id, slot);
        let at = self
            .registry
            .component::<Position>(entity)
            .map_or(glam::Vec2::ZERO, |pos| pos.0);
        self.context
            .events
            .push(GameEvent::new(EventKind::PlayerJoined, entity.id(), at));
        entity
    }

    pub fn remove_player(&mut self, entity: Entity) -> bool {
        let at = self
            .registry
            .component::<Position>(entity)
            .map_or(glam::Vec2::ZERO, |pos| pos.0);
        let removed = self.registry.kill(entity);
        if removed {
            self.context
                .events
                .push(GameEvent::new(EventKind::PlayerLeft, entity.id(), at));
        }
        removed
    }

    pub fn set_input(&mut self, entity: Entity, flags: InputFlags) -> bool {
        if !self.registry.is_alive(entity) {
            return false;
        }
        let mut controls = self.registry.get_mut::<Controllable>();
        match controls.get_mut(entity.index()) {
            Some(control) => {
                control.input = flags;
                true
            }
            None => false,
        }
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.registry.is_alive(entity)
    }

    pub fn count_kind(&self, kind: EntityKind) -> usize {
        self.registry
            .get::<EntityKind>()
            .iter()
            .filter(|(_, k)| **k == kind)
            .count()
    }

    pub fn snapshot(&self, cap: usize) -> Snapshot {
        build_snapshot(&self.registry, self.context.tick, cap)
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.context.events)
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.context.tick)
            .field("score", &self.context.score)
            .field("entities", &self.registry.alive_count())
            .field("generation", &self.generation)
            .finish()
    }
}

fn build_registry(
    config: &SimulationConfig,
    behaviors: &BehaviorTable,
    enemies: &[EnemyDefinition],
) -> Registry {
    let mut registry = Registry::new();
    register_components(&mut registry);

    let input_config = config.clone();
    let table = behaviors.clone();
    let mut warned = HashSet::new();
    let bounds_config = config.clone();
    let spawn_config = config.clone();
    let definitions = enemies.to_vec();

    registry
        .add_system(move |registry, ctx| systems::apply_input(registry, ctx, &input_config))
        .add_system(move |registry, ctx| systems::run_ai(registry, ctx, &table, &mut warned))
        .add_system(systems::update_projectiles)
        .add_system(systems::integrate_motion)
        .add_system(systems::detect_collisions)
        .add_system(systems::apply_damage)
        .add_system(move |registry, _| systems::enforce_bounds(registry, &bounds_config))
        .add_system(systems::despawn_marked)
        .add_system(move |registry, ctx| {
            systems::spawn_pending(registry, ctx, &spawn_config, &definitions)
        });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use glam::Vec2;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            spawn_interval_ticks: 0,
            ..Default::default()
        }
    }

    fn spawn_at(sim: &mut Simulation, kind: EntityKind, pos: Vec2, size: f32) -> Entity {
        let registry = sim.registry_mut();
        let entity = registry.spawn();
        registry.add(entity, kind);
        registry.add(entity, Position(pos));
        registry.add(entity, Hitbox::new(size, size));
        registry.add(entity, Collision::default());
        entity
    }

    #[test]
    fn one_step_integrates_velocity() {
        let mut sim = Simulation::new(quiet_config());
        let entity = sim.registry_mut().spawn();
        sim.registry_mut().add(entity, Position(Vec2::ZERO));
        sim.registry_mut().add(entity, Velocity(Vec2::new(10.0, 0.0)));

        sim.step();

        let pos = sim.registry().component::<Position>(entity).unwrap().0;
        assert_approx_eq!(pos.x, 10.0 / 60.0, 1e-6);
        assert_approx_eq!(pos.y, 0.0, 1e-6);
        assert_eq!(sim.tick(), 1);
    }

    #[test]
    fn update_runs_whole_steps() {
        let mut sim = Simulation::new(quiet_config());
        let mut seen = Vec::new();

        let ticks = sim.update_with(1.0 / 30.0, |sim| seen.push(sim.tick()));

        assert_eq!(ticks, 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn damage_respects_cooldown() {
        let mut sim = Simulation::new(quiet_config());
        let player = spawn_at(&mut sim, EntityKind::Player, Vec2::new(100.0, 100.0), 40.0);
        sim.registry_mut().add(player, Health::new(10));
        sim.registry_mut().add(player, DamageCooldown::new(60));
        let enemy = spawn_at(&mut sim, EntityKind::Enemy, Vec2::new(110.0, 110.0), 40.0);
        sim.registry_mut().add(enemy, ContactDamage(1));

        let hp = |sim: &Simulation| sim.registry().component::<Health>(player).unwrap().hp;

        sim.step();
        assert_eq!(hp(&sim), 9);

        for _ in 0..59 {
            sim.step();
        }
        assert_eq!(hp(&sim), 9);

        sim.step();
        assert_eq!(hp(&sim), 8);
    }

    #[test]
    fn enemy_wraps_and_player_clamps() {
        let config = quiet_config();
        let width = config.world_width;
        let mut sim = Simulation::new(config);
        let enemy = spawn_at(&mut sim, EntityKind::Enemy, Vec2::new(-200.0, 100.0), 32.0);
        let player = spawn_at(&mut sim, EntityKind::Player, Vec2::new(-5.0, 100.0), 32.0);

        sim.step();

        let enemy_pos = sim.registry().component::<Position>(enemy).unwrap().0;
        let player_pos = sim.registry().component::<Position>(player).unwrap().0;
        assert_approx_eq!(enemy_pos.x, width + 100.0);
        assert_approx_eq!(player_pos.x, 0.0);
        assert_approx_eq!(player_pos.y, 100.0);
    }

    #[test]
    fn projectile_kills_enemy_and_scores() {
        let mut sim = Simulation::new(quiet_config());
        let enemy = spawn_at(&mut sim, EntityKind::Enemy, Vec2::new(500.0, 500.0), 40.0);
        sim.registry_mut().add(enemy, Health::new(1));
        sim.registry_mut().add(enemy, Bounty(100));
        let shot = spawn_at(
            &mut sim,
            EntityKind::PlayerProjectile,
            Vec2::new(510.0, 510.0),
            8.0,
        );
        sim.registry_mut().add(shot, Projectile { damage: 1, ttl: 60 });

        sim.step();

        assert!(!sim.is_alive(enemy));
        assert!(!sim.is_alive(shot));
        assert_eq!(sim.score(), 100);

        let events = sim.drain_events();
        assert!(
            events
                .iter()
                .any(|e| e.kind == EventKind::Destroyed && e.entity_id == enemy.id())
        );
        assert!(
            !events
                .iter()
                .any(|e| e.kind == EventKind::Destroyed && e.entity_id == shot.id())
        );
    }

    #[test]
    fn shot_survives_shooter_dying_same_tick() {
        let mut sim = Simulation::new(quiet_config());
        let player = sim.spawn_player(1, 0);
        sim.registry_mut().add(player, Health::new(1));
        let at = sim.registry().component::<Position>(player).unwrap().0;
        let bullet = spawn_at(&mut sim, EntityKind::EnemyProjectile, at + Vec2::splat(4.0), 8.0);
        sim.registry_mut().add(bullet, Projectile { damage: 1, ttl: 60 });
        assert!(sim.set_input(player, InputFlags::SHOOT));

        sim.step();

        assert!(!sim.is_alive(player));
        assert_eq!(sim.count_kind(EntityKind::PlayerProjectile), 1);
    }

    #[test]
    fn friendly_contact_does_no_damage() {
        let mut sim = Simulation::new(quiet_config());
        let a = spawn_at(&mut sim, EntityKind::Player, Vec2::new(100.0, 100.0), 40.0);
        sim.registry_mut().add(a, Health::new(3));
        let b = spawn_at(&mut sim, EntityKind::PlayerProjectile, Vec2::new(105.0, 105.0), 8.0);
        sim.registry_mut().add(b, Projectile { damage: 1, ttl: 60 });

        sim.step();

        assert_eq!(sim.registry().component::<Health>(a).unwrap().hp, 3);
        assert!(sim.is_alive(b));
        assert!(sim.registry().component::<Collision>(a).unwrap().collided);
    }

    #[test]
    fn projectile_expires_after_ttl() {
        let mut sim = Simulation::new(quiet_config());
        let shot = spawn_at(&mut sim, EntityKind::EnemyProjectile, Vec2::new(300.0, 300.0), 8.0);
        sim.registry_mut().add(shot, Projectile { damage: 1, ttl: 2 });

        sim.step();
        sim.step();
        assert!(sim.is_alive(shot));
        sim.step();
        assert!(!sim.is_alive(shot));
    }

    #[test]
    fn projectile_leaving_world_is_despawned() {
        let mut sim = Simulation::new(quiet_config());
        let shot = spawn_at(&mut sim, EntityKind::PlayerProjectile, Vec2::new(-50.0, 300.0), 8.0);
        sim.registry_mut().add(shot, Projectile { damage: 1, ttl: 600 });

        sim.step();

        assert!(!sim.is_alive(shot));
    }

    #[test]
    fn ballistic_projectile_falls() {
        let mut sim = Simulation::new(quiet_config());
        let shot = spawn_at(&mut sim, EntityKind::EnemyProjectile, Vec2::new(300.0, 300.0), 8.0);
        sim.registry_mut().add(shot, Projectile { damage: 1, ttl: 600 });
        sim.registry_mut().add(shot, Velocity(Vec2::ZERO));
        sim.registry_mut().add(shot, Ballistic { gravity: 600.0 });

        sim.step();

        let vel = sim.registry().component::<Velocity>(shot).unwrap().0;
        assert_approx_eq!(vel.y, 10.0, 1e-4);
    }

    #[test]
    fn player_input_moves_and_shoots() {
        let mut sim = Simulation::new(quiet_config());
        let player = sim.spawn_player(7, 0);
        let start = sim.registry().component::<Position>(player).unwrap().0;

        assert!(sim.set_input(player, InputFlags::RIGHT | InputFlags::SHOOT));
        sim.step();

        let pos = sim.registry().component::<Position>(player).unwrap().0;
        assert!(pos.x > start.x);
        assert_eq!(sim.count_kind(EntityKind::PlayerProjectile), 1);

        sim.step();
        // still cooling down
        assert_eq!(sim.count_kind(EntityKind::PlayerProjectile), 1);
    }

    #[test]
    fn set_input_rejects_uncontrollable_entities() {
        let mut sim = Simulation::new(quiet_config());
        let rock = spawn_at(&mut sim, EntityKind::Obstacle, Vec2::ZERO, 10.0);
        assert!(!sim.set_input(rock, InputFlags::UP));
        assert!(!sim.set_input(Entity::from_id(999), InputFlags::UP));
    }

    #[test]
    fn waves_spawn_on_interval_up_to_cap() {
        let config = SimulationConfig {
            spawn_interval_ticks: 2,
            max_enemies: 3,
            ..Default::default()
        };
        let mut sim = Simulation::new(config);

        sim.step();
        assert_eq!(sim.count_kind(EntityKind::Enemy), 0);

        for _ in 0..20 {
            sim.step();
        }
        assert_eq!(sim.count_kind(EntityKind::Enemy), 3);
        assert!(
            sim.drain_events()
                .iter()
                .any(|e| e.kind == EventKind::Spawned)
        );
    }

    #[test]
    fn unknown_behavior_leaves_entity_alone() {
        let mut sim = Simulation::with_parts(quiet_config(), BehaviorTable::new(), Vec::new());
        let grunt = &EnemyDefinition::builtin()[0];
        let enemy = spawn_enemy(sim.registry_mut(), grunt, Vec2::new(800.0, 400.0), 0, 0.0);

        sim.step();
        sim.step();

        let vel = sim.registry().component::<Velocity>(enemy).unwrap().0;
        assert_eq!(vel, Vec2::ZERO);
        assert!(sim.is_alive(enemy));
    }

    #[test]
    fn reset_clears_world() {
        let mut sim = Simulation::new(quiet_config());
        sim.spawn_player(1, 0);
        sim.step();

        sim.reset();

        assert_eq!(sim.registry().alive_count(), 0);
        assert_eq!(sim.tick(), 0);
        assert_eq!(sim.score(), 0);
        assert_eq!(sim.registry().system_count(), 9);
    }
}
