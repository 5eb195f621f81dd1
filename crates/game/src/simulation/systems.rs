//! The per-step pipeline. Each function is one system; [`super::Simulation`]
//! installs them in the order they appear here.

use std::collections::{BTreeSet, HashSet};

use glam::Vec2;
use rand::Rng;

use super::behaviors::{BehaviorContext, BehaviorTable};
use super::config::{EnemyDefinition, SimulationConfig};
use super::spawn::{spawn_enemy, spawn_requested};
use crate::components::{
    AiController, Ballistic, Bounty, Collision, ContactDamage, Controllable, DamageCooldown,
    Despawn, EntityKind, Health, Hitbox, Position, Projectile, SpawnQueue, SpawnRequest, Velocity,
};
use crate::ecs::{Entity, Registry, SparseArray, SystemContext, indexed_zip, zip};
use crate::net::{EventKind, GameEvent, InputFlags};

fn queue_spawn(queues: &mut SparseArray<SpawnQueue>, index: usize, request: SpawnRequest) {
    match queues.get_mut(index) {
        Some(queue) => queue.0.push(request),
        None => {
            queues.set(index, SpawnQueue(vec![request]));
        }
    }
}

pub fn apply_input(registry: &mut Registry, ctx: &mut SystemContext, config: &SimulationConfig) {
    let mut controls = registry.get_mut::<Controllable>();
    let mut velocities = registry.get_mut::<Velocity>();
    let positions = registry.get::<Position>();
    let hitboxes = registry.get::<Hitbox>();
    let mut queues = registry.get_mut::<SpawnQueue>();

    for (index, (control, velocity, position, hitbox)) in
        indexed_zip((&mut *controls, &mut *velocities, &*positions, &*hitboxes))
    {
        // diagonals are no faster than straight lines
        velocity.0 = control.input.direction().normalize_or_zero() * control.speed;

        if control.input.contains(InputFlags::SHOOT) && control.can_fire(ctx.tick) {
            control.last_shot = Some(ctx.tick);
            let muzzle = position.0 + Vec2::new(hitbox.size.x, hitbox.size.y * 0.5);
            queue_spawn(
                &mut queues,
                index,
                SpawnRequest {
                    kind: EntityKind::PlayerProjectile,
                    position: muzzle,
                    velocity: Vec2::new(config.projectile_speed, 0.0),
                    size: config.projectile_size,
                    damage: config.projectile_damage,
                    gravity: 0.0,
                    ttl: config.projectile_ttl,
                },
            );
        }
    }
}

pub fn run_ai(
    registry: &mut Registry,
    ctx: &mut SystemContext,
    table: &BehaviorTable,
    warned: &mut HashSet<String>,
) {
    let targets: Vec<Vec2> = {
        let kinds = registry.get::<EntityKind>();
        let positions = registry.get::<Position>();
        let hitboxes = registry.get::<Hitbox>();
        zip((&*kinds, &*positions, &*hitboxes))
            .filter(|(kind, _, _)| **kind == EntityKind::Player)
            .map(|(_, position, hitbox)| position.0 + hitbox.size * 0.5)
            .collect()
    };

    // behaviors cannot spawn directly while the stores are borrowed
    let mut controllers = registry.get_mut::<AiController>();
    let positions = registry.get::<Position>();
    let mut velocities = registry.get_mut::<Velocity>();
    let hitboxes = registry.get::<Hitbox>();
    let mut queues = registry.get_mut::<SpawnQueue>();
    let mut spawns = Vec::new();

    for (index, (ai, position, velocity, hitbox)) in indexed_zip((
        &mut *controllers,
        &*positions,
        &mut *velocities,
        &*hitboxes,
    )) {
        let Some(behavior) = table.get(&ai.behavior) else {
            if warned.insert(ai.behavior.clone()) {
                log::warn!("no behavior named `{}`, entity #{index} idles", ai.behavior);
            }
            continue;
        };

        let mut behavior_ctx = BehaviorContext {
            tick: ctx.tick,
            dt: ctx.dt,
            position: position.0,
            size: hitbox.size,
            velocity: &mut velocity.0,
            state: &mut ai.state,
            spells: &mut ai.spells,
            targets: &targets,
            rng: &mut ctx.rng,
            spawns: &mut spawns,
        };
        behavior(&mut behavior_ctx);

        for request in spawns.drain(..) {
            queue_spawn(&mut queues, index, request);
        }
    }
}

pub fn update_projectiles(registry: &mut Registry, ctx: &mut SystemContext) {
    {
        let ballistics = registry.get::<Ballistic>();
        let mut velocities = registry.get_mut::<Velocity>();
        for (ballistic, velocity) in zip((&*ballistics, &mut *velocities)) {
            velocity.0.y += ballistic.gravity * ctx.dt;
        }
    }

    let expired: Vec<Entity> = {
        let mut projectiles = registry.get_mut::<Projectile>();
        projectiles
            .iter_mut()
            .filter_map(|(index, projectile)| {
                // ttl counts remaining steps, zero expires this one
                if projectile.ttl == 0 {
                    Some(Entity::from_index(index))
                } else {
                    projectile.ttl -= 1;
                    None
                }
            })
            .collect()
    };

    for entity in expired {
        registry.add(entity, Despawn);
    }
}

pub fn integrate_motion(registry: &mut Registry, ctx: &mut SystemContext) {
    let mut positions = registry.get_mut::<Position>();
    let velocities = registry.get::<Velocity>();
    for (position, velocity) in zip((&mut *positions, &*velocities)) {
        position.0 += velocity.0 * ctx.dt;
    }
}

/// Calls `on_contact` once for every overlapping pair, lower index first.
pub fn sweep<F>(bodies: &[(Entity, Vec2, Hitbox)], mut on_contact: F)
where
    F: FnMut(Entity, Entity),
{
    for (i, (a, a_pos, a_box)) in bodies.iter().enumerate() {
        for (b, b_pos, b_box) in &bodies[i + 1..] {
            if a_box.overlaps(*a_pos, b_box, *b_pos) {
                on_contact(*a, *b);
            }
        }
    }
}

pub fn detect_collisions(registry: &mut Registry, _ctx: &mut SystemContext) {
    let positions = registry.get::<Position>();
    let hitboxes = registry.get::<Hitbox>();
    let kinds = registry.get::<EntityKind>();
    let mut collisions = registry.get_mut::<Collision>();

    for (_, collision) in collisions.iter_mut() {
        collision.collided = false;
        collision.contacts.clear();
    }

    let bodies: Vec<(Entity, Vec2, Hitbox)> = indexed_zip((&*positions, &*hitboxes, &*kinds))
        .filter(|(_, (_, _, kind))| !kind.survives_pruning())
        .map(|(index, (position, hitbox, _))| (Entity::from_index(index), position.0, *hitbox))
        .collect();

    sweep(&bodies, |a, b| {
        for (this, other) in [(a, b), (b, a)] {
            if let Some(collision) = collisions.get_mut(this.index()) {
                collision.collided = true;
                collision.contacts.push(other);
            }
        }
    });
}

/// Applies hostile contacts. A victim with a [`DamageCooldown`] takes at most
/// one hit per cooldown window; projectiles are consumed by the hit they land.
pub fn apply_damage(registry: &mut Registry, ctx: &mut SystemContext) {
    let mut doomed = BTreeSet::new();
    {
        let collisions = registry.get::<Collision>();
        let kinds = registry.get::<EntityKind>();
        let positions = registry.get::<Position>();
        let projectiles = registry.get::<Projectile>();
        let contact_damage = registry.get::<ContactDamage>();
        let bounties = registry.get::<Bounty>();
        let mut healths = registry.get_mut::<Health>();
        let mut cooldowns = registry.get_mut::<DamageCooldown>();
        let mut consumed = BTreeSet::new();

        for (index, (collision, kind, health)) in
            indexed_zip((&*collisions, &*kinds, &mut *healths))
        {
            if health.is_dead() {
                continue;
            }
            let victim = Entity::from_index(index);

            for &attacker in &collision.contacts {
                if consumed.contains(&attacker) {
                    continue;
                }
                let Some(&attacker_kind) = kinds.get(attacker.index()) else {
                    continue;
                };
                if !attacker_kind.damages(*kind) {
                    continue;
                }
                if let Some(cooldown) = cooldowns.get_mut(index) {
                    if !cooldown.is_ready(ctx.tick) {
                        continue;
                    }
                    cooldown.last_hit = Some(ctx.tick);
                }

                let amount = projectiles
                    .get(attacker.index())
                    .map(|projectile| projectile.damage)
                    .or_else(|| contact_damage.get(attacker.index()).map(|damage| damage.0))
                    .unwrap_or(1);
                health.hp -= amount;

                let at = positions.get(index).map_or(Vec2::ZERO, |pos| pos.0);
                ctx.events.push(GameEvent::new(EventKind::Hit, victim.id(), at));

                if attacker_kind.is_projectile() {
                    consumed.insert(attacker);
                }
                if health.is_dead() {
                    if let Some(bounty) = bounties.get(index) {
                        ctx.score = ctx.score.saturating_add(bounty.0);
                    }
                    doomed.insert(victim);
                    break;
                }
            }
        }
        doomed.extend(consumed);
    }

    for entity in doomed {
        registry.add(entity, Despawn);
    }
}

/// Enemies past the left margin wrap to the right, players are clamped to
/// the world, projectiles outside it are marked for despawn.
pub fn enforce_bounds(registry: &mut Registry, config: &SimulationConfig) {
    let mut outside = Vec::new();
    {
        let kinds = registry.get::<EntityKind>();
        let hitboxes = registry.get::<Hitbox>();
        let mut positions = registry.get_mut::<Position>();
        let world = Vec2::new(config.world_width, config.world_height);

        for (index, (kind, position)) in indexed_zip((&*kinds, &mut *positions)) {
            let size = hitboxes.get(index).map_or(Vec2::ZERO, |hitbox| hitbox.size);
            let max = (world - size).max(Vec2::ZERO);

            match kind {
                EntityKind::Enemy => {
                    if position.0.x < -config.wrap_margin {
                        position.0.x = config.world_width + config.wrap_margin;
                    }
                    position.0.y = position.0.y.clamp(0.0, max.y);
                }
                EntityKind::Player => {
                    position.0 = position.0.clamp(Vec2::ZERO, max);
                }
                EntityKind::PlayerProjectile | EntityKind::EnemyProjectile => {
                    let p = position.0;
                    if p.x + size.x < 0.0 || p.y + size.y < 0.0 || p.x > world.x || p.y > world.y {
                        outside.push(Entity::from_index(index));
                    }
                }
                _ => {}
            }
        }
    }

    for entity in outside {
        registry.add(entity, Despawn);
    }
}

pub fn despawn_marked(registry: &mut Registry, ctx: &mut SystemContext) {
    // killing clears the marker, so nothing is removed twice
    let marked: Vec<Entity> = registry
        .get::<Despawn>()
        .iter()
        .map(|(index, _)| Entity::from_index(index))
        .collect();

    for entity in marked {
        // a shot fired on the tick its owner dies still goes out
        if let Some(queue) = registry.remove::<SpawnQueue>(entity) {
            ctx.orphaned_spawns.extend(queue.0);
        }
        let kind = registry.component::<EntityKind>(entity).unwrap_or_default();
        let at = registry
            .component::<Position>(entity)
            .map_or(Vec2::ZERO, |pos| pos.0);
        if registry.kill(entity) && !kind.is_projectile() {
            ctx.events
                .push(GameEvent::new(EventKind::Destroyed, entity.id(), at));
        }
    }
}

/// Materialises queued spawn requests, then runs the wave trigger.
pub fn spawn_pending(
    registry: &mut Registry,
    ctx: &mut SystemContext,
    config: &SimulationConfig,
    definitions: &[EnemyDefinition],
) {
    let mut requests = std::mem::take(&mut ctx.orphaned_spawns);
    {
        let mut queues = registry.get_mut::<SpawnQueue>();
        for (_, queue) in queues.iter_mut() {
            requests.append(&mut queue.0);
        }
    }
    for request in &requests {
        spawn_requested(registry, request);
    }

    if config.spawn_interval_ticks == 0 || definitions.is_empty() {
        return;
    }
    if ctx.tick == 0 || ctx.tick % config.spawn_interval_ticks != 0 {
        return;
    }

    let enemies = registry
        .get::<EntityKind>()
        .iter()
        .filter(|(_, kind)| **kind == EntityKind::Enemy)
        .count();
    if enemies >= config.max_enemies {
        return;
    }

    let definition = &definitions[ctx.rng.gen_range(0..definitions.len())];
    let max_y = (config.world_height - definition.hitbox.y).max(0.0);
    let position = Vec2::new(
        config.world_width - definition.hitbox.x,
        ctx.rng.gen_range(0.0..=max_y),
    );
    let phase = ctx.rng.gen_range(0.0..std::f32::consts::TAU);

    let entity = spawn_enemy(registry, definition, position, ctx.tick, phase);
    log::debug!("tick {}: spawned {} as {}", ctx.tick, definition.name, entity);
    ctx.events
        .push(GameEvent::new(EventKind::Spawned, entity.id(), position));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(id: u32, x: f32, size: f32) -> (Entity, Vec2, Hitbox) {
        (Entity::from_id(id), Vec2::new(x, 0.0), Hitbox::new(size, size))
    }

    #[test]
    fn sweep_reports_each_pair_once() {
        let bodies = [body(0, 0.0, 10.0), body(1, 5.0, 10.0), body(2, 50.0, 10.0)];
        let mut pairs = Vec::new();
        sweep(&bodies, |a, b| pairs.push((a.id(), b.id())));
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        let bodies = [body(0, 0.0, 10.0), body(1, 10.0, 10.0)];
        let mut count = 0;
        sweep(&bodies, |_, _| count += 1);
        assert_eq!(count, 0);
    }
}
