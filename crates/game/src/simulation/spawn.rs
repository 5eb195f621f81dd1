use glam::Vec2;

use super::config::{EnemyDefinition, SimulationConfig};
use crate::components::{
    AiController, AiState, Ballistic, Bounty, Collision, ContactDamage, Controllable,
    DamageCooldown, Drawable, EntityKind, Health, Hitbox, Position, Projectile, SpawnRequest,
    Velocity,
};
use crate::ecs::{Entity, Registry};

/// Vertical lanes handed out to players by join order.
const PLAYER_LANES: u32 = 4;

pub fn player_start(config: &SimulationConfig, slot: u32) -> Vec2 {
    let lane = slot % PLAYER_LANES;
    let spacing = config.world_height / (PLAYER_LANES + 1) as f32;
    Vec2::new(
        config.world_width * 0.1,
        spacing * (lane + 1) as f32 - config.player_size.y * 0.5,
    )
}

pub fn spawn_player(
    registry: &mut Registry,
    config: &SimulationConfig,
    player_id: u32,
    slot: u32,
) -> Entity {
    let entity = registry.spawn();
    registry.add(entity, Position(player_start(config, slot)));
    registry.add(entity, Velocity::default());
    registry.add(entity, EntityKind::Player);
    registry.add(entity, Hitbox::new(config.player_size.x, config.player_size.y));
    registry.add(entity, Health::new(config.player_hp));
    registry.add(entity, DamageCooldown::new(config.damage_cooldown_ticks));
    registry.add(entity, Collision::default());
    registry.add(
        entity,
        Drawable {
            variant: (slot % PLAYER_LANES) as u8,
        },
    );
    registry.add(
        entity,
        Controllable::new(player_id, config.player_speed, config.shot_cooldown_ticks),
    );
    entity
}

pub fn spawn_enemy(
    registry: &mut Registry,
    definition: &EnemyDefinition,
    position: Vec2,
    tick: u32,
    phase: f32,
) -> Entity {
    let entity = registry.spawn();
    registry.add(entity, Position(position));
    registry.add(entity, Velocity::default());
    registry.add(entity, EntityKind::Enemy);
    registry.add(entity, Hitbox::new(definition.hitbox.x, definition.hitbox.y));
    registry.add(entity, Health::new(definition.hp));
    registry.add(entity, Collision::default());
    registry.add(entity, ContactDamage(definition.contact_damage));
    registry.add(entity, Bounty(definition.bounty));
    registry.add(
        entity,
        Drawable {
            variant: definition.variant,
        },
    );
    registry.add(
        entity,
        AiController {
            behavior: definition.behavior.clone(),
            state: AiState {
                spawn_tick: tick,
                origin: position,
                speed: definition.speed,
                phase,
                counter: 0,
            },
            spells: definition.spells.clone(),
        },
    );
    entity
}

/// Materialises a queued request. The request position is the projectile's
/// center.
pub fn spawn_requested(registry: &mut Registry, request: &SpawnRequest) -> Entity {
    let entity = registry.spawn();
    registry.add(entity, Position(request.position - request.size * 0.5));
    registry.add(entity, Velocity(request.velocity));
    registry.add(entity, request.kind);
    registry.add(entity, Hitbox::new(request.size.x, request.size.y));
    registry.add(entity, Collision::default());
    if request.kind.is_projectile() {
        registry.add(
            entity,
            Projectile {
                damage: request.damage,
                ttl: request.ttl,
            },
        );
    } else {
        registry.add(entity, ContactDamage(request.damage));
    }
    if request.gravity != 0.0 {
        registry.add(
            entity,
            Ballistic {
                gravity: request.gravity,
            },
        );
    }
    entity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::register_components;

    #[test]
    fn player_lanes_stay_inside_world() {
        let config = SimulationConfig::default();
        for slot in 0..8 {
            let start = player_start(&config, slot);
            assert!(start.y >= 0.0);
            assert!(start.y + config.player_size.y <= config.world_height);
        }
        assert_eq!(player_start(&config, 0), player_start(&config, PLAYER_LANES));
    }

    #[test]
    fn requested_projectile_is_centered() {
        let mut registry = Registry::new();
        register_components(&mut registry);

        let entity = spawn_requested(
            &mut registry,
            &SpawnRequest {
                kind: EntityKind::PlayerProjectile,
                position: Vec2::new(100.0, 100.0),
                velocity: Vec2::X,
                size: Vec2::new(20.0, 10.0),
                damage: 2,
                gravity: 0.0,
                ttl: 5,
            },
        );

        assert_eq!(
            registry.component::<Position>(entity),
            Some(Position(Vec2::new(90.0, 95.0)))
        );
        assert_eq!(
            registry.component::<Projectile>(entity),
            Some(Projectile { damage: 2, ttl: 5 })
        );
        assert!(!registry.has::<Ballistic>(entity));
    }
}
