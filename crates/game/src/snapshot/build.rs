use crate::components::{Collision, Drawable, EntityKind, Health, Hitbox, Position, Velocity};
use crate::ecs::Registry;
use crate::net::{EntityState, Snapshot};

pub const DEFAULT_SNAPSHOT_CAP: usize = 10_000;

/// Flattens up to `cap` live, positioned entities into a snapshot.
///
/// Entities are taken in ascending id order, so when the cap truncates the
/// list the oldest entities are the ones kept. Optional components fall back
/// to defaults: zero velocity, `Unknown` kind, `HP_UNKNOWN` health.
pub fn build_snapshot(registry: &Registry, tick: u32, cap: usize) -> Snapshot {
    let positions = registry.get::<Position>();
    // only positions are required, everything else may be unregistered
    let velocities = registry.try_get::<Velocity>().ok();
    let kinds = registry.try_get::<EntityKind>().ok();
    let healths = registry.try_get::<Health>().ok();
    let hitboxes = registry.try_get::<Hitbox>().ok();
    let collisions = registry.try_get::<Collision>().ok();
    let drawables = registry.try_get::<Drawable>().ok();

    let mut snapshot = Snapshot::new(tick);
    let live = registry
        .entities()
        .filter_map(|entity| positions.get(entity.index()).map(|pos| (entity, pos.0)));

    for (entity, pos) in live.take(cap) {
        let index = entity.index();
        let velocity = velocities
            .as_ref()
            .and_then(|store| store.get(index))
            .map(|v| v.0)
            .unwrap_or_default();
        let kind = kinds
            .as_ref()
            .and_then(|store| store.get(index))
            .copied()
            .unwrap_or_default();
        let hp = healths
            .as_ref()
            .and_then(|store| store.get(index))
            // 255 is reserved for "no health"
            .map_or(EntityState::HP_UNKNOWN, |health| {
                health.hp.clamp(0, EntityState::HP_UNKNOWN as i32 - 1) as u8
            });
        let hitbox = hitboxes
            .as_ref()
            .and_then(|store| store.get(index))
            .map(|hitbox| hitbox.size)
            .unwrap_or_default();
        let collided = collisions
            .as_ref()
            .and_then(|store| store.get(index))
            .is_some_and(|collision| collision.collided);
        let variant = drawables
            .as_ref()
            .and_then(|store| store.get(index))
            .map_or(0, |drawable| drawable.variant);

        snapshot.entities.push(EntityState {
            entity_id: entity.id(),
            x: pos.x,
            y: pos.y,
            vx: velocity.x,
            vy: velocity.y,
            kind: kind as u8,
            hp,
            collided,
            variant,
            hitbox_w: hitbox.x,
            hitbox_h: hitbox.y,
        });
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register::<Position>()
            .register::<Velocity>()
            .register::<EntityKind>()
            .register::<Health>();
        registry
    }

    #[test]
    fn missing_components_use_defaults() {
        let mut registry = registry();
        let entity = registry.spawn();
        registry.add(entity, Position(Vec2::new(4.0, 5.0)));

        let snapshot = build_snapshot(&registry, 3, DEFAULT_SNAPSHOT_CAP);
        let state = snapshot.entities[0];

        assert_eq!(snapshot.tick, 3);
        assert_eq!(state.entity_id, entity.id());
        assert_eq!((state.x, state.y), (4.0, 5.0));
        assert_eq!((state.vx, state.vy), (0.0, 0.0));
        assert_eq!(state.kind, EntityKind::Unknown as u8);
        assert_eq!(state.hp, EntityState::HP_UNKNOWN);
        assert!(!state.collided);
    }

    #[test]
    fn unpositioned_and_dead_entities_are_skipped() {
        let mut registry = registry();
        let floating = registry.spawn();
        registry.add(floating, EntityKind::Enemy);
        let dead = registry.spawn();
        registry.add(dead, Position(Vec2::ZERO));
        registry.kill(dead);
        let kept = registry.spawn();
        registry.add(kept, Position(Vec2::ONE));
        registry.add(kept, Health::new(3));

        let snapshot = build_snapshot(&registry, 0, DEFAULT_SNAPSHOT_CAP);

        assert_eq!(snapshot.entities.len(), 1);
        assert_eq!(snapshot.entities[0].entity_id, kept.id());
        assert_eq!(snapshot.entities[0].hp, 3);
    }

    #[test]
    fn cap_keeps_oldest_entities() {
        let mut registry = registry();
        for i in 0..10_050 {
            let entity = registry.spawn();
            registry.add(entity, Position(Vec2::new(i as f32, 0.0)));
        }

        let snapshot = build_snapshot(&registry, 1, DEFAULT_SNAPSHOT_CAP);

        assert_eq!(snapshot.entities.len(), 10_000);
        assert_eq!(snapshot.entities.last().map(|s| s.entity_id), Some(9_999));
        assert_eq!(
            snapshot.encoded_len(),
            Snapshot::HEADER_SIZE + 10_000 * EntityState::WIRE_SIZE
        );
        let body = crate::net::Payload::Snapshot(snapshot).encode().unwrap();
        assert_eq!(body.len(), 6 + 10_000 * 32);
    }
}
