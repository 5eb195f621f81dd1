use std::collections::BTreeSet;

use glam::Vec2;

use crate::components::{Collision, Drawable, EntityKind, Health, Hitbox, Position, Velocity};
use crate::ecs::{Entity, Registry};
use crate::net::{EntityState, Snapshot, sequence_greater_than};

/// Furthest a snapshot id may run ahead of the highest id mirrored so far.
/// Stores are indexed by id, so an absurd id would size every store to it.
const MAX_ID_ADVANCE: u32 = 1 << 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub pruned: usize,
    pub rejected: usize,
}

/// Client-side copy of the server's entities, rebuilt from full snapshots.
///
/// Mirrors use the server's entity ids. Each snapshot creates or updates the
/// entities it lists; ids listed by the previous snapshot but missing from
/// this one are pruned unless their kind survives pruning.
#[derive(Debug)]
pub struct Mirror {
    registry: Registry,
    present: BTreeSet<u32>,
    last_tick: Option<u32>,
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

impl Mirror {
    pub fn new() -> Self {
        let mut registry = Registry::new();
        registry
            .register::<Position>()
            .register::<Velocity>()
            .register::<EntityKind>()
            .register::<Health>()
            .register::<Hitbox>()
            .register::<Collision>()
            .register::<Drawable>();

        Self {
            registry,
            present: BTreeSet::new(),
            last_tick: None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }

    pub fn len(&self) -> usize {
        self.registry.alive_count()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.alive_count() == 0
    }

    pub fn contains(&self, entity_id: u32) -> bool {
        self.registry.is_alive(Entity::from_id(entity_id))
    }

    pub fn kind_of(&self, entity_id: u32) -> Option<EntityKind> {
        self.registry.component::<EntityKind>(Entity::from_id(entity_id))
    }

    pub fn position_of(&self, entity_id: u32) -> Option<Vec2> {
        self.registry
            .component::<Position>(Entity::from_id(entity_id))
            .map(|pos| pos.0)
    }

    pub fn clear(&mut self) {
        for id in std::mem::take(&mut self.present) {
            self.registry.kill(Entity::from_id(id));
        }
        self.last_tick = None;
    }

    /// Applies one snapshot. Returns `None` if the snapshot is older than the
    /// last one applied.
    pub fn apply(&mut self, snapshot: &Snapshot) -> Option<ApplyReport> {
        if let Some(last) = self.last_tick {
            if sequence_greater_than(last, snapshot.tick) {
                log::debug!("ignoring stale snapshot {} (have {})", snapshot.tick, last);
                return None;
            }
        }

        let mut report = ApplyReport::default();
        let mut current = BTreeSet::new();

        let id_limit = self.registry.next_id().saturating_add(MAX_ID_ADVANCE);
        for state in &snapshot.entities {
            if state.entity_id > id_limit {
                log::debug!("rejecting entity id {} (limit {})", state.entity_id, id_limit);
                report.rejected += 1;
                continue;
            }
            current.insert(state.entity_id);
            if self.upsert(state) {
                report.created += 1;
            } else {
                report.updated += 1;
            }
        }

        for &id in self.present.difference(&current) {
            let entity = Entity::from_id(id);
            let exempt = self
                .registry
                .component::<EntityKind>(entity)
                .is_some_and(EntityKind::survives_pruning);
            if exempt {
                continue;
            }
            if self.registry.kill(entity) {
                report.pruned += 1;
            }
        }

        // exempt entities stay tracked so they are checked again next time
        let survivors: Vec<u32> = self
            .present
            .difference(&current)
            .copied()
            .filter(|&id| self.registry.is_alive(Entity::from_id(id)))
            .collect();
        current.extend(survivors);

        self.present = current;
        self.last_tick = Some(snapshot.tick);
        Some(report)
    }

    fn upsert(&mut self, state: &EntityState) -> bool {
        let entity = Entity::from_id(state.entity_id);
        let created = self.registry.adopt(entity);
        let kind = EntityKind::from(state.kind);

        self.registry
            .add(entity, Position(Vec2::new(state.x, state.y)));
        self.registry
            .add(entity, Velocity(Vec2::new(state.vx, state.vy)));
        self.registry.add(entity, kind);
        self.registry.add(
            entity,
            Hitbox::new(state.hitbox_w, state.hitbox_h),
        );
        self.registry.add(
            entity,
            Drawable {
                variant: state.variant,
            },
        );

        {
            let mut collisions = self.registry.get_mut::<Collision>();
            match collisions.get_mut(entity.index()) {
                Some(collision) => collision.collided = state.collided,
                None => {
                    collisions.set(
                        entity.index(),
                        Collision {
                            collided: state.collided,
                            contacts: Vec::new(),
                        },
                    );
                }
            }
        }

        if state.hp == EntityState::HP_UNKNOWN {
            self.registry.remove::<Health>(entity);
        } else {
            let hp = state.hp as i32;
            let mut healths = self.registry.get_mut::<Health>();
            match healths.get_mut(entity.index()) {
                Some(health) => {
                    health.hp = hp;
                    health.max = health.max.max(hp);
                }
                None => {
                    healths.set(entity.index(), Health::new(hp));
                }
            }
        }

        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: u32, kind: EntityKind, x: f32) -> EntityState {
        EntityState {
            entity_id: id,
            x,
            y: 10.0,
            vx: -1.0,
            kind: kind as u8,
            hp: 5,
            hitbox_w: 8.0,
            hitbox_h: 8.0,
            ..Default::default()
        }
    }

    fn snapshot(tick: u32, states: &[EntityState]) -> Snapshot {
        Snapshot {
            tick,
            entities: states.to_vec(),
        }
    }

    #[test]
    fn runaway_entity_id_is_rejected() {
        let mut mirror = Mirror::new();
        let report = mirror
            .apply(&snapshot(
                1,
                &[
                    state(1, EntityKind::Enemy, 0.0),
                    state(u32::MAX, EntityKind::Enemy, 0.0),
                ],
            ))
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.rejected, 1);
        assert!(!mirror.contains(u32::MAX));
        assert_eq!(mirror.registry().next_id(), 2);
    }

    #[test]
    fn long_running_server_ids_are_mirrored() {
        let mut mirror = Mirror::new();
        mirror.apply(&snapshot(1, &[state(50_000, EntityKind::Enemy, 0.0)]));
        assert!(mirror.contains(50_000));
    }

    #[test]
    fn creates_then_updates_in_place() {
        let mut mirror = Mirror::new();
        let first = mirror
            .apply(&snapshot(1, &[state(4, EntityKind::Enemy, 0.0)]))
            .unwrap();
        assert_eq!(first.created, 1);

        let second = mirror
            .apply(&snapshot(2, &[state(4, EntityKind::Enemy, 25.0)]))
            .unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);
        assert_eq!(mirror.position_of(4), Some(Vec2::new(25.0, 10.0)));
        assert_eq!(mirror.kind_of(4), Some(EntityKind::Enemy));
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let snap = snapshot(
            7,
            &[
                state(1, EntityKind::Player, 1.0),
                state(2, EntityKind::Enemy, 2.0),
            ],
        );

        let mut once = Mirror::new();
        once.apply(&snap);

        let mut twice = Mirror::new();
        twice.apply(&snap);
        twice.apply(&snap);

        assert_eq!(once.len(), twice.len());
        for id in [1, 2] {
            assert_eq!(once.position_of(id), twice.position_of(id));
            assert_eq!(once.kind_of(id), twice.kind_of(id));
            assert_eq!(
                once.registry().component::<Health>(Entity::from_id(id)),
                twice.registry().component::<Health>(Entity::from_id(id))
            );
        }
    }

    #[test]
    fn prunes_ids_missing_from_next_snapshot() {
        let mut mirror = Mirror::new();
        mirror.apply(&snapshot(
            1,
            &[
                state(1, EntityKind::Enemy, 0.0),
                state(2, EntityKind::Enemy, 0.0),
                state(3, EntityKind::Enemy, 0.0),
            ],
        ));
        let report = mirror
            .apply(&snapshot(
                2,
                &[
                    state(1, EntityKind::Enemy, 0.0),
                    state(3, EntityKind::Enemy, 0.0),
                ],
            ))
            .unwrap();

        assert_eq!(report.pruned, 1);
        assert!(mirror.contains(1));
        assert!(!mirror.contains(2));
        assert!(mirror.contains(3));
        assert!(mirror.position_of(2).is_none());
        assert!(mirror.kind_of(2).is_none());
    }

    #[test]
    fn background_survives_missing_snapshot() {
        let mut mirror = Mirror::new();
        mirror.apply(&snapshot(
            1,
            &[
                state(1, EntityKind::Background, 0.0),
                state(2, EntityKind::Enemy, 0.0),
            ],
        ));
        mirror.apply(&snapshot(2, &[]));

        assert!(mirror.contains(1));
        assert!(!mirror.contains(2));

        mirror.apply(&snapshot(3, &[]));
        assert!(mirror.contains(1));
    }

    #[test]
    fn stale_snapshot_is_ignored() {
        let mut mirror = Mirror::new();
        mirror.apply(&snapshot(10, &[state(1, EntityKind::Enemy, 5.0)]));

        assert!(mirror.apply(&snapshot(9, &[])).is_none());
        assert!(mirror.contains(1));
        assert_eq!(mirror.last_tick(), Some(10));
    }

    #[test]
    fn unknown_hp_clears_health() {
        let mut mirror = Mirror::new();
        mirror.apply(&snapshot(1, &[state(1, EntityKind::Player, 0.0)]));

        let mut hidden = state(1, EntityKind::Player, 0.0);
        hidden.hp = EntityState::HP_UNKNOWN;
        mirror.apply(&snapshot(2, &[hidden]));

        assert!(
            mirror
                .registry()
                .component::<Health>(Entity::from_id(1))
                .is_none()
        );
    }

    #[test]
    fn pruned_id_can_reappear() {
        let mut mirror = Mirror::new();
        mirror.apply(&snapshot(1, &[state(5, EntityKind::Enemy, 0.0)]));
        mirror.apply(&snapshot(2, &[]));
        let report = mirror
            .apply(&snapshot(3, &[state(5, EntityKind::Enemy, 1.0)]))
            .unwrap();

        assert_eq!(report.created, 1);
        assert!(mirror.contains(5));
    }
}
