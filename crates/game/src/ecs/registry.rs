use std::cell::{Ref, RefMut};
use std::collections::BTreeSet;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::component::Component;
use super::sparse::SparseArray;
use crate::components::{SpawnRequest, Stores};
use crate::net::GameEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u32);

impl Entity {
    pub const fn from_id(id: u32) -> Self {
        Self(id)
    }

    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("component `{0}` accessed before registration")]
    UnregisteredComponent(&'static str),
}

pub struct SystemContext {
    pub tick: u32,
    pub dt: f32,
    pub rng: StdRng,
    pub score: u32,
    pub events: Vec<GameEvent>,
    /// Requests queued by entities that were killed before the spawn system ran.
    pub orphaned_spawns: Vec<SpawnRequest>,
}

impl SystemContext {
    pub fn new(dt: f32, seed: u64) -> Self {
        Self {
            tick: 0,
            dt,
            rng: StdRng::seed_from_u64(seed),
            score: 0,
            events: Vec::new(),
            orphaned_spawns: Vec::new(),
        }
    }
}

pub type System = Box<dyn FnMut(&mut Registry, &mut SystemContext) + Send>;

type Eraser = fn(&mut Stores, Entity);

fn erase<T: Component>(stores: &mut Stores, entity: Entity) {
    if let Some(store) = T::slot_mut(stores) {
        store.get_mut().clear(entity.index());
    }
}

pub struct Registry {
    stores: Stores,
    alive: BTreeSet<Entity>,
    next_id: u32,
    erasers: Vec<Eraser>,
    systems: Vec<System>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            stores: Stores::default(),
            alive: BTreeSet::new(),
            next_id: 0,
            erasers: Vec::new(),
            systems: Vec::new(),
        }
    }

    /// Allocates the store for `T`. Registering twice is a no-op.
    pub fn register<T: Component>(&mut self) -> &mut Self {
        let slot = T::slot_mut(&mut self.stores);
        if slot.is_none() {
            *slot = Some(Default::default());
            self.erasers.push(erase::<T>);
        }
        self
    }

    pub fn is_registered<T: Component>(&self) -> bool {
        T::slot(&self.stores).is_some()
    }

    pub fn spawn(&mut self) -> Entity {
        let entity = Entity(self.next_id);
        self.next_id += 1;
        self.alive.insert(entity);
        entity
    }

    /// Marks an externally allocated id as alive, keeping later `spawn`
    /// calls above it. Used by mirrors that reuse the server's ids.
    pub fn adopt(&mut self, entity: Entity) -> bool {
        // never hand out an id the server already used
        self.next_id = self.next_id.max(entity.0.saturating_add(1));
        self.alive.insert(entity)
    }

    pub fn kill(&mut self, entity: Entity) -> bool {
        if !self.alive.remove(&entity) {
            return false;
        }
        // one eraser per registered type
        for erase in &self.erasers {
            erase(&mut self.stores, entity);
        }
        true
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive.contains(&entity)
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive.iter().copied()
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    #[track_caller]
    pub fn add<T: Component>(&mut self, entity: Entity, value: T) -> Option<T> {
        let alive = self.alive.contains(&entity);
        let store = Self::expect_slot(T::slot_mut(&mut self.stores)).get_mut();
        if !alive {
            log::debug!("ignoring {} for dead entity {}", T::NAME, entity);
            return None;
        }
        store.set(entity.index(), value)
    }

    #[track_caller]
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        Self::expect_slot(T::slot_mut(&mut self.stores))
            .get_mut()
            .clear(entity.index())
    }

    pub fn try_get<T: Component>(&self) -> Result<Ref<'_, SparseArray<T>>, RegistryError> {
        T::slot(&self.stores)
            .as_ref()
            .map(|store| store.borrow())
            .ok_or(RegistryError::UnregisteredComponent(T::NAME))
    }

    pub fn try_get_mut<T: Component>(&self) -> Result<RefMut<'_, SparseArray<T>>, RegistryError> {
        T::slot(&self.stores)
            .as_ref()
            .map(|store| store.borrow_mut())
            .ok_or(RegistryError::UnregisteredComponent(T::NAME))
    }

    /// Shared view of `T`'s store.
    ///
    /// # Panics
    ///
    /// If `T` was never registered, or the store is currently borrowed mutably.
    #[track_caller]
    pub fn get<T: Component>(&self) -> Ref<'_, SparseArray<T>> {
        self.try_get::<T>().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Exclusive view of `T`'s store. Different component types may be
    /// borrowed at the same time.
    ///
    /// # Panics
    ///
    /// If `T` was never registered, or the store is already borrowed.
    #[track_caller]
    pub fn get_mut<T: Component>(&self) -> RefMut<'_, SparseArray<T>> {
        self.try_get_mut::<T>().unwrap_or_else(|err| panic!("{err}"))
    }

    #[track_caller]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.get::<T>().contains(entity.index())
    }

    #[track_caller]
    pub fn component<T: Component + Clone>(&self, entity: Entity) -> Option<T> {
        self.get::<T>().get(entity.index()).cloned()
    }

    pub fn add_system<F>(&mut self, system: F) -> &mut Self
    where
        F: FnMut(&mut Registry, &mut SystemContext) + Send + 'static,
    {
        self.systems.push(Box::new(system));
        self
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn run_systems(&mut self, ctx: &mut SystemContext) {
        let mut systems = std::mem::take(&mut self.systems);
        for system in systems.iter_mut() {
            system(self, ctx);
        }
        // systems registered while running go after the existing ones
        systems.append(&mut self.systems);
        self.systems = systems;
    }

    #[track_caller]
    fn expect_slot<T: Component>(slot: &mut super::Slot<T>) -> &mut std::cell::RefCell<SparseArray<T>> {
        match slot {
            Some(store) => store,
            None => panic!("{}", RegistryError::UnregisteredComponent(T::NAME)),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("alive", &self.alive.len())
            .field("next_id", &self.next_id)
            .field("components", &self.erasers.len())
            .field("systems", &self.systems.len())
            .finish()
    }
}
