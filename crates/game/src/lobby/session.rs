use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::LobbyError;
use crate::ecs::Entity;
use crate::net::{
    ConnectAck, Endpoint, GameOver, InputCommand, LobbyEntry, PLAYER_NAME_LEN, Payload, Snapshot,
};
use crate::simulation::{Simulation, SimulationConfig};
use crate::snapshot::DEFAULT_SNAPSHOT_CAP;

pub type LobbyId = u32;
pub type PlayerId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A connected slot that sends no INPUT for this long is demoted.
    pub input_timeout: Duration,
    /// A demoted slot that does not reconnect within this long is released.
    pub slot_expiry: Duration,
    pub snapshot_cap: usize,
    /// Send a snapshot every N ticks.
    pub snapshot_send_rate: u32,
    pub max_players: u8,
    pub simulation: SimulationConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_timeout: Duration::from_secs(5),
            slot_expiry: Duration::from_secs(30),
            snapshot_cap: DEFAULT_SNAPSHOT_CAP,
            snapshot_send_rate: 1,
            max_players: 4,
            simulation: SimulationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobbyState {
    Waiting,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Connected,
    Disconnected { since: Instant },
}

#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub player_id: PlayerId,
    pub name: String,
    pub lane: u32,
    pub state: SlotState,
    pub entity: Option<Entity>,
    pub last_input: Instant,
}

impl PlayerSlot {
    pub fn is_connected(&self) -> bool {
        self.state == SlotState::Connected
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: Vec<Endpoint>,
    pub payload: Payload,
}

impl Outgoing {
    pub fn single(to: Endpoint, payload: Payload) -> Self {
        Self {
            to: vec![to],
            payload,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    pub ticks: u32,
    pub timed_out: Vec<Endpoint>,
    pub released: Vec<Endpoint>,
    pub game_over: Option<GameOver>,
}

/// One game session: its players, keyed by endpoint, and the simulation
/// they share.
pub struct Lobby {
    id: LobbyId,
    name: String,
    max_players: u8,
    config: SessionConfig,
    slots: BTreeMap<Endpoint, PlayerSlot>,
    simulation: Simulation,
    next_player_id: PlayerId,
    games_played: u32,
    outbox: Vec<Outgoing>,
}

impl Lobby {
    pub fn new(
        id: LobbyId,
        name: impl Into<String>,
        max_players: u8,
        config: SessionConfig,
    ) -> Self {
        let simulation = Simulation::new(SimulationConfig {
            seed: config.simulation.seed.wrapping_add(id as u64),
            ..config.simulation.clone()
        });

        Self {
            id,
            name: name.into(),
            max_players: max_players.max(1),
            config,
            slots: BTreeMap::new(),
            simulation,
            next_player_id: 1,
            games_played: 0,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_players(&self) -> u8 {
        self.max_players
    }

    pub fn player_count(&self) -> usize {
        self.slots.len()
    }

    pub fn connected_count(&self) -> usize {
        self.slots.values().filter(|slot| slot.is_connected()).count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.max_players as usize
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, endpoint: Endpoint) -> bool {
        self.slots.contains_key(&endpoint)
    }

    pub fn slot(&self, endpoint: Endpoint) -> Option<&PlayerSlot> {
        self.slots.get(&endpoint)
    }

    pub fn slots(&self) -> impl Iterator<Item = (&Endpoint, &PlayerSlot)> {
        self.slots.iter()
    }

    pub fn state(&self) -> LobbyState {
        if self.connected_count() > 0 {
            LobbyState::Running
        } else {
            LobbyState::Waiting
        }
    }

    pub fn games_played(&self) -> u32 {
        self.games_played
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }

    pub fn entry(&self) -> LobbyEntry {
        LobbyEntry {
            id: self.id,
            name: self.name.clone(),
            players: self.slots.len().min(u8::MAX as usize) as u8,
            max_players: self.max_players,
        }
    }

    pub fn join(
        &mut self,
        endpoint: Endpoint,
        name: &str,
        now: Instant,
    ) -> Result<ConnectAck, LobbyError> {
        if let Some(ack) = self.reconnect(endpoint, now) {
            return Ok(ack);
        }
        if self.is_full() {
            return Err(LobbyError::Full(self.id));
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;
        let lane = (0..)
            .find(|lane| self.slots.values().all(|slot| slot.lane != *lane))
            .unwrap_or_default();
        let entity = self.simulation.spawn_player(player_id, lane);

        let name = if name.is_empty() {
            format!("player{player_id}")
        } else {
            name.chars().take(PLAYER_NAME_LEN).collect()
        };
        log::info!(
            "lobby {}: {} joined as player {} from {}",
            self.id,
            name,
            player_id,
            endpoint
        );

        self.slots.insert(
            endpoint,
            PlayerSlot {
                player_id,
                name,
                lane,
                state: SlotState::Connected,
                entity: Some(entity),
                last_input: now,
            },
        );

        Ok(self.acknowledge(endpoint, player_id, entity))
    }

    /// Brings a slot back to `Connected`, respawning its ship if it has none.
    /// Returns `None` if `endpoint` holds no slot here.
    fn reconnect(&mut self, endpoint: Endpoint, now: Instant) -> Option<ConnectAck> {
        let simulation = &mut self.simulation;
        let slot = self.slots.get_mut(&endpoint)?;

        if !slot.is_connected() {
            log::info!("lobby {}: player {} reconnected", self.id, slot.player_id);
        }
        slot.state = SlotState::Connected;
        slot.last_input = now;

        let entity = match slot.entity {
            Some(entity) if simulation.is_alive(entity) => entity,
            _ => {
                let entity = simulation.spawn_player(slot.player_id, slot.lane);
                slot.entity = Some(entity);
                entity
            }
        };
        let player_id = slot.player_id;
        Some(self.acknowledge(endpoint, player_id, entity))
    }

    fn acknowledge(
        &mut self,
        endpoint: Endpoint,
        player_id: PlayerId,
        entity: Entity,
    ) -> ConnectAck {
        let ack = ConnectAck {
            player_id,
            entity_id: entity.id(),
            lobby_id: self.id,
        };
        self.outbox
            .push(Outgoing::single(endpoint, Payload::ConnectAck(ack)));
        ack
    }

    pub fn leave(&mut self, endpoint: Endpoint) -> bool {
        let Some(slot) = self.slots.remove(&endpoint) else {
            return false;
        };
        if let Some(entity) = slot.entity {
            self.simulation.remove_player(entity);
        }
        log::info!("lobby {}: player {} left", self.id, slot.player_id);
        true
    }

    pub fn handle(&mut self, endpoint: Endpoint, payload: Payload, now: Instant) {
        match payload {
            Payload::ConnectRequest(request) => {
                if let Err(err) = self.join(endpoint, &request.name, now) {
                    log::debug!("lobby {}: connect from {} refused: {}", self.id, endpoint, err);
                }
            }
            Payload::Input(command) => self.apply_input(endpoint, command, now),
            Payload::Ping { timestamp } => {
                self.outbox
                    .push(Outgoing::single(endpoint, Payload::Pong { timestamp }));
            }
            other => {
                log::debug!(
                    "lobby {}: ignoring {:?} from {}",
                    self.id,
                    other.kind(),
                    endpoint
                );
            }
        }
    }

    fn apply_input(&mut self, endpoint: Endpoint, command: InputCommand, now: Instant) {
        let Some(slot) = self.slots.get_mut(&endpoint) else {
            return;
        };
        if !slot.is_connected() {
            return;
        }
        slot.last_input = now;
        if let Some(entity) = slot.entity {
            self.simulation.set_input(entity, command.flags);
        }
    }

    pub fn update(&mut self, delta: f32, now: Instant) -> UpdateReport {
        let mut report = UpdateReport::default();
        self.expire_slots(now, &mut report);

        let recipients: Vec<Endpoint> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.is_connected())
            .map(|(endpoint, _)| *endpoint)
            .collect();
        if recipients.is_empty() {
            return report;
        }

        // anything larger cannot be framed into one datagram
        let cap = self
            .config
            .snapshot_cap
            .min(Snapshot::MAX_DATAGRAM_ENTITIES);
        let send_rate = self.config.snapshot_send_rate.max(1);
        let outbox = &mut self.outbox;
        report.ticks = self.simulation.update_with(delta, |simulation| {
            for event in simulation.drain_events() {
                outbox.push(Outgoing {
                    to: recipients.clone(),
                    payload: Payload::Event(event),
                });
            }
            if simulation.tick() % send_rate == 0 {
                outbox.push(Outgoing {
                    to: recipients.clone(),
                    payload: Payload::Snapshot(simulation.snapshot(cap)),
                });
            }
        });

        if report.ticks > 0 && self.all_players_down() {
            report.game_over = Some(self.restart(recipients));
        }
        report
    }

    fn expire_slots(&mut self, now: Instant, report: &mut UpdateReport) {
        let timeout = self.config.input_timeout;
        let expiry = self.config.slot_expiry;

        for (endpoint, slot) in self.slots.iter_mut() {
            match slot.state {
                SlotState::Connected if now.duration_since(slot.last_input) > timeout => {
                    log::warn!(
                        "lobby {}: player {} timed out after {:?}",
                        self.id,
                        slot.player_id,
                        timeout
                    );
                    slot.state = SlotState::Disconnected { since: now };
                    if let Some(entity) = slot.entity.take() {
                        self.simulation.remove_player(entity);
                    }
                    report.timed_out.push(*endpoint);
                }
                SlotState::Disconnected { since } if now.duration_since(since) > expiry => {
                    report.released.push(*endpoint);
                }
                _ => {}
            }
        }

        for endpoint in &report.released {
            if let Some(slot) = self.slots.remove(endpoint) {
                log::info!("lobby {}: released slot of player {}", self.id, slot.player_id);
            }
        }
    }

    fn all_players_down(&self) -> bool {
        self.slots
            .values()
            .filter(|slot| slot.is_connected())
            .all(|slot| slot.entity.is_none_or(|entity| !self.simulation.is_alive(entity)))
    }

    fn restart(&mut self, recipients: Vec<Endpoint>) -> GameOver {
        let game_over = GameOver {
            tick: self.simulation.tick(),
            score: self.simulation.score(),
        };
        log::info!(
            "lobby {}: game over at tick {} with score {}",
            self.id,
            game_over.tick,
            game_over.score
        );
        self.outbox.push(Outgoing {
            to: recipients,
            payload: Payload::GameOver(game_over),
        });

        self.games_played += 1;
        self.simulation.reset();

        // every connected slot gets a fresh ship and a fresh ack

        let mut respawned = Vec::new();
        for (endpoint, slot) in self.slots.iter_mut() {
            slot.entity = None;
            if slot.is_connected() {
                let entity = self.simulation.spawn_player(slot.player_id, slot.lane);
                slot.entity = Some(entity);
                respawned.push((*endpoint, slot.player_id, entity));
            }
        }
        for (endpoint, player_id, entity) in respawned {
            self.acknowledge(endpoint, player_id, entity);
        }
        game_over
    }

    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }
}

impl std::fmt::Debug for Lobby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("players", &self.slots.len())
            .field("max_players", &self.max_players)
            .field("simulation", &self.simulation)
            .finish()
    }
}
