use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::LobbyError;
use super::session::{Lobby, LobbyId, LobbyState, Outgoing, PlayerId, SessionConfig};
use crate::net::{
    ConnectAck, CreateLobby, Datagram, Endpoint, LOBBY_NAME_LEN, LobbyEntry, MAX_LOBBY_ENTRIES,
    Payload,
};

#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    Created {
        lobby: LobbyId,
        name: String,
    },
    Destroyed {
        lobby: LobbyId,
    },
    PlayerJoined {
        lobby: LobbyId,
        endpoint: Endpoint,
        player_id: PlayerId,
    },
    PlayerLeft {
        lobby: LobbyId,
        endpoint: Endpoint,
    },
    PlayerTimedOut {
        lobby: LobbyId,
        endpoint: Endpoint,
    },
    GameOver {
        lobby: LobbyId,
        score: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LobbySummary {
    pub id: LobbyId,
    pub name: String,
    pub players: usize,
    pub connected: usize,
    pub max_players: u8,
    pub state: LobbyState,
    pub tick: u32,
    pub entities: usize,
    pub score: u32,
    pub games_played: u32,
}

#[derive(Default)]
struct Directory {
    lobbies: BTreeMap<LobbyId, Arc<Mutex<Lobby>>>,
    members: HashMap<Endpoint, LobbyId>,
    next_id: LobbyId,
}

/// Routes datagrams to the lobby their sender belongs to and answers the
/// lobby control packets itself.
///
/// The directory lock is always taken before any lobby lock.
pub struct LobbyManager {
    directory: Mutex<Directory>,
    config: SessionConfig,
    max_lobbies: usize,
    events: Mutex<Vec<LobbyEvent>>,
}

impl LobbyManager {
    pub fn new(config: SessionConfig, max_lobbies: usize) -> Self {
        Self {
            directory: Mutex::new(Directory {
                next_id: 1,
                ..Default::default()
            }),
            config,
            max_lobbies,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn lobby_count(&self) -> usize {
        self.directory.lock().lobbies.len()
    }

    pub fn member_count(&self) -> usize {
        self.directory.lock().members.len()
    }

    pub fn lobby_of(&self, endpoint: Endpoint) -> Option<LobbyId> {
        self.directory.lock().members.get(&endpoint).copied()
    }

    pub fn lobby(&self, id: LobbyId) -> Option<Arc<Mutex<Lobby>>> {
        self.directory.lock().lobbies.get(&id).cloned()
    }

    /// Open lobbies in id order, at most what one LOBBY_LIST_RESPONSE holds.
    pub fn list(&self) -> Vec<LobbyEntry> {
        let dir = self.directory.lock();
        dir.lobbies
            .values()
            .take(MAX_LOBBY_ENTRIES)
            .map(|lobby| lobby.lock().entry())
            .collect()
    }

    pub fn summaries(&self) -> Vec<LobbySummary> {
        let dir = self.directory.lock();
        dir.lobbies
            .values()
            .map(|lobby| {
                let lobby = lobby.lock();
                let simulation = lobby.simulation();
                LobbySummary {
                    id: lobby.id(),
                    name: lobby.name().to_owned(),
                    players: lobby.player_count(),
                    connected: lobby.connected_count(),
                    max_players: lobby.max_players(),
                    state: lobby.state(),
                    tick: simulation.tick(),
                    entities: simulation.registry().alive_count(),
                    score: simulation.score(),
                    games_played: lobby.games_played(),
                }
            })
            .collect()
    }

    pub fn drain_events(&self) -> Vec<LobbyEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn emit(&self, event: LobbyEvent) {
        self.events.lock().push(event);
    }

    pub fn create_lobby(&self, name: &str, max_players: u8) -> Result<LobbyId, LobbyError> {
        let mut dir = self.directory.lock();
        self.create_locked(&mut dir, name, max_players)
    }

    fn create_locked(
        &self,
        dir: &mut Directory,
        name: &str,
        max_players: u8,
    ) -> Result<LobbyId, LobbyError> {
        if dir.lobbies.len() >= self.max_lobbies {
            return Err(LobbyError::TooManyLobbies(self.max_lobbies));
        }

        let id = dir.next_id;
        // 0 is never a lobby id
        dir.next_id = dir.next_id.wrapping_add(1).max(1);

        let name = match name.trim() {
            "" => format!("Lobby {id}"),
            name => name.chars().take(LOBBY_NAME_LEN).collect(),
        };
        let max_players = match max_players {
            0 => self.config.max_players,
            n => n,
        };

        let lobby = Lobby::new(id, name.clone(), max_players, self.config.clone());
        dir.lobbies.insert(id, Arc::new(Mutex::new(lobby)));
        log::info!("created lobby {id} \"{name}\" for {max_players} players");
        self.emit(LobbyEvent::Created { lobby: id, name });
        Ok(id)
    }

    /// Moves `endpoint` into lobby `id`, leaving its previous lobby only once
    /// the new one has accepted it.
    pub fn join(
        &self,
        endpoint: Endpoint,
        id: LobbyId,
        name: &str,
        now: Instant,
    ) -> Result<ConnectAck, LobbyError> {
        let mut dir = self.directory.lock();
        self.join_locked(&mut dir, endpoint, id, name, now)
    }

    fn join_locked(
        &self,
        dir: &mut Directory,
        endpoint: Endpoint,
        id: LobbyId,
        name: &str,
        now: Instant,
    ) -> Result<ConnectAck, LobbyError> {
        let lobby = dir.lobbies.get(&id).cloned().ok_or(LobbyError::NotFound(id))?;
        if dir.members.get(&endpoint) == Some(&id) {
            return Err(LobbyError::AlreadyMember(id));
        }
        if lobby.lock().is_full() {
            return Err(LobbyError::Full(id));
        }

        if let Some(previous) = dir.members.remove(&endpoint) {
            self.leave_locked(dir, previous, endpoint);
        }

        let ack = lobby.lock().join(endpoint, name, now)?;
        dir.members.insert(endpoint, id);
        self.emit(LobbyEvent::PlayerJoined {
            lobby: id,
            endpoint,
            player_id: ack.player_id,
        });
        Ok(ack)
    }

    pub fn leave(&self, endpoint: Endpoint) -> Option<LobbyId> {
        let mut dir = self.directory.lock();
        let id = dir.members.remove(&endpoint)?;
        self.leave_locked(&mut dir, id, endpoint);
        Some(id)
    }

    fn leave_locked(&self, dir: &mut Directory, id: LobbyId, endpoint: Endpoint) {
        let Some(lobby) = dir.lobbies.get(&id).cloned() else {
            return;
        };
        let empty = {
            let mut lobby = lobby.lock();
            lobby.leave(endpoint);
            lobby.is_empty()
        };
        self.emit(LobbyEvent::PlayerLeft {
            lobby: id,
            endpoint,
        });
        if empty {
            self.destroy_locked(dir, id);
        }
    }

    fn destroy_locked(&self, dir: &mut Directory, id: LobbyId) {
        if dir.lobbies.remove(&id).is_some() {
            dir.members.retain(|_, lobby| *lobby != id);
            log::info!("destroyed empty lobby {id}");
            self.emit(LobbyEvent::Destroyed { lobby: id });
        }
    }

    pub fn route(&self, datagram: Datagram, now: Instant) -> Vec<Outgoing> {
        let sender = datagram.sender;
        let mut replies = Vec::new();

        match datagram.payload {
            Payload::ListLobbies => {
                replies.push(Outgoing::single(sender, Payload::LobbyList(self.list())));
            }
            Payload::CreateLobby(CreateLobby { name, max_players }) => {
                // create and join under one lock so nobody else grabs the seat
                let mut dir = self.directory.lock();
                let joined = self
                    .create_locked(&mut dir, &name, max_players)
                    .and_then(|id| self.join_locked(&mut dir, sender, id, "", now));
                drop(dir);
                match joined {
                    Ok(ack) => self.collect(ack.lobby_id, &mut replies),
                    Err(err) => {
                        log::debug!("create from {sender} failed: {err}");
                        replies.push(self.lobby_list_reply(sender));
                    }
                }
            }
            Payload::JoinLobby { lobby_id } => match self.join(sender, lobby_id, "", now) {
                Ok(_) => self.collect(lobby_id, &mut replies),
                Err(LobbyError::AlreadyMember(id)) => {
                    // treat as a reconnect so a lost ack can be recovered
                    self.forward(id, sender, Payload::ConnectRequest(Default::default()), now);
                    self.collect(id, &mut replies);
                }
                Err(err) => {
                    log::debug!("join from {sender} failed: {err}");
                    replies.push(self.lobby_list_reply(sender));
                }
            },
            Payload::ConnectRequest(request) => match self.lobby_of(sender) {
                Some(id) => {
                    self.forward(id, sender, Payload::ConnectRequest(request), now);
                    self.collect(id, &mut replies);
                }
                None => match self.quick_play(sender, &request.name, now) {
                    Ok(ack) => self.collect(ack.lobby_id, &mut replies),
                    Err(err) => {
                        log::debug!("quick play for {sender} failed: {err}");
                        replies.push(self.lobby_list_reply(sender));
                    }
                },
            },
            Payload::Ping { timestamp } if self.lobby_of(sender).is_none() => {
                replies.push(Outgoing::single(sender, Payload::Pong { timestamp }));
            }
            payload @ (Payload::Input(_) | Payload::Ping { .. }) => {
                if let Some(id) = self.lobby_of(sender) {
                    self.forward(id, sender, payload, now);
                    self.collect(id, &mut replies);
                } else {
                    log::debug!("dropping {:?} from non-member {sender}", payload.kind());
                }
            }
            other => {
                log::debug!("dropping client-bound {:?} from {sender}", other.kind());
            }
        }

        replies
    }

    fn quick_play(&self, endpoint: Endpoint, name: &str, now: Instant) -> Result<ConnectAck, LobbyError> {
        let mut dir = self.directory.lock();
        let open = dir
            .lobbies
            .iter()
            .find(|(_, lobby)| !lobby.lock().is_full())
            .map(|(id, _)| *id);
        let id = match open {
            Some(id) => id,
            // unnamed, default size
            None => self.create_locked(&mut dir, "", 0)?,
        };
        self.join_locked(&mut dir, endpoint, id, name, now)
    }

    fn forward(&self, id: LobbyId, endpoint: Endpoint, payload: Payload, now: Instant) {
        if let Some(lobby) = self.lobby(id) {
            lobby.lock().handle(endpoint, payload, now);
        }
    }

    fn collect(&self, id: LobbyId, replies: &mut Vec<Outgoing>) {
        if let Some(lobby) = self.lobby(id) {
            replies.extend(lobby.lock().drain_outbox());
        }
    }

    fn lobby_list_reply(&self, to: Endpoint) -> Outgoing {
        Outgoing::single(to, Payload::LobbyList(self.list()))
    }

    pub fn update(&self, delta: f32, now: Instant) -> Vec<Outgoing> {
        let lobbies: Vec<(LobbyId, Arc<Mutex<Lobby>>)> = self
            .directory
            .lock()
            .lobbies
            .iter()
            .map(|(id, lobby)| (*id, Arc::clone(lobby)))
            .collect();

        let mut outgoing = Vec::new();
        let mut released = Vec::new();

        // directory lock is not held here, routing can proceed meanwhile
        for (id, lobby) in lobbies {
            let mut lobby = lobby.lock();
            let report = lobby.update(delta, now);
            outgoing.extend(lobby.drain_outbox());

            for endpoint in report.timed_out {
                self.emit(LobbyEvent::PlayerTimedOut { lobby: id, endpoint });
            }
            if let Some(over) = report.game_over {
                self.emit(LobbyEvent::GameOver {
                    lobby: id,
                    score: over.score,
                });
            }
            if !report.released.is_empty() || lobby.is_empty() {
                released.push((id, report.released));
            }
        }

        if !released.is_empty() {
            let mut dir = self.directory.lock();
            for (id, endpoints) in released {
                for endpoint in endpoints {
                    if dir.members.get(&endpoint) == Some(&id) {
                        dir.members.remove(&endpoint);
                        self.emit(LobbyEvent::PlayerLeft { lobby: id, endpoint });
                    }
                }
                // re-check under the directory lock; someone may have joined
                let empty = dir
                    .lobbies
                    .get(&id)
                    .is_some_and(|lobby| lobby.lock().is_empty());
                if empty {
                    self.destroy_locked(&mut dir, id);
                }
            }
        }

        outgoing
    }
}

impl std::fmt::Debug for LobbyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dir = self.directory.lock();
        f.debug_struct("LobbyManager")
            .field("lobbies", &dir.lobbies.len())
            .field("members", &dir.members.len())
            .field("max_lobbies", &self.max_lobbies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::net::{ConnectRequest, PacketHeader, PacketKind};
    use crate::simulation::SimulationConfig;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(([127, 0, 0, 1], port).into())
    }

    fn manager(max_players: u8, max_lobbies: usize) -> LobbyManager {
        LobbyManager::new(
            SessionConfig {
                max_players,
                simulation: SimulationConfig {
                    spawn_interval_ticks: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
            max_lobbies,
        )
    }

    fn datagram(sender: Endpoint, payload: Payload) -> Datagram {
        Datagram {
            header: PacketHeader::new(payload.kind(), 0, 0),
            payload,
            sender,
        }
    }

    fn create(name: &str, max_players: u8) -> Payload {
        Payload::CreateLobby(CreateLobby {
            name: name.into(),
            max_players,
        })
    }

    fn single_ack(replies: &[Outgoing]) -> ConnectAck {
        let acks: Vec<_> = replies
            .iter()
            .filter_map(|out| match out.payload {
                Payload::ConnectAck(ack) => Some(ack),
                _ => None,
            })
            .collect();
        assert_eq!(acks.len(), 1, "{replies:?}");
        acks[0]
    }

    #[test]
    fn create_lobby_joins_creator() {
        let manager = manager(4, 8);
        let now = Instant::now();

        let replies = manager.route(datagram(endpoint(1), create("arena", 2)), now);
        let ack = single_ack(&replies);

        assert_eq!(manager.lobby_of(endpoint(1)), Some(ack.lobby_id));
        let list = manager.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "arena");
        assert_eq!((list[0].players, list[0].max_players), (1, 2));
    }

    #[test]
    fn list_lobbies_replies_to_sender() {
        let manager = manager(4, 8);
        let now = Instant::now();
        manager.create_lobby("a", 4).unwrap();
        manager.create_lobby("b", 4).unwrap();

        let replies = manager.route(datagram(endpoint(9), Payload::ListLobbies), now);

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].to, vec![endpoint(9)]);
        match &replies[0].payload {
            Payload::LobbyList(entries) => {
                let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
                assert_eq!(ids, vec![1, 2]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failed_join_answers_with_lobby_list() {
        let manager = manager(1, 8);
        let now = Instant::now();
        manager.route(datagram(endpoint(1), create("solo", 1)), now);
        let id = manager.lobby_of(endpoint(1)).unwrap();

        let full = manager.route(datagram(endpoint(2), Payload::JoinLobby { lobby_id: id }), now);
        let missing = manager.route(
            datagram(endpoint(2), Payload::JoinLobby { lobby_id: 77 }),
            now,
        );

        for replies in [full, missing] {
            assert_eq!(replies.len(), 1);
            assert_eq!(replies[0].payload.kind(), PacketKind::LobbyListResponse);
        }
        assert_eq!(manager.lobby_of(endpoint(2)), None);
    }

    #[test]
    fn quick_play_fills_existing_lobby_first() {
        let manager = manager(2, 8);
        let now = Instant::now();
        let connect = || Payload::ConnectRequest(ConnectRequest { name: "p".into() });

        let a = single_ack(&manager.route(datagram(endpoint(1), connect()), now));
        let b = single_ack(&manager.route(datagram(endpoint(2), connect()), now));
        let c = single_ack(&manager.route(datagram(endpoint(3), connect()), now));

        assert_eq!(a.lobby_id, b.lobby_id);
        assert_ne!(a.lobby_id, c.lobby_id);
        assert_eq!(manager.lobby_count(), 2);
    }

    #[test]
    fn switching_lobby_destroys_empty_previous() {
        let manager = manager(4, 8);
        let now = Instant::now();
        manager.route(datagram(endpoint(1), create("first", 4)), now);
        let first = manager.lobby_of(endpoint(1)).unwrap();
        let second = manager.create_lobby("second", 4).unwrap();

        let replies = manager.route(
            datagram(endpoint(1), Payload::JoinLobby { lobby_id: second }),
            now,
        );

        assert_eq!(single_ack(&replies).lobby_id, second);
        assert!(manager.lobby(first).is_none());
        assert!(
            manager
                .drain_events()
                .contains(&LobbyEvent::Destroyed { lobby: first })
        );
    }

    #[test]
    fn rejoining_own_lobby_reacknowledges() {
        let manager = manager(4, 8);
        let now = Instant::now();
        let first = single_ack(&manager.route(datagram(endpoint(1), create("x", 4)), now));

        let again = single_ack(&manager.route(
            datagram(endpoint(1), Payload::JoinLobby { lobby_id: first.lobby_id }),
            now,
        ));

        assert_eq!(first, again);
    }

    #[test]
    fn lobby_limit_is_enforced() {
        let manager = manager(4, 1);
        manager.create_lobby("one", 4).unwrap();
        assert_eq!(
            manager.create_lobby("two", 4),
            Err(LobbyError::TooManyLobbies(1))
        );
    }

    #[test]
    fn ping_from_stranger_gets_pong() {
        let manager = manager(4, 8);
        let replies = manager.route(
            datagram(endpoint(5), Payload::Ping { timestamp: 9 }),
            Instant::now(),
        );
        assert_eq!(
            replies,
            vec![Outgoing::single(endpoint(5), Payload::Pong { timestamp: 9 })]
        );
    }

    #[test]
    fn input_from_stranger_is_dropped() {
        let manager = manager(4, 8);
        let replies = manager.route(
            datagram(
                endpoint(5),
                Payload::Input(crate::net::InputCommand {
                    tick: 0,
                    flags: Default::default(),
                }),
            ),
            Instant::now(),
        );
        assert!(replies.is_empty());
    }

    #[test]
    fn expired_lobby_is_destroyed_on_update() {
        let manager = manager(4, 8);
        let start = Instant::now();
        manager.route(datagram(endpoint(1), create("brief", 4)), start);
        let id = manager.lobby_of(endpoint(1)).unwrap();

        manager.update(0.0, start + Duration::from_secs(6));
        assert!(manager.lobby(id).is_some());

        manager.update(0.0, start + Duration::from_secs(40));
        assert!(manager.lobby(id).is_none());
        assert_eq!(manager.lobby_of(endpoint(1)), None);

        let events = manager.drain_events();
        assert!(events.contains(&LobbyEvent::PlayerTimedOut {
            lobby: id,
            endpoint: endpoint(1)
        }));
        assert!(events.contains(&LobbyEvent::Destroyed { lobby: id }));
    }

    #[test]
    fn update_sends_snapshots_to_members() {
        let manager = manager(4, 8);
        let now = Instant::now();
        manager.route(datagram(endpoint(1), create("live", 4)), now);

        let out = manager.update(1.0 / 60.0, now);

        let snapshot = out
            .iter()
            .find(|o| o.payload.kind() == PacketKind::Snapshot)
            .unwrap();
        assert_eq!(snapshot.to, vec![endpoint(1)]);
    }
}
