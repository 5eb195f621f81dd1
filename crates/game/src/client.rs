use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::net::{
    ConnectAck, ConnectRequest, CreateLobby, Endpoint, GameEvent, GameOver, InputCommand,
    InputFlags, LobbyEntry, NetworkStats, Payload, Snapshot, Transport, sequence_greater_than,
};
use crate::snapshot::Mirror;

/// A snapshot this far behind the newest one means the server restarted its
/// world rather than reordered a packet.
const RESTART_WINDOW: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Joining,
    Connected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub applied: u64,
    pub stale: u64,
    pub created: u64,
    pub pruned: u64,
}

/// Client end of the protocol: lobby handshake, input upload and a mirror
/// of the server's entities.
pub struct ClientSession {
    transport: Transport,
    server: Endpoint,
    mirror: Mirror,
    state: SessionState,
    ack: Option<ConnectAck>,
    lobbies: Vec<LobbyEntry>,
    events: Vec<GameEvent>,
    game_over: Option<GameOver>,
    input_tick: u32,
    epoch: Instant,
    rtt: Option<Duration>,
    stats: MirrorStats,
}

impl ClientSession {
    pub fn connect<A: ToSocketAddrs>(bind: A, server: SocketAddr) -> io::Result<Self> {
        let transport = Transport::bind(bind)?;
        log::info!(
            "client bound to {}, server {}",
            transport.local_endpoint(),
            server
        );

        Ok(Self {
            transport,
            server: Endpoint::new(server),
            mirror: Mirror::new(),
            state: SessionState::Idle,
            ack: None,
            lobbies: Vec::new(),
            events: Vec::new(),
            game_over: None,
            input_tick: 0,
            epoch: Instant::now(),
            rtt: None,
            stats: MirrorStats::default(),
        })
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.transport.local_endpoint()
    }

    pub fn server(&self) -> Endpoint {
        self.server
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ack(&self) -> Option<ConnectAck> {
        self.ack
    }

    pub fn lobbies(&self) -> &[LobbyEntry] {
        &self.lobbies
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn mirror_stats(&self) -> MirrorStats {
        self.stats
    }

    pub fn network_stats(&self) -> &NetworkStats {
        self.transport.stats()
    }

    pub fn rtt(&self) -> Option<Duration> {
        self.rtt
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn take_game_over(&mut self) -> Option<GameOver> {
        self.game_over.take()
    }

    fn send(&mut self, payload: Payload) {
        self.transport.send(&payload, self.server);
    }

    pub fn request_lobbies(&mut self) {
        self.send(Payload::ListLobbies);
    }

    pub fn create_lobby(&mut self, name: &str, max_players: u8) {
        self.state = SessionState::Joining;
        self.send(Payload::CreateLobby(CreateLobby {
            name: name.to_owned(),
            max_players,
        }));
    }

    pub fn join_lobby(&mut self, lobby_id: u32) {
        self.state = SessionState::Joining;
        self.send(Payload::JoinLobby { lobby_id });
    }

    /// Joins any lobby with room, or reconnects a timed-out slot.
    pub fn quick_play(&mut self, name: &str) {
        self.state = SessionState::Joining;
        self.send(Payload::ConnectRequest(ConnectRequest {
            name: name.to_owned(),
        }));
    }

    pub fn send_input(&mut self, flags: InputFlags) {
        if self.state != SessionState::Connected {
            return;
        }
        let tick = self.input_tick;
        self.input_tick = self.input_tick.wrapping_add(1);
        self.send(Payload::Input(InputCommand { tick, flags }));
    }

    pub fn ping(&mut self) {
        let timestamp = self.epoch.elapsed().as_micros() as u64;
        self.send(Payload::Ping { timestamp });
    }

    pub fn poll(&mut self) -> usize {
        self.transport.poll();

        let mut handled = 0;
        while let Some(datagram) = self.transport.receive() {
            if datagram.sender != self.server {
                log::debug!("ignoring packet from {}", datagram.sender);
                continue;
            }
            self.handle(datagram.payload);
            handled += 1;
        }
        handled
    }

    fn handle(&mut self, payload: Payload) {
        match payload {
            Payload::ConnectAck(ack) => {
                // a new lobby, or a fresh ship in the same one after a world
                // restart, makes every mirrored entity and tick meaningless
                if self.ack.is_some_and(|prev| {
                    prev.lobby_id != ack.lobby_id || prev.entity_id != ack.entity_id
                }) {
                    self.mirror.clear();
                }
                log::info!(
                    "joined lobby {} as player {} (entity {})",
                    ack.lobby_id,
                    ack.player_id,
                    ack.entity_id
                );
                self.ack = Some(ack);
                self.state = SessionState::Connected;
            }
            Payload::Snapshot(snapshot) => self.apply_snapshot(&snapshot),
            Payload::Event(event) => self.events.push(event),
            Payload::Pong { timestamp } => {
                let sent = Duration::from_micros(timestamp);
                self.rtt = self.epoch.elapsed().checked_sub(sent);
            }
            Payload::GameOver(over) => {
                log::info!("game over at tick {}, score {}", over.tick, over.score);
                self.mirror.clear();
                self.game_over = Some(over);
            }
            Payload::LobbyList(entries) => {
                if self.state == SessionState::Joining {
                    log::info!("join refused, {} lobbies available", entries.len());
                    self.state = SessionState::Idle;
                }
                self.lobbies = entries;
            }
            other => log::debug!("ignoring server-bound {:?}", other.kind()),
        }
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        if let Some(last) = self.mirror.last_tick() {
            let restarted = sequence_greater_than(last, snapshot.tick)
                && last.wrapping_sub(snapshot.tick) > RESTART_WINDOW;
            if restarted {
                log::info!("snapshot tick went from {} to {}, resetting mirror", last, snapshot.tick);
                self.mirror.clear();
            }
        }

        match self.mirror.apply(snapshot) {
            Some(report) => {
                self.stats.applied += 1;
                self.stats.created += report.created as u64;
                self.stats.pruned += report.pruned as u64;
            }
            None => self.stats.stale += 1,
        }
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("server", &self.server)
            .field("state", &self.state)
            .field("ack", &self.ack)
            .field("mirrored", &self.mirror.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::EntityState;

    fn session() -> ClientSession {
        let server: SocketAddr = "127.0.0.1:9".parse().unwrap();
        ClientSession::connect("127.0.0.1:0", server).unwrap()
    }

    fn snapshot(tick: u32, ids: &[u32]) -> Snapshot {
        Snapshot {
            tick,
            entities: ids
                .iter()
                .map(|&entity_id| EntityState {
                    entity_id,
                    hp: EntityState::HP_UNKNOWN,
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn ack_marks_session_connected() {
        let mut client = session();
        client.quick_play("bot");
        assert_eq!(client.state(), SessionState::Joining);

        let ack = ConnectAck {
            player_id: 1,
            entity_id: 4,
            lobby_id: 2,
        };
        client.handle(Payload::ConnectAck(ack));

        assert_eq!(client.state(), SessionState::Connected);
        assert_eq!(client.ack(), Some(ack));
    }

    #[test]
    fn lobby_list_while_joining_means_refused() {
        let mut client = session();
        client.join_lobby(5);
        client.handle(Payload::LobbyList(Vec::new()));
        assert_eq!(client.state(), SessionState::Idle);
    }

    #[test]
    fn stale_snapshot_is_counted_not_applied() {
        let mut client = session();
        client.handle(Payload::Snapshot(snapshot(100, &[1, 2])));
        client.handle(Payload::Snapshot(snapshot(99, &[1])));

        assert_eq!(client.mirror().len(), 2);
        assert_eq!(client.mirror_stats().stale, 1);
        assert_eq!(client.mirror_stats().applied, 1);
    }

    #[test]
    fn large_tick_rewind_resets_mirror() {
        let mut client = session();
        client.handle(Payload::Snapshot(snapshot(5_000, &[1, 2, 3])));
        client.handle(Payload::Snapshot(snapshot(1, &[7])));

        assert_eq!(client.mirror().len(), 1);
        assert!(client.mirror().contains(7));
        assert_eq!(client.mirror().last_tick(), Some(1));
    }

    #[test]
    fn reissued_ack_accepts_restarted_world() {
        let mut client = session();
        let first = ConnectAck {
            player_id: 1,
            entity_id: 0,
            lobby_id: 2,
        };
        client.handle(Payload::ConnectAck(first));
        client.handle(Payload::Snapshot(snapshot(300, &[0, 5, 9])));

        client.handle(Payload::ConnectAck(ConnectAck {
            entity_id: 3,
            ..first
        }));
        client.handle(Payload::Snapshot(snapshot(1, &[3])));

        assert_eq!(client.mirror().last_tick(), Some(1));
        assert_eq!(client.mirror().len(), 1);
        assert!(client.mirror().contains(3));
        assert_eq!(client.mirror_stats().stale, 0);
    }

    #[test]
    fn repeated_ack_keeps_mirror() {
        let mut client = session();
        let ack = ConnectAck {
            player_id: 1,
            entity_id: 0,
            lobby_id: 2,
        };
        client.handle(Payload::ConnectAck(ack));
        client.handle(Payload::Snapshot(snapshot(40, &[0, 1])));
        client.handle(Payload::ConnectAck(ack));

        assert_eq!(client.mirror().len(), 2);
    }

    #[test]
    fn game_over_clears_mirror() {
        let mut client = session();
        client.handle(Payload::Snapshot(snapshot(10, &[1])));
        client.handle(Payload::GameOver(GameOver { tick: 10, score: 50 }));

        assert!(client.mirror().is_empty());
        assert_eq!(client.take_game_over(), Some(GameOver { tick: 10, score: 50 }));
        assert_eq!(client.take_game_over(), None);
    }

    #[test]
    fn input_is_held_back_until_connected() {
        let mut client = session();
        client.send_input(InputFlags::UP);
        assert_eq!(client.network_stats().packets_sent, 0);
    }
}
