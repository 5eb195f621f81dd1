pub mod client;
pub mod components;
pub mod ecs;
pub mod lobby;
pub mod net;
pub mod simulation;
pub mod snapshot;

pub use client::{ClientSession, MirrorStats, SessionState};
pub use components::EntityKind;
pub use ecs::{Entity, Registry, RegistryError, SparseArray, SystemContext, indexed_zip, zip};
pub use lobby::{
    Lobby, LobbyError, LobbyEvent, LobbyId, LobbyManager, LobbyState, LobbySummary, Outgoing,
    PlayerId, SessionConfig,
};
pub use net::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, Datagram, Endpoint, EntityState, GameEvent, InputFlags,
    NetworkStats, Packet, PacketHeader, PacketKind, PacketLossSimulation, Payload, ProtocolError,
    Snapshot, Transport,
};
pub use simulation::{EnemyDefinition, FixedTimestep, Simulation, SimulationConfig};
pub use snapshot::{DEFAULT_SNAPSHOT_CAP, Mirror, build_snapshot};
