mod codec;
mod protocol;
mod transport;

pub use codec::{ProtocolError, Reader, Wire, Writer};
pub use protocol::{
    ConnectAck, ConnectRequest, CreateLobby, DEFAULT_PORT, DEFAULT_TICK_RATE, EntityState,
    EventKind, GameEvent, GameOver, InputCommand, InputFlags, LOBBY_NAME_LEN, LobbyEntry,
    MAX_DATAGRAM_SIZE, MAX_LOBBY_ENTRIES, PLAYER_NAME_LEN, Packet, PacketHeader, PacketKind,
    Payload, Snapshot, frame, sequence_greater_than,
};
pub use transport::{Datagram, Endpoint, NetworkStats, PacketLossSimulation, Transport};
