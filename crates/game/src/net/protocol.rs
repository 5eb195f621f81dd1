use bitflags::bitflags;

use super::codec::{ProtocolError, Reader, Wire, Writer};

pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 60;
/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
pub const PLAYER_NAME_LEN: usize = 16;
pub const LOBBY_NAME_LEN: usize = 32;
pub const MAX_LOBBY_ENTRIES: usize = u8::MAX as usize;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    ConnectRequest = 0,
    ConnectAck = 1,
    Input = 2,
    Snapshot = 3,
    Event = 4,
    Ping = 5,
    Pong = 6,
    GameOver = 7,
    ListLobbies = 8,
    LobbyListResponse = 9,
    CreateLobby = 10,
    JoinLobby = 11,
}

impl TryFrom<u8> for PacketKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::ConnectRequest,
            1 => Self::ConnectAck,
            2 => Self::Input,
            3 => Self::Snapshot,
            4 => Self::Event,
            5 => Self::Ping,
            6 => Self::Pong,
            7 => Self::GameOver,
            8 => Self::ListLobbies,
            9 => Self::LobbyListResponse,
            10 => Self::CreateLobby,
            11 => Self::JoinLobby,
            other => return Err(ProtocolError::UnknownKind(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    pub payload_size: u16,
    pub sequence: u32,
}

impl PacketHeader {
    pub const WIRE_SIZE: usize = 7;

    pub fn new(kind: PacketKind, payload_size: u16, sequence: u32) -> Self {
        Self {
            kind,
            payload_size,
            sequence,
        }
    }
}

impl Wire for PacketHeader {
    fn write(&self, writer: &mut Writer) {
        writer.put_u8(self.kind as u8);
        writer.put_u16(self.payload_size);
        writer.put_u32(self.sequence);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let kind = PacketKind::try_from(reader.u8()?)?;
        Ok(Self {
            kind,
            payload_size: reader.u16()?,
            sequence: reader.u32()?,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputFlags: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const SHOOT = 1 << 4;
    }
}

impl InputFlags {
    /// Unit-less movement direction, not normalised.
    pub fn direction(self) -> glam::Vec2 {
        let mut dir = glam::Vec2::ZERO;
        if self.contains(Self::UP) {
            dir.y -= 1.0;
        }
        if self.contains(Self::DOWN) {
            dir.y += 1.0;
        }
        if self.contains(Self::LEFT) {
            dir.x -= 1.0;
        }
        if self.contains(Self::RIGHT) {
            dir.x += 1.0;
        }
        dir
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    pub name: String,
}

impl Wire for ConnectRequest {
    fn write(&self, writer: &mut Writer) {
        writer.put_fixed_str::<PLAYER_NAME_LEN>(&self.name);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: reader.fixed_str::<PLAYER_NAME_LEN>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAck {
    pub player_id: u32,
    pub entity_id: u32,
    pub lobby_id: u32,
}

impl Wire for ConnectAck {
    fn write(&self, writer: &mut Writer) {
        writer.put_u32(self.player_id);
        writer.put_u32(self.entity_id);
        writer.put_u32(self.lobby_id);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            player_id: reader.u32()?,
            entity_id: reader.u32()?,
            lobby_id: reader.u32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputCommand {
    pub tick: u32,
    pub flags: InputFlags,
}

impl Wire for InputCommand {
    fn write(&self, writer: &mut Writer) {
        writer.put_u32(self.tick);
        writer.put_u8(self.flags.bits());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            tick: reader.u32()?,
            flags: InputFlags::from_bits_truncate(reader.u8()?),
        })
    }
}

/// Flattened view of one entity as carried in a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityState {
    pub entity_id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub kind: u8,
    pub hp: u8,
    pub collided: bool,
    pub variant: u8,
    pub hitbox_w: f32,
    pub hitbox_h: f32,
}

impl EntityState {
    pub const WIRE_SIZE: usize = 32;
    /// Sent when the entity has no health component.
    pub const HP_UNKNOWN: u8 = u8::MAX;
}

impl Wire for EntityState {
    fn write(&self, writer: &mut Writer) {
        writer.put_u32(self.entity_id);
        writer.put_f32(self.x);
        writer.put_f32(self.y);
        writer.put_f32(self.vx);
        writer.put_f32(self.vy);
        writer.put_u8(self.kind);
        writer.put_u8(self.hp);
        writer.put_u8(self.collided as u8);
        writer.put_u8(self.variant);
        writer.put_f32(self.hitbox_w);
        writer.put_f32(self.hitbox_h);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: reader.u32()?,
            x: reader.f32()?,
            y: reader.f32()?,
            vx: reader.f32()?,
            vy: reader.f32()?,
            kind: reader.u8()?,
            hp: reader.u8()?,
            collided: reader.u8()? != 0,
            variant: reader.u8()?,
            hitbox_w: reader.f32()?,
            hitbox_h: reader.f32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub tick: u32,
    pub entities: Vec<EntityState>,
}

impl Snapshot {
    pub const HEADER_SIZE: usize = 6;
    /// Most records one framed snapshot can carry in a single UDP datagram.
    pub const MAX_DATAGRAM_ENTITIES: usize =
        (MAX_DATAGRAM_SIZE - PacketHeader::WIRE_SIZE - Self::HEADER_SIZE) / EntityState::WIRE_SIZE;

    pub fn new(tick: u32) -> Self {
        Self {
            tick,
            entities: Vec::new(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.entities.len() * EntityState::WIRE_SIZE
    }
}

impl Snapshot {
    fn write_checked(&self, writer: &mut Writer) -> Result<(), ProtocolError> {
        let count = u16::try_from(self.entities.len())
            .map_err(|_| ProtocolError::TooManyEntities(self.entities.len()))?;
        writer.put_u32(self.tick);
        writer.put_u16(count);
        for state in &self.entities {
            state.write(writer);
        }
        Ok(())
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let tick = reader.u32()?;
        let count = reader.u16()? as usize;
        // refuse before allocating for a count the datagram cannot hold
        if reader.remaining() < count * EntityState::WIRE_SIZE {
            return Err(ProtocolError::Truncated {
                needed: Self::HEADER_SIZE + count * EntityState::WIRE_SIZE,
                available: Self::HEADER_SIZE + reader.remaining(),
            });
        }
        let mut entities = Vec::with_capacity(count);
        for _ in 0..count {
            entities.push(EntityState::read(reader)?);
        }
        Ok(Self { tick, entities })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    Spawned = 0,
    Hit = 1,
    Destroyed = 2,
    PlayerJoined = 3,
    PlayerLeft = 4,
}

impl TryFrom<u8> for EventKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Spawned,
            1 => Self::Hit,
            2 => Self::Destroyed,
            3 => Self::PlayerJoined,
            4 => Self::PlayerLeft,
            other => return Err(ProtocolError::UnknownEvent(other)),
        })
    }
}

/// One-shot gameplay notification for audio/effects collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameEvent {
    pub kind: EventKind,
    pub entity_id: u32,
    pub x: f32,
    pub y: f32,
}

impl GameEvent {
    pub fn new(kind: EventKind, entity_id: u32, position: glam::Vec2) -> Self {
        Self {
            kind,
            entity_id,
            x: position.x,
            y: position.y,
        }
    }
}

impl Wire for GameEvent {
    fn write(&self, writer: &mut Writer) {
        writer.put_u8(self.kind as u8);
        writer.put_u32(self.entity_id);
        writer.put_f32(self.x);
        writer.put_f32(self.y);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind: EventKind::try_from(reader.u8()?)?,
            entity_id: reader.u32()?,
            x: reader.f32()?,
            y: reader.f32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOver {
    pub tick: u32,
    pub score: u32,
}

impl Wire for GameOver {
    fn write(&self, writer: &mut Writer) {
        writer.put_u32(self.tick);
        writer.put_u32(self.score);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            tick: reader.u32()?,
            score: reader.u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyEntry {
    pub id: u32,
    pub name: String,
    pub players: u8,
    pub max_players: u8,
}

impl LobbyEntry {
    pub const WIRE_SIZE: usize = 4 + LOBBY_NAME_LEN + 2;
}

impl Wire for LobbyEntry {
    fn write(&self, writer: &mut Writer) {
        writer.put_u32(self.id);
        writer.put_fixed_str::<LOBBY_NAME_LEN>(&self.name);
        writer.put_u8(self.players);
        writer.put_u8(self.max_players);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: reader.u32()?,
            name: reader.fixed_str::<LOBBY_NAME_LEN>()?,
            players: reader.u8()?,
            max_players: reader.u8()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLobby {
    pub name: String,
    pub max_players: u8,
}

impl Wire for CreateLobby {
    fn write(&self, writer: &mut Writer) {
        writer.put_fixed_str::<LOBBY_NAME_LEN>(&self.name);
        writer.put_u8(self.max_players);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: reader.fixed_str::<LOBBY_NAME_LEN>()?,
            max_players: reader.u8()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    ConnectRequest(ConnectRequest),
    ConnectAck(ConnectAck),
    Input(InputCommand),
    Snapshot(Snapshot),
    Event(GameEvent),
    Ping { timestamp: u64 },
    Pong { timestamp: u64 },
    GameOver(GameOver),
    ListLobbies,
    LobbyList(Vec<LobbyEntry>),
    CreateLobby(CreateLobby),
    JoinLobby { lobby_id: u32 },
}

impl Payload {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::ConnectRequest(_) => PacketKind::ConnectRequest,
            Self::ConnectAck(_) => PacketKind::ConnectAck,
            Self::Input(_) => PacketKind::Input,
            Self::Snapshot(_) => PacketKind::Snapshot,
            Self::Event(_) => PacketKind::Event,
            Self::Ping { .. } => PacketKind::Ping,
            Self::Pong { .. } => PacketKind::Pong,
            Self::GameOver(_) => PacketKind::GameOver,
            Self::ListLobbies => PacketKind::ListLobbies,
            Self::LobbyList(_) => PacketKind::LobbyListResponse,
            Self::CreateLobby(_) => PacketKind::CreateLobby,
            Self::JoinLobby { .. } => PacketKind::JoinLobby,
        }
    }

    /// Encodes the payload body only, without a header.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut writer = Writer::with_capacity(64);
        match self {
            Self::ConnectRequest(req) => req.write(&mut writer),
            Self::ConnectAck(ack) => ack.write(&mut writer),
            Self::Input(input) => input.write(&mut writer),
            Self::Snapshot(snapshot) => {
                writer = Writer::with_capacity(snapshot.encoded_len());
                snapshot.write_checked(&mut writer)?;
            }
            Self::Event(event) => event.write(&mut writer),
            Self::Ping { timestamp } | Self::Pong { timestamp } => writer.put_u64(*timestamp),
            Self::GameOver(game_over) => game_over.write(&mut writer),
            Self::ListLobbies => {}
            Self::LobbyList(entries) => {
                let count = entries.len().min(MAX_LOBBY_ENTRIES);
                writer.put_u8(count as u8);
                for entry in &entries[..count] {
                    entry.write(&mut writer);
                }
            }
            Self::CreateLobby(create) => create.write(&mut writer),
            Self::JoinLobby { lobby_id } => writer.put_u32(*lobby_id),
        }
        Ok(writer.into_inner())
    }

    pub fn decode(kind: PacketKind, body: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::new(body);
        let reader = &mut reader;
        Ok(match kind {
            PacketKind::ConnectRequest => Self::ConnectRequest(ConnectRequest::read(reader)?),
            PacketKind::ConnectAck => Self::ConnectAck(ConnectAck::read(reader)?),
            PacketKind::Input => Self::Input(InputCommand::read(reader)?),
            PacketKind::Snapshot => Self::Snapshot(Snapshot::read(reader)?),
            PacketKind::Event => Self::Event(GameEvent::read(reader)?),
            PacketKind::Ping => Self::Ping {
                timestamp: reader.u64()?,
            },
            PacketKind::Pong => Self::Pong {
                timestamp: reader.u64()?,
            },
            PacketKind::GameOver => Self::GameOver(GameOver::read(reader)?),
            PacketKind::ListLobbies => Self::ListLobbies,
            PacketKind::LobbyListResponse => {
                let count = reader.u8()? as usize;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    entries.push(LobbyEntry::read(reader)?);
                }
                Self::LobbyList(entries)
            }
            PacketKind::CreateLobby => Self::CreateLobby(CreateLobby::read(reader)?),
            PacketKind::JoinLobby => Self::JoinLobby {
                lobby_id: reader.u32()?,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Payload,
}

impl Packet {
    pub fn new(sequence: u32, payload: Payload) -> Self {
        Self {
            header: PacketHeader::new(payload.kind(), 0, sequence),
            payload,
        }
    }

    /// Frames `header || payload`. The header's size field is recomputed.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let body = self.payload.encode()?;
        frame(self.payload.kind(), self.header.sequence, &body)
    }

    /// Decodes one datagram. Bytes past the declared payload size are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::new(data);
        let header = PacketHeader::read(&mut reader)?;
        let body = reader.take_slice(header.payload_size as usize)?;
        let payload = Payload::decode(header.kind, body)?;
        Ok(Self { header, payload })
    }
}

pub fn frame(kind: PacketKind, sequence: u32, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let payload_size =
        u16::try_from(body.len()).map_err(|_| ProtocolError::PayloadTooLarge(body.len()))?;
    let mut writer = Writer::with_capacity(PacketHeader::WIRE_SIZE + body.len());
    PacketHeader::new(kind, payload_size, sequence).write(&mut writer);
    writer.put_bytes(body);
    Ok(writer.into_inner())
}
