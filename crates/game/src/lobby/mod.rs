mod manager;
mod session;

pub use manager::{LobbyEvent, LobbyManager, LobbySummary};
pub use session::{
    Lobby, LobbyId, LobbyState, Outgoing, PlayerId, PlayerSlot, SessionConfig, SlotState,
    UpdateReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("lobby {0} does not exist")]
    NotFound(LobbyId),
    #[error("lobby {0} is full")]
    Full(LobbyId),
    #[error("already a member of lobby {0}")]
    AlreadyMember(LobbyId),
    #[error("lobby limit of {0} reached")]
    TooManyLobbies(usize),
}
