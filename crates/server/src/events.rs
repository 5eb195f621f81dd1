use volley::{Endpoint, LobbyEvent, LobbyId, PlayerId};

#[derive(Debug, Clone)]
pub enum ServerEvent {
    LobbyCreated {
        lobby: LobbyId,
        name: String,
    },
    LobbyDestroyed {
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
        reason: LeaveReason,
    },
    GameOver {
        lobby: LobbyId,
        score: u32,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum LeaveReason {
    Left,
    Timeout,
}

impl LeaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::Left => "left",
            LeaveReason::Timeout => "timed out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl ServerEvent {
    pub fn severity(&self) -> Severity {
        match self {
            ServerEvent::PlayerLeft {
                reason: LeaveReason::Timeout,
                ..
            } => Severity::Warn,
            ServerEvent::Error { .. } => Severity::Error,
            _ => Severity::Info,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ServerEvent::LobbyCreated { lobby, name } => {
                format!("Lobby {} \"{}\" created", lobby, name)
            }
            ServerEvent::LobbyDestroyed { lobby } => format!("Lobby {} closed", lobby),
            ServerEvent::PlayerJoined {
                lobby,
                endpoint,
                player_id,
            } => format!("Player {} joined lobby {} from {}", player_id, lobby, endpoint),
            ServerEvent::PlayerLeft {
                lobby,
                endpoint,
                reason,
            } => format!("{} {} lobby {}", endpoint, reason.as_str(), lobby),
            ServerEvent::GameOver { lobby, score } => {
                format!("Lobby {} game over, score {}", lobby, score)
            }
            ServerEvent::Error { message } => message.clone(),
        }
    }
}

impl From<LobbyEvent> for ServerEvent {
    fn from(event: LobbyEvent) -> Self {
        match event {
            LobbyEvent::Created { lobby, name } => ServerEvent::LobbyCreated { lobby, name },
            LobbyEvent::Destroyed { lobby } => ServerEvent::LobbyDestroyed { lobby },
            LobbyEvent::PlayerJoined {
                lobby,
                endpoint,
                player_id,
            } => ServerEvent::PlayerJoined {
                lobby,
                endpoint,
                player_id,
            },
            LobbyEvent::PlayerLeft { lobby, endpoint } => ServerEvent::PlayerLeft {
                lobby,
                endpoint,
                reason: LeaveReason::Left,
            },
            LobbyEvent::PlayerTimedOut { lobby, endpoint } => ServerEvent::PlayerLeft {
                lobby,
                endpoint,
                reason: LeaveReason::Timeout,
            },
            LobbyEvent::GameOver { lobby, score } => ServerEvent::GameOver { lobby, score },
        }
    }
}
