use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: SocketAddr,
    pub name: String,
    /// Create a lobby with this name instead of quick play.
    pub create: Option<String>,
    /// Join this lobby id instead of quick play.
    pub join: Option<u32>,
    pub max_players: u8,
    pub input_rate: u32,
    pub ping_interval: Duration,
    /// Zero runs until interrupted.
    pub duration: Duration,
    pub join_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            name: String::from("bot"),
            create: None,
            join: None,
            max_players: 4,
            input_rate: 60,
            ping_interval: Duration::from_millis(250),
            duration: Duration::ZERO,
            join_timeout: Duration::from_secs(5),
        }
    }

    pub fn input_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.input_rate.max(1) as f64)
    }
}
