use volley::{DEFAULT_PORT, PacketLossSimulation, SessionConfig};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub max_lobbies: usize,
    pub session: SessionConfig,
    pub packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: String::from("0.0.0.0"),
            port: DEFAULT_PORT,
            max_lobbies: 64,
            session: SessionConfig::default(),
            packet_loss: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
