use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use volley::{LobbyManager, LobbySummary, NetworkStats, Outgoing, Transport};

use crate::config::ServerConfig;
use crate::events::{ServerEvent, Severity};

pub struct GameServer {
    transport: Transport,
    lobbies: LobbyManager,
    config: ServerConfig,
    last_frame: Instant,
    running: Arc<AtomicBool>,
    start_time: Instant,
    pending_events: VecDeque<ServerEvent>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> io::Result<Self> {
        let mut transport = Transport::bind(config.bind_addr())?;
        if let Some(sim) = config.packet_loss.clone() {
            log::warn!("Simulating {:.1}% outgoing packet loss", sim.loss_percent);
            transport.set_packet_loss(sim);
        }

        Ok(Self {
            transport,
            lobbies: LobbyManager::new(config.session.clone(), config.max_lobbies),
            last_frame: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_endpoint().addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn lobbies(&self) -> &LobbyManager {
        &self.lobbies
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// Headless loop. Events go straight to the logger.
    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            for event in self.pending_events.drain(..) {
                match event.severity() {
                    Severity::Info => log::info!("{}", event.describe()),
                    Severity::Warn => log::warn!("{}", event.describe()),
                    Severity::Error => log::error!("{}", event.describe()),
                }
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// One pass of the server loop: route whatever arrived, then advance
    /// every lobby by the wall time since the previous pass.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        let errors_before = self.transport.stats().send_errors;

        self.transport.poll();
        while let Some(datagram) = self.transport.receive() {
            let replies = self.lobbies.route(datagram, now);
            self.send_all(replies);
        }

        let outgoing = self.lobbies.update(delta, now);
        self.send_all(outgoing);

        self.pending_events
            .extend(self.lobbies.drain_events().into_iter().map(ServerEvent::from));

        let errors = self.transport.stats().send_errors - errors_before;
        if errors > 0 {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("{} datagrams failed to send", errors),
            });
        }
    }

    fn send_all(&mut self, outgoing: Vec<Outgoing>) {
        for out in outgoing {
            self.transport.broadcast(&out.payload, &out.to);
        }
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            lobbies: self.lobbies.summaries(),
            max_lobbies: self.config.max_lobbies,
            member_count: self.lobbies.member_count(),
            network_stats: self.transport.stats().clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub uptime_secs: u64,
    pub lobbies: Vec<LobbySummary>,
    pub max_lobbies: usize,
    pub member_count: usize,
    pub network_stats: NetworkStats,
}
