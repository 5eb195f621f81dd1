use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use rand::Rng;
use volley::{ClientSession, InputFlags, SessionState};

use crate::config::ClientConfig;

const REPORT_INTERVAL: Duration = Duration::from_secs(2);
/// Inputs per leg of the movement pattern.
const LEG_LENGTH: u32 = 45;

/// Walks a rectangle clockwise, firing on the horizontal legs and pausing
/// now and then.
#[derive(Debug, Default)]
pub struct InputScript {
    step: u32,
}

impl InputScript {
    pub fn next(&mut self, rng: &mut impl Rng) -> InputFlags {
        let leg = (self.step / LEG_LENGTH) % 4;
        self.step = self.step.wrapping_add(1);

        if rng.gen_ratio(1, 20) {
            return InputFlags::empty();
        }

        let mut flags = match leg {
            0 => InputFlags::RIGHT,
            1 => InputFlags::DOWN,
            2 => InputFlags::LEFT,
            _ => InputFlags::UP,
        };
        if leg % 2 == 0 {
            flags |= InputFlags::SHOOT;
        }
        flags
    }
}

pub struct Bot {
    session: ClientSession,
    config: ClientConfig,
    script: InputScript,
}

impl Bot {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let session = ClientSession::connect("0.0.0.0:0", config.server)?;
        Ok(Self {
            session,
            config,
            script: InputScript::default(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        self.join()?;

        let mut rng = rand::thread_rng();
        let start = Instant::now();
        let mut last_input = Instant::now();
        let mut last_ping = Instant::now();
        let mut last_report = Instant::now();
        let input_interval = self.config.input_interval();

        while self.config.duration.is_zero() || start.elapsed() < self.config.duration {
            self.session.poll();

            for event in self.session.take_events() {
                log::debug!("event {:?}", event);
            }
            if let Some(over) = self.session.take_game_over() {
                log::info!("game over at tick {}, final score {}", over.tick, over.score);
            }

            if last_input.elapsed() >= input_interval {
                last_input = Instant::now();
                let flags = self.script.next(&mut rng);
                self.session.send_input(flags);
            }

            if last_ping.elapsed() >= self.config.ping_interval {
                last_ping = Instant::now();
                self.session.ping();
            }

            if last_report.elapsed() >= REPORT_INTERVAL {
                last_report = Instant::now();
                self.report();
            }

            std::thread::sleep(Duration::from_millis(1));
        }

        self.report();
        Ok(())
    }

    fn join(&mut self) -> Result<()> {
        self.session.request_lobbies();
        self.wait_for(|s| s.network_stats().packets_received > 0);
        for lobby in self.session.lobbies() {
            log::info!(
                "lobby {} \"{}\" {}/{}",
                lobby.id,
                lobby.name,
                lobby.players,
                lobby.max_players
            );
        }

        if let Some(name) = self.config.create.clone() {
            self.session.create_lobby(&name, self.config.max_players);
        } else if let Some(id) = self.config.join {
            self.session.join_lobby(id);
        } else {
            let name = self.config.name.clone();
            self.session.quick_play(&name);
        }

        self.wait_for(|s| s.state() != SessionState::Joining);
        match self.session.ack() {
            Some(ack) if self.session.state() == SessionState::Connected => {
                log::info!(
                    "playing in lobby {} as player {} (entity {})",
                    ack.lobby_id,
                    ack.player_id,
                    ack.entity_id
                );
                Ok(())
            }
            _ => bail!("could not join a lobby on {}", self.config.server),
        }
    }

    fn wait_for<F>(&mut self, mut done: F)
    where
        F: FnMut(&ClientSession) -> bool,
    {
        let start = Instant::now();
        while start.elapsed() < self.config.join_timeout {
            self.session.poll();
            if done(&self.session) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn report(&self) {
        let mirror = self.session.mirror();
        let stats = self.session.mirror_stats();
        let net = self.session.network_stats();
        let rtt = self
            .session
            .rtt()
            .map(|rtt| format!("{:.1}ms", rtt.as_secs_f64() * 1000.0))
            .unwrap_or_else(|| String::from("-"));

        log::info!(
            "tick {:?} | {} entities | {} applied, {} stale, {} created, {} pruned | {} recv, {} dropped | rtt {}",
            mirror.last_tick(),
            mirror.len(),
            stats.applied,
            stats.stale,
            stats.created,
            stats.pruned,
            net.packets_received,
            net.packets_dropped,
            rtt
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn script_walks_each_leg_in_turn() {
        let mut script = InputScript::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = InputFlags::empty();
        for _ in 0..LEG_LENGTH * 4 {
            seen |= script.next(&mut rng);
        }
        assert!(seen.contains(
            InputFlags::UP | InputFlags::DOWN | InputFlags::LEFT | InputFlags::RIGHT
        ));
        assert!(seen.contains(InputFlags::SHOOT));
    }

    #[test]
    fn vertical_legs_hold_fire() {
        let mut script = InputScript { step: LEG_LENGTH };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..LEG_LENGTH {
            assert!(!script.next(&mut rng).contains(InputFlags::SHOOT));
        }
    }
}
