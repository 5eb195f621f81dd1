mod config;
mod events;
mod server;
mod tui;

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use config::ServerConfig;
use events::Severity;
use server::GameServer;
use tui::TuiState;
use volley::{PacketLossSimulation, SessionConfig, SimulationConfig};

#[derive(Parser)]
#[command(name = "volley-server")]
#[command(about = "Volley lobby server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = volley::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = volley::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = 64)]
    max_lobbies: usize,

    #[arg(long, default_value_t = 4, help = "Default lobby size for quick play")]
    max_players: u8,

    #[arg(long, default_value_t = 5, help = "Seconds without input before a slot is demoted")]
    input_timeout: u64,

    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable outgoing packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let packet_loss = args
        .simulate_packet_loss
        .then(|| PacketLossSimulation::new(args.loss_percent));

    let config = ServerConfig {
        bind: args.bind,
        port: args.port,
        max_lobbies: args.max_lobbies,
        session: SessionConfig {
            input_timeout: Duration::from_secs(args.input_timeout),
            max_players: args.max_players,
            simulation: SimulationConfig {
                tick_rate: args.tick_rate,
                seed: args.seed,
                ..Default::default()
            },
            ..Default::default()
        },
        packet_loss,
    };

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        let mut server = GameServer::new(config)?;
        log::info!("Server started on {}", server.local_addr());
        server.run();
        log::info!("Server shutting down");
    } else {
        let mut server = GameServer::new(config)?;
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::new();

    tui_state.log_info(format!("Server started on {}", server.local_addr()));
    if let Some(sim) = &server.config().packet_loss {
        tui_state.log_warn(format!("Simulating {:.1}% packet loss", sim.loss_percent));
    }

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            let message = event.describe();
            match event.severity() {
                Severity::Info => tui_state.log_info(message),
                Severity::Warn => tui_state.log_warn(message),
                Severity::Error => tui_state.log_error(message),
            }
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    running.store(false, Ordering::SeqCst);
                }
            }
        }

        let stats = server.stats();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats);
        })?;
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
