mod bot;
mod config;

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use bot::Bot;
use config::ClientConfig;

#[derive(Parser)]
#[command(name = "volley-client")]
#[command(about = "Headless volley client driven by a scripted bot")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:27015")]
    server: String,

    #[arg(short, long, default_value = "bot")]
    name: String,

    #[arg(long, help = "Create a lobby with this name")]
    create: Option<String>,

    #[arg(long, conflicts_with = "create", help = "Join the lobby with this id")]
    join: Option<u32>,

    #[arg(long, default_value_t = 4)]
    max_players: u8,

    #[arg(long, default_value_t = 60, help = "Inputs sent per second")]
    input_rate: u32,

    #[arg(long, default_value_t = 250, help = "Ping interval in ms")]
    ping_ms: u64,

    #[arg(short, long, default_value_t = 0, help = "Seconds to play, 0 for forever")]
    duration: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let server: SocketAddr = args
        .server
        .to_socket_addrs()?
        .next()
        .with_context(|| format!("could not resolve {}", args.server))?;

    let config = ClientConfig {
        name: args.name,
        create: args.create,
        join: args.join,
        max_players: args.max_players,
        input_rate: args.input_rate,
        ping_interval: Duration::from_millis(args.ping_ms),
        duration: Duration::from_secs(args.duration),
        ..ClientConfig::new(server)
    };

    let mut bot = Bot::new(config)?;
    bot.run()
}
