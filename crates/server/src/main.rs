use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use skirmish::UdpTransport;
use skirmish_server::{GameServer, ServerConfig};

#[derive(Parser)]
#[command(name = "skirmish-server")]
#[command(about = "Skirmish authoritative game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = skirmish::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = skirmish::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 16)]
    max_peers: usize,

    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Broadcast every Nth tick"
    )]
    snapshot_interval: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let transport = UdpTransport::bind(&bind_addr)?;
    log::info!("server listening on {}", transport.local_addr());

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_peers: args.max_peers,
        snapshot_interval: args.snapshot_interval,
    };
    let mut server = GameServer::new(transport, config);

    let mut last_frame = Instant::now();
    loop {
        let now = Instant::now();
        let delta = (now - last_frame).as_secs_f32();
        last_frame = now;

        server.update(delta);
        std::thread::sleep(Duration::from_millis(1));
    }
}
