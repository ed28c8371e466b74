use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use skirmish::{InputFlags, InputState, UdpTransport};
use skirmish_client::GameClient;

#[derive(Parser)]
#[command(name = "skirmish-client")]
#[command(about = "Headless skirmish client driving a scripted input pattern")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    #[arg(short, long, default_value_t = skirmish::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = skirmish::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 30, help = "Seconds to run before leaving")]
    duration: u64,
}

/// Walk forward while slowly turning, squeezing the trigger for a
/// moment every couple of seconds.
fn scripted_input(elapsed: f32) -> InputState {
    let mut flags = InputFlags::MOVE_FORWARD;
    if elapsed % 2.0 < 0.1 {
        flags |= InputFlags::USE_PRIMARY;
    }
    InputState {
        flags,
        aim_yaw: elapsed * 0.4,
        aim_pitch: 0.0,
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_addr = format!("{}:{}", args.server, args.port);

    let transport = UdpTransport::connect(&server_addr)?;
    log::info!("connecting to {server_addr}");
    let mut client = GameClient::new(transport, args.tick_rate);

    let started = Instant::now();
    let mut last_frame = started;
    let mut last_report = started;

    while started.elapsed() < Duration::from_secs(args.duration) {
        let now = Instant::now();
        let delta = (now - last_frame).as_secs_f32();
        last_frame = now;

        client.update(delta, scripted_input(started.elapsed().as_secs_f32()));

        if now - last_report >= Duration::from_secs(1) {
            last_report = now;
            match client.local_position() {
                Some(position) => log::info!(
                    "tick {} position ({:.2}, {:.2}, {:.2})",
                    client.world().map(|w| w.tick()).unwrap_or(0),
                    position.x,
                    position.y,
                    position.z
                ),
                None => log::info!("waiting for spawn"),
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    log::info!("leaving");
    client.leave();
    Ok(())
}
