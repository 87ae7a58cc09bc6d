use clap::Parser;
use log::{info, warn};
use server::game::MatchConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of connected players
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Rounds a team must win to take the match
    #[arg(short, long, default_value_t = shared::ROUNDS_TO_WIN)]
    rounds_to_win: u32,

    /// Pause between rounds in seconds
    #[arg(long, default_value_t = shared::NEXT_ROUND_DELAY_SECS)]
    next_round_delay: f32,

    /// Time a dead player waits before respawning, in seconds
    #[arg(long, default_value_t = shared::RESPAWN_DELAY_SECS)]
    respawn_delay: f32,

    /// Let the host start without every player being ready
    #[arg(long)]
    allow_unready_start: bool,
}

/// Longest delay accepted from the command line.
const MAX_DELAY: Duration = Duration::from_secs(3600);

/// Converts a delay given in seconds, falling back to `default` for values
/// that are negative, not finite, or longer than [`MAX_DELAY`].
fn seconds(name: &str, value: f32, default: Duration) -> Duration {
    match Duration::try_from_secs_f32(value) {
        Ok(delay) if delay <= MAX_DELAY => delay,
        _ => {
            warn!("Ignoring --{} {}; using {:?}", name, value, default);
            default
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let defaults = MatchConfig::default();
    let config = MatchConfig {
        rounds_to_win: args.rounds_to_win,
        next_round_delay: seconds(
            "next-round-delay",
            args.next_round_delay,
            defaults.next_round_delay,
        ),
        respawn_delay: seconds("respawn-delay", args.respawn_delay, defaults.respawn_delay),
        require_all_ready: !args.allow_unready_start,
        ..defaults
    };
    let tick_duration = Duration::from_secs_f64(1.0 / f64::from(args.tick_rate.max(1)));
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Starting server on {} at {}Hz, first to {} rounds",
        address, args.tick_rate, config.rounds_to_win
    );

    let mut server = Server::new(&address, tick_duration, args.max_clients, config).await?;
    server.run().await?;

    Ok(())
}
