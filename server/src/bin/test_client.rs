use bincode::{deserialize, serialize};
use clap::Parser;
use shared::{Packet, Vec3, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout_at, Instant};

/// Connects to a running server, readies up, tries to start the match and
/// fires a few shots, printing everything the server sends back.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Number of shots to fire once the match is running
    #[arg(short = 'n', long, default_value = "5")]
    shots: u32,
}

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    server_addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, server_addr).await?;
    Ok(())
}

/// Prints whatever arrives within `window`.
async fn drain(socket: &UdpSocket, window: Duration) {
    let mut buf = [0u8; 2048];
    let deadline = Instant::now() + window;
    while let Ok(Ok((len, _))) = timeout_at(deadline, socket.recv_from(&mut buf)).await {
        match deserialize::<Packet>(&buf[0..len]) {
            Ok(Packet::MatchState { tick, round, players, .. }) => {
                println!(
                    "tick {}: round {} {:?} Red {} - Blue {}",
                    tick, round.round_number, round.phase, round.red_score, round.blue_score
                );
                for p in players {
                    println!(
                        "  player {} {:?} hp={} alive={} ammo={}/{}",
                        p.id, p.team, p.health, p.alive, p.mag_ammo, p.reserve_ammo
                    );
                }
            }
            Ok(other) => println!("Received: {:?}", other),
            Err(e) => println!("Failed to deserialize packet: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = args.server.parse::<SocketAddr>()?;

    println!("Sending connection request to {}", server_addr);
    send(
        &socket,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
        server_addr,
    )
    .await?;

    let mut buf = [0u8; 2048];
    let client_id = loop {
        let (len, _) = socket.recv_from(&mut buf).await?;
        match deserialize::<Packet>(&buf[0..len]) {
            Ok(Packet::Connected { client_id }) => break client_id,
            Ok(Packet::Disconnected { reason }) => {
                println!("Server refused connection: {}", reason);
                return Ok(());
            }
            Ok(_) => continue,
            Err(e) => println!("Failed to deserialize response: {}", e),
        }
    };
    println!("Connection accepted with client ID: {}", client_id);

    let mut sequence = 1;
    send(&socket, &Packet::Ready { sequence, ready: true }, server_addr).await?;
    sequence += 1;
    send(&socket, &Packet::StartMatch { sequence }, server_addr).await?;
    sequence += 1;
    drain(&socket, Duration::from_millis(200)).await;

    for _ in 0..args.shots {
        let packet = Packet::Fire {
            sequence,
            origin: Vec3::new(0.0, 1.65, 0.0),
            aim_forward: Vec3::Z,
            is_aiming: false,
            client_timestamp: get_timestamp(),
        };
        println!("Sending {:?}", packet);
        send(&socket, &packet, server_addr).await?;
        sequence += 1;

        drain(&socket, Duration::from_millis(50)).await;
        sleep(Duration::from_millis(250)).await;
    }

    send(&socket, &Packet::Reload { sequence }, server_addr).await?;
    drain(&socket, Duration::from_millis(200)).await;

    println!("Sending disconnect request");
    send(&socket, &Packet::Disconnect, server_addr).await?;

    println!("Test client finished");
    Ok(())
}
