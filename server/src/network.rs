//! Server network layer handling UDP communications and the match loop

use crate::client_manager::ClientManager;
use crate::error::Rejection;
use crate::events::MatchEvent;
use crate::game::{FireRequest, Match, MatchConfig};
use crate::teams::SpawnPoints;
use crate::world::ArenaWorld;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Messages sent from the match loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Who hears about a match event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Everyone,
    Only(u32),
}

/// Maps a match event to the packet clients see. Events that only change
/// replicated state return `None`; the next `MatchState` carries them.
pub fn route_event(event: &MatchEvent) -> Option<(Packet, Delivery)> {
    match event {
        MatchEvent::ShotFired {
            shooter_id,
            visual_origin,
            visual_hit_point,
            any_hit,
        } => Some((
            Packet::ShotFired {
                shooter_id: *shooter_id,
                visual_origin: *visual_origin,
                visual_hit_point: *visual_hit_point,
                any_hit: *any_hit,
            },
            Delivery::Everyone,
        )),
        MatchEvent::Hitmarker { shooter_id } => {
            Some((Packet::Hitmarker, Delivery::Only(*shooter_id)))
        }
        MatchEvent::DryFire { player_id } => Some((Packet::DryFire, Delivery::Only(*player_id))),
        MatchEvent::PlayerDied { player_id, team } => Some((
            Packet::PlayerDied {
                player_id: *player_id,
                team: *team,
            },
            Delivery::Everyone,
        )),
        MatchEvent::Respawned {
            player_id,
            position,
        } => Some((
            Packet::Respawned {
                player_id: *player_id,
                position: *position,
            },
            Delivery::Everyone,
        )),
        _ => None,
    }
}

/// Main server coordinating networking and the authoritative match
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: Match,
    events: mpsc::UnboundedReceiver<MatchEvent>,
    tick: u32,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        config: MatchConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();

        let mut game = Match::new(
            config,
            ArenaWorld::default_arena(),
            SpawnPoints::default_arena(),
        );
        game.subscribe(Box::new(event_tx));

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game,
            events,
            tick: 0,
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// A handle for feeding the main loop from outside, e.g. to send
    /// [`ServerMessage::Shutdown`].
    pub fn message_sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn send_to_client(&self, client_id: u32, packet: Packet) {
        let addr = {
            let clients = self.clients.read().await;
            clients.addr_of(client_id)
        };
        match addr {
            Some(addr) => self.send_packet(packet, addr),
            None => debug!("Client {} is gone, dropping {:?}", client_id, packet),
        }
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            let response = Packet::Disconnected {
                reason: "Protocol version mismatch".to_string(),
            };
            self.send_packet(response, addr);
            return;
        }

        // Remove existing connection if present
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };

        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            {
                let mut clients = self.clients.write().await;
                clients.remove_client(&existing_id);
            }
            self.game.remove_player(existing_id, Instant::now());
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };

        if let Some(client_id) = client_id {
            self.game.add_player(client_id);
            self.send_packet(Packet::Connected { client_id }, addr);
        } else {
            let response = Packet::Disconnected {
                reason: "Server full".to_string(),
            };
            self.send_packet(response, addr);
        }
    }

    /// Processes incoming packets and forwards requests to the match
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            self.flush_events().await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let Some(client_id) = clients.find_client_by_addr(addr) else {
                debug!("Ignoring packet from unknown address {}", addr);
                return;
            };
            clients.touch(client_id);

            if let Some(sequence) = packet.sequence() {
                if !clients.accept_sequence(client_id, sequence) {
                    debug!(
                        "Dropping stale request {} from client {}",
                        sequence, client_id
                    );
                    return;
                }
            }
            client_id
        };

        let now = Instant::now();
        let result: Result<(), Rejection> = match packet {
            Packet::Fire {
                origin,
                aim_forward,
                is_aiming,
                client_timestamp,
                ..
            } => self
                .game
                .handle_fire(
                    FireRequest {
                        shooter_id: client_id,
                        origin,
                        aim_forward,
                        is_aiming,
                        client_timestamp,
                    },
                    now,
                )
                .map(|_| ()),
            Packet::Reload { .. } => self.game.handle_reload(client_id, now),
            Packet::TeamChange { team, .. } => {
                self.game.handle_team_change(client_id, team).map(|_| ())
            }
            Packet::Ready { ready, .. } => self.game.handle_ready(client_id, ready),
            Packet::StartMatch { .. } => self.game.handle_start_match(client_id),
            Packet::PositionUpdate { position, .. } => {
                self.game.update_position(client_id, position)
            }
            Packet::Heartbeat => Ok(()),
            Packet::Disconnect => {
                {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                }
                self.game.remove_player(client_id, now);
                Ok(())
            }
            _ => {
                warn!("Unexpected packet type from client {}", client_id);
                Ok(())
            }
        };

        if let Err(rejection) = result {
            debug!("Rejected request from client {}: {}", client_id, rejection);
        }

        self.flush_events().await;
    }

    /// Forwards queued match events to the clients that should see them
    async fn flush_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            let Some((packet, delivery)) = route_event(&event) else {
                continue;
            };
            match delivery {
                Delivery::Everyone => self.broadcast_packet(packet, None),
                Delivery::Only(client_id) => self.send_to_client(client_id, packet).await,
            }
        }
    }

    /// Broadcasts the round state and every player to all clients
    async fn broadcast_match_state(&self) {
        let client_count = {
            let clients = self.clients.read().await;
            clients.len()
        };

        if client_count == 0 {
            return;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis();
        let timestamp_safe = (timestamp.min(u64::MAX as u128)) as u64;

        let packet = Packet::MatchState {
            tick: self.tick,
            timestamp: timestamp_safe,
            round: self.game.round_snapshot(),
            players: self.game.player_snapshots(),
        };

        self.broadcast_packet(packet, None);
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.game.remove_player(client_id, Instant::now());
                            self.flush_events().await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.game.advance(Instant::now());
                    self.tick = self.tick.wrapping_add(1);
                    self.flush_events().await;
                    self.broadcast_match_state().await;

                    if self.tick % 60 == 0 && !self.game.is_empty() {
                        let round = self.game.round_snapshot();
                        debug!(
                            "Tick {}: {} players, round {} {:?}, Red {} - Blue {}",
                            self.tick,
                            self.game.len(),
                            round.round_number,
                            round.phase,
                            round.red_score,
                            round.blue_score
                        );
                    }
                },
            }
        }

        Ok(())
    }
}
