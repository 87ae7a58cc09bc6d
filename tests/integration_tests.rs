//! Integration tests for the deathmatch server
//!
//! These tests exercise the match through its public API and a real UDP
//! server, crossing module boundaries the unit tests keep apart.

use bincode::{deserialize, serialize};
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::combat::{PlayerCombatState, Roster};
use server::game::{FireRequest, Match, MatchConfig};
use server::hit_resolver::resolve_shot;
use server::network::{Server, ServerMessage};
use server::teams::SpawnPoints;
use server::world::{ArenaWorld, RayHit, SurfaceTag, WorldQuery};
use shared::{MatchPhase, Packet, Team, Vec3, WeaponProfile, PROTOCOL_VERSION};
use std::cell::RefCell;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn seeded_match(config: MatchConfig) -> Match {
    Match::with_rng(
        config,
        ArenaWorld::default_arena(),
        SpawnPoints::default_arena(),
        StdRng::seed_from_u64(42),
    )
}

/// A world where every ray hits `owner` at a fixed distance and records the
/// directions it was asked about.
struct AlwaysHits {
    owner: u32,
    surface: SurfaceTag,
    rays: RefCell<Vec<Vec3>>,
}

impl WorldQuery for AlwaysHits {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        self.rays.borrow_mut().push(direction);
        let distance = max_distance.min(10.0);
        Some(RayHit {
            point: origin + direction * distance,
            distance,
            surface: self.surface,
            owner: Some(self.owner),
        })
    }
}

fn roster_of(players: &[(u32, Team, WeaponProfile)]) -> Roster {
    players
        .iter()
        .map(|(id, team, weapon)| {
            (
                *id,
                PlayerCombatState::new(*id, *team, Arc::new(weapon.clone()), 100, Vec3::ZERO),
            )
        })
        .collect()
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests that a fire request survives the wire unchanged
    #[test]
    fn fire_packet_serialization() {
        let packet = Packet::Fire {
            sequence: 7,
            origin: Vec3::new(1.0, 1.65, -3.0),
            aim_forward: Vec3::Z,
            is_aiming: true,
            client_timestamp: 123456789,
        };

        let decoded: Packet = deserialize(&serialize(&packet).unwrap()).unwrap();
        match decoded {
            Packet::Fire {
                sequence,
                origin,
                is_aiming,
                ..
            } => {
                assert_eq!(sequence, 7);
                assert_eq!(origin, Vec3::new(1.0, 1.65, -3.0));
                assert!(is_aiming);
            }
            _ => panic!("Packet type mismatch after serialization"),
        }
    }

    /// Tests a full connect handshake against a running server
    #[tokio::test]
    async fn server_accepts_connection_and_streams_state() {
        let mut server = Server::new(
            "127.0.0.1:0",
            Duration::from_millis(10),
            4,
            MatchConfig::default(),
        )
        .await
        .expect("Failed to start server");
        let server_addr = server.local_addr().unwrap();
        let control = server.message_sender();
        let handle = tokio::spawn(async move { server.run().await.is_ok() });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let connect = serialize(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .unwrap();
        client.send_to(&connect, server_addr).await.unwrap();

        let mut buf = [0u8; 2048];
        let mut client_id = None;
        let mut saw_state = false;
        for _ in 0..50 {
            let Ok(Ok((len, _))) =
                timeout(Duration::from_millis(500), client.recv_from(&mut buf)).await
            else {
                break;
            };
            match deserialize::<Packet>(&buf[..len]).unwrap() {
                Packet::Connected { client_id: id } => client_id = Some(id),
                Packet::MatchState { round, players, .. } => {
                    assert_eq!(round.phase, MatchPhase::Lobby);
                    assert_eq!(players.len(), 1);
                    saw_state = true;
                }
                _ => {}
            }
            if client_id.is_some() && saw_state {
                break;
            }
        }

        assert_eq!(client_id, Some(1));
        assert!(saw_state);

        control.send(ServerMessage::Shutdown).unwrap();
        assert!(handle.await.unwrap());
    }

    /// Tests that binding to a bogus address fails cleanly
    #[test]
    fn server_rejects_bad_bind_address() {
        let result = tokio_test::block_on(Server::new(
            "not-an-address",
            Duration::from_millis(16),
            4,
            MatchConfig::default(),
        ));
        assert!(result.is_err());
    }
}

/// HIT RESOLUTION TESTS
mod hit_resolution_tests {
    use super::*;

    /// Tests that shots into teammates never produce damage
    #[test]
    fn teammates_are_never_damaged() {
        let roster = roster_of(&[
            (1, Team::Red, WeaponProfile::pump_shotgun()),
            (2, Team::Red, WeaponProfile::starter_pistol()),
        ]);
        let world = AlwaysHits {
            owner: 2,
            surface: SurfaceTag::Head,
            rays: RefCell::new(Vec::new()),
        };
        let mut rng = StdRng::seed_from_u64(1);

        let result =
            resolve_shot(1, Vec3::ZERO, Vec3::Z, false, &world, &roster, &mut rng).unwrap();

        assert!(result.damage_events.is_empty());
        assert!(result.first_hit_was_on_shooter_team);
        assert!(!result.hitmarker());
        assert_eq!(world.rays.borrow().len(), 8);
    }

    /// Tests that zero spread traces exactly along the aim
    #[test]
    fn zero_spread_is_exact() {
        let roster = roster_of(&[
            (1, Team::Blue, WeaponProfile::starter_pistol()),
            (2, Team::Red, WeaponProfile::starter_pistol()),
        ]);
        let world = AlwaysHits {
            owner: 2,
            surface: SurfaceTag::Body,
            rays: RefCell::new(Vec::new()),
        };
        let mut rng = StdRng::seed_from_u64(99);

        for aim in [Vec3::Z, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, -1.0, 0.0)] {
            resolve_shot(1, Vec3::ZERO, aim, false, &world, &roster, &mut rng).unwrap();
            assert_eq!(world.rays.borrow().last().copied(), Some(aim));
        }
    }

    /// Tests headshot rounding on a fractional multiplier
    #[test]
    fn headshot_damage_is_rounded() {
        let roster = roster_of(&[
            (1, Team::Blue, WeaponProfile::pump_shotgun()),
            (2, Team::Red, WeaponProfile::starter_pistol()),
        ]);
        let head = AlwaysHits {
            owner: 2,
            surface: SurfaceTag::Head,
            rays: RefCell::new(Vec::new()),
        };
        let body = AlwaysHits {
            owner: 2,
            surface: SurfaceTag::Body,
            rays: RefCell::new(Vec::new()),
        };
        let mut rng = StdRng::seed_from_u64(5);

        // 9 * 1.5 = 13.5 rounds to 14.
        let result =
            resolve_shot(1, Vec3::ZERO, Vec3::Z, false, &head, &roster, &mut rng).unwrap();
        assert_eq!(result.damage_events.len(), 8);
        assert!(result.damage_events.iter().all(|e| e.amount == 14 && e.is_headshot));
        assert!(result.hitmarker());

        let result =
            resolve_shot(1, Vec3::ZERO, Vec3::Z, true, &body, &roster, &mut rng).unwrap();
        assert!(result.damage_events.iter().all(|e| e.amount == 9 && !e.is_headshot));
    }
}

/// MATCH FLOW TESTS
mod match_flow_tests {
    use super::*;

    const BLUE: u32 = 1;
    const RED: u32 = 2;

    fn eye_level_shot(game: &Match, shooter: u32, target: u32) -> FireRequest {
        let from = game.player(shooter).unwrap().position;
        let to = game.player(target).unwrap().position;
        let origin = from + Vec3::new(0.0, 1.72, 0.0);
        FireRequest {
            shooter_id: shooter,
            origin,
            aim_forward: (to + Vec3::new(0.0, 1.72, 0.0)) - origin,
            is_aiming: false,
            client_timestamp: 0,
        }
    }

    /// Tests the starter pistol scenario: 10 damage per headshot
    #[test]
    fn starter_pistol_headshot_deals_ten() {
        let mut game = seeded_match(MatchConfig::default());
        game.add_player(BLUE);
        game.add_player(RED);
        let now = Instant::now();
        assert!(game.start_match());

        let shot = eye_level_shot(&game, RED, BLUE);
        let result = game.handle_fire(shot, now).unwrap();

        assert!(result.any_hit);
        assert!(result.hitmarker());
        assert_eq!(result.damage_events[0].amount, 10);
        assert_eq!(game.player(BLUE).unwrap().health, 90);
    }

    /// Tests shotgun pellets land in order and health matches the events
    #[test]
    fn shotgun_pellets_apply_in_order() {
        let mut game = seeded_match(MatchConfig::default());
        game.add_player(BLUE);
        game.add_player(RED);
        let now = Instant::now();
        game.start_match();

        game.equip_weapon(RED, "pump_shotgun").unwrap();
        game.update_position(RED, Vec3::new(0.0, 0.0, 25.0)).unwrap();
        let shot = eye_level_shot(&game, RED, BLUE);
        let result = game.handle_fire(shot, now).unwrap();

        let pellets: Vec<u32> = result.damage_events.iter().map(|e| e.pellet).collect();
        let mut sorted = pellets.clone();
        sorted.sort_unstable();
        assert_eq!(pellets, sorted);

        let dealt: u32 = result.damage_events.iter().map(|e| e.amount).sum();
        assert!(result.damage_events.iter().all(|e| e.amount == 9 || e.amount == 14));
        assert_eq!(game.player(BLUE).unwrap().health, 100u32.saturating_sub(dealt));
        assert_eq!(game.player(RED).unwrap().mag_ammo, 5);
    }

    /// Tests a whole match from lobby to match over and a rematch
    #[test]
    fn full_match_and_rematch() {
        let mut game = seeded_match(MatchConfig {
            rounds_to_win: 3,
            ..MatchConfig::default()
        });
        game.add_player(BLUE);
        game.add_player(RED);
        game.handle_ready(BLUE, true).unwrap();
        game.handle_ready(RED, true).unwrap();
        game.handle_start_match(BLUE).unwrap();

        let mut now = Instant::now();
        for round in 1..=3 {
            assert_eq!(game.round_snapshot().round_number, round);
            assert_eq!(game.phase(), MatchPhase::InProgress);
            game.apply_damage(RED, 100, now).unwrap();
            assert_eq!(game.round_snapshot().blue_score, round);
            now += Duration::from_secs(3);
            game.advance(now);
        }

        assert_eq!(game.phase(), MatchPhase::MatchOver);
        assert_eq!(game.winner(), Some(Team::Blue));
        assert!(game.apply_damage(RED, 100, now).is_none());
        assert_eq!(game.round_snapshot().blue_score, 3);

        game.handle_start_match(BLUE).unwrap();
        let round = game.round_snapshot();
        assert_eq!(round.phase, MatchPhase::InProgress);
        assert_eq!((round.red_score, round.blue_score, round.round_number), (0, 0, 1));
        assert_eq!(game.pending_timers(), 0);
    }

    /// Tests that a start request mid-round leaves everything untouched
    #[test]
    fn start_during_round_is_rejected() {
        let mut game = seeded_match(MatchConfig {
            require_all_ready: false,
            ..MatchConfig::default()
        });
        game.add_player(BLUE);
        game.add_player(RED);
        game.handle_start_match(BLUE).unwrap();
        let now = Instant::now();
        game.apply_damage(RED, 30, now);

        let before = game.player_snapshots();
        assert!(game.handle_start_match(BLUE).is_err());
        assert_eq!(game.player_snapshots(), before);
    }

    /// Tests that a late respawn timer cannot revive a player who died again
    #[test]
    fn respawn_is_tied_to_the_death_it_followed() {
        let mut game = seeded_match(MatchConfig {
            next_round_delay: Duration::from_millis(1500),
            respawn_delay: Duration::from_secs(3),
            ..MatchConfig::default()
        });
        game.add_player(BLUE);
        game.add_player(RED);
        let start = Instant::now();
        game.start_match();

        game.apply_damage(BLUE, 100, start);
        game.advance(start + Duration::from_millis(1500));
        assert_eq!(game.round_snapshot().round_number, 2);
        assert!(game.player(BLUE).unwrap().alive);

        game.apply_damage(BLUE, 100, start + Duration::from_secs(2));
        assert_eq!(game.phase(), MatchPhase::RoundEnding);

        // The respawn queued by the first death comes due now and is stale.
        game.advance(start + Duration::from_secs(3));
        assert!(!game.player(BLUE).unwrap().alive);

        game.advance(start + Duration::from_millis(3500));
        assert_eq!(game.round_snapshot().round_number, 3);
        assert!(game.player(BLUE).unwrap().alive);
    }
}
