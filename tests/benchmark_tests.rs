//! Performance benchmarks for critical combat systems

use rand::rngs::StdRng;
use rand::SeedableRng;
use server::combat::{PlayerCombatState, Roster};
use server::game::{Match, MatchConfig};
use server::hit_resolver::resolve_shot;
use server::teams::SpawnPoints;
use server::timers::{Scheduler, TimerEvent};
use server::world::{ArenaWorld, Hitbox, PopulatedWorld};
use shared::{Team, Vec3, WeaponProfile};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Benchmarks shotgun resolution against a full arena
#[test]
fn benchmark_shot_resolution() {
    let geometry = ArenaWorld::default_arena();
    let roster: Roster = (1..=16u32)
        .map(|id| {
            let team = if id % 2 == 0 { Team::Red } else { Team::Blue };
            let position = Vec3::new((id as f32) - 8.0, 0.0, 10.0);
            let weapon = Arc::new(WeaponProfile::pump_shotgun());
            (id, PlayerCombatState::new(id, team, weapon, 100, position))
        })
        .collect();
    let hitboxes: Vec<Hitbox> = roster
        .values()
        .map(|p| Hitbox::standing(p.player_id, p.position))
        .collect();
    let world = PopulatedWorld {
        geometry: &geometry,
        hitboxes: &hitboxes,
    };
    let mut rng = StdRng::seed_from_u64(7);

    let origin = Vec3::new(0.0, 1.72, -10.0);
    let iterations = 10_000;
    let start = Instant::now();

    let mut hits = 0;
    for _ in 0..iterations {
        if let Some(result) =
            resolve_shot(1, origin, Vec3::Z, false, &world, &roster, &mut rng)
        {
            hits += result.damage_events.len();
        }
    }

    let duration = start.elapsed();
    println!(
        "Shot resolution: {} shots ({} damage events) in {:?} ({:.2} μs/shot)",
        iterations,
        hits,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // 80k pellets against 16 hitboxes should stay under a second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks scheduling and draining deferred events
#[test]
fn benchmark_scheduler() {
    let mut scheduler = Scheduler::new();
    let base = Instant::now();
    let iterations = 100_000u32;
    let start = Instant::now();

    for i in 0..iterations {
        let deadline = base + Duration::from_micros(u64::from((i * 7919) % 10_000));
        scheduler.schedule(
            deadline,
            TimerEvent::Respawn {
                player_id: i % 16,
                life: i,
            },
        );
    }

    let mut drained = 0;
    let end = base + Duration::from_secs(1);
    while scheduler.pop_due(end).is_some() {
        drained += 1;
    }

    let duration = start.elapsed();
    println!(
        "Scheduler: {} schedule+pop pairs in {:?} ({:.2} ns/pair)",
        iterations,
        duration,
        duration.as_nanos() as f64 / f64::from(iterations)
    );

    assert_eq!(drained, iterations);
    assert!(scheduler.is_empty());
    // Should complete in under 500ms
    assert!(duration.as_millis() < 500);
}

/// Benchmarks a long run of rounds driven through damage and timers
#[test]
fn benchmark_round_simulation() {
    let mut game = Match::with_rng(
        MatchConfig {
            rounds_to_win: u32::MAX,
            ..MatchConfig::default()
        },
        ArenaWorld::default_arena(),
        SpawnPoints::default_arena(),
        StdRng::seed_from_u64(3),
    );
    let players: Vec<(u32, Team)> = (1..=8).map(|id| (id, game.add_player(id))).collect();
    let reds: Vec<u32> = players
        .iter()
        .filter(|(_, team)| *team == Team::Red)
        .map(|(id, _)| *id)
        .collect();
    game.start_match();

    let rounds = 1000;
    let mut now = Instant::now();
    let start = Instant::now();

    for _ in 0..rounds {
        for &id in &reds {
            game.apply_damage(id, 100, now);
        }
        now += Duration::from_secs(5);
        game.advance(now);
    }

    let duration = start.elapsed();
    println!(
        "Round simulation: {} rounds in {:?} ({:.2} μs/round)",
        rounds,
        duration,
        duration.as_micros() as f64 / rounds as f64
    );

    assert_eq!(game.round_snapshot().blue_score, rounds);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}
