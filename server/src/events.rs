//! Change notifications pushed out of the match
//!
//! The match notifies every registered observer synchronously, in the order
//! the state changed. Observers get owned copies and never touch match state.

use shared::{RoundSnapshot, Team, Vec3};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    HealthChanged {
        player_id: u32,
        health: u32,
    },
    AliveChanged {
        player_id: u32,
        alive: bool,
    },
    AmmoChanged {
        player_id: u32,
        mag_ammo: u32,
        reserve_ammo: u32,
    },
    TeamChanged {
        player_id: u32,
        team: Team,
    },
    ReadyChanged {
        player_id: u32,
        ready: bool,
    },
    WeaponChanged {
        player_id: u32,
        weapon_id: String,
    },
    PlayerDied {
        player_id: u32,
        team: Team,
    },
    Respawned {
        player_id: u32,
        position: Vec3,
    },
    RoundChanged(RoundSnapshot),
    ShotFired {
        shooter_id: u32,
        visual_origin: Vec3,
        visual_hit_point: Vec3,
        any_hit: bool,
    },
    /// Only meant for the shooter.
    Hitmarker {
        shooter_id: u32,
    },
    /// Only meant for the player who pulled the trigger.
    DryFire {
        player_id: u32,
    },
}

/// Receives match events on the match loop.
pub trait MatchObserver: Send + Sync {
    fn on_event(&mut self, event: &MatchEvent);
}

impl MatchObserver for mpsc::UnboundedSender<MatchEvent> {
    fn on_event(&mut self, event: &MatchEvent) {
        // A closed receiver just means nobody is listening any more.
        let _ = self.send(event.clone());
    }
}
