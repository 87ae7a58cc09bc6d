pub mod weapon;

pub use glam::Vec3;
pub use weapon::{should_fire, FireMode, WeaponProfile, WeaponRegistry};

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_HEALTH: u32 = 100;
pub const RESPAWN_DELAY_SECS: f32 = 3.0;
pub const NEXT_ROUND_DELAY_SECS: f32 = 3.0;
pub const ROUNDS_TO_WIN: u32 = 10;
/// Minimum spacing between two dry-fire notifications for one player.
pub const DRY_FIRE_COOLDOWN_SECS: f32 = 0.08;

/// The two sides of a match. Index 0 is red, 1 is blue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    /// Maps any requested index onto a valid team, clamping out-of-range values.
    pub fn from_index(index: i32) -> Team {
        if index <= 0 {
            Team::Red
        } else {
            Team::Blue
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Team::Red => 0,
            Team::Blue => 1,
        }
    }

    pub fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

/// Round controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPhase {
    Lobby,
    InProgress,
    RoundEnding,
    MatchOver,
}

/// Replicated view of one player's combat state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: u32,
    pub team: Team,
    pub health: u32,
    pub alive: bool,
    pub weapon_id: String,
    pub mag_ammo: u32,
    pub reserve_ammo: u32,
    pub is_reloading: bool,
    pub ready: bool,
    pub position: Vec3,
}

/// Replicated view of the round controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_number: u32,
    pub red_score: u32,
    pub blue_score: u32,
    pub phase: MatchPhase,
    pub rounds_to_win: u32,
}

impl RoundSnapshot {
    pub fn score(&self, team: Team) -> u32 {
        match team {
            Team::Red => self.red_score,
            Team::Blue => self.blue_score,
        }
    }
}

/// Everything that crosses the wire. Requests carry a per-client `sequence`
/// so the server can drop duplicates and stale retransmits.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Fire {
        sequence: u32,
        origin: Vec3,
        aim_forward: Vec3,
        is_aiming: bool,
        client_timestamp: u64,
    },
    Reload {
        sequence: u32,
    },
    TeamChange {
        sequence: u32,
        team: i32,
    },
    Ready {
        sequence: u32,
        ready: bool,
    },
    StartMatch {
        sequence: u32,
    },
    PositionUpdate {
        sequence: u32,
        position: Vec3,
    },
    Heartbeat,
    Disconnect,

    Connected {
        client_id: u32,
    },
    Disconnected {
        reason: String,
    },
    MatchState {
        tick: u32,
        timestamp: u64,
        round: RoundSnapshot,
        players: Vec<PlayerSnapshot>,
    },
    ShotFired {
        shooter_id: u32,
        visual_origin: Vec3,
        visual_hit_point: Vec3,
        any_hit: bool,
    },
    Hitmarker,
    DryFire,
    PlayerDied {
        player_id: u32,
        team: Team,
    },
    Respawned {
        player_id: u32,
        position: Vec3,
    },
}

impl Packet {
    /// The request sequence number, for packets that carry one.
    pub fn sequence(&self) -> Option<u32> {
        match self {
            Packet::Fire { sequence, .. }
            | Packet::Reload { sequence }
            | Packet::TeamChange { sequence, .. }
            | Packet::Ready { sequence, .. }
            | Packet::StartMatch { sequence }
            | Packet::PositionUpdate { sequence, .. } => Some(*sequence),
            _ => None,
        }
    }
}
