//! Team membership and spawn lookup
//!
//! Teams are derived from player id parity so a reconnecting client lands on
//! the same side. Players may switch only while the match sits in the lobby.

use crate::error::Rejection;
use log::warn;
use shared::{MatchPhase, Team, Vec3};
use std::collections::HashMap;

pub const RED_SPAWN: &str = "RedSpawn";
pub const BLUE_SPAWN: &str = "BlueSpawn";
pub const LOBBY_SPAWN: &str = "LobbySpawn";

/// Named spawn locations of the loaded level.
#[derive(Debug, Clone, Default)]
pub struct SpawnPoints {
    points: HashMap<String, Vec3>,
}

impl SpawnPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Red and blue spawns at opposite ends of the default arena and a lobby
    /// area behind the red end.
    pub fn default_arena() -> Self {
        let mut spawns = Self::new();
        spawns.insert(RED_SPAWN, Vec3::new(0.0, 0.0, -30.0));
        spawns.insert(BLUE_SPAWN, Vec3::new(0.0, 0.0, 30.0));
        spawns.insert(LOBBY_SPAWN, Vec3::new(0.0, 0.0, -60.0));
        spawns
    }

    pub fn insert(&mut self, name: &str, position: Vec3) {
        self.points.insert(name.to_string(), position);
    }

    /// Looks up a spawn by name. A missing spawn is a level configuration
    /// gap: it is logged and the origin is used instead.
    pub fn resolve(&self, name: &str) -> Vec3 {
        match self.points.get(name) {
            Some(position) => *position,
            None => {
                warn!("Spawn point '{}' is missing, using origin", name);
                Vec3::ZERO
            }
        }
    }
}

pub struct TeamAssignment {
    teams: HashMap<u32, Team>,
    spawns: SpawnPoints,
}

impl TeamAssignment {
    pub fn new(spawns: SpawnPoints) -> Self {
        Self {
            teams: HashMap::new(),
            spawns,
        }
    }

    /// Deterministic starting side: even ids play red, odd ids play blue.
    pub fn initial_team_for(player_id: u32) -> Team {
        Team::from_index((player_id % 2) as i32)
    }

    /// Records and returns the starting side of a joining player.
    pub fn assign_initial_team(&mut self, player_id: u32) -> Team {
        let team = Self::initial_team_for(player_id);
        self.teams.insert(player_id, team);
        team
    }

    pub fn team_of(&self, player_id: u32) -> Option<Team> {
        self.teams.get(&player_id).copied()
    }

    /// Moves a player to `desired`, clamped onto a valid team. Allowed only
    /// in the lobby. Returns the team the player ends up on.
    pub fn request_team_change(
        &mut self,
        player_id: u32,
        desired: i32,
        phase: MatchPhase,
    ) -> Result<Team, Rejection> {
        if phase != MatchPhase::Lobby {
            return Err(Rejection::WrongPhase(phase));
        }
        let slot = self
            .teams
            .get_mut(&player_id)
            .ok_or(Rejection::UnknownPlayer(player_id))?;
        *slot = Team::from_index(desired);
        Ok(*slot)
    }

    pub fn remove(&mut self, player_id: u32) {
        self.teams.remove(&player_id);
    }

    /// The lobby spawn while in the lobby, otherwise the team's match spawn.
    pub fn spawn_position_for(&self, team: Team, phase: MatchPhase) -> Vec3 {
        if phase == MatchPhase::Lobby {
            self.spawns.resolve(LOBBY_SPAWN)
        } else {
            self.team_spawn(team)
        }
    }

    pub fn team_spawn(&self, team: Team) -> Vec3 {
        match team {
            Team::Red => self.spawns.resolve(RED_SPAWN),
            Team::Blue => self.spawns.resolve(BLUE_SPAWN),
        }
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}
