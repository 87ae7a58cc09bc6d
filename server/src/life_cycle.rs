//! Damage, death and respawn
//!
//! Damage only lands while a round is live and only on living players, which
//! makes late or duplicated hits harmless: a second kill shot on a corpse can
//! neither report another death nor queue another respawn.

use crate::combat::Roster;
use crate::teams::TeamAssignment;
use crate::timers::{Scheduler, TimerEvent};
use log::{debug, info};
use shared::{MatchPhase, Team, Vec3};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    pub target_id: u32,
    pub team: Team,
    pub new_health: u32,
    /// True only for the hit that took the target from alive to dead.
    pub died: bool,
}

/// Applies damage and brings dead players back.
///
/// Holds no per-player state of its own; health and the life counter live in
/// the roster, and pending respawns live in the scheduler.
pub struct LifeCycle {
    respawn_delay: Duration,
}

impl LifeCycle {
    pub fn new(respawn_delay: Duration) -> Self {
        Self { respawn_delay }
    }

    pub fn respawn_delay(&self) -> Duration {
        self.respawn_delay
    }

    /// Subtracts `amount` from the target's health.
    ///
    /// Returns `None` without touching anything when the target is unknown,
    /// already dead, or the round is not live. Negative amounts count as zero.
    /// A killing blow marks the player dead, drops any reload in progress and
    /// schedules the respawn; the caller reports the death to the round
    /// controller.
    pub fn apply_damage(
        &self,
        roster: &mut Roster,
        phase: MatchPhase,
        target_id: u32,
        amount: i32,
        now: Instant,
        scheduler: &mut Scheduler,
    ) -> Option<DamageOutcome> {
        if phase != MatchPhase::InProgress {
            debug!("Ignoring damage to {} during {:?}", target_id, phase);
            return None;
        }
        let target = roster.get_mut(&target_id)?;
        if !target.alive {
            return None;
        }

        let amount = amount.max(0) as u32;
        target.health = target.health.saturating_sub(amount).min(target.max_health);

        let died = target.health == 0;
        if died {
            target.alive = false;
            target.life = target.life.wrapping_add(1);
            target.cancel_reload();
            info!("Player {} ({:?}) died", target_id, target.team);
            self.respawn_after(scheduler, target_id, target.life, now);
        }

        Some(DamageOutcome {
            target_id,
            team: target.team,
            new_health: target.health,
            died,
        })
    }

    /// Queues the natural respawn of the death identified by `life`.
    pub fn respawn_after(&self, scheduler: &mut Scheduler, player_id: u32, life: u32, now: Instant) {
        scheduler.schedule(
            now + self.respawn_delay,
            TimerEvent::Respawn { player_id, life },
        );
    }

    /// Runs a due respawn. Stale entries (the player was already brought back,
    /// or has died again since) are ignored. Returns the spawn position used.
    pub fn complete_respawn(
        &self,
        roster: &mut Roster,
        teams: &TeamAssignment,
        phase: MatchPhase,
        player_id: u32,
        life: u32,
    ) -> Option<Vec3> {
        let player = roster.get_mut(&player_id)?;
        if player.alive || player.life != life {
            return None;
        }

        let position = teams.spawn_position_for(player.team, phase);
        player.restore(position);
        info!("Player {} respawned at {:?}", player_id, position);
        Some(position)
    }

    /// Immediately restores a player at their team spawn, whatever the phase.
    /// Used at round boundaries.
    pub fn force_respawn_at_team_spawn(
        &self,
        roster: &mut Roster,
        teams: &TeamAssignment,
        player_id: u32,
    ) -> Option<Vec3> {
        let player = roster.get_mut(&player_id)?;
        let position = teams.team_spawn(player.team);
        player.restore(position);
        Some(position)
    }
}
