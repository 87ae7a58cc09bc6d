//! Round and match state machine
//!
//! ```text
//!  Lobby ──start──▶ InProgress ──team wiped──▶ RoundEnding ──delay──▶ InProgress
//!    ▲                                             │
//!    └──────────── start ◀── MatchOver ◀──score reached roundsToWin
//! ```
//!
//! A round is decided by scanning who is still alive, never by counting
//! kills, so duplicated or late death reports cannot award extra points. The
//! `InProgress → RoundEnding` edge is the only place a score changes and it
//! cannot be taken twice in one round.

use crate::combat::Roster;
use crate::timers::{Scheduler, TimerEvent};
use log::info;
use shared::{MatchPhase, RoundSnapshot, Team};
use std::time::{Duration, Instant};

/// What happens when the round-ending pause runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundAdvance {
    /// A new round with this number starts; everyone must be reset.
    NextRound(u32),
    /// A team reached the winning score.
    MatchOver(Team),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundState {
    pub round_number: u32,
    pub red_score: u32,
    pub blue_score: u32,
    pub phase: MatchPhase,
    pub rounds_to_win: u32,
}

/// Drives a match through its phases.
///
/// Lobby until the host starts, then alternating `InProgress` and
/// `RoundEnding` until a team has won `rounds_to_win` rounds, then
/// `MatchOver` until the next start. Scores only ever change on the
/// transition out of `InProgress`, so duplicate death reports cannot award a
/// round twice.
pub struct RoundController {
    state: RoundState,
    next_round_delay: Duration,
}

impl RoundController {
    /// A controller waiting in the lobby at round 1. A `rounds_to_win` of
    /// zero is treated as one.
    pub fn new(rounds_to_win: u32, next_round_delay: Duration) -> Self {
        Self {
            state: RoundState {
                round_number: 1,
                red_score: 0,
                blue_score: 0,
                phase: MatchPhase::Lobby,
                rounds_to_win: rounds_to_win.max(1),
            },
            next_round_delay,
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.phase
    }

    pub fn score(&self, team: Team) -> u32 {
        match team {
            Team::Red => self.state.red_score,
            Team::Blue => self.state.blue_score,
        }
    }

    /// A match can only be started from the lobby or after the previous one
    /// finished.
    pub fn can_start_match(&self) -> bool {
        matches!(self.state.phase, MatchPhase::Lobby | MatchPhase::MatchOver)
    }

    /// Zeroes the scores and rewinds to round 1. The caller resets players
    /// and then calls [`RoundController::enter_in_progress`].
    pub fn reset_for_new_match(&mut self) -> bool {
        if !self.can_start_match() {
            return false;
        }
        self.state.red_score = 0;
        self.state.blue_score = 0;
        self.state.round_number = 1;
        true
    }

    /// Opens the current round for combat. Called after the players have
    /// been reset, both on match start and after each round-ending pause.
    pub fn enter_in_progress(&mut self) {
        self.state.phase = MatchPhase::InProgress;
        info!("Round {} started", self.state.round_number);
    }

    /// Handles a death on `dead_team`. When nobody on that team is left
    /// alive the other team takes the round, the controller moves to
    /// `RoundEnding` and the next-round timer is queued. Returns the round
    /// winner.
    pub fn on_player_died(
        &mut self,
        dead_team: Team,
        roster: &Roster,
        now: Instant,
        scheduler: &mut Scheduler,
    ) -> Option<Team> {
        if self.state.phase != MatchPhase::InProgress {
            return None;
        }
        if team_has_survivors(roster, dead_team) {
            return None;
        }

        let winner = dead_team.opponent();
        match winner {
            Team::Red => self.state.red_score += 1,
            Team::Blue => self.state.blue_score += 1,
        }
        self.state.phase = MatchPhase::RoundEnding;

        info!(
            "{:?} won round {}. Score: Red {} - Blue {}",
            winner, self.state.round_number, self.state.red_score, self.state.blue_score
        );

        scheduler.schedule(
            now + self.next_round_delay,
            TimerEvent::NextRound {
                round_number: self.state.round_number,
            },
        );
        Some(winner)
    }

    /// Handles the end of the round-ending pause of `round_number`. Stale
    /// timers from an earlier round or match return `None`.
    pub fn on_round_ending_elapsed(&mut self, round_number: u32) -> Option<RoundAdvance> {
        if self.state.phase != MatchPhase::RoundEnding || self.state.round_number != round_number {
            return None;
        }

        if let Some(winner) = self.leader_at_target() {
            self.state.phase = MatchPhase::MatchOver;
            info!(
                "{:?} won the match {} - {}",
                winner,
                self.score(winner),
                self.score(winner.opponent())
            );
            return Some(RoundAdvance::MatchOver(winner));
        }

        self.state.round_number += 1;
        Some(RoundAdvance::NextRound(self.state.round_number))
    }

    /// The winning team once the match is over.
    pub fn winner(&self) -> Option<Team> {
        if self.state.phase == MatchPhase::MatchOver {
            self.leader_at_target()
        } else {
            None
        }
    }

    fn leader_at_target(&self) -> Option<Team> {
        if self.state.red_score >= self.state.rounds_to_win {
            Some(Team::Red)
        } else if self.state.blue_score >= self.state.rounds_to_win {
            Some(Team::Blue)
        } else {
            None
        }
    }

    /// Replicated view of the round, scores and phase.
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            round_number: self.state.round_number,
            red_score: self.state.red_score,
            blue_score: self.state.blue_score,
            phase: self.state.phase,
            rounds_to_win: self.state.rounds_to_win,
        }
    }
}

fn team_has_survivors(roster: &Roster, team: Team) -> bool {
    roster
        .values()
        .any(|player| player.team == team && player.alive)
}
