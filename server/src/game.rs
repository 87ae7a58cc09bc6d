//! The authoritative match
//!
//! `Match` is the single writer for everything gameplay-related: the roster,
//! the round state machine, teams, weapons and deferred timers. The server
//! loop owns one and feeds it requests and clock ticks; everything else only
//! sees snapshots and [`MatchEvent`]s.

use crate::combat::{FireGate, PlayerCombatState, Roster};
use crate::error::Rejection;
use crate::events::{MatchEvent, MatchObserver};
use crate::hit_resolver::{aim_direction, resolve_shot, ShotResult};
use crate::life_cycle::{DamageOutcome, LifeCycle};
use crate::round::{RoundAdvance, RoundController};
use crate::teams::{SpawnPoints, TeamAssignment};
use crate::timers::{Scheduler, TimerEvent};
use crate::world::{ArenaWorld, Hitbox, PopulatedWorld, WorldQuery};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    MatchPhase, PlayerSnapshot, RoundSnapshot, Team, Vec3, WeaponProfile, WeaponRegistry,
    MAX_HEALTH, NEXT_ROUND_DELAY_SECS, RESPAWN_DELAY_SECS, ROUNDS_TO_WIN,
};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub rounds_to_win: u32,
    pub next_round_delay: Duration,
    pub respawn_delay: Duration,
    pub max_health: u32,
    /// When set, the host can only start once every player is ready.
    pub require_all_ready: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            rounds_to_win: ROUNDS_TO_WIN,
            next_round_delay: Duration::from_secs_f32(NEXT_ROUND_DELAY_SECS),
            respawn_delay: Duration::from_secs_f32(RESPAWN_DELAY_SECS),
            max_health: MAX_HEALTH,
            require_all_ready: true,
        }
    }
}

/// A trigger pull as reported by a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireRequest {
    pub shooter_id: u32,
    /// Camera position of the shooter.
    pub origin: Vec3,
    pub aim_forward: Vec3,
    pub is_aiming: bool,
    pub client_timestamp: u64,
}

impl FireRequest {
    /// Checks the reported pose and returns the unit aim direction.
    ///
    /// Clients send whatever their camera produced; a non-finite origin or
    /// an aim with no direction is refused before any ammo is spent.
    fn validate(&self) -> Result<Vec3, Rejection> {
        if !self.origin.is_finite() {
            return Err(Rejection::InvalidAim);
        }
        aim_direction(self.aim_forward).ok_or(Rejection::InvalidAim)
    }
}

/// One running match: the roster and every controller acting on it.
///
/// The server loop is the only owner. Requests come in through the
/// `handle_*` methods, which either apply fully or return a [`Rejection`]
/// and change nothing. Clock-driven work (respawns, reload completions, the
/// pause between rounds) happens in [`Match::advance`]. Every state change is
/// reported to the subscribed observers in the order it happened.
pub struct Match<W: WorldQuery = ArenaWorld> {
    config: MatchConfig,
    roster: Roster,
    round: RoundController,
    teams: TeamAssignment,
    weapons: WeaponRegistry,
    life_cycle: LifeCycle,
    geometry: W,
    scheduler: Scheduler,
    rng: StdRng,
    observers: Vec<Box<dyn MatchObserver>>,
}

impl<W: WorldQuery> Match<W> {
    pub fn new(config: MatchConfig, geometry: W, spawns: SpawnPoints) -> Self {
        Self::with_rng(config, geometry, spawns, StdRng::from_entropy())
    }

    /// Same as [`Match::new`] with a caller-supplied RNG, so pellet spread
    /// can be replayed.
    pub fn with_rng(config: MatchConfig, geometry: W, spawns: SpawnPoints, rng: StdRng) -> Self {
        Self {
            round: RoundController::new(config.rounds_to_win, config.next_round_delay),
            life_cycle: LifeCycle::new(config.respawn_delay),
            config,
            roster: Roster::new(),
            teams: TeamAssignment::new(spawns),
            weapons: WeaponRegistry::default(),
            geometry,
            scheduler: Scheduler::new(),
            rng,
            observers: Vec::new(),
        }
    }

    /// Registers an observer for every future [`MatchEvent`].
    ///
    /// Observers are called synchronously from inside the mutating call, so
    /// they must not block. The server subscribes an unbounded channel
    /// sender and drains it after each request.
    pub fn subscribe(&mut self, observer: Box<dyn MatchObserver>) {
        self.observers.push(observer);
    }

    /// Adds or replaces a weapon archetype available to pickups.
    pub fn register_weapon(&mut self, profile: WeaponProfile) {
        self.weapons.register(profile);
    }

    fn emit(&mut self, event: MatchEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    fn emit_round(&mut self) {
        let snapshot = self.round.snapshot();
        self.emit(MatchEvent::RoundChanged(snapshot));
    }

    /// Seats a new player on their default team. Joining an existing id is a
    /// no-op that returns the current team.
    pub fn add_player(&mut self, player_id: u32) -> Team {
        if let Some(existing) = self.roster.get(&player_id) {
            return existing.team;
        }

        let team = self.teams.assign_initial_team(player_id);
        let position = self.teams.spawn_position_for(team, self.round.phase());
        let state = PlayerCombatState::new(
            player_id,
            team,
            self.weapons.starter(),
            self.config.max_health,
            position,
        );
        self.roster.insert(player_id, state);
        info!("Player {} joined {:?} at {:?}", player_id, team, position);

        self.emit(MatchEvent::TeamChanged { player_id, team });
        self.emit(MatchEvent::Respawned {
            player_id,
            position,
        });
        team
    }

    /// Drops a player. Leaving alive during a live round counts as leaving
    /// the team's survivor pool, so the round can still end.
    pub fn remove_player(&mut self, player_id: u32, now: Instant) -> bool {
        let Some(player) = self.roster.remove(&player_id) else {
            return false;
        };
        self.teams.remove(player_id);
        info!("Player {} left", player_id);

        if player.alive {
            let winner =
                self.round
                    .on_player_died(player.team, &self.roster, now, &mut self.scheduler);
            if winner.is_some() {
                self.emit_round();
            }
        }
        true
    }

    /// Stores the owner-reported feet position used for hitboxes.
    pub fn update_position(&mut self, player_id: u32, position: Vec3) -> Result<(), Rejection> {
        if !position.is_finite() {
            return Err(Rejection::InvalidPosition);
        }
        let player = self
            .roster
            .get_mut(&player_id)
            .ok_or(Rejection::UnknownPlayer(player_id))?;
        if !player.alive {
            return Err(Rejection::Dead);
        }
        player.position = position;
        Ok(())
    }

    /// Gates, resolves and applies one trigger pull.
    ///
    /// The request is refused outside a live round, for a bad pose, for an
    /// unknown or dead shooter, while reloading or during the fire cooldown.
    /// An empty magazine is a dry fire: no shot, and a `DryFire` event at
    /// most once per debounce window.
    ///
    /// On success the round is spent, the shot is traced against the level
    /// and every living player's hitbox, and the resulting damage is applied
    /// pellet by pellet. A pellet that kills its target makes later pellets
    /// on the same target no-ops.
    pub fn handle_fire(&mut self, request: FireRequest, now: Instant) -> Result<ShotResult, Rejection> {
        let phase = self.round.phase();
        if phase != MatchPhase::InProgress {
            return Err(Rejection::WrongPhase(phase));
        }
        let aim_forward = request.validate()?;

        let shooter_id = request.shooter_id;
        let shooter = self
            .roster
            .get_mut(&shooter_id)
            .ok_or(Rejection::UnknownPlayer(shooter_id))?;
        if !shooter.alive {
            return Err(Rejection::Dead);
        }

        match shooter.try_fire(now) {
            FireGate::Fired => {}
            FireGate::Reloading => return Err(Rejection::Reloading),
            FireGate::Cooldown => return Err(Rejection::Cooldown),
            FireGate::DryFire { notify } => {
                if notify {
                    self.emit(MatchEvent::DryFire {
                        player_id: shooter_id,
                    });
                }
                return Err(Rejection::MagazineEmpty);
            }
        }
        let (mag_ammo, reserve_ammo) = (shooter.mag_ammo, shooter.reserve_ammo);
        self.emit(MatchEvent::AmmoChanged {
            player_id: shooter_id,
            mag_ammo,
            reserve_ammo,
        });

        let hitboxes: Vec<Hitbox> = self
            .roster
            .values()
            .filter(|player| player.alive)
            .map(|player| Hitbox::standing(player.player_id, player.position))
            .collect();
        let world = PopulatedWorld {
            geometry: &self.geometry,
            hitboxes: &hitboxes,
        };
        let result = resolve_shot(
            shooter_id,
            request.origin,
            aim_forward,
            request.is_aiming,
            &world,
            &self.roster,
            &mut self.rng,
        )
        .ok_or(Rejection::UnknownPlayer(shooter_id))?;

        self.emit(MatchEvent::ShotFired {
            shooter_id,
            visual_origin: result.visual_origin,
            visual_hit_point: result.visual_hit_point,
            any_hit: result.any_hit,
        });
        if result.hitmarker() {
            self.emit(MatchEvent::Hitmarker { shooter_id });
        }

        for event in &result.damage_events {
            let amount = i32::try_from(event.amount).unwrap_or(i32::MAX);
            self.apply_damage(event.target_id, amount, now);
        }
        Ok(result)
    }

    /// Applies damage and, on a kill, lets the round controller check for a
    /// wiped team.
    pub fn apply_damage(&mut self, target_id: u32, amount: i32, now: Instant) -> Option<DamageOutcome> {
        let outcome = self.life_cycle.apply_damage(
            &mut self.roster,
            self.round.phase(),
            target_id,
            amount,
            now,
            &mut self.scheduler,
        )?;

        self.emit(MatchEvent::HealthChanged {
            player_id: target_id,
            health: outcome.new_health,
        });

        if outcome.died {
            self.emit(MatchEvent::AliveChanged {
                player_id: target_id,
                alive: false,
            });
            self.emit(MatchEvent::PlayerDied {
                player_id: target_id,
                team: outcome.team,
            });
            let winner =
                self.round
                    .on_player_died(outcome.team, &self.roster, now, &mut self.scheduler);
            if winner.is_some() {
                self.emit_round();
            }
        }
        Some(outcome)
    }

    /// Starts a reload for a living player during a live round.
    ///
    /// The magazine is topped up when the timer fires in [`Match::advance`],
    /// unless the player dies first.
    pub fn handle_reload(&mut self, player_id: u32, now: Instant) -> Result<(), Rejection> {
        let phase = self.round.phase();
        if phase != MatchPhase::InProgress {
            return Err(Rejection::WrongPhase(phase));
        }
        let player = self
            .roster
            .get_mut(&player_id)
            .ok_or(Rejection::UnknownPlayer(player_id))?;
        if !player.alive {
            return Err(Rejection::Dead);
        }

        let epoch = player.begin_reload()?;
        let deadline = now + player.weapon.reload_duration();
        self.scheduler
            .schedule(deadline, TimerEvent::ReloadComplete { player_id, epoch });
        debug!("Player {} reloading", player_id);
        Ok(())
    }

    /// Moves a player to another team while in the lobby. Out-of-range team
    /// ids are clamped.
    pub fn handle_team_change(&mut self, player_id: u32, desired: i32) -> Result<Team, Rejection> {
        if !self.roster.contains_key(&player_id) {
            return Err(Rejection::UnknownPlayer(player_id));
        }
        let team = self
            .teams
            .request_team_change(player_id, desired, self.round.phase())?;
        if let Some(player) = self.roster.get_mut(&player_id) {
            player.team = team;
        }
        info!("Player {} switched to {:?}", player_id, team);
        self.emit(MatchEvent::TeamChanged { player_id, team });
        Ok(team)
    }

    /// Sets the lobby ready flag. The flag survives into later matches, so a
    /// rematch only needs the host to start again.
    ///
    /// Emits `ReadyChanged` only when the flag actually changes.
    pub fn handle_ready(&mut self, player_id: u32, ready: bool) -> Result<(), Rejection> {
        let player = self
            .roster
            .get_mut(&player_id)
            .ok_or(Rejection::UnknownPlayer(player_id))?;
        if player.ready != ready {
            player.ready = ready;
            self.emit(MatchEvent::ReadyChanged { player_id, ready });
        }
        Ok(())
    }

    /// A start request from a client: only the host may start, and only once
    /// everyone is ready unless the config says otherwise.
    pub fn handle_start_match(&mut self, requester: u32) -> Result<(), Rejection> {
        if !self.roster.contains_key(&requester) {
            return Err(Rejection::UnknownPlayer(requester));
        }
        if !self.round.can_start_match() {
            return Err(Rejection::WrongPhase(self.round.phase()));
        }
        if self.host_id() != Some(requester) {
            return Err(Rejection::NotHost);
        }
        if self.config.require_all_ready && !self.roster.values().all(|player| player.ready) {
            return Err(Rejection::PlayersNotReady);
        }
        self.start_match();
        Ok(())
    }

    /// Starts a fresh match from the lobby or after a finished match.
    /// Returns false, changing nothing, while a match is running.
    pub fn start_match(&mut self) -> bool {
        if !self.round.reset_for_new_match() {
            debug!("Ignoring start during {:?}", self.round.phase());
            return false;
        }
        self.scheduler.clear();
        self.reset_all_players();
        self.round.enter_in_progress();
        self.emit_round();
        true
    }

    /// Round-start loadout for everyone: starter weapon, full ammo, full
    /// health, standing at the team spawn.
    pub fn reset_all_players(&mut self) {
        let starter = self.weapons.starter();
        let ids: Vec<u32> = self.roster.keys().copied().collect();
        for player_id in ids {
            if let Some(player) = self.roster.get_mut(&player_id) {
                player.equip(starter.clone());
            }
            let Some(position) =
                self.life_cycle
                    .force_respawn_at_team_spawn(&mut self.roster, &self.teams, player_id)
            else {
                continue;
            };
            self.emit_player_refresh(player_id, position);
        }
    }

    fn emit_player_refresh(&mut self, player_id: u32, position: Vec3) {
        let Some(player) = self.roster.get(&player_id) else {
            return;
        };
        let events = [
            MatchEvent::WeaponChanged {
                player_id,
                weapon_id: player.weapon.id.clone(),
            },
            MatchEvent::AmmoChanged {
                player_id,
                mag_ammo: player.mag_ammo,
                reserve_ammo: player.reserve_ammo,
            },
            MatchEvent::HealthChanged {
                player_id,
                health: player.health,
            },
            MatchEvent::AliveChanged {
                player_id,
                alive: true,
            },
            MatchEvent::Respawned {
                player_id,
                position,
            },
        ];
        for event in events {
            self.emit(event);
        }
    }

    /// Runs every timer due at `now`. Returns how many fired.
    pub fn advance(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(event) = self.scheduler.pop_due(now) {
            fired += 1;
            match event {
                TimerEvent::Respawn { player_id, life } => self.on_respawn_due(player_id, life),
                TimerEvent::ReloadComplete { player_id, epoch } => {
                    self.on_reload_due(player_id, epoch)
                }
                TimerEvent::NextRound { round_number } => self.on_next_round_due(round_number),
            }
        }
        fired
    }

    fn on_respawn_due(&mut self, player_id: u32, life: u32) {
        let position = self.life_cycle.complete_respawn(
            &mut self.roster,
            &self.teams,
            self.round.phase(),
            player_id,
            life,
        );
        let Some(position) = position else {
            return;
        };
        let health = self.roster.get(&player_id).map_or(0, |p| p.health);
        self.emit(MatchEvent::HealthChanged { player_id, health });
        self.emit(MatchEvent::AliveChanged {
            player_id,
            alive: true,
        });
        self.emit(MatchEvent::Respawned {
            player_id,
            position,
        });
    }

    fn on_reload_due(&mut self, player_id: u32, epoch: u32) {
        let Some(player) = self.roster.get_mut(&player_id) else {
            return;
        };
        if !player.finish_reload(epoch) {
            return;
        }
        let (mag_ammo, reserve_ammo) = (player.mag_ammo, player.reserve_ammo);
        self.emit(MatchEvent::AmmoChanged {
            player_id,
            mag_ammo,
            reserve_ammo,
        });
    }

    fn on_next_round_due(&mut self, round_number: u32) {
        match self.round.on_round_ending_elapsed(round_number) {
            Some(RoundAdvance::NextRound(_)) => {
                self.reset_all_players();
                self.round.enter_in_progress();
                self.emit_round();
            }
            Some(RoundAdvance::MatchOver(_)) => self.emit_round(),
            None => debug!("Dropping stale next-round timer for round {}", round_number),
        }
    }

    /// Weapon pickup: swaps to `weapon_id` with full ammo.
    ///
    /// Any reload in flight is abandoned. Unknown weapon ids are logged and
    /// leave the player's loadout untouched.
    pub fn equip_weapon(&mut self, player_id: u32, weapon_id: &str) -> Result<(), Rejection> {
        let Some(weapon) = self.weapons.get(weapon_id) else {
            warn!("Weapon '{}' is not registered", weapon_id);
            return Err(Rejection::UnknownWeapon(weapon_id.to_string()));
        };
        let player = self
            .roster
            .get_mut(&player_id)
            .ok_or(Rejection::UnknownPlayer(player_id))?;
        player.equip(weapon);
        let (mag_ammo, reserve_ammo) = (player.mag_ammo, player.reserve_ammo);

        self.emit(MatchEvent::WeaponChanged {
            player_id,
            weapon_id: weapon_id.to_string(),
        });
        self.emit(MatchEvent::AmmoChanged {
            player_id,
            mag_ammo,
            reserve_ammo,
        });
        Ok(())
    }

    /// Ammo pickup. Returns the new reserve count.
    pub fn add_reserve_ammo(&mut self, player_id: u32, amount: i32) -> Result<u32, Rejection> {
        let player = self
            .roster
            .get_mut(&player_id)
            .ok_or(Rejection::UnknownPlayer(player_id))?;
        let reserve_ammo = player.add_reserve_ammo(amount);
        let mag_ammo = player.mag_ammo;
        self.emit(MatchEvent::AmmoChanged {
            player_id,
            mag_ammo,
            reserve_ammo,
        });
        Ok(reserve_ammo)
    }

    /// Refills magazine and reserve of the equipped weapon.
    pub fn give_full_ammo(&mut self, player_id: u32) -> Result<(), Rejection> {
        let player = self
            .roster
            .get_mut(&player_id)
            .ok_or(Rejection::UnknownPlayer(player_id))?;
        player.give_full_ammo();
        let (mag_ammo, reserve_ammo) = (player.mag_ammo, player.reserve_ammo);
        self.emit(MatchEvent::AmmoChanged {
            player_id,
            mag_ammo,
            reserve_ammo,
        });
        Ok(())
    }

    pub fn player(&self, player_id: u32) -> Option<&PlayerCombatState> {
        self.roster.get(&player_id)
    }

    /// Replicated state of every player, ordered by id.
    pub fn player_snapshots(&self) -> Vec<PlayerSnapshot> {
        self.roster.values().map(PlayerCombatState::snapshot).collect()
    }

    pub fn round_snapshot(&self) -> RoundSnapshot {
        self.round.snapshot()
    }

    pub fn phase(&self) -> MatchPhase {
        self.round.phase()
    }

    pub fn winner(&self) -> Option<Team> {
        self.round.winner()
    }

    /// The player allowed to start the match.
    ///
    /// This is the lowest seated id. Ids are handed out in connection order,
    /// so the host is normally the longest-connected player, and when the
    /// host leaves the role passes to the next one automatically.
    pub fn host_id(&self) -> Option<u32> {
        self.roster.keys().next().copied()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }
}
