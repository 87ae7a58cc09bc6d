//! Per-player combat state owned by the match loop
//!
//! Holds health, life flag, team, the equipped weapon and its ammo, and the
//! fire/reload clocks. All mutation clamps into the documented ranges so an
//! out-of-range request can never leave the state inconsistent.

use crate::error::Rejection;
use shared::{PlayerSnapshot, Team, Vec3, WeaponProfile, DRY_FIRE_COOLDOWN_SECS};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// All players of a match keyed by id. Ordered so scans and snapshots are
/// deterministic.
pub type Roster = BTreeMap<u32, PlayerCombatState>;

/// Result of pulling the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireGate {
    Fired,
    Reloading,
    Cooldown,
    /// Empty magazine. `notify` is false while the dry-fire debounce is running.
    DryFire { notify: bool },
}

/// Everything the server tracks to decide whether a player may shoot, how
/// much they can take, and what to replicate to clients.
///
/// `health` stays within `0..=max_health`, ammo never exceeds the equipped
/// weapon's capacity, and `health == 0` always means `alive == false`.
#[derive(Debug, Clone)]
pub struct PlayerCombatState {
    pub player_id: u32,
    pub team: Team,
    pub health: u32,
    pub max_health: u32,
    pub alive: bool,
    pub weapon: Arc<WeaponProfile>,
    pub mag_ammo: u32,
    pub reserve_ammo: u32,
    pub is_reloading: bool,
    pub next_fire_time: Option<Instant>,
    pub last_dry_fire_time: Option<Instant>,
    pub position: Vec3,
    pub ready: bool,
    /// Bumped on every death.
    pub life: u32,
    /// Bumped whenever an in-flight reload must be forgotten.
    pub reload_epoch: u32,
}

impl PlayerCombatState {
    /// A freshly joined player: full health, full ammo, weapon ready.
    pub fn new(
        player_id: u32,
        team: Team,
        weapon: Arc<WeaponProfile>,
        max_health: u32,
        position: Vec3,
    ) -> Self {
        let mag_ammo = weapon.magazine_size;
        let reserve_ammo = weapon.max_reserve_ammo;
        Self {
            player_id,
            team,
            health: max_health,
            max_health,
            alive: true,
            weapon,
            mag_ammo,
            reserve_ammo,
            is_reloading: false,
            next_fire_time: None,
            last_dry_fire_time: None,
            position,
            ready: false,
            life: 0,
            reload_epoch: 0,
        }
    }

    /// Swaps the weapon and refills it.
    pub fn equip(&mut self, weapon: Arc<WeaponProfile>) {
        self.weapon = weapon;
        self.cancel_reload();
        self.next_fire_time = None;
        self.give_full_ammo();
    }

    pub fn give_full_ammo(&mut self) {
        self.mag_ammo = self.weapon.magazine_size;
        self.reserve_ammo = self.weapon.max_reserve_ammo;
    }

    /// Adds (or, for a negative amount, removes) reserve rounds, clamped to
    /// the weapon's capacity. Returns the new reserve.
    pub fn add_reserve_ammo(&mut self, amount: i32) -> u32 {
        let current = i64::from(self.reserve_ammo);
        let next = (current + i64::from(amount)).clamp(0, i64::from(self.weapon.max_reserve_ammo));
        self.reserve_ammo = next as u32;
        self.reserve_ammo
    }

    /// Gates one trigger pull at `now`.
    ///
    /// The cooldown advances even on a dry fire so an empty weapon cannot be
    /// spammed faster than its fire rate.
    pub fn try_fire(&mut self, now: Instant) -> FireGate {
        if self.is_reloading {
            return FireGate::Reloading;
        }
        if let Some(next) = self.next_fire_time {
            if now < next {
                return FireGate::Cooldown;
            }
        }

        self.next_fire_time = Some(now + self.weapon.fire_interval());

        if self.mag_ammo == 0 {
            let debounce = Duration::from_secs_f32(DRY_FIRE_COOLDOWN_SECS);
            let notify = self
                .last_dry_fire_time
                .map_or(true, |last| now.saturating_duration_since(last) >= debounce);
            if notify {
                self.last_dry_fire_time = Some(now);
            }
            return FireGate::DryFire { notify };
        }

        self.mag_ammo -= 1;
        FireGate::Fired
    }

    /// Starts a reload and returns the epoch its completion must present.
    ///
    /// The caller schedules the completion for `weapon.reload_duration()`
    /// later. If the player dies or swaps weapons in between, the epoch moves
    /// on and the completion is ignored.
    ///
    /// # Errors
    /// `Reloading` while a reload is already running, `MagazineFull` when
    /// there is nothing to top up and `NoReserveAmmo` when there is nothing
    /// to top up with.
    pub fn begin_reload(&mut self) -> Result<u32, Rejection> {
        if self.is_reloading {
            return Err(Rejection::Reloading);
        }
        if self.mag_ammo >= self.weapon.magazine_size {
            return Err(Rejection::MagazineFull);
        }
        if self.reserve_ammo == 0 {
            return Err(Rejection::NoReserveAmmo);
        }
        self.is_reloading = true;
        Ok(self.reload_epoch)
    }

    /// Moves rounds from reserve into the magazine. Returns false when the
    /// reload was cancelled after it started.
    pub fn finish_reload(&mut self, epoch: u32) -> bool {
        if !self.is_reloading || epoch != self.reload_epoch {
            return false;
        }
        let needed = self.weapon.magazine_size.saturating_sub(self.mag_ammo);
        let to_load = needed.min(self.reserve_ammo);
        self.mag_ammo += to_load;
        self.reserve_ammo -= to_load;
        self.is_reloading = false;
        true
    }

    /// Abandons any reload in flight. Its pending completion becomes stale.
    pub fn cancel_reload(&mut self) {
        self.is_reloading = false;
        self.reload_epoch = self.reload_epoch.wrapping_add(1);
    }

    /// Full health, alive, standing at `position`.
    pub fn restore(&mut self, position: Vec3) {
        self.health = self.max_health;
        self.alive = true;
        self.position = position;
    }

    /// Replicated view sent to clients every tick.
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.player_id,
            team: self.team,
            health: self.health,
            alive: self.alive,
            weapon_id: self.weapon.id.clone(),
            mag_ammo: self.mag_ammo,
            reserve_ammo: self.reserve_ammo,
            is_reloading: self.is_reloading,
            ready: self.ready,
            position: self.position,
        }
    }
}
