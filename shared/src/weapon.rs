//! Weapon archetype data shared by the server and any client tooling.
//!
//! Profiles are immutable once loaded and handed out as `Arc<WeaponProfile>`,
//! so every player carrying the same archetype points at the same record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// How the trigger maps to shots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireMode {
    /// One shot per press.
    SemiAuto,
    /// Continuous fire while held.
    FullAuto,
}

/// Decides whether the trigger state asks for a shot.
///
/// `input_edge` is true only on the frame the trigger went down; `input_held`
/// stays true while it is down. Cooldowns are checked separately by the server.
pub fn should_fire(mode: FireMode, input_edge: bool, input_held: bool) -> bool {
    match mode {
        FireMode::SemiAuto => input_edge,
        FireMode::FullAuto => input_held,
    }
}

/// Immutable stat record for one weapon archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponProfile {
    pub id: String,
    pub damage: u32,
    /// Shots per second.
    pub fire_rate: f32,
    pub range: f32,
    pub pellets_per_shot: u32,
    /// Half-angle of the pellet cone in degrees.
    pub spread_angle_deg: f32,
    /// Scale applied to the spread while aiming down sights, in `[0, 1]`.
    pub ads_spread_multiplier: f32,
    pub magazine_size: u32,
    pub max_reserve_ammo: u32,
    pub reload_time_sec: f32,
    pub fire_mode: FireMode,
    pub headshot_multiplier: f32,
}

impl WeaponProfile {
    /// Clamps raw table values into the ranges the combat code relies on.
    pub fn sanitized(mut self) -> Self {
        self.pellets_per_shot = self.pellets_per_shot.max(1);
        self.spread_angle_deg = finite_or(self.spread_angle_deg, 0.0).max(0.0);
        self.ads_spread_multiplier = finite_or(self.ads_spread_multiplier, 1.0).clamp(0.0, 1.0);
        self.magazine_size = self.magazine_size.max(1);
        self.reload_time_sec = finite_or(self.reload_time_sec, 1.0).max(0.01);
        self.fire_rate = finite_or(self.fire_rate, 1.0).max(0.01);
        self.range = finite_or(self.range, 0.0).max(0.0);
        self.headshot_multiplier = finite_or(self.headshot_multiplier, 1.0).max(0.0);
        self
    }

    /// Time between two shots.
    pub fn fire_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fire_rate.max(0.01)))
    }

    /// Reload time rounded to whole milliseconds.
    pub fn reload_duration(&self) -> Duration {
        let millis = (f64::from(self.reload_time_sec.max(0.01)) * 1000.0).round();
        Duration::from_millis(millis as u64)
    }

    pub fn starter_pistol() -> Self {
        Self {
            id: "starter_pistol".to_string(),
            damage: 5,
            fire_rate: 10.0,
            range: 100.0,
            pellets_per_shot: 1,
            spread_angle_deg: 0.0,
            ads_spread_multiplier: 0.4,
            magazine_size: 12,
            max_reserve_ammo: 60,
            reload_time_sec: 1.2,
            fire_mode: FireMode::SemiAuto,
            headshot_multiplier: 2.0,
        }
    }

    pub fn assault_rifle() -> Self {
        Self {
            id: "assault_rifle".to_string(),
            damage: 12,
            fire_rate: 9.0,
            range: 150.0,
            pellets_per_shot: 1,
            spread_angle_deg: 1.5,
            ads_spread_multiplier: 0.3,
            magazine_size: 30,
            max_reserve_ammo: 120,
            reload_time_sec: 2.0,
            fire_mode: FireMode::FullAuto,
            headshot_multiplier: 2.0,
        }
    }

    pub fn pump_shotgun() -> Self {
        Self {
            id: "pump_shotgun".to_string(),
            damage: 9,
            fire_rate: 1.2,
            range: 40.0,
            pellets_per_shot: 8,
            spread_angle_deg: 6.0,
            ads_spread_multiplier: 0.7,
            magazine_size: 6,
            max_reserve_ammo: 24,
            reload_time_sec: 2.6,
            fire_mode: FireMode::SemiAuto,
            headshot_multiplier: 1.5,
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Read-only table of weapon archetypes keyed by id.
#[derive(Debug, Clone)]
pub struct WeaponRegistry {
    profiles: HashMap<String, Arc<WeaponProfile>>,
    starter: Arc<WeaponProfile>,
}

impl WeaponRegistry {
    /// Builds a registry whose round-start loadout is `starter`.
    pub fn new(starter: WeaponProfile) -> Self {
        let starter = Arc::new(starter.sanitized());
        let mut profiles = HashMap::new();
        profiles.insert(starter.id.clone(), Arc::clone(&starter));
        Self { profiles, starter }
    }

    /// Adds or replaces a profile.
    pub fn register(&mut self, profile: WeaponProfile) {
        let profile = Arc::new(profile.sanitized());
        if profile.id == self.starter.id {
            self.starter = Arc::clone(&profile);
        }
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn get(&self, id: &str) -> Option<Arc<WeaponProfile>> {
        self.profiles.get(id).cloned()
    }

    pub fn starter(&self) -> Arc<WeaponProfile> {
        Arc::clone(&self.starter)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for WeaponRegistry {
    /// The built-in archetypes with the starter pistol as the loadout.
    fn default() -> Self {
        let mut registry = Self::new(WeaponProfile::starter_pistol());
        registry.register(WeaponProfile::assault_rifle());
        registry.register(WeaponProfile::pump_shotgun());
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_should_fire_semi_auto_needs_edge() {
        assert!(should_fire(FireMode::SemiAuto, true, true));
        assert!(!should_fire(FireMode::SemiAuto, false, true));
        assert!(!should_fire(FireMode::SemiAuto, false, false));
    }

    #[test]
    fn test_should_fire_full_auto_on_hold() {
        assert!(should_fire(FireMode::FullAuto, false, true));
        assert!(should_fire(FireMode::FullAuto, true, true));
        assert!(!should_fire(FireMode::FullAuto, false, false));
    }

    #[test]
    fn test_sanitized_clamps_ranges() {
        let raw = WeaponProfile {
            pellets_per_shot: 0,
            spread_angle_deg: -4.0,
            ads_spread_multiplier: 1.7,
            magazine_size: 0,
            reload_time_sec: 0.0,
            fire_rate: f32::NAN,
            ..WeaponProfile::starter_pistol()
        };

        let clean = raw.sanitized();
        assert_eq!(clean.pellets_per_shot, 1);
        assert_eq!(clean.spread_angle_deg, 0.0);
        assert_eq!(clean.ads_spread_multiplier, 1.0);
        assert_eq!(clean.magazine_size, 1);
        assert_approx_eq!(clean.reload_time_sec, 0.01, 1e-6);
        assert_eq!(clean.fire_rate, 1.0);
    }

    #[test]
    fn test_fire_interval() {
        let pistol = WeaponProfile::starter_pistol();
        assert_eq!(pistol.fire_interval(), Duration::from_millis(100));
        assert_eq!(pistol.reload_duration(), Duration::from_millis(1200));
    }

    #[test]
    fn test_registry_lookup_and_starter() {
        let registry = WeaponRegistry::default();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.starter().id, "starter_pistol");
        assert!(registry.get("pump_shotgun").is_some());
        assert!(registry.get("railgun").is_none());
    }

    #[test]
    fn test_registry_shares_profiles() {
        let registry = WeaponRegistry::default();
        let a = registry.starter();
        let b = registry.get("starter_pistol").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_registering_starter_id_replaces_loadout() {
        let mut registry = WeaponRegistry::default();
        registry.register(WeaponProfile {
            damage: 7,
            ..WeaponProfile::starter_pistol()
        });
        assert_eq!(registry.starter().damage, 7);
    }
}
