//! Hitscan shot resolution
//!
//! Turns one trigger pull into per-pellet raycasts and the damage those
//! pellets deal. Resolution is pure: it reads the roster and the world and
//! returns damage events for the caller to apply in pellet order.
//!
//! The shot is traced from the camera pose the shooter reported. The resolver
//! does not throttle; callers must enforce `1 / fire_rate` between shots or a
//! client could multiply its damage output by flooding fire requests.

use crate::combat::Roster;
use crate::world::WorldQuery;
use rand::Rng;
use shared::Vec3;
use std::f32::consts::TAU;

/// Spread cones wider than this are clamped; `tan` diverges at 90°.
const MAX_SPREAD_DEG: f32 = 89.0;

/// Damage one pellet deals to one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageEvent {
    pub target_id: u32,
    pub amount: u32,
    pub is_headshot: bool,
    /// Index of the pellet that dealt it.
    pub pellet: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShotResult {
    /// Whether pellet 0 struck anything.
    pub any_hit: bool,
    pub visual_origin: Vec3,
    /// Where pellet 0 stopped: its hit point, or the end of its range.
    pub visual_hit_point: Vec3,
    /// In pellet order.
    pub damage_events: Vec<DamageEvent>,
    pub first_hit_was_on_shooter_team: bool,
}

impl ShotResult {
    /// True when pellet 0 hurt an enemy; the shooter gets a hitmarker.
    pub fn hitmarker(&self) -> bool {
        self.damage_events.first().map_or(false, |event| event.pellet == 0)
    }
}

/// Unit direction of a client-reported aim vector.
///
/// The vector is scaled by its largest component first, so finite aims far
/// too long to square (say `1e20` along z) still point where they should.
/// Returns `None` for non-finite or zero vectors.
pub fn aim_direction(aim: Vec3) -> Option<Vec3> {
    if !aim.is_finite() {
        return None;
    }
    let largest = aim.abs().max_element();
    if largest <= 0.0 {
        return None;
    }
    let direction = (aim / largest).normalize_or_zero();
    (direction != Vec3::ZERO).then_some(direction)
}

/// Resolves a shot by `shooter_id` fired from `origin` along `aim_forward`.
///
/// Every pellet is traced independently from the same origin; the first
/// pellet decides the tracer end point and the hitmarker. Pellets that land
/// on the shooter's own team are dropped silently.
///
/// Returns `None` when the shooter is not in the roster or the aim has no
/// usable direction (see [`aim_direction`]).
pub fn resolve_shot<W, R>(
    shooter_id: u32,
    origin: Vec3,
    aim_forward: Vec3,
    is_aiming: bool,
    world: &W,
    roster: &Roster,
    rng: &mut R,
) -> Option<ShotResult>
where
    W: WorldQuery + ?Sized,
    R: Rng + ?Sized,
{
    let shooter = roster.get(&shooter_id)?;
    let aim_forward = aim_direction(aim_forward)?;
    let weapon = &shooter.weapon;

    let pellets = weapon.pellets_per_shot.max(1);
    let base_spread = weapon.spread_angle_deg.max(0.0);
    let spread = if is_aiming {
        base_spread * weapon.ads_spread_multiplier
    } else {
        base_spread
    };

    let mut result = ShotResult {
        any_hit: false,
        visual_origin: origin,
        visual_hit_point: origin + aim_forward * weapon.range,
        damage_events: Vec::new(),
        first_hit_was_on_shooter_team: false,
    };

    for pellet in 0..pellets {
        let direction = spread_direction(aim_forward, spread, rng);
        let hit = world.raycast(origin, direction, weapon.range);

        if pellet == 0 {
            result.any_hit = hit.is_some();
            result.visual_hit_point = hit.map_or(origin + direction * weapon.range, |h| h.point);
        }

        let Some(hit) = hit else {
            continue;
        };
        let Some(target) = hit.owner.and_then(|owner| roster.get(&owner)) else {
            continue;
        };

        if target.team == shooter.team {
            if pellet == 0 {
                result.first_hit_was_on_shooter_team = true;
            }
            continue;
        }

        let is_headshot = hit.surface.is_head();
        let amount = if is_headshot {
            (weapon.damage as f32 * weapon.headshot_multiplier).round().max(0.0) as u32
        } else {
            weapon.damage
        };

        result.damage_events.push(DamageEvent {
            target_id: target.player_id,
            amount,
            is_headshot,
            pellet,
        });
    }

    Some(result)
}

/// Picks a pellet direction uniformly inside a cone of `angle_deg` around
/// `forward`.
///
/// Samples a point uniformly on a disk of radius `tan(angle)` in the plane
/// orthogonal to `forward`, which keeps pellets from bunching at the centre.
/// A zero angle returns the normalized `forward` without touching the RNG.
pub fn spread_direction<R: Rng + ?Sized>(forward: Vec3, angle_deg: f32, rng: &mut R) -> Vec3 {
    let forward = forward.normalize_or_zero();
    if angle_deg <= 0.0 || !angle_deg.is_finite() {
        return forward;
    }

    let mut right = forward.cross(Vec3::Y);
    if right.length_squared() < 0.001 {
        right = forward.cross(Vec3::Z);
    }
    let right = right.normalize_or_zero();
    let up = right.cross(forward).normalize_or_zero();

    let radius = angle_deg.min(MAX_SPREAD_DEG).to_radians().tan();
    let r = radius * rng.gen::<f32>().sqrt();
    let theta = rng.gen::<f32>() * TAU;

    let offset = right * (r * theta.cos()) + up * (r * theta.sin());
    (forward + offset).normalize_or_zero()
}
