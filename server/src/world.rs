//! World geometry queries used by hit resolution
//!
//! The hit resolver only sees the `WorldQuery` trait. The server composes the
//! static arena with a per-shot layer of player hitboxes so that dead players
//! and disconnected players never block or absorb pellets.

use shared::Vec3;

/// Height of a player's eyes above their feet; shots originate here.
pub const EYE_HEIGHT: f32 = 1.65;
pub const BODY_HALF_WIDTH: f32 = 0.4;
pub const BODY_HEIGHT: f32 = 1.5;
pub const HEAD_CENTER_HEIGHT: f32 = 1.72;
pub const HEAD_RADIUS: f32 = 0.25;

const PARALLEL_EPSILON: f32 = 1e-8;

/// What kind of surface a ray struck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceTag {
    Static,
    Body,
    Head,
}

impl SurfaceTag {
    pub fn is_head(self) -> bool {
        self == SurfaceTag::Head
    }
}

/// First blocking surface along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub distance: f32,
    pub surface: SurfaceTag,
    /// Player that owns the struck volume, `None` for level geometry.
    pub owner: Option<u32>,
}

/// Geometry query consumed by the hit resolver.
pub trait WorldQuery {
    /// Casts a ray from `origin` along the unit vector `direction` and returns
    /// the nearest hit within `max_distance`.
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit>;
}

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Distance at which the ray enters the box. Rays starting inside never
    /// report a hit, so a shooter's own volumes do not swallow the shot.
    pub fn ray_entry(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;

        let axes = [
            (origin.x, direction.x, self.min.x, self.max.x),
            (origin.y, direction.y, self.min.y, self.max.y),
            (origin.z, direction.z, self.min.z, self.max.z),
        ];

        for (o, d, min, max) in axes {
            if d.abs() < PARALLEL_EPSILON {
                if o < min || o > max {
                    return None;
                }
                continue;
            }

            let t1 = (min - o) / d;
            let t2 = (max - o) / d;
            t_near = t_near.max(t1.min(t2));
            t_far = t_far.min(t1.max(t2));

            if t_near > t_far {
                return None;
            }
        }

        if t_near < 0.0 {
            return None;
        }
        Some(t_near)
    }
}

/// Distance at which a ray enters a sphere; `None` when it misses or starts inside.
pub fn ray_sphere_entry(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let c = oc.length_squared() - radius * radius;
    if c < 0.0 {
        return None;
    }

    let b = oc.dot(direction);
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }

    let t = -b - discriminant.sqrt();
    if t < 0.0 {
        return None;
    }
    Some(t)
}

/// Hit volumes of one standing player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    pub owner: u32,
    pub body: Aabb,
    pub head_center: Vec3,
    pub head_radius: f32,
}

impl Hitbox {
    /// Builds the volumes for a player whose feet are at `position`.
    pub fn standing(owner: u32, position: Vec3) -> Self {
        Self {
            owner,
            body: Aabb::new(
                Vec3::new(
                    position.x - BODY_HALF_WIDTH,
                    position.y,
                    position.z - BODY_HALF_WIDTH,
                ),
                Vec3::new(
                    position.x + BODY_HALF_WIDTH,
                    position.y + BODY_HEIGHT,
                    position.z + BODY_HALF_WIDTH,
                ),
            ),
            head_center: position + Vec3::new(0.0, HEAD_CENTER_HEIGHT, 0.0),
            head_radius: HEAD_RADIUS,
        }
    }

    fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<(f32, SurfaceTag)> {
        let head = ray_sphere_entry(origin, direction, self.head_center, self.head_radius)
            .map(|t| (t, SurfaceTag::Head));
        let body = self
            .body
            .ray_entry(origin, direction)
            .map(|t| (t, SurfaceTag::Body));

        match (head, body) {
            (Some(h), Some(b)) => Some(if b.0 < h.0 { b } else { h }),
            (h, b) => h.or(b),
        }
    }
}

/// Static level geometry.
#[derive(Debug, Clone, Default)]
pub struct ArenaWorld {
    pub solids: Vec<Aabb>,
}

impl ArenaWorld {
    pub fn new(solids: Vec<Aabb>) -> Self {
        Self { solids }
    }

    /// A small symmetric arena: floor, four boundary walls and two cover blocks.
    pub fn default_arena() -> Self {
        Self::new(vec![
            Aabb::new(Vec3::new(-40.0, -1.0, -70.0), Vec3::new(40.0, 0.0, 40.0)),
            Aabb::new(Vec3::new(-41.0, 0.0, -70.0), Vec3::new(-40.0, 8.0, 40.0)),
            Aabb::new(Vec3::new(40.0, 0.0, -70.0), Vec3::new(41.0, 8.0, 40.0)),
            Aabb::new(Vec3::new(-40.0, 0.0, -71.0), Vec3::new(40.0, 8.0, -70.0)),
            Aabb::new(Vec3::new(-40.0, 0.0, 40.0), Vec3::new(40.0, 8.0, 41.0)),
            Aabb::new(Vec3::new(-6.0, 0.0, -2.0), Vec3::new(-2.0, 2.0, 2.0)),
            Aabb::new(Vec3::new(2.0, 0.0, -2.0), Vec3::new(6.0, 2.0, 2.0)),
        ])
    }
}

impl WorldQuery for ArenaWorld {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        nearest(
            self.solids
                .iter()
                .filter_map(|solid| solid.ray_entry(origin, direction))
                .map(|t| (t, SurfaceTag::Static, None)),
            origin,
            direction,
            max_distance,
        )
    }
}

/// Level geometry plus the hitboxes of the players currently standing in it.
pub struct PopulatedWorld<'a, W: WorldQuery + ?Sized> {
    pub geometry: &'a W,
    pub hitboxes: &'a [Hitbox],
}

impl<'a, W: WorldQuery + ?Sized> WorldQuery for PopulatedWorld<'a, W> {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        let level = self.geometry.raycast(origin, direction, max_distance);
        let players = nearest(
            self.hitboxes.iter().filter_map(|hitbox| {
                hitbox
                    .raycast(origin, direction)
                    .map(|(t, surface)| (t, surface, Some(hitbox.owner)))
            }),
            origin,
            direction,
            max_distance,
        );

        match (level, players) {
            (Some(l), Some(p)) => Some(if p.distance < l.distance { p } else { l }),
            (l, p) => l.or(p),
        }
    }
}

fn nearest(
    candidates: impl Iterator<Item = (f32, SurfaceTag, Option<u32>)>,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
) -> Option<RayHit> {
    candidates
        .filter(|(t, _, _)| *t <= max_distance)
        .fold(None, |best: Option<(f32, SurfaceTag, Option<u32>)>, candidate| match best {
            Some(b) if b.0 <= candidate.0 => Some(b),
            _ => Some(candidate),
        })
        .map(|(distance, surface, owner)| RayHit {
            point: origin + direction * distance,
            distance,
            surface,
            owner,
        })
}
