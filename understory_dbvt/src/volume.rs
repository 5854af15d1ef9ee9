// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounding volumes: 3D AABBs, corner selectors, planes, and the shape bounds seam.

use glam::{Affine3A, Vec3};

/// Axis-aligned bounding box in 3D.
///
/// Invariant: `min` is componentwise less than or equal to `max`.
/// Float inputs are assumed to be finite (no NaNs).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Volume {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

bitflags::bitflags! {
    /// Per-axis corner selector.
    ///
    /// A set bit picks the `max` bound on that axis and a clear bit picks `min`
    /// (see [`Volume::corner`]). Only the eight combinations of the three axis bits
    /// are meaningful; [`Volume::classify`] rejects anything else.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AxisSigns: u8 {
        /// X axis.
        const X = 0b0000_0001;
        /// Y axis.
        const Y = 0b0000_0010;
        /// Z axis.
        const Z = 0b0000_0100;
    }
}

impl AxisSigns {
    /// Axes along which `v` is non-negative.
    ///
    /// This is the selector [`Volume::classify`] and [`Volume::project_minimum`] expect
    /// for a plane normal or projection direction `v`.
    pub fn non_negative(v: Vec3) -> Self {
        let mut s = Self::empty();
        s.set(Self::X, v.x >= 0.0);
        s.set(Self::Y, v.y >= 0.0);
        s.set(Self::Z, v.z >= 0.0);
        s
    }

    /// Axes along which `v` is strictly negative.
    ///
    /// Used by ray queries to order the near/far slab of each axis.
    pub fn negative(v: Vec3) -> Self {
        Self::non_negative(v).complement()
    }
}

/// Result of classifying a volume against a plane.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum PlaneSide {
    /// Every corner lies behind the plane.
    Behind = -1,
    /// The plane passes through the volume.
    Straddling = 0,
    /// Every corner lies on or in front of the plane.
    Front = 1,
}

/// A plane `normal · p + offset = 0`; the front half-space is where the expression is non-negative.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Plane {
    /// Plane normal (not required to be unit length).
    pub normal: Vec3,
    /// Signed offset.
    pub offset: f32,
}

impl Plane {
    /// Create a plane from its normal and offset.
    pub const fn new(normal: Vec3, offset: f32) -> Self {
        Self { normal, offset }
    }

    /// Corner selector matching this plane's normal.
    pub fn signs(&self) -> AxisSigns {
        AxisSigns::non_negative(self.normal)
    }
}

impl Volume {
    /// Create a volume from its min/max corners.
    pub const fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a volume from a center and half-extents.
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self::from_min_max(center - extents, center + extents)
    }

    /// Create a cube around `center` with half-extent `radius` on every axis.
    pub fn from_center_radius(center: Vec3, radius: f32) -> Self {
        Self::from_center_extents(center, Vec3::splat(radius))
    }

    /// The tightest volume around `points`, or `None` if `points` is empty.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut v = Self::from_min_max(*first, *first);
        for p in rest {
            v.min = v.min.min(*p);
            v.max = v.max.max(*p);
        }
        Some(v)
    }

    /// Midpoint of the volume.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Full edge lengths.
    pub fn lengths(&self) -> Vec3 {
        self.max - self.min
    }

    /// Half-extents.
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Cost heuristic: volume plus the sum of edge lengths.
    ///
    /// Only meaningful as a comparison key. The edge term keeps flat and
    /// degenerate boxes ordered instead of collapsing to zero.
    pub fn size(&self) -> f32 {
        let l = self.lengths();
        l.x * l.y * l.z + l.x + l.y + l.z
    }

    /// Grow symmetrically by `e` on every axis.
    pub fn expand(&mut self, e: Vec3) {
        self.min -= e;
        self.max += e;
    }

    /// Grow only in the direction `e` points.
    ///
    /// For each axis, a positive component moves `max` outward; otherwise the
    /// component is added to `min`, moving it outward for negative values.
    pub fn signed_expand(&mut self, e: Vec3) {
        for axis in 0..3 {
            if e[axis] > 0.0 {
                self.max[axis] += e[axis];
            } else {
                self.min[axis] += e[axis];
            }
        }
    }

    /// Whether `other` lies entirely inside this volume (faces inclusive).
    pub fn contains(&self, other: &Self) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// Whether the point lies inside this volume (faces inclusive).
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && self.max.cmpge(p).all()
    }

    /// Slab overlap test; touching faces count as overlapping.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Manhattan distance between the two centers, scaled by two.
    ///
    /// Lower is closer. Used to steer insertion toward the nearer child.
    pub fn proximity(&self, other: &Self) -> f32 {
        ((self.min + self.max) - (other.min + other.max))
            .abs()
            .element_sum()
    }

    /// Which of `a` (0) or `b` (1) is closer to this volume. Ties pick `b`.
    pub(crate) fn select(&self, a: &Self, b: &Self) -> usize {
        if self.proximity(a) < self.proximity(b) {
            0
        } else {
            1
        }
    }

    /// Componentwise union.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Corner picked by `signs`: `max` on set axes, `min` on clear ones.
    pub fn corner(&self, signs: AxisSigns) -> Vec3 {
        Vec3::new(
            if signs.contains(AxisSigns::X) { self.max.x } else { self.min.x },
            if signs.contains(AxisSigns::Y) { self.max.y } else { self.min.y },
            if signs.contains(AxisSigns::Z) { self.max.z } else { self.min.z },
        )
    }

    /// Classify against the plane `normal · p + offset`.
    ///
    /// `signs` must be [`AxisSigns::non_negative`] of `normal` (see [`Plane::signs`]);
    /// it picks the corners extremal along the normal without branching per axis.
    ///
    /// # Panics
    ///
    /// Panics if `signs` holds bits outside the three axis flags.
    pub fn classify(&self, normal: Vec3, offset: f32, signs: AxisSigns) -> PlaneSide {
        let (far, near) = match signs.bits() {
            0..=7 => (self.corner(signs), self.corner(signs.complement())),
            bits => panic!("invalid corner selector {bits:#04x}"),
        };
        if normal.dot(far) + offset < 0.0 {
            PlaneSide::Behind
        } else if normal.dot(near) + offset >= 0.0 {
            PlaneSide::Front
        } else {
            PlaneSide::Straddling
        }
    }

    /// Smallest projection of the volume onto `direction`.
    ///
    /// `signs` must be [`AxisSigns::non_negative`] of `direction`.
    pub fn project_minimum(&self, direction: Vec3, signs: AxisSigns) -> f32 {
        self.corner(signs.complement()).dot(direction)
    }
}

/// The one capability the tree needs from collision shapes: a world-space box.
///
/// Hosts implement [`world_volume`](ShapeBounds::world_volume) and feed the
/// result to [`Dbvt::insert`](crate::Dbvt::insert) and the update family.
pub trait ShapeBounds {
    /// World-space bounds of the shape under `placement`.
    fn world_volume(&self, placement: &Affine3A) -> Volume;

    /// Center and radius of a sphere enclosing the shape in its local frame.
    fn bounding_sphere(&self) -> (Vec3, f32) {
        let v = self.world_volume(&Affine3A::IDENTITY);
        (v.center(), v.lengths().length() * 0.5)
    }

    /// Largest distance any point of the shape can sweep per radian of rotation.
    fn angular_motion_disc(&self) -> f32 {
        let (center, radius) = self.bounding_sphere();
        radius + center.length()
    }

    /// Conservative bounds of the shape moving over `[0, time_step)`.
    ///
    /// Linear motion fattens only toward the direction of travel; angular
    /// motion adds a uniform margin.
    fn temporal_volume(
        &self,
        placement: &Affine3A,
        linear_velocity: Vec3,
        angular_velocity: Vec3,
        time_step: f32,
    ) -> Volume {
        let mut v = self.world_volume(placement);
        v.signed_expand(linear_velocity * time_step);
        let angular = angular_velocity.length() * self.angular_motion_disc() * time_step;
        v.expand(Vec3::splat(angular));
        v
    }
}

/// A box shape given by its local bounds.
impl ShapeBounds for Volume {
    fn world_volume(&self, placement: &Affine3A) -> Volume {
        let first = placement.transform_point3(self.corner(AxisSigns::empty()));
        let mut out = Self::from_min_max(first, first);
        for bits in 1..8_u8 {
            let p = placement.transform_point3(self.corner(AxisSigns::from_bits_truncate(bits)));
            out.min = out.min.min(p);
            out.max = out.max.max(p);
        }
        out
    }
}
