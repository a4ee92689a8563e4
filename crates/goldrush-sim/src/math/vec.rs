// SPDX-License-Identifier: Apache-2.0

//! Integer and fixed-point 2D vectors plus the 8-way direction tables.
//!
//! Ordering invariant: `Direction` discriminants are fixed
//! (N=0, NE=1, E=2, SE=3, S=4, SW=5, W=6, NW=7) and the `STEP`/`MASK`
//! tables are indexed by them. Map baking, pathfinding child order and
//! fog raytracing all observe this ordering; changing it desyncs peers.

use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::math::fixed::Fixed;

/// 2D integer vector (grid cells, deltas, screen-independent offsets).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IVec2 {
    /// Horizontal component.
    pub x: i32,
    /// Vertical component (positive is south).
    pub y: i32,
}

/// Shorthand constructor for [`IVec2`].
#[must_use]
pub const fn ivec2(x: i32, y: i32) -> IVec2 {
    IVec2 { x, y }
}

impl IVec2 {
    /// Manhattan distance: sum of absolute component deltas.
    #[must_use]
    pub const fn manhattan_distance(a: Self, b: Self) -> i32 {
        (a.x - b.x).abs() + (a.y - b.y).abs()
    }

    /// Squared euclidean distance in pure integer math.
    #[must_use]
    pub const fn euclidean_distance_squared(a: Self, b: Self) -> i32 {
        let dx = a.x - b.x;
        let dy = a.y - b.y;
        dx * dx + dy * dy
    }

    /// Converts to a fixed-point vector.
    #[must_use]
    pub const fn to_fvec(self) -> FVec2 {
        FVec2 {
            x: Fixed::from_int(self.x),
            y: Fixed::from_int(self.y),
        }
    }
}

impl Add for IVec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl AddAssign for IVec2 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for IVec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl SubAssign for IVec2 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for IVec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl Mul<i32> for IVec2 {
    type Output = Self;

    fn mul(self, rhs: i32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

/// 2D fixed-point vector (sub-cell positions, projectile motion).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FVec2 {
    /// Horizontal component.
    pub x: Fixed,
    /// Vertical component.
    pub y: Fixed,
}

/// Shorthand constructor for [`FVec2`].
#[must_use]
pub const fn fvec2(x: Fixed, y: Fixed) -> FVec2 {
    FVec2 { x, y }
}

impl FVec2 {
    /// The zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Euclidean distance to `other`, via the deterministic integer
    /// square root.
    #[must_use]
    pub fn distance_to(self, other: Self) -> Fixed {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Truncates both components to their integer parts.
    #[must_use]
    pub const fn to_ivec(self) -> IVec2 {
        IVec2 {
            x: self.x.integer_part(),
            y: self.y.integer_part(),
        }
    }
}

impl Add for FVec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl AddAssign for FVec2 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for FVec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<Fixed> for FVec2 {
    type Output = Self;

    fn mul(self, rhs: Fixed) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl core::ops::Div<Fixed> for FVec2 {
    type Output = Self;

    fn div(self, rhs: Fixed) -> Self {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}

/// Axis-aligned integer rectangle, `position` inclusive, `size` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    /// Top-left corner.
    pub position: IVec2,
    /// Extent in cells.
    pub size: IVec2,
}

impl Rect {
    /// Constructs a rect from its corner and size.
    #[must_use]
    pub const fn new(position: IVec2, size: IVec2) -> Self {
        Self { position, size }
    }

    /// Whether `point` falls inside the rect.
    #[must_use]
    pub const fn has_point(&self, point: IVec2) -> bool {
        !(point.x < self.position.x
            || point.x >= self.position.x + self.size.x
            || point.y < self.position.y
            || point.y >= self.position.y + self.size.y)
    }
}

/// The eight compass directions in their canonical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// Up.
    North = 0,
    /// Up-right.
    Northeast = 1,
    /// Right.
    East = 2,
    /// Down-right.
    Southeast = 3,
    /// Down.
    South = 4,
    /// Down-left.
    Southwest = 5,
    /// Left.
    West = 6,
    /// Up-left.
    Northwest = 7,
}

/// Number of compass directions.
pub const DIRECTION_COUNT: usize = 8;

/// Grid step for each direction, indexed by discriminant.
pub const DIRECTION_STEP: [IVec2; DIRECTION_COUNT] = [
    ivec2(0, -1),
    ivec2(1, -1),
    ivec2(1, 0),
    ivec2(1, 1),
    ivec2(0, 1),
    ivec2(-1, 1),
    ivec2(-1, 0),
    ivec2(-1, -1),
];

/// Neighbor bitfield bit for each direction, indexed by discriminant.
pub const DIRECTION_MASK: [u32; DIRECTION_COUNT] = [1, 2, 4, 8, 16, 32, 64, 128];

impl Direction {
    /// All directions in discriminant order.
    pub const ALL: [Self; DIRECTION_COUNT] = [
        Self::North,
        Self::Northeast,
        Self::East,
        Self::Southeast,
        Self::South,
        Self::Southwest,
        Self::West,
        Self::Northwest,
    ];

    /// Direction from a discriminant; wraps modulo 8.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self::ALL[index % DIRECTION_COUNT]
    }

    /// The grid step this direction takes.
    #[must_use]
    pub const fn step(self) -> IVec2 {
        DIRECTION_STEP[self as usize]
    }

    /// The neighbor-bitfield bit for this direction.
    #[must_use]
    pub const fn mask(self) -> u32 {
        DIRECTION_MASK[self as usize]
    }

    /// Whether this is a diagonal direction.
    #[must_use]
    pub const fn is_diagonal(self) -> bool {
        (self as usize) % 2 == 1
    }

    /// Direction whose step best matches `delta`, if `delta` is a unit step.
    #[must_use]
    pub fn from_step(delta: IVec2) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.step() == delta)
    }
}

#[cfg(test)]
mod tests {
    use super::{ivec2, Direction, FVec2, IVec2, Rect, DIRECTION_MASK, DIRECTION_STEP};
    use crate::math::fixed::Fixed;

    #[test]
    fn direction_tables_align() {
        assert_eq!(DIRECTION_STEP.len(), DIRECTION_MASK.len());
        assert_eq!(Direction::North.step(), ivec2(0, -1));
        assert_eq!(Direction::Southwest.step(), ivec2(-1, 1));
        assert_eq!(Direction::Northwest.mask(), 128);
    }

    #[test]
    fn manhattan_and_euclidean() {
        let a = ivec2(2, 3);
        let b = ivec2(-1, 7);
        assert_eq!(IVec2::manhattan_distance(a, b), 7);
        assert_eq!(IVec2::euclidean_distance_squared(a, b), 25);
    }

    #[test]
    fn rect_has_point_is_half_open() {
        let r = Rect::new(ivec2(1, 1), ivec2(3, 3));
        assert!(r.has_point(ivec2(1, 1)));
        assert!(r.has_point(ivec2(3, 3)));
        assert!(!r.has_point(ivec2(4, 3)));
        assert!(!r.has_point(ivec2(0, 2)));
    }

    #[test]
    fn fvec_distance_matches_integer_hypotenuse() {
        let a = FVec2::ZERO;
        let b = ivec2(3, 4).to_fvec();
        assert_eq!(a.distance_to(b), Fixed::from_int(5));
    }

    #[test]
    fn from_step_roundtrips() {
        for d in Direction::ALL {
            assert_eq!(Direction::from_step(d.step()), Some(d));
        }
        assert_eq!(Direction::from_step(ivec2(2, 0)), None);
    }
}
