// SPDX-License-Identifier: Apache-2.0

//! Deterministic math subsystem (fixed-point scalar, vectors, LCG).

pub mod fixed;
pub mod lcg;
pub mod vec;

pub use fixed::Fixed;
pub use lcg::Lcg;
pub use vec::{
    fvec2, ivec2, Direction, FVec2, IVec2, Rect, DIRECTION_COUNT, DIRECTION_MASK, DIRECTION_STEP,
};
