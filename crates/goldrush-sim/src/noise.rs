// SPDX-License-Identifier: Apache-2.0

//! Seeded OpenSimplex2 2D noise, quantized into elevation classes.
//!
//! Adapted from K.jpg's OpenSimplex2
//! <https://github.com/KdotJPG/OpenSimplex2>.
//!
//! This is the one place floating point exists in the crate: it runs once
//! at match load, before the simulation starts, and every peer evaluates
//! it with the same seed on IEEE-754 hardware. The gradient table, the
//! hash constants and the `1/56` frequency are part of the seed-to-value
//! contract, as is the lattice prime selection below — including the fact
//! that the y lattice coordinate is premultiplied by `PRIME_X` — so none
//! of them may be "fixed" without desyncing against existing peers.
//!
//! Output classes per cell: `-1` water, `0` lowground, `1` highground,
//! `2` cliff top.

const HASH_MULTIPLIER: u64 = 6026932503003350773;
const N_GRADS_2D_EXPONENT: u32 = 7;
const N_GRADS_2D: usize = 1 << N_GRADS_2D_EXPONENT;
const NORMALIZER_2D: f64 = 0.05481866495625118;

const SKEW_2D: f64 = 0.366025403784439;
const UNSKEW_2D: f64 = -0.21132486540518713;
const RSQUARED_2D: f32 = 2.0 / 3.0;
const PRIME_X: u64 = 5910200641878280303;
const PRIME_Y: u64 = 6452764530575939509;

const FREQUENCY: f64 = 1.0 / 56.0;

#[rustfmt::skip]
const GRAD2_BASE: [f32; 48] = [
    0.38268343236509,   0.923879532511287,
    0.923879532511287,  0.38268343236509,
    0.923879532511287, -0.38268343236509,
    0.38268343236509,  -0.923879532511287,
   -0.38268343236509,  -0.923879532511287,
   -0.923879532511287, -0.38268343236509,
   -0.923879532511287,  0.38268343236509,
   -0.38268343236509,   0.923879532511287,
    //-------------------------------------//
    0.130526192220052,  0.99144486137381,
    0.608761429008721,  0.793353340291235,
    0.793353340291235,  0.608761429008721,
    0.99144486137381,   0.130526192220051,
    0.99144486137381,  -0.130526192220051,
    0.793353340291235, -0.60876142900872,
    0.608761429008721, -0.793353340291235,
    0.130526192220052, -0.99144486137381,
   -0.130526192220052, -0.99144486137381,
   -0.608761429008721, -0.793353340291235,
   -0.793353340291235, -0.608761429008721,
   -0.99144486137381,  -0.130526192220052,
   -0.99144486137381,   0.130526192220051,
   -0.793353340291235,  0.608761429008721,
   -0.608761429008721,  0.793353340291235,
   -0.130526192220052,  0.99144486137381,
];

/// Quantized elevation grid handed to the map baker at match load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoiseMap {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Row-major elevation classes, `map[x + y * width]`.
    pub map: Vec<i8>,
}

struct Simplex2 {
    seed: u64,
    gradients: [f32; N_GRADS_2D * 2],
}

impl Simplex2 {
    fn new(seed: u64) -> Self {
        let mut normalized = [0.0_f32; 48];
        for (out, g) in normalized.iter_mut().zip(GRAD2_BASE) {
            *out = (f64::from(g) / NORMALIZER_2D) as f32;
        }
        let mut gradients = [0.0_f32; N_GRADS_2D * 2];
        for (i, slot) in gradients.iter_mut().enumerate() {
            *slot = normalized[i % 48];
        }
        Self { seed, gradients }
    }

    fn grad(&self, xsvp: u64, ysvp: u64, dx: f32, dy: f32) -> f32 {
        let mut hash = (self.seed ^ xsvp ^ ysvp).wrapping_mul(HASH_MULTIPLIER);
        hash ^= hash >> (64 - N_GRADS_2D_EXPONENT + 1);
        let gi = (hash as usize) & ((N_GRADS_2D - 1) << 1);
        self.gradients[gi] * dx + self.gradients[gi | 1] * dy
    }

    #[allow(clippy::many_single_char_names)]
    fn sample(&self, x: f64, y: f64) -> f32 {
        let skew = SKEW_2D * (x + y);
        let xs = x + skew;
        let ys = y + skew;

        let xsb = fast_floor(xs);
        let ysb = fast_floor(ys);
        let xi = (xs - f64::from(xsb)) as f32;
        let yi = (ys - f64::from(ysb)) as f32;

        let xsbp = (i64::from(xsb) as u64).wrapping_mul(PRIME_X);
        let ysbp = (i64::from(ysb) as u64).wrapping_mul(PRIME_X);

        let t = (xi + yi) * (UNSKEW_2D as f32);
        let dx0 = xi + t;
        let dy0 = yi + t;

        let a0 = RSQUARED_2D - (dx0 * dx0) - (dy0 * dy0);
        let mut value = (a0 * a0) * (a0 * a0) * self.grad(xsbp, ysbp, dx0, dy0);

        let a1 = ((2.0 * (1.0 + 2.0 * UNSKEW_2D) * (1.0 / UNSKEW_2D + 2.0)) as f32) * t
            + (((-2.0 * (1.0 + 2.0 * UNSKEW_2D) * (1.0 + 2.0 * UNSKEW_2D)) as f32) + a0);
        let dx1 = dx0 - ((1.0 + 2.0 * UNSKEW_2D) as f32);
        let dy1 = dy0 - ((1.0 + 2.0 * UNSKEW_2D) as f32);
        value += (a1 * a1)
            * (a1 * a1)
            * self.grad(
                xsbp.wrapping_add(PRIME_X),
                ysbp.wrapping_add(PRIME_Y),
                dx1,
                dy1,
            );

        let xmyi = xi - yi;
        if f64::from(t) < UNSKEW_2D {
            if xi + xmyi > 1.0 {
                let dx2 = dx0 - ((3.0 * UNSKEW_2D + 2.0) as f32);
                let dy2 = dy0 - ((3.0 * UNSKEW_2D + 1.0) as f32);
                let a2 = RSQUARED_2D - dx2 * dx2 - dy2 * dy2;
                if a2 > 0.0 {
                    value += (a2 * a2)
                        * (a2 * a2)
                        * self.grad(
                            xsbp.wrapping_add(PRIME_X << 1),
                            ysbp.wrapping_add(PRIME_Y),
                            dx2,
                            dy2,
                        );
                }
            } else {
                let dx2 = dx0 - (UNSKEW_2D as f32);
                let dy2 = dy0 - ((UNSKEW_2D + 1.0) as f32);
                let a2 = RSQUARED_2D - dx2 * dx2 - dy2 * dy2;
                if a2 > 0.0 {
                    value +=
                        (a2 * a2) * (a2 * a2) * self.grad(xsbp, ysbp.wrapping_add(PRIME_Y), dx2, dy2);
                }
            }

            if yi - xmyi > 1.0 {
                let dx3 = dx0 - ((3.0 * UNSKEW_2D + 1.0) as f32);
                let dy3 = dy0 - ((3.0 * UNSKEW_2D + 2.0) as f32);
                let a3 = RSQUARED_2D - dx3 * dx3 - dy3 * dy3;
                if a3 > 0.0 {
                    value += (a3 * a3)
                        * (a3 * a3)
                        * self.grad(
                            xsbp.wrapping_add(PRIME_X),
                            ysbp.wrapping_add(PRIME_Y << 1),
                            dx3,
                            dy3,
                        );
                }
            } else {
                let dx3 = dx0 - ((UNSKEW_2D + 1.0) as f32);
                let dy3 = dy0 - (UNSKEW_2D as f32);
                let a3 = RSQUARED_2D - dx3 * dx3 - dy3 * dy3;
                if a3 > 0.0 {
                    value +=
                        (a3 * a3) * (a3 * a3) * self.grad(xsbp.wrapping_add(PRIME_X), ysbp, dx3, dy3);
                }
            }
        } else {
            if xi + xmyi < 0.0 {
                let dx2 = dx0 + ((1.0 + UNSKEW_2D) as f32);
                let dy2 = dy0 + (UNSKEW_2D as f32);
                let a2 = RSQUARED_2D - dx2 * dx2 - dy2 * dy2;
                if a2 > 0.0 {
                    value +=
                        (a2 * a2) * (a2 * a2) * self.grad(xsbp.wrapping_sub(PRIME_X), ysbp, dx2, dy2);
                }
            } else {
                let dx2 = dx0 - ((UNSKEW_2D + 1.0) as f32);
                let dy2 = dy0 - (UNSKEW_2D as f32);
                let a2 = RSQUARED_2D - dx2 * dx2 - dy2 * dy2;
                if a2 > 0.0 {
                    value +=
                        (a2 * a2) * (a2 * a2) * self.grad(xsbp.wrapping_add(PRIME_X), ysbp, dx2, dy2);
                }
            }

            if yi < xmyi {
                let dx2 = dx0 + (UNSKEW_2D as f32);
                let dy2 = dy0 + ((UNSKEW_2D + 1.0) as f32);
                let a2 = RSQUARED_2D - dx2 * dx2 - dy2 * dy2;
                if a2 > 0.0 {
                    value +=
                        (a2 * a2) * (a2 * a2) * self.grad(xsbp, ysbp.wrapping_sub(PRIME_Y), dx2, dy2);
                }
            } else {
                let dx2 = dx0 - (UNSKEW_2D as f32);
                let dy2 = dy0 - ((UNSKEW_2D + 1.0) as f32);
                let a2 = RSQUARED_2D - dx2 * dx2 - dy2 * dy2;
                if a2 > 0.0 {
                    value +=
                        (a2 * a2) * (a2 * a2) * self.grad(xsbp, ysbp.wrapping_add(PRIME_Y), dx2, dy2);
                }
            }
        }

        value
    }
}

fn fast_floor(x: f64) -> i32 {
    let xi = x as i32;
    if x < f64::from(xi) {
        xi - 1
    } else {
        xi
    }
}

/// Generates the quantized elevation grid for a `width × height` map.
#[must_use]
pub fn generate(seed: u64, width: u32, height: u32) -> NoiseMap {
    let simplex = Simplex2::new(seed);
    let mut map = vec![0_i8; (width * height) as usize];

    for x in 0..width {
        for y in 0..height {
            // Generates result from -1 to 1
            let sample = simplex.sample(f64::from(x) * FREQUENCY, f64::from(y) * FREQUENCY);
            let result = (1.0 + f64::from(sample)) * 0.5;
            let class = if result < 0.15 {
                -1
            } else if result < 0.6 {
                0
            } else if result < 0.8 {
                1
            } else {
                2
            };
            map[(x + y * width) as usize] = class;
        }
    }

    NoiseMap { width, height, map }
}

#[cfg(test)]
mod tests {
    use super::generate;

    #[test]
    fn same_seed_same_grid() {
        let a = generate(1743160839, 96, 96);
        let b = generate(1743160839, 96, 96);
        assert_eq!(a, b);
        assert_eq!(a.map.len(), 96 * 96);
    }

    #[test]
    fn different_seeds_diverge() {
        let a = generate(1, 96, 96);
        let b = generate(2, 96, 96);
        assert_ne!(a.map, b.map);
    }

    #[test]
    fn classes_are_in_range() {
        let grid = generate(42, 96, 96);
        assert!(grid.map.iter().all(|&c| (-1..=2).contains(&c)));
    }

    #[test]
    fn all_classes_appear_on_a_typical_seed() {
        // A 96x96 grid at 1/56 frequency spans enough lattice cells that
        // every band shows up for ordinary seeds.
        let grid = generate(1743160839, 96, 96);
        for class in [-1_i8, 0, 1, 2] {
            assert!(
                grid.map.contains(&class),
                "elevation class {class} missing from grid"
            );
        }
    }
}
