// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]

use goldrush_sim::noise_generate;

// The reference seed used by peers to smoke-test their builds against
// each other before a match.
const AUDIT_SEED: u64 = 1743160839;

#[test]
fn audit_seed_grid_is_reproducible() {
    let a = noise_generate(AUDIT_SEED, 96, 96);
    let b = noise_generate(AUDIT_SEED, 96, 96);
    assert_eq!(a.width, 96);
    assert_eq!(a.height, 96);
    assert_eq!(a.map.len(), 96 * 96);
    assert_eq!(a, b, "same seed must produce a byte-identical grid");
}

#[test]
fn every_map_size_is_reproducible() {
    for edge in [96_u32, 128, 164] {
        let a = noise_generate(AUDIT_SEED, edge, edge);
        let b = noise_generate(AUDIT_SEED, edge, edge);
        assert_eq!(a, b, "edge {edge}");
    }
}

#[test]
fn seed_changes_change_the_grid() {
    let base = noise_generate(AUDIT_SEED, 96, 96);
    for delta in 1..=8 {
        let other = noise_generate(AUDIT_SEED + delta, 96, 96);
        assert_ne!(base.map, other.map, "seed delta {delta}");
    }
}

// Heavier sweep kept behind a feature so routine runs stay fast.
#[cfg(feature = "golden_noise")]
#[test]
fn large_grid_histograms_are_stable_across_many_seeds() {
    for seed in (0..32_u64).map(|n| AUDIT_SEED + n * 7919) {
        let a = noise_generate(seed, 164, 164);
        let b = noise_generate(seed, 164, 164);
        assert_eq!(a, b, "seed {seed}");

        let mut histogram = [0_usize; 4];
        for class in &a.map {
            histogram[(class + 1) as usize] += 1;
        }
        let total: usize = histogram.iter().sum();
        assert_eq!(total, 164 * 164);
        // Lowground dominates on every seed at this frequency.
        assert!(histogram[1] > histogram[0], "seed {seed}: {histogram:?}");
    }
}

#[test]
fn quantization_stays_in_the_four_classes() {
    let grid = noise_generate(AUDIT_SEED, 128, 128);
    for (index, class) in grid.map.iter().enumerate() {
        assert!(
            (-1..=2).contains(class),
            "cell {index} holds out-of-range class {class}"
        );
    }
}
