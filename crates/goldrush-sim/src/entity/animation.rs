// SPDX-License-Identifier: Apache-2.0

//! Simulation-side animation state.
//!
//! The simulation only tracks a name, a frame and loop bookkeeping; pixel
//! and sprite resolution happens on the render side from
//! `(type, mode, frame)`. The simulation does observe animation *ends*
//! (death fades, attack windups, smoke chains), which is why this lives
//! here and advances deterministically with the tick.

use crate::math::{ivec2, IVec2};

/// Which animation is playing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AnimationName {
    UnitIdle,
    UnitMove,
    UnitAttack,
    UnitBuild,
    UnitDeath,
    UnitDeathFade,
    MineArm,
    MinePrime,
    BuildingDestroyed,
    ParticleSmokeStart,
    ParticleSmoke,
    ParticleSmokeEnd,
}

struct AnimationData {
    v_frame: i32,
    h_frame_start: i32,
    h_frame_end: i32,
    frame_duration: u32,
    loops: u32,
}

const LOOP_FOREVER: u32 = u32::MAX;

const fn data(name: AnimationName) -> AnimationData {
    match name {
        AnimationName::UnitIdle | AnimationName::BuildingDestroyed => AnimationData {
            v_frame: -1,
            h_frame_start: 0,
            h_frame_end: 0,
            frame_duration: 0,
            loops: 0,
        },
        AnimationName::UnitMove => AnimationData {
            v_frame: -1,
            h_frame_start: 1,
            h_frame_end: 4,
            frame_duration: 8,
            loops: LOOP_FOREVER,
        },
        AnimationName::UnitAttack => AnimationData {
            v_frame: -1,
            h_frame_start: 5,
            h_frame_end: 7,
            frame_duration: 8,
            loops: 0,
        },
        AnimationName::UnitBuild => AnimationData {
            v_frame: 0,
            h_frame_start: 0,
            h_frame_end: 1,
            frame_duration: 8,
            loops: LOOP_FOREVER,
        },
        AnimationName::UnitDeath => AnimationData {
            v_frame: -1,
            h_frame_start: 0,
            h_frame_end: 3,
            frame_duration: 6,
            loops: 0,
        },
        AnimationName::UnitDeathFade => AnimationData {
            v_frame: -1,
            h_frame_start: 0,
            h_frame_end: 2,
            frame_duration: 30,
            loops: 0,
        },
        AnimationName::MineArm => AnimationData {
            v_frame: 0,
            h_frame_start: 0,
            h_frame_end: 2,
            frame_duration: 10,
            loops: 0,
        },
        AnimationName::MinePrime => AnimationData {
            v_frame: 0,
            h_frame_start: 3,
            h_frame_end: 4,
            frame_duration: 4,
            loops: 0,
        },
        AnimationName::ParticleSmokeStart => AnimationData {
            v_frame: 0,
            h_frame_start: 0,
            h_frame_end: 3,
            frame_duration: 4,
            loops: 0,
        },
        AnimationName::ParticleSmoke => AnimationData {
            v_frame: 0,
            h_frame_start: 0,
            h_frame_end: 5,
            frame_duration: 6,
            loops: 8,
        },
        AnimationName::ParticleSmokeEnd => AnimationData {
            v_frame: 0,
            h_frame_start: 4,
            h_frame_end: 6,
            frame_duration: 4,
            loops: 0,
        },
    }
}

/// Deterministic animation playback state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Animation {
    /// Which animation this is.
    pub name: AnimationName,
    /// Ticks accumulated toward the next frame.
    pub timer: u32,
    /// Current `(h, v)` frame; `v` stays 0 when the data says "row of the
    /// unit's facing" (`v_frame == -1`), which the renderer resolves.
    pub frame: IVec2,
    /// Full loops still to play for looping animations.
    pub loops_remaining: u32,
    /// Whether playback is still advancing.
    pub is_playing: bool,
}

impl Animation {
    /// Starts an animation from its first frame.
    #[must_use]
    pub const fn start(name: AnimationName) -> Self {
        let d = data(name);
        Self {
            name,
            timer: 0,
            frame: ivec2(d.h_frame_start, if d.v_frame == -1 { 0 } else { d.v_frame }),
            loops_remaining: d.loops,
            // Single-frame animations are born finished.
            is_playing: d.h_frame_start != d.h_frame_end,
        }
    }

    /// Advances one tick.
    pub fn update(&mut self) {
        if !self.is_playing {
            return;
        }
        let d = data(self.name);

        self.timer += 1;
        if self.timer != d.frame_duration {
            return;
        }
        self.timer = 0;
        self.frame.x += 1;
        if self.frame.x == d.h_frame_end + 1 {
            if self.loops_remaining == 0 {
                self.frame.x -= 1;
                self.is_playing = false;
            } else {
                if self.loops_remaining != LOOP_FOREVER {
                    self.loops_remaining -= 1;
                }
                self.frame.x = d.h_frame_start;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Animation, AnimationName};

    #[test]
    fn single_frame_animations_start_finished() {
        let idle = Animation::start(AnimationName::UnitIdle);
        assert!(!idle.is_playing);
    }

    #[test]
    fn non_looping_animation_stops_on_last_frame() {
        let mut attack = Animation::start(AnimationName::UnitAttack);
        for _ in 0..1000 {
            attack.update();
        }
        assert!(!attack.is_playing);
        assert_eq!(attack.frame.x, 7);
    }

    #[test]
    fn looping_animation_keeps_playing() {
        let mut walk = Animation::start(AnimationName::UnitMove);
        for _ in 0..1000 {
            walk.update();
        }
        assert!(walk.is_playing);
        assert!((1..=4).contains(&walk.frame.x));
    }

    #[test]
    fn bounded_loops_run_out() {
        let mut smoke = Animation::start(AnimationName::ParticleSmoke);
        // 6 frames * 6 ticks per loop, 9 total passes (first + 8 loops).
        for _ in 0..(6 * 6 * 9 + 1) {
            smoke.update();
        }
        assert!(!smoke.is_playing);
    }
}
