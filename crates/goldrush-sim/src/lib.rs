// SPDX-License-Identifier: Apache-2.0
//! goldrush-sim: the deterministic lockstep core of Gold Rush.
//!
//! Every peer in a match runs this simulation independently and feeds it
//! the same ordered input bundles per turn; no state crosses the wire
//! after the match-load event. Determinism is load-bearing everywhere:
//! positional math is Q16.16 fixed point, the only random source is one
//! seeded LCG, iteration orders are structural, and floats exist solely
//! in the init-time noise generator. [`digest::state_digest`] folds the
//! whole observable state into 32 bytes so peers can audit agreement
//! tick by tick.
//!
//! Rendering, audio, menus and the transport live elsewhere; the
//! simulation talks to them only through [`event::MatchEvent`]s and the
//! serialized bundles of [`lockstep::LockstepDriver`].

/// Maximum players per match.
pub const MAX_PLAYERS: usize = 4;

pub mod digest;
pub mod entity;
pub mod event;
pub mod input;
pub mod lockstep;
pub mod map;
pub mod math;
pub mod noise;
pub mod state;

pub use digest::{state_digest, StateDigest};
pub use entity::{
    Entity, EntityId, EntityMode, EntityType, IdArray, Target, ID_MAX, ID_NULL, PLAYER_NONE,
};
pub use event::MatchEvent;
pub use input::{deserialize_bundle, serialize_bundle, DecodeError, Input};
pub use lockstep::{LockstepDriver, TickOutcome, TURN_DURATION, TURN_LATENCY};
pub use map::Map;
pub use math::{Fixed, IVec2, Lcg};
pub use noise::{generate as noise_generate, NoiseMap};
pub use state::{MapSize, MatchSettings, MatchState, Player, PlayerStatus};
