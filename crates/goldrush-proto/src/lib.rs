// SPDX-License-Identifier: Apache-2.0
//! goldrush-proto: wire schema for Gold Rush lockstep sessions.
//!
//! This crate frames the two message kinds the simulation consumes from
//! the transport — the match-load event and per-turn input frames — and
//! nothing else. Input bundles stay opaque bytes at this layer: their
//! internal layout belongs to the simulation's codec, so this crate
//! needs no dependency on it and the transport needs no knowledge of
//! either.

pub mod wire;

pub use wire::{DecodeError, Message, Packet, MESSAGE_TAG_INPUT, MESSAGE_TAG_MATCH_LOAD};
