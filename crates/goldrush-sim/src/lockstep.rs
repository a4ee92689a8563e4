// SPDX-License-Identifier: Apache-2.0

//! The lockstep turn driver.
//!
//! Time advances in ticks; every [`TURN_DURATION`] ticks a turn fires.
//! A turn applies exactly one input bundle from every live player, in
//! player-id order, with inputs inside a bundle applied in serialized
//! order. Commands issued locally are scheduled [`TURN_LATENCY`] turns
//! ahead: the driver seeds each queue with that many empty bundles, and
//! every flushed bundle is echoed into the local queue exactly as it is
//! handed to the transport, so local and remote playback are symmetric.
//!
//! Missing bundles stall the turn — the whole tick is skipped, no state
//! advances, no time is consumed — which keeps a stall invisible to
//! determinism: every peer executes the same turns over the same
//! bundles, just not at the same wall-clock moments.

use std::collections::VecDeque;

use crate::input::{self, DecodeError, Input};
use crate::state::{MatchState, PlayerStatus};
use crate::MAX_PLAYERS;

/// Ticks per turn.
pub const TURN_DURATION: u32 = 4;

/// Turns of input latency; queues are seeded with this many empty
/// bundles so turn consumption is uniform from tick zero.
pub const TURN_LATENCY: usize = 3;

/// Outcome of driving one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A required bundle was missing; nothing advanced.
    Stalled,
    /// The tick ran. When a turn fired, `outgoing` carries the local
    /// bundle to hand to the transport (serialized, unframed).
    Advanced {
        /// Serialized local bundle flushed this turn, if any.
        outgoing: Option<Vec<u8>>,
    },
}

/// Per-match lockstep driver owned by the local peer.
#[derive(Clone, Debug)]
pub struct LockstepDriver {
    inputs: [VecDeque<Vec<Input>>; MAX_PLAYERS],
    input_queue: Vec<Input>,
    turn_timer: u32,
    local_player_id: u8,
}

impl LockstepDriver {
    /// Creates a driver for the local player, seeding every live queue
    /// with the latency padding.
    #[must_use]
    pub fn new(local_player_id: u8, state: &MatchState) -> Self {
        let mut inputs: [VecDeque<Vec<Input>>; MAX_PLAYERS] =
            core::array::from_fn(|_| VecDeque::new());
        for (player_id, queue) in inputs.iter_mut().enumerate() {
            if state.players[player_id].status == PlayerStatus::None {
                continue;
            }
            for _ in 0..TURN_LATENCY {
                queue.push_back(vec![Input::None]);
            }
        }
        Self {
            inputs,
            input_queue: Vec::new(),
            turn_timer: 0,
            local_player_id,
        }
    }

    /// Queues a local command for the next flushed turn.
    pub fn queue_input(&mut self, input: Input) {
        self.input_queue.push(input);
    }

    /// Accepts a decoded remote bundle for `player_id`.
    pub fn enqueue_remote_bundle(&mut self, player_id: u8, bundle: Vec<Input>) {
        if (player_id as usize) < MAX_PLAYERS {
            self.inputs[player_id as usize].push_back(bundle);
        }
    }

    /// Accepts a serialized remote bundle for `player_id`.
    pub fn enqueue_remote_bytes(&mut self, player_id: u8, bytes: &[u8]) -> Result<(), DecodeError> {
        let bundle = input::deserialize_bundle(bytes)?;
        self.enqueue_remote_bundle(player_id, bundle);
        Ok(())
    }

    /// Number of bundles waiting for `player_id`.
    #[must_use]
    pub fn pending_bundles(&self, player_id: u8) -> usize {
        self.inputs
            .get(player_id as usize)
            .map_or(0, VecDeque::len)
    }

    /// Drives one tick: maybe fire a turn, then advance the simulation.
    pub fn update(&mut self, state: &mut MatchState) -> TickOutcome {
        let mut outgoing = None;

        if self.turn_timer == 0 {
            // A turn only fires with every live player's bundle present.
            for player_id in 0..MAX_PLAYERS {
                if state.players[player_id].status != PlayerStatus::Playing {
                    continue;
                }
                if self.inputs[player_id].is_empty() {
                    return TickOutcome::Stalled;
                }
            }

            // Apply one bundle per player, in player-id order.
            for player_id in 0..MAX_PLAYERS {
                if state.players[player_id].status != PlayerStatus::Playing {
                    continue;
                }
                let Some(bundle) = self.inputs[player_id].pop_front() else {
                    continue;
                };
                for input in &bundle {
                    input::handle(state, player_id as u8, input);
                }
            }

            outgoing = Some(self.flush_local_bundle());
            self.turn_timer = TURN_DURATION;
        }

        state.update();
        self.turn_timer -= 1;

        TickOutcome::Advanced { outgoing }
    }

    // Serialize the queued local commands, echo them into the local
    // queue, and hand the bytes up for broadcast.
    fn flush_local_bundle(&mut self) -> Vec<u8> {
        // Always send at least one input per turn so peers can count
        // bundles instead of guessing at silence.
        if self.input_queue.is_empty() {
            self.input_queue.push(Input::None);
        }

        let bytes = input::serialize_bundle(&self.input_queue);
        let bundle = core::mem::take(&mut self.input_queue);
        self.inputs[self.local_player_id as usize].push_back(bundle);
        bytes
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::{LockstepDriver, TickOutcome, TURN_DURATION, TURN_LATENCY};
    use crate::input::Input;
    use crate::state::{MatchState, Player, PlayerStatus};

    fn two_player_state() -> MatchState {
        let mut players = [Player::default(); crate::MAX_PLAYERS];
        players[0] = Player {
            status: PlayerStatus::Playing,
            team: 0,
        };
        players[1] = Player {
            status: PlayerStatus::Playing,
            team: 1,
        };
        MatchState::bare(32, 32, players, 1)
    }

    #[test]
    fn latency_padding_covers_the_first_turns() {
        let mut state = two_player_state();
        let mut driver = LockstepDriver::new(0, &state);

        // Three padded turns advance without any remote traffic.
        let mut turns_fired = 0;
        for _ in 0..(TURN_DURATION as usize * TURN_LATENCY) {
            match driver.update(&mut state) {
                TickOutcome::Advanced { outgoing } => {
                    if outgoing.is_some() {
                        turns_fired += 1;
                    }
                }
                TickOutcome::Stalled => panic!("stall during padded turns"),
            }
        }
        assert_eq!(turns_fired, TURN_LATENCY);
    }

    #[test]
    fn missing_remote_bundle_stalls_without_consuming() {
        let mut state = two_player_state();
        let mut driver = LockstepDriver::new(0, &state);

        // Drain the padding.
        for _ in 0..(TURN_DURATION as usize * TURN_LATENCY) {
            assert!(matches!(
                driver.update(&mut state),
                TickOutcome::Advanced { .. }
            ));
        }

        // Player 1's fourth bundle never arrived: stall, repeatedly.
        assert_eq!(driver.update(&mut state), TickOutcome::Stalled);
        assert_eq!(driver.update(&mut state), TickOutcome::Stalled);

        // Once it arrives, the turn fires.
        driver.enqueue_remote_bundle(1, vec![Input::None]);
        assert!(matches!(
            driver.update(&mut state),
            TickOutcome::Advanced { outgoing: Some(_) }
        ));
    }

    #[test]
    fn disconnected_players_stop_gating_turns() {
        let mut state = two_player_state();
        let mut driver = LockstepDriver::new(0, &state);

        for _ in 0..(TURN_DURATION as usize * TURN_LATENCY) {
            let _ = driver.update(&mut state);
        }
        assert_eq!(driver.update(&mut state), TickOutcome::Stalled);

        state.disconnect_player(1);
        assert!(matches!(
            driver.update(&mut state),
            TickOutcome::Advanced { .. }
        ));
    }

    #[test]
    fn local_echo_matches_the_broadcast_bytes() {
        let mut state = two_player_state();
        let mut driver = LockstepDriver::new(0, &state);
        driver.queue_input(Input::Chat {
            message: "go".to_owned(),
        });
        // Keep player 1 fed.
        for _ in 0..8 {
            driver.enqueue_remote_bundle(1, vec![Input::None]);
        }

        let mut flushed = None;
        for _ in 0..(TURN_DURATION as usize * (TURN_LATENCY + 1)) {
            if let TickOutcome::Advanced { outgoing: Some(bytes) } = driver.update(&mut state) {
                flushed.get_or_insert(bytes);
            }
        }
        let bytes = flushed.unwrap_or_default();
        let decoded = crate::input::deserialize_bundle(&bytes).unwrap_or_default();
        assert_eq!(
            decoded,
            vec![Input::Chat {
                message: "go".to_owned()
            }]
        );
        // The echoed bundle sits in the local queue awaiting its turn.
        assert!(driver.pending_bundles(0) > 0);
    }
}
