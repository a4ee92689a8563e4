// SPDX-License-Identifier: Apache-2.0

//! Byte framing for session messages.
//!
//! Message bodies are tightly packed little-endian, prefixed by one tag
//! byte. Stream framing adds a big-endian u32 length so messages survive
//! arbitrary transport segmentation. Decoding is length-checked
//! throughout; an incomplete frame is reported, never guessed at.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Tag byte of a match-load message.
pub const MESSAGE_TAG_MATCH_LOAD: u8 = 0;
/// Tag byte of an input frame.
pub const MESSAGE_TAG_INPUT: u8 = 1;

/// A session message the simulation consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Start-of-match payload; both peers must receive identical bytes.
    MatchLoad {
        /// Seed for the simulation LCG.
        lcg_seed: i32,
        /// Noise grid width.
        width: u32,
        /// Noise grid height.
        height: u32,
        /// Quantized elevation classes, row-major, `width × height`.
        map: Vec<i8>,
    },
    /// One player's serialized input bundle for one turn.
    Input {
        /// Sending player.
        player_id: u8,
        /// Opaque bundle bytes (the simulation's input codec owns them).
        bundle: Vec<u8>,
    },
}

/// Wire decoding failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended inside a message.
    #[error("message truncated")]
    Truncated,
    /// Unknown message tag byte.
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    /// A match-load header described more cells than the buffer holds.
    #[error("match-load grid length mismatch")]
    GridLengthMismatch,
}

impl Message {
    /// Serializes the message body (tag included, no length prefix).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::MatchLoad {
                lcg_seed,
                width,
                height,
                map,
            } => {
                out.put_u8(MESSAGE_TAG_MATCH_LOAD);
                out.put_i32_le(*lcg_seed);
                out.put_u32_le(*width);
                out.put_u32_le(*height);
                for class in map {
                    out.put_i8(*class);
                }
            }
            Self::Input { player_id, bundle } => {
                out.put_u8(MESSAGE_TAG_INPUT);
                out.put_u8(*player_id);
                out.put_slice(bundle);
            }
        }
        out
    }

    /// Decodes a message body produced by [`Message::encode`].
    pub fn decode(mut bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.remaining() < 1 {
            return Err(DecodeError::Truncated);
        }
        let tag = bytes.get_u8();
        match tag {
            MESSAGE_TAG_MATCH_LOAD => {
                if bytes.remaining() < 12 {
                    return Err(DecodeError::Truncated);
                }
                let lcg_seed = bytes.get_i32_le();
                let width = bytes.get_u32_le();
                let height = bytes.get_u32_le();
                let cells = (width as usize)
                    .checked_mul(height as usize)
                    .ok_or(DecodeError::GridLengthMismatch)?;
                if bytes.remaining() != cells {
                    return Err(DecodeError::GridLengthMismatch);
                }
                let mut map = Vec::with_capacity(cells);
                for _ in 0..cells {
                    map.push(bytes.get_i8());
                }
                Ok(Self::MatchLoad {
                    lcg_seed,
                    width,
                    height,
                    map,
                })
            }
            MESSAGE_TAG_INPUT => {
                if bytes.remaining() < 1 {
                    return Err(DecodeError::Truncated);
                }
                let player_id = bytes.get_u8();
                let bundle = bytes.to_vec();
                Ok(Self::Input { player_id, bundle })
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

/// Stream framing: big-endian u32 length + message body.
#[derive(Debug, Clone)]
pub struct Packet;

impl Packet {
    /// Encodes a message into a length-prefixed frame.
    #[must_use]
    pub fn encode(message: &Message) -> Vec<u8> {
        let body = message.encode();
        let mut out = Vec::with_capacity(4 + body.len());
        out.put_u32(body.len() as u32);
        out.put_slice(&body);
        out
    }

    /// Decodes one frame from the front of `stream`, returning the
    /// message and the bytes consumed. [`DecodeError::Truncated`] means
    /// "wait for more bytes".
    pub fn decode(stream: &[u8]) -> Result<(Message, usize), DecodeError> {
        if stream.len() < 4 {
            return Err(DecodeError::Truncated);
        }
        let len = u32::from_be_bytes([stream[0], stream[1], stream[2], stream[3]]) as usize;
        if stream.len() < 4 + len {
            return Err(DecodeError::Truncated);
        }
        let message = Message::decode(&stream[4..4 + len])?;
        Ok((message, 4 + len))
    }
}

#[cfg(test)]
mod tests {
    use super::{DecodeError, Message, Packet};

    #[test]
    fn match_load_roundtrips() {
        let message = Message::MatchLoad {
            lcg_seed: -1743160839,
            width: 3,
            height: 2,
            map: vec![-1, 0, 1, 2, 0, -1],
        };
        let bytes = message.encode();
        assert_eq!(Message::decode(&bytes), Ok(message));
    }

    #[test]
    fn input_frame_roundtrips() {
        let message = Message::Input {
            player_id: 2,
            bundle: vec![0, 8, 1, 0, 5, 0],
        };
        let bytes = message.encode();
        assert_eq!(Message::decode(&bytes), Ok(message));
    }

    #[test]
    fn packets_survive_segmentation() {
        let message = Message::Input {
            player_id: 1,
            bundle: vec![0xaa; 16],
        };
        let frame = Packet::encode(&message);

        // Partial frames ask for more bytes.
        for cut in 0..frame.len() {
            assert_eq!(Packet::decode(&frame[..cut]), Err(DecodeError::Truncated));
        }

        // A frame with trailing stream bytes reports what it consumed.
        let mut stream = frame.clone();
        stream.extend_from_slice(&frame);
        let (decoded, consumed) = Packet::decode(&stream).unwrap_or_else(|_| unreachable!());
        assert_eq!(decoded, message);
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn grid_length_is_validated() {
        let mut bytes = Message::MatchLoad {
            lcg_seed: 1,
            width: 2,
            height: 2,
            map: vec![0; 4],
        }
        .encode();
        bytes.pop();
        assert_eq!(Message::decode(&bytes), Err(DecodeError::GridLengthMismatch));
    }
}
