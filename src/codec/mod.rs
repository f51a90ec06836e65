// MIT License - Copyright (c) 2026 Peter Wright
// Collaborator interfaces for payload and frame encoding

pub mod frame;
pub mod payload;

use std::fmt;

use crate::config::PathIdentity;
use crate::error::Result;
use crate::message::{EventParams, MessageType};

pub use frame::{Dc09Codec, Dc09CodecFactory};
pub use payload::StandardPayloadEncoder;

/// Receiver verdict carried in an answer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Message accepted.
    Ack,
    /// Message rejected (usually a timestamp or key problem).
    Nak,
    /// Receiver could not interpret the message.
    Duh,
    /// Any other answer ID.
    Other(String),
}

impl AckOutcome {
    pub fn from_id(id: &str) -> Self {
        match id {
            "ACK" => Self::Ack,
            "NAK" => Self::Nak,
            "DUH" => Self::Duh,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }
}

impl fmt::Display for AckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => f.write_str("ACK"),
            Self::Nak => f.write_str("NAK"),
            Self::Duh => f.write_str("DUH"),
            Self::Other(id) => f.write_str(id),
        }
    }
}

/// A parsed answer: the verdict plus the offset to use for the next request
/// on the same path. `offset` is `None` when the answer carried nothing to
/// update it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub outcome: AckOutcome,
    pub offset: Option<i64>,
}

/// Builds outgoing frames and parses answers for one path.
///
/// A codec instance belongs to exactly one path. The path supplies its
/// current offset on every call and stores the offset from each answer.
pub trait FrameCodec: Send + Sync {
    /// Supervision (poll) frame.
    fn build_poll(&self, offset: i64) -> Vec<u8>;

    /// Data block carrying an event payload.
    fn build_block(&self, seq: u16, message_type: MessageType, payload: &str, offset: i64)
    -> Vec<u8>;

    /// Parse the raw bytes of a single read from the receiver.
    fn parse_answer(&self, seq: u16, raw: &[u8]) -> Result<Answer>;
}

/// Creates the frame codec for a newly configured path.
pub trait FrameCodecFactory: Send + Sync {
    fn build(&self, identity: &PathIdentity) -> Result<Box<dyn FrameCodec>>;
}

/// Produces the payload string carried inside a data block.
pub trait PayloadEncoder: Send + Sync {
    /// Encode the event body for `account`.
    fn encode(&self, message_type: MessageType, account: &str, params: &EventParams)
    -> Result<String>;

    /// Optional extended data appended after the event body.
    fn extra(&self, params: &EventParams) -> Option<String>;
}
