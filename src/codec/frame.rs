// MIT License - Copyright (c) 2026 Peter Wright
// Unencrypted DC09 framing

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use tracing::debug;

use crate::codec::{AckOutcome, Answer, FrameCodec, FrameCodecFactory};
use crate::config::PathIdentity;
use crate::constants::{CR, CRC_TABLE, LF, POLL_SEQUENCE};
use crate::error::{Dc09Error, Result};
use crate::message::MessageType;

const TIMESTAMP_FORMAT: &str = "%H:%M:%S,%m-%d-%Y";

/// Plain-text DC09 frame codec.
///
/// Frame layout:
///
/// ```text
/// <LF> CRC(4 hex) 0LLL "ID" SEQ(4) R<rcvr> L<line> #<acct> [data]... [_timestamp] <CR>
/// ```
///
/// The CRC (CRC-16/ARC) and the length cover everything from the opening
/// quote of the ID up to, but not including, the trailing CR.
#[derive(Debug, Clone)]
pub struct Dc09Codec {
    account: String,
    receiver: Option<u32>,
    line: Option<u32>,
}

impl Dc09Codec {
    pub fn new(account: impl Into<String>, receiver: Option<u32>, line: Option<u32>) -> Self {
        Self {
            account: account.into(),
            receiver,
            line,
        }
    }

    /// Compute CRC-16/ARC (init 0) over `data`.
    pub fn compute_crc(data: &[u8]) -> u16 {
        let mut crc: u16 = 0;
        for &byte in data {
            crc = (crc >> 8) ^ CRC_TABLE[((crc ^ byte as u16) & 0xFF) as usize];
        }
        crc
    }

    /// Header tokens after the sequence number: `R..L..#acct`.
    fn routing(&self) -> String {
        let mut out = String::new();
        if let Some(rcvr) = self.receiver {
            out.push_str(&format!("R{:X}", rcvr));
        }
        out.push_str(&format!("L{:X}", self.line.unwrap_or(0)));
        out.push('#');
        out.push_str(&self.account);
        out
    }

    /// Wrap a body (`"ID"...`) into a complete frame.
    fn frame(body: &str) -> Vec<u8> {
        let crc = Self::compute_crc(body.as_bytes());
        let mut out = Vec::with_capacity(body.len() + 10);
        out.push(LF);
        out.extend_from_slice(format!("{:04X}0{:03X}", crc, body.len()).as_bytes());
        out.extend_from_slice(body.as_bytes());
        out.push(CR);
        out
    }

    /// Append the receiver-clock timestamp: local time shifted by `offset` seconds.
    fn stamp(body: &mut String, offset: i64, now: DateTime<Utc>) {
        let ts = TimeDelta::try_seconds(offset)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        body.push('_');
        body.push_str(&ts.format(TIMESTAMP_FORMAT).to_string());
    }

    /// Poll frame stamped relative to the given local time.
    pub fn build_poll_at(&self, offset: i64, now: DateTime<Utc>) -> Vec<u8> {
        let mut body = format!("\"NULL\"{:04}{}[]", POLL_SEQUENCE, self.routing());
        Self::stamp(&mut body, offset, now);
        Self::frame(&body)
    }

    /// Data block stamped relative to the given local time.
    pub fn build_block_at(
        &self,
        seq: u16,
        message_type: MessageType,
        payload: &str,
        offset: i64,
        now: DateTime<Utc>,
    ) -> Vec<u8> {
        let mut body = format!("\"{}\"{:04}{}{}", message_type, seq, self.routing(), payload);
        Self::stamp(&mut body, offset, now);
        Self::frame(&body)
    }

    /// Build an answer frame as a receiver would send it. Used by receiver
    /// simulators and tests.
    pub fn build_answer(&self, id: &str, seq: u16, timestamp: Option<DateTime<Utc>>) -> Vec<u8> {
        let mut body = format!("\"{}\"{:04}{}[]", id, seq, self.routing());
        if let Some(ts) = timestamp {
            body.push('_');
            body.push_str(&ts.format(TIMESTAMP_FORMAT).to_string());
        }
        Self::frame(&body)
    }

    /// Parse an answer relative to the given local time.
    pub fn parse_answer_at(&self, seq: u16, raw: &[u8], now: DateTime<Utc>) -> Result<Answer> {
        let parsed = parse_frame(raw)?;
        let outcome = AckOutcome::from_id(&parsed.id);

        // NAK answers carry sequence 0000; only an ACK must echo our sequence
        if outcome.is_ack() && parsed.seq != seq {
            return Err(Dc09Error::SequenceMismatch {
                sent: seq,
                answered: parsed.seq,
            });
        }

        let offset = parsed
            .timestamp
            .map(|ts| ts.and_utc().signed_duration_since(now).num_seconds());

        debug!("Answer {} seq {} offset {:?}", outcome, parsed.seq, offset);
        Ok(Answer { outcome, offset })
    }
}

impl FrameCodec for Dc09Codec {
    fn build_poll(&self, offset: i64) -> Vec<u8> {
        self.build_poll_at(offset, Utc::now())
    }

    fn build_block(
        &self,
        seq: u16,
        message_type: MessageType,
        payload: &str,
        offset: i64,
    ) -> Vec<u8> {
        self.build_block_at(seq, message_type, payload, offset, Utc::now())
    }

    fn parse_answer(&self, seq: u16, raw: &[u8]) -> Result<Answer> {
        self.parse_answer_at(seq, raw, Utc::now())
    }
}

/// Factory for [`Dc09Codec`]. Rejects paths configured with a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dc09CodecFactory;

impl FrameCodecFactory for Dc09CodecFactory {
    fn build(&self, identity: &PathIdentity) -> Result<Box<dyn FrameCodec>> {
        if identity.key.is_some() {
            return Err(Dc09Error::EncryptionUnsupported);
        }
        Ok(Box::new(Dc09Codec::new(
            identity.account.clone(),
            identity.receiver,
            identity.line,
        )))
    }
}

/// Fields extracted from a received frame.
#[derive(Debug)]
struct ParsedFrame {
    id: String,
    seq: u16,
    timestamp: Option<NaiveDateTime>,
}

fn invalid(details: impl Into<String>) -> Dc09Error {
    Dc09Error::InvalidResponse {
        details: details.into(),
    }
}

fn parse_frame(raw: &[u8]) -> Result<ParsedFrame> {
    let start = raw
        .iter()
        .position(|&b| b == LF)
        .ok_or_else(|| invalid("no frame start"))?;
    let rest = &raw[start + 1..];
    let end = rest
        .iter()
        .position(|&b| b == CR)
        .ok_or_else(|| invalid("no frame end"))?;
    let frame = std::str::from_utf8(&rest[..end]).map_err(|_| invalid("frame is not ASCII"))?;

    if frame.len() < 8 || !frame.is_ascii() {
        return Err(invalid(format!("frame too short: {:?}", frame)));
    }
    let (crc_hex, rest) = frame.split_at(4);
    let (len_hex, body) = rest.split_at(4);

    let received_crc =
        u16::from_str_radix(crc_hex, 16).map_err(|_| invalid(format!("bad CRC field {crc_hex}")))?;
    let length =
        usize::from_str_radix(len_hex, 16).map_err(|_| invalid(format!("bad length field {len_hex}")))?;
    if length != body.len() {
        return Err(invalid(format!(
            "length field {} does not match body length {}",
            length,
            body.len()
        )));
    }
    let expected_crc = Dc09Codec::compute_crc(body.as_bytes());
    if expected_crc != received_crc {
        return Err(Dc09Error::CrcMismatch {
            expected: expected_crc,
            received: received_crc,
        });
    }

    if body.starts_with("*\"") {
        return Err(Dc09Error::EncryptionUnsupported);
    }
    let body = body
        .strip_prefix('"')
        .ok_or_else(|| invalid("missing ID"))?;
    let id_end = body.find('"').ok_or_else(|| invalid("unterminated ID"))?;
    let id = body[..id_end].to_string();
    let after_id = &body[id_end + 1..];
    if after_id.len() < 4 {
        return Err(invalid("missing sequence number"));
    }
    let (seq_str, tail) = after_id.split_at(4);
    let seq: u16 = seq_str
        .parse()
        .map_err(|_| invalid(format!("bad sequence {seq_str}")))?;

    let timestamp = match tail.rfind('_') {
        Some(pos) => {
            let ts = &tail[pos + 1..];
            Some(
                NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
                    .map_err(|_| invalid(format!("bad timestamp {ts}")))?,
            )
        }
        None => None,
    };

    Ok(ParsedFrame { id, seq, timestamp })
}
