// MIT License - Copyright (c) 2026 Peter Wright
// Error types

/// All errors that can occur in the dc09-spt library.
///
/// Transport and protocol errors never escape a [`TransmissionPath`]: they are
/// logged and collapsed into a failed attempt. The remaining variants are
/// returned to callers of the [`Dialer`] API.
///
/// [`TransmissionPath`]: crate::path::TransmissionPath
/// [`Dialer`]: crate::dialer::Dialer
#[derive(Debug, thiserror::Error)]
pub enum Dc09Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout: {endpoint}")]
    ConnectTimeout { endpoint: String },

    #[error("Response timeout: {endpoint}")]
    ResponseTimeout { endpoint: String },

    #[error("Connection closed by receiver before answering")]
    ConnectionClosed,

    #[error("Invalid response: {details}")]
    InvalidResponse { details: String },

    #[error("CRC mismatch (expected {expected:04X}, got {received:04X})")]
    CrcMismatch { expected: u16, received: u16 },

    #[error("Sequence mismatch (sent {sent}, answered {answered})")]
    SequenceMismatch { sent: u16, answered: u16 },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Missing message field: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid interval: {0} seconds")]
    InvalidInterval(u64),

    #[error("Encrypted paths are not supported by this frame codec")]
    EncryptionUnsupported,
}

impl Dc09Error {
    /// Whether this error came from the network rather than from the answer's content.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Dc09Error::Io(_)
                | Dc09Error::ConnectTimeout { .. }
                | Dc09Error::ResponseTimeout { .. }
                | Dc09Error::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, Dc09Error>;
