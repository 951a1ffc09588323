//! Shared error type for the SFU core and server.
//!
//! Uses `thiserror` for ergonomic error definitions. Every variant maps to one
//! of the error kinds the coordinator is expected to classify and log;
//! nothing here is meant to reach an HTTP response body.

/// Core error type used across the SFU's signaling and media-forwarding paths.
#[derive(Debug, thiserror::Error)]
pub enum SfuError {
    /// SDP set/create failed on a peer connection.
    #[error("peer protocol error: {0}")]
    PeerProtocolError(String),

    /// An ICE candidate arrived for a peer that isn't ready to accept it.
    #[error("peer not ready to accept ICE candidates")]
    PeerNotReady,

    /// A write to a peer's signaling socket failed.
    #[error("peer disconnected")]
    PeerDisconnected,

    /// An envelope named a room that does not exist.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// An envelope named a peer that does not exist in its room.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// An envelope's JSON was malformed or had the wrong shape for its event.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// The peer-connection engine could not be constructed at start-up.
    #[error("fatal initialization error: {0}")]
    FatalInit(String),

    /// Catch-all for errors surfaced by the underlying peer-connection engine
    /// that don't cleanly map to one of the kinds above.
    #[error("engine error: {0}")]
    Engine(#[from] anyhow::Error),
}

impl SfuError {
    /// Stable string identifier for structured log fields, mirroring the
    /// error-kind names used in the design documentation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PeerProtocolError(_) => "PEER_PROTOCOL_ERROR",
            Self::PeerNotReady => "PEER_NOT_READY",
            Self::PeerDisconnected => "PEER_DISCONNECTED",
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Self::PeerNotFound(_) => "PEER_NOT_FOUND",
            Self::DecodeError(_) => "DECODE_ERROR",
            Self::FatalInit(_) => "FATAL_INIT",
            Self::Engine(_) => "ENGINE_ERROR",
        }
    }
}

/// Convenience alias for Results using [`SfuError`].
pub type SfuResult<T> = Result<T, SfuError>;
