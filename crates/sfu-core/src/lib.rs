//! Room/peer/coordinator signaling core: the session plane around a pool of
//! WebRTC peer connections. No transcoding, no mixing — packets in, packets
//! out.

pub mod coordinator;
pub mod engine;
pub mod envelope;
pub mod peer;
pub mod room;

pub use coordinator::Coordinator;
pub use envelope::Envelope;
pub use peer::{Peer, Socket};
pub use room::Room;
