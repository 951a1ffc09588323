//! Wire types for the signaling channel (§4.4 / C4).
//!
//! Every message on the channel is `{ "event": <string>, "data": <...> }`.
//! `data`'s shape depends on `event`, so it's kept as an opaque [`serde_json::Value`]
//! at the envelope level and only decoded into one of the typed bodies below
//! once the event name is known.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub data: Value,
}

impl Envelope {
    /// Build an outbound envelope, serializing `data` into the opaque slot.
    pub fn new(event: impl Into<String>, data: &impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_value(data)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinRoomBody {
    pub self_id: String,
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaveRoomBody {
    pub self_id: String,
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfferBody {
    pub self_id: String,
    pub room_id: String,
    pub offer: RTCSessionDescription,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerBody {
    pub self_id: String,
    pub room_id: String,
    pub answer: RTCSessionDescription,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IceCandidateBody {
    pub self_id: String,
    pub room_id: String,
    pub candidate: RTCIceCandidateInit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_join_room_body_from_opaque_data() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"event":"joinRoom","data":{"self_id":"alice","room_id":"lobby"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.event, "joinRoom");
        let body: JoinRoomBody = serde_json::from_value(envelope.data).unwrap();
        assert_eq!(body.self_id, "alice");
        assert_eq!(body.room_id, "lobby");
    }

    #[test]
    fn rejects_ice_candidate_body_missing_candidate() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"event":"ice-candidate","data":{"self_id":"a","room_id":"r"}}"#,
        )
        .unwrap();
        assert!(serde_json::from_value::<IceCandidateBody>(envelope.data).is_err());
    }
}
