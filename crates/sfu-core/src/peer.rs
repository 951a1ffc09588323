//! A single signaling participant (C1): one signaling socket paired with
//! zero-or-one peer connection, for the lifetime of that pairing.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use sfu_common::{SfuError, SfuResult};
use tokio::sync::Mutex;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_remote::TrackRemote;

use crate::envelope::Envelope;

/// The write half of a peer's signaling socket.
pub type Socket = SplitSink<WebSocket, WsMessage>;

struct PeerInner {
    peer_connection: Option<Arc<RTCPeerConnection>>,
    /// Inbound tracks this peer has published, kept for diagnostics only —
    /// forwarding state lives in the room's track map, not here.
    remote_tracks: HashMap<String, Arc<TrackRemote>>,
}

/// One signaling participant.
///
/// Two locks guard disjoint state: `inner` serializes peer-connection
/// mutation (SDP exchanges, ICE candidates), `write_lock` serializes socket
/// writes. A peer that's mid-renegotiation can still receive a forwarded
/// ICE candidate from another task without waiting on the SDP lock.
pub struct Peer {
    self_id: String,
    inner: Mutex<PeerInner>,
    write_lock: Mutex<Option<Socket>>,
}

impl Peer {
    pub fn new(self_id: String) -> Self {
        Self {
            self_id,
            inner: Mutex::new(PeerInner {
                peer_connection: None,
                remote_tracks: HashMap::new(),
            }),
            write_lock: Mutex::new(None),
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Install (or replace) the socket half this peer writes envelopes to.
    pub async fn set_socket(&self, socket: Socket) {
        *self.write_lock.lock().await = Some(socket);
    }

    pub async fn set_peer_connection(&self, pc: Arc<RTCPeerConnection>) {
        self.inner.lock().await.peer_connection = Some(pc);
    }

    pub async fn peer_connection(&self) -> Option<Arc<RTCPeerConnection>> {
        self.inner.lock().await.peer_connection.clone()
    }

    pub async fn register_remote_track(&self, track_id: String, track: Arc<TrackRemote>) {
        self.inner.lock().await.remote_tracks.insert(track_id, track);
    }

    pub async fn remove_remote_track(&self, track_id: &str) {
        self.inner.lock().await.remote_tracks.remove(track_id);
    }

    /// Apply a remote offer and answer it. Mutually exclusive with
    /// [`Self::react_on_answer`] and the room's renegotiation pass for this
    /// peer's connection.
    pub async fn react_on_offer(&self, offer: RTCSessionDescription) -> SfuResult<RTCSessionDescription> {
        let inner = self.inner.lock().await;
        let pc = inner
            .peer_connection
            .clone()
            .ok_or(SfuError::PeerNotReady)?;
        drop(inner);

        pc.set_remote_description(offer)
            .await
            .map_err(|e| SfuError::PeerProtocolError(e.to_string()))?;
        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| SfuError::PeerProtocolError(e.to_string()))?;
        pc.set_local_description(answer)
            .await
            .map_err(|e| SfuError::PeerProtocolError(e.to_string()))?;
        pc.local_description()
            .await
            .ok_or_else(|| SfuError::PeerProtocolError("no local description after set".into()))
    }

    /// Apply a remote answer to a locally-initiated offer.
    pub async fn react_on_answer(&self, answer: RTCSessionDescription) -> SfuResult<()> {
        let inner = self.inner.lock().await;
        let pc = inner
            .peer_connection
            .clone()
            .ok_or(SfuError::PeerNotReady)?;
        drop(inner);

        pc.set_remote_description(answer)
            .await
            .map_err(|e| SfuError::PeerProtocolError(e.to_string()))
    }

    /// Hand a trickled ICE candidate to the peer connection. A peer with no
    /// connection yet reports [`SfuError::PeerNotReady`]; a candidate the
    /// stack itself rejects (malformed, wrong transport state, ...) is
    /// passed through as [`SfuError::PeerProtocolError`] carrying the
    /// stack's own message, the same as [`Self::react_on_offer`] and
    /// [`Self::react_on_answer`] do for their SDP calls.
    pub async fn add_ice(&self, candidate: RTCIceCandidateInit) -> SfuResult<()> {
        let inner = self.inner.lock().await;
        let pc = inner
            .peer_connection
            .clone()
            .ok_or(SfuError::PeerNotReady)?;
        drop(inner);

        pc.add_ice_candidate(candidate)
            .await
            .map_err(|e| SfuError::PeerProtocolError(e.to_string()))
    }

    /// Write an already-built envelope to this peer's socket. Writes are
    /// linearized through `write_lock`; a socket that hasn't been installed
    /// yet (or was torn down) reports [`SfuError::PeerDisconnected`].
    pub async fn write_envelope(&self, envelope: Envelope) -> SfuResult<()> {
        let text = serde_json::to_string(&envelope).map_err(|e| SfuError::Engine(e.into()))?;
        let mut guard = self.write_lock.lock().await;
        let socket = guard.as_mut().ok_or(SfuError::PeerDisconnected)?;
        socket
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|_| SfuError::PeerDisconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn react_on_offer_without_peer_connection_is_not_ready() {
        let peer = Peer::new("alice".to_string());
        let offer = RTCSessionDescription::offer("v=0".to_string()).unwrap();
        let err = peer.react_on_offer(offer).await.unwrap_err();
        assert!(matches!(err, SfuError::PeerNotReady));
    }

    #[tokio::test]
    async fn write_envelope_without_socket_is_disconnected() {
        let peer = Peer::new("alice".to_string());
        let envelope = Envelope::new("candidate", &serde_json::json!({})).unwrap();
        let err = peer.write_envelope(envelope).await.unwrap_err();
        assert!(matches!(err, SfuError::PeerDisconnected));
    }

    /// Two peer connections negotiating in the same process, no network
    /// involved: an offerer builds a real offer, `react_on_offer` answers it
    /// through the same code path `handle_offer` drives, and the answer is
    /// fed back to bring both sides to the stable signaling state.
    #[tokio::test]
    async fn react_on_offer_and_answer_negotiate_a_real_session() {
        use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
        use webrtc::peer_connection::signaling_state::RTCSignalingState;
        use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

        let api = crate::engine::build_api().expect("engine builds without ICE servers");
        let offerer_pc = crate::engine::new_peer_connection(&api)
            .await
            .expect("offerer connection builds");
        let answerer_pc = crate::engine::new_peer_connection(&api)
            .await
            .expect("answerer connection builds");

        offerer_pc
            .add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .expect("offerer adds a video transceiver");

        let offer = offerer_pc.create_offer(None).await.expect("offer is created");
        offerer_pc
            .set_local_description(offer.clone())
            .await
            .expect("offerer sets its own local description");

        let answerer = Peer::new("bob".to_string());
        answerer.set_peer_connection(answerer_pc.clone()).await;
        let answer = answerer
            .react_on_offer(offer)
            .await
            .expect("react_on_offer negotiates an answer");
        assert_eq!(answer.sdp_type, RTCSdpType::Answer);

        offerer_pc
            .set_remote_description(answer)
            .await
            .expect("offerer accepts the answer");

        assert_eq!(offerer_pc.signaling_state(), RTCSignalingState::Stable);
        assert_eq!(answerer_pc.signaling_state(), RTCSignalingState::Stable);
    }
}
