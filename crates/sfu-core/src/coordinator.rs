//! The coordinator (C3): the room directory, and the event dispatch table
//! that turns decoded envelopes into room/peer operations.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use webrtc::api::API;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_remote::TrackRemote;

use sfu_common::SfuError;

use crate::envelope::{AnswerBody, Envelope, IceCandidateBody, LeaveRoomBody, OfferBody};
use crate::peer::{Peer, Socket};
use crate::room::Room;

/// Directory of rooms, and the engine handle every new peer connection is
/// built from. One per process.
pub struct Coordinator {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    api: Arc<API>,
}

impl Coordinator {
    pub fn new(api: Arc<API>) -> Arc<Self> {
        Arc::new(Self {
            rooms: Mutex::new(HashMap::new()),
            api,
        })
    }

    async fn get_or_create_room(&self, room_id: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Room::new(room_id.to_string())))
            .clone()
    }

    async fn get_room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    /// Handle a `joinRoom` event. Unlike the other four events this isn't
    /// reached through [`Self::dispatch`] — the signaling handler calls it
    /// directly because it's the one event that hands over ownership of the
    /// socket's write half.
    pub async fn join_room(self: &Arc<Self>, self_id: String, room_id: String, socket: Socket) {
        let room = self.get_or_create_room(&room_id).await;

        let peer = Arc::new(Peer::new(self_id.clone()));
        peer.set_socket(socket).await;

        let pc = match crate::engine::new_peer_connection(&self.api).await {
            Ok(pc) => pc,
            Err(e) => {
                tracing::error!(self_id = %self_id, room_id = %room_id, error = %e, "failed to create peer connection");
                return;
            }
        };

        let recvonly = || RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Recvonly,
            send_encodings: Vec::new(),
        };
        if let Err(e) = pc
            .add_transceiver_from_kind(RTPCodecType::Video, Some(recvonly()))
            .await
        {
            tracing::error!(self_id = %self_id, room_id = %room_id, error = %e, "failed to add video transceiver");
            return;
        }
        if let Err(e) = pc
            .add_transceiver_from_kind(RTPCodecType::Audio, Some(recvonly()))
            .await
        {
            tracing::error!(self_id = %self_id, room_id = %room_id, error = %e, "failed to add audio transceiver");
            return;
        }

        peer.set_peer_connection(pc.clone()).await;
        room.add_peer(self_id.clone(), peer.clone()).await;

        Self::wire_callbacks(pc, room, peer, self_id.clone());

        tracing::info!(self_id = %self_id, room_id = %room_id, "peer joined room");
    }

    fn wire_callbacks(pc: Arc<RTCPeerConnection>, room: Arc<Room>, peer: Arc<Peer>, self_id: String) {
        let room_state = room.clone();
        let pc_state = pc.clone();
        let self_id_state = self_id.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let room = room_state.clone();
            let pc = pc_state.clone();
            let self_id = self_id_state.clone();
            Box::pin(async move {
                match state {
                    RTCPeerConnectionState::Failed => {
                        if let Err(e) = pc.close().await {
                            tracing::warn!(self_id = %self_id, error = %e, "failed to close failed peer connection");
                        }
                    }
                    RTCPeerConnectionState::Closed => {
                        room.signal().await;
                    }
                    _ => {}
                }
            })
        }));

        let peer_ice = peer.clone();
        let self_id_ice = self_id.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let peer = peer_ice.clone();
            let self_id = self_id_ice.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    tracing::debug!(self_id = %self_id, "ICE gathering complete");
                    return;
                };
                let init = match candidate.to_json() {
                    Ok(init) => init,
                    Err(e) => {
                        tracing::warn!(self_id = %self_id, error = %e, "failed to encode ICE candidate");
                        return;
                    }
                };
                match Envelope::new("candidate", &init) {
                    Ok(envelope) => {
                        if let Err(e) = peer.write_envelope(envelope).await {
                            tracing::warn!(self_id = %self_id, error = %e, "failed to send ICE candidate");
                        }
                    }
                    Err(e) => tracing::warn!(self_id = %self_id, error = %e, "failed to encode candidate envelope"),
                }
            })
        }));

        let room_track = room.clone();
        let peer_track = peer.clone();
        let self_id_track = self_id.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let room = room_track.clone();
            let peer = peer_track.clone();
            let self_id = self_id_track.clone();
            Box::pin(async move {
                forward_track(room, peer, track, self_id).await;
            })
        }));
    }

    /// Route a decoded envelope (anything but `joinRoom`) to its handler.
    /// Handlers run as independent tasks — a slow renegotiation on one peer
    /// never blocks an ICE candidate bound for another.
    pub fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        let this = self.clone();
        match envelope.event.as_str() {
            "leaveRoom" => {
                tokio::spawn(async move { this.handle_leave_room(envelope.data).await });
            }
            "offer" => {
                tokio::spawn(async move { this.handle_offer(envelope.data).await });
            }
            "answer" => {
                tokio::spawn(async move { this.handle_answer(envelope.data).await });
            }
            "ice-candidate" => {
                tokio::spawn(async move { this.handle_ice_candidate(envelope.data).await });
            }
            other => {
                tracing::debug!(event = %other, "unrecognized signaling event, dropping");
            }
        };
    }

    /// Remove a peer from a room. Shared by the `leaveRoom` event handler and
    /// the signaling endpoint's disconnect teardown — both describe the same
    /// lifecycle transition (§3: a peer is destroyed when removed from its
    /// room, however that removal was triggered).
    pub async fn leave_room(&self, self_id: &str, room_id: &str) {
        let Some(room) = self.get_room(room_id).await else {
            let err = SfuError::RoomNotFound(room_id.to_string());
            tracing::warn!(self_id = %self_id, room_id = %room_id, kind = err.kind(), "{err}");
            return;
        };
        room.remove_peer(self_id).await;
    }

    async fn handle_leave_room(&self, data: Value) {
        let body: LeaveRoomBody = match serde_json::from_value(data) {
            Ok(b) => b,
            Err(e) => {
                let err = SfuError::DecodeError(e.to_string());
                tracing::warn!(event = "leaveRoom", kind = err.kind(), "{err}");
                return;
            }
        };
        self.leave_room(&body.self_id, &body.room_id).await;
    }

    async fn handle_offer(&self, data: Value) {
        let body: OfferBody = match serde_json::from_value(data) {
            Ok(b) => b,
            Err(e) => {
                let err = SfuError::DecodeError(e.to_string());
                tracing::warn!(event = "offer", kind = err.kind(), "{err}");
                return;
            }
        };
        let Some(room) = self.get_room(&body.room_id).await else {
            let err = SfuError::RoomNotFound(body.room_id.clone());
            tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, kind = err.kind(), "{err}");
            return;
        };
        let Some(peer) = room.get_peer(&body.self_id).await else {
            let err = SfuError::PeerNotFound(body.self_id.clone());
            tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, kind = err.kind(), "{err}");
            return;
        };

        match peer.react_on_offer(body.offer).await {
            Ok(answer) => match Envelope::new("answer", &answer) {
                Ok(envelope) => {
                    if let Err(e) = peer.write_envelope(envelope).await {
                        tracing::warn!(self_id = %body.self_id, kind = e.kind(), "{e}");
                    }
                }
                Err(e) => tracing::warn!(self_id = %body.self_id, error = %e, "failed to encode answer envelope"),
            },
            Err(e) => {
                tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, kind = e.kind(), "{e}");
            }
        }
    }

    async fn handle_answer(&self, data: Value) {
        let body: AnswerBody = match serde_json::from_value(data) {
            Ok(b) => b,
            Err(e) => {
                let err = SfuError::DecodeError(e.to_string());
                tracing::warn!(event = "answer", kind = err.kind(), "{err}");
                return;
            }
        };
        let Some(room) = self.get_room(&body.room_id).await else {
            let err = SfuError::RoomNotFound(body.room_id.clone());
            tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, kind = err.kind(), "{err}");
            return;
        };
        let Some(peer) = room.get_peer(&body.self_id).await else {
            let err = SfuError::PeerNotFound(body.self_id.clone());
            tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, kind = err.kind(), "{err}");
            return;
        };

        if let Err(e) = peer.react_on_answer(body.answer).await {
            tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, kind = e.kind(), "{e}");
        }
    }

    async fn handle_ice_candidate(&self, data: Value) {
        let body: IceCandidateBody = match serde_json::from_value(data) {
            Ok(b) => b,
            Err(e) => {
                let err = SfuError::DecodeError(e.to_string());
                tracing::warn!(event = "ice-candidate", kind = err.kind(), "{err}");
                return;
            }
        };
        let Some(room) = self.get_room(&body.room_id).await else {
            let err = SfuError::RoomNotFound(body.room_id.clone());
            tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, kind = err.kind(), "{err}");
            return;
        };
        let Some(peer) = room.get_peer(&body.self_id).await else {
            let err = SfuError::PeerNotFound(body.self_id.clone());
            tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, kind = err.kind(), "{err}");
            return;
        };

        if let Err(e) = peer.add_ice(body.candidate).await {
            tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, kind = e.kind(), "{e}");
        }
    }
}

/// Read a published remote track to EOF, republishing every packet onto a
/// room-wide local track that [`Room::signal`] fans out to every other peer.
/// Runs for the lifetime of the remote track; ends when the publisher stops
/// sending (remote closed) or the connection drops.
async fn forward_track(room: Arc<Room>, peer: Arc<Peer>, remote_track: Arc<TrackRemote>, self_id: String) {
    let track_id = remote_track.id().to_string();
    let local_track = Arc::new(TrackLocalStaticRTP::new(
        remote_track.codec().capability.clone(),
        track_id.clone(),
        remote_track.stream_id().to_string(),
    ));

    peer.register_remote_track(track_id.clone(), remote_track.clone()).await;
    room.add_track(track_id.clone(), self_id.clone(), local_track.clone()).await;

    tracing::info!(room = %room.id(), self_id = %self_id, track = %track_id, kind = ?remote_track.kind(), "forwarding track");

    let mut buf = vec![0u8; 1500];
    loop {
        match remote_track.read(&mut buf).await {
            Ok((packet, _attributes)) => {
                if let Err(e) = write_rtp(&local_track, &packet).await {
                    tracing::debug!(track = %track_id, self_id = %self_id, error = %e, "dropped forwarded RTP packet");
                }
            }
            Err(e) => {
                tracing::info!(track = %track_id, self_id = %self_id, error = %e, "remote track ended");
                break;
            }
        }
    }

    peer.remove_remote_track(&track_id).await;
    room.remove_track(&track_id).await;
}

async fn write_rtp(
    local_track: &Arc<TrackLocalStaticRTP>,
    packet: &webrtc::rtp::packet::Packet,
) -> Result<(), webrtc::Error> {
    use webrtc::track::track_local::TrackLocalWriter;
    local_track.write_rtp(packet).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_coordinator() -> Arc<Coordinator> {
        let api = crate::engine::build_api().expect("engine builds without ICE servers");
        Coordinator::new(api)
    }

    #[tokio::test]
    async fn get_or_create_room_reuses_existing_room() {
        let coordinator = test_coordinator();
        let a = coordinator.get_or_create_room("lobby").await;
        let b = coordinator.get_or_create_room("lobby").await;
        assert_eq!(a.id(), b.id());
        assert_eq!(Arc::strong_count(&a), 3); // a, b, and the rooms map entry
    }

    #[tokio::test]
    async fn dispatch_unknown_event_does_not_panic() {
        let coordinator = test_coordinator();
        let envelope = Envelope::new("frobnicate", &serde_json::json!({})).unwrap();
        coordinator.dispatch(envelope);
    }

    #[tokio::test]
    async fn leave_room_on_unknown_room_is_a_no_op() {
        let coordinator = test_coordinator();
        coordinator.leave_room("alice", "nonexistent").await;
    }
}
