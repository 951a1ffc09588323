//! A room (C2): a peer set, a track set, and the renegotiation pass that
//! keeps every peer's senders converged on that track set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

use crate::envelope::Envelope;
use crate::peer::Peer;

/// A renegotiation pass is retried up to this many times before the room
/// gives up and reschedules itself in the background — restarting the whole
/// pass keeps the bookkeeping simple at the cost of repeated work, matching
/// the retry shape this is ported from.
const MAX_SIGNAL_PASSES: usize = 25;
const SIGNAL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// A fan-out track plus the id of the peer it was published by. Tracked so a
/// publisher never receives its own track back (conventional SFU behavior,
/// see DESIGN.md).
struct TrackEntry {
    owner_peer_id: String,
    track: Arc<TrackLocalStaticRTP>,
}

struct RoomState {
    peers: HashMap<String, Arc<Peer>>,
    tracks: HashMap<String, TrackEntry>,
}

enum PassOutcome {
    Converged,
    Restart,
}

pub struct Room {
    id: String,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(id: String) -> Self {
        Self {
            id,
            state: Mutex::new(RoomState {
                peers: HashMap::new(),
                tracks: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn add_peer(&self, peer_id: String, peer: Arc<Peer>) {
        self.state.lock().await.peers.insert(peer_id, peer);
    }

    pub async fn get_peer(&self, peer_id: &str) -> Option<Arc<Peer>> {
        self.state.lock().await.peers.get(peer_id).cloned()
    }

    pub async fn peer_count(&self) -> usize {
        self.state.lock().await.peers.len()
    }

    /// Remove a peer and re-run the renegotiation pass so survivors drop any
    /// senders that fed from it.
    pub async fn remove_peer(self: &Arc<Self>, peer_id: &str) {
        {
            let mut state = self.state.lock().await;
            remove_peer_locked(&mut state, peer_id);
        }
        self.clone().signal().await;
    }

    pub async fn add_track(
        self: &Arc<Self>,
        track_id: String,
        owner_peer_id: String,
        track: Arc<TrackLocalStaticRTP>,
    ) {
        {
            self.state
                .lock()
                .await
                .tracks
                .insert(track_id, TrackEntry { owner_peer_id, track });
        }
        self.clone().signal().await;
    }

    pub async fn remove_track(self: &Arc<Self>, track_id: &str) {
        {
            self.state.lock().await.tracks.remove(track_id);
        }
        self.clone().signal().await;
    }

    /// Reconcile every peer's senders against the room's track set. Each
    /// mutation (sender add/remove, peer removal) restarts the pass from
    /// scratch rather than trying to patch up an in-flight iteration, since
    /// the peer/track maps may have changed shape underneath it.
    ///
    /// The room lock is held for the whole pass; a pass that doesn't
    /// converge within [`MAX_SIGNAL_PASSES`] is abandoned and rescheduled a
    /// few seconds later rather than looping forever under the lock.
    pub async fn signal(self: Arc<Self>) {
        let mut state = self.state.lock().await;

        for pass in 0..MAX_SIGNAL_PASSES {
            match Self::attempt_pass(&self.id, &mut state).await {
                PassOutcome::Converged => {
                    tracing::debug!(room = %self.id, passes = pass + 1, "signaling converged");
                    return;
                }
                PassOutcome::Restart => continue,
            }
        }

        tracing::warn!(
            room = %self.id,
            passes = MAX_SIGNAL_PASSES,
            "signaling did not converge, rescheduling"
        );
        drop(state);

        let room = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SIGNAL_RETRY_DELAY).await;
            room.signal().await;
        });
    }

    async fn attempt_pass(room_id: &str, state: &mut RoomState) -> PassOutcome {
        let peer_ids: Vec<String> = state.peers.keys().cloned().collect();

        for peer_id in peer_ids {
            let Some(peer) = state.peers.get(&peer_id).cloned() else {
                continue;
            };
            let Some(pc) = peer.peer_connection().await else {
                continue;
            };

            if pc.connection_state() == RTCPeerConnectionState::Closed {
                tracing::info!(room = %room_id, peer = %peer_id, "peer connection closed, removing from room");
                remove_peer_locked(state, &peer_id);
                return PassOutcome::Restart;
            }

            let wanted: HashSet<String> = state
                .tracks
                .iter()
                .filter(|(_, entry)| entry.owner_peer_id != peer_id)
                .map(|(track_id, _)| track_id.clone())
                .collect();
            let mut attached: HashSet<String> = HashSet::new();

            for sender in pc.get_senders().await {
                let Some(track) = sender.track().await else {
                    continue;
                };
                let track_id = track.id().to_string();
                if !wanted.contains(&track_id) {
                    if pc.remove_track(&sender).await.is_ok() {
                        tracing::debug!(room = %room_id, peer = %peer_id, track = %track_id, "removed stale sender");
                        return PassOutcome::Restart;
                    }
                    continue;
                }
                attached.insert(track_id);
            }

            for receiver in pc.get_receivers().await {
                if let Some(track) = receiver.track().await {
                    attached.insert(track.id().to_string());
                }
            }

            for track_id in &wanted {
                if attached.contains(track_id) {
                    continue;
                }
                let Some(track) = state.tracks.get(track_id).map(|entry| entry.track.clone()) else {
                    continue;
                };
                if pc.add_track(track as Arc<dyn TrackLocal + Send + Sync>).await.is_ok() {
                    tracing::debug!(room = %room_id, peer = %peer_id, track = %track_id, "added sender");
                    return PassOutcome::Restart;
                }
            }

            if pc.pending_local_description().await.is_some() {
                if let Err(e) = Self::renegotiate(room_id, &peer_id, &peer, &pc).await {
                    tracing::warn!(room = %room_id, peer = %peer_id, error = %e, "renegotiation failed, skipping peer this pass");
                }
            }
        }

        PassOutcome::Converged
    }

    async fn renegotiate(
        room_id: &str,
        peer_id: &str,
        peer: &Arc<Peer>,
        pc: &Arc<RTCPeerConnection>,
    ) -> sfu_common::SfuResult<()> {
        let offer = pc
            .create_offer(Some(RTCOfferOptions {
                ice_restart: true,
                voice_activity_detection: false,
            }))
            .await
            .map_err(|e| sfu_common::SfuError::PeerProtocolError(e.to_string()))?;
        pc.set_local_description(offer.clone())
            .await
            .map_err(|e| sfu_common::SfuError::PeerProtocolError(e.to_string()))?;

        let envelope = Envelope::new("offer", &offer).map_err(|e| sfu_common::SfuError::Engine(e.into()))?;
        tracing::debug!(room = %room_id, peer = %peer_id, "sending renegotiation offer");
        peer.write_envelope(envelope).await
    }
}

/// Remove a peer from a room whose state lock is already held — never call
/// `Room::remove_peer` from inside a pass, it would deadlock re-acquiring
/// the same lock.
fn remove_peer_locked(state: &mut RoomState, peer_id: &str) {
    state.peers.remove(peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_get_peer_round_trips() {
        let room = Arc::new(Room::new("lobby".to_string()));
        let peer = Arc::new(Peer::new("alice".to_string()));
        room.add_peer("alice".to_string(), peer.clone()).await;
        assert_eq!(room.peer_count().await, 1);
        assert!(room.get_peer("alice").await.is_some());
        assert!(room.get_peer("bob").await.is_none());
    }

    #[tokio::test]
    async fn remove_peer_locked_is_idempotent() {
        let mut state = RoomState {
            peers: HashMap::new(),
            tracks: HashMap::new(),
        };
        remove_peer_locked(&mut state, "ghost");
        assert!(state.peers.is_empty());
    }

    #[tokio::test]
    async fn remove_peer_drops_it_from_room() {
        let room = Arc::new(Room::new("lobby".to_string()));
        let peer = Arc::new(Peer::new("alice".to_string()));
        room.add_peer("alice".to_string(), peer).await;
        room.remove_peer("alice").await;
        assert_eq!(room.peer_count().await, 0);
    }
}
