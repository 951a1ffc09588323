//! Construction of the underlying peer-connection engine.
//!
//! One [`API`] instance is shared by the whole process; every joining peer
//! gets its own [`RTCPeerConnection`] built from it. ICE servers are left
//! empty — callers deploying behind NAT are expected to supply them
//! out-of-band by extending [`RTCConfiguration`] before this returns, not by
//! patching this function.

use std::sync::Arc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

/// Build the shared engine handle: default codec set, default interceptors
/// (NACK, RTCP reports, twcc), nothing exotic.
pub fn build_api() -> anyhow::Result<Arc<API>> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    Ok(Arc::new(api))
}

/// Create a new peer connection from the shared engine, empty ICE server
/// list (§6.3 leaves TURN/STUN provisioning to deployment, not to the core).
pub async fn new_peer_connection(api: &API) -> anyhow::Result<Arc<RTCPeerConnection>> {
    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;
    Ok(Arc::new(pc))
}
