//! Glue between scraped room parameters and the `webrtc` peer connection.

use crate::error::{SResult, SignalingError};
use crate::ice::IceServer;
use crate::message::SignalingMessage;
use crate::parameters::SignalingParameters;
use crate::signaling_client::SignalingClient;
use webrtc::api::API;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

impl From<&IceServer> for RTCIceServer {
    fn from(server: &IceServer) -> Self {
        RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone(),
            credential: server.credential.clone(),
            ..Default::default()
        }
    }
}

pub fn rtc_configuration(ice_servers: &[IceServer]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers.iter().map(RTCIceServer::from).collect(),
        ..Default::default()
    }
}

/// Creates a peer connection using the ICE servers of the joined room.
pub async fn new_peer_connection(
    api: &API,
    parameters: &SignalingParameters,
) -> SResult<RTCPeerConnection> {
    let connection = api
        .new_peer_connection(rtc_configuration(&parameters.ice_servers))
        .await?;
    Ok(connection)
}

/// Sends every locally gathered ICE candidate to the other participant.
pub fn forward_ice_candidates(connection: &RTCPeerConnection, client: SignalingClient) {
    connection.on_ice_candidate(Box::new(move |candidate| {
        let client = client.clone();

        Box::pin(async move {
            let Some(candidate) = candidate else {
                return;
            };

            let message = candidate
                .to_json()
                .map_err(SignalingError::from)
                .and_then(|init| SignalingMessage::from_candidate(init).to_json());

            match message {
                Ok(message) => client.send_message(message),
                Err(err) => tracing::warn!(error = %err, "unable to signal ICE candidate"),
            }
        })
    }));
}
