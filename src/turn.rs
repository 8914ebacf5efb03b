use crate::error::{SResult, SignalingError};
use crate::ice::{IceServer, TurnServerResponse};
use reqwest::{header::ORIGIN, StatusCode, Url};

/// Asks the room's TURN endpoint for short-lived relay credentials.
///
/// The endpoint checks `Origin` against the room server, so it is set to the
/// origin of the room's base URL.
pub async fn request_turn_server(
    http: &reqwest::Client,
    turn_url: &Url,
    origin: &Url,
) -> SResult<IceServer> {
    let origin = origin.origin().ascii_serialization();
    tracing::debug!(%turn_url, %origin, "requesting TURN server");

    let response = http
        .get(turn_url.clone())
        .header(ORIGIN, origin)
        .send()
        .await?;

    if response.status() != StatusCode::OK {
        return Err(SignalingError::UnexpectedStatus {
            url: turn_url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let body: TurnServerResponse = serde_json::from_slice(&response.bytes().await?)?;
    IceServer::try_from(body)
}
