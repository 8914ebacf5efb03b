use crate::error::{SResult, SignalingError};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }

    pub fn is_turn(&self) -> bool {
        self.urls
            .iter()
            .any(|url| url.starts_with("turn:") || url.starts_with("turns:"))
    }
}

/// Body returned by the room server's TURN endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnServerResponse {
    pub username: String,
    pub password: String,
    pub uris: Vec<String>,
}

impl TryFrom<TurnServerResponse> for IceServer {
    type Error = SignalingError;

    fn try_from(response: TurnServerResponse) -> SResult<Self> {
        if response.uris.is_empty() {
            return Err(SignalingError::malformed("turn.uris", "no TURN URIs offered"));
        }

        Ok(IceServer {
            urls: response.uris,
            username: response.username,
            credential: response.password,
        })
    }
}

/// Parses the page's `pcConfig` (`{"iceServers": [...]}`).
///
/// Entries may carry either a single `url` or `urls` (string or array).
pub fn ice_servers_from_pc_config(pc_config: &str) -> SResult<Vec<IceServer>> {
    let value: Value = serde_json::from_str(pc_config)?;
    let servers = value
        .get("iceServers")
        .and_then(Value::as_array)
        .ok_or_else(|| SignalingError::malformed("pcConfig", "missing iceServers array"))?;

    servers.iter().map(ice_server_from_value).collect()
}

pub fn has_turn_server(servers: &[IceServer]) -> bool {
    servers.iter().any(IceServer::is_turn)
}

fn ice_server_from_value(entry: &Value) -> SResult<IceServer> {
    let urls = match (entry.get("urls"), entry.get("url")) {
        (Some(Value::String(url)), _) | (None, Some(Value::String(url))) => vec![url.clone()],
        (Some(Value::Array(urls)), _) => urls
            .iter()
            .map(|url| {
                url.as_str().map(str::to_string).ok_or_else(|| {
                    SignalingError::malformed("pcConfig.iceServers", "non-string url")
                })
            })
            .collect::<SResult<Vec<_>>>()?,
        _ => {
            return Err(SignalingError::malformed(
                "pcConfig.iceServers",
                "entry without url",
            ))
        }
    };

    let string_field = |name: &str| {
        entry
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(IceServer {
        urls,
        username: string_field("username"),
        credential: string_field("credential"),
    })
}
