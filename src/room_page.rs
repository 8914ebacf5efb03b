//! Scraping of the server-rendered room page.
//!
//! The room server renders its session parameters as JavaScript variable
//! declarations, one per line:
//!
//! ```text
//!     var channelToken = 'f2a1...';
//!     var initiator = 1;
//!     var pcConfig = {"iceServers": [...]};
//! ```

use crate::error::{SResult, SignalingError};

const ROOM_FULL_MARKER: &str = "Sorry, this room is full.";

/// Raw variable values read from a room page, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPage {
    pub channel_token: String,
    pub room_key: String,
    pub client_id: String,
    pub initiator: String,
    pub turn_url: String,
    pub pc_config: String,
    pub pc_constraints: String,
    pub offer_constraints: Option<String>,
    pub media_constraints: String,
}

impl RoomPage {
    pub fn parse(html: &str) -> SResult<Self> {
        if is_room_full(html) {
            return Err(SignalingError::RoomFull);
        }

        Ok(Self {
            channel_token: var_value(html, "channelToken", true)?,
            room_key: var_value(html, "roomKey", true)?,
            client_id: var_value(html, "me", true)?,
            initiator: var_value(html, "initiator", false)?,
            turn_url: var_value(html, "turnUrl", true)?,
            pc_config: var_value(html, "pcConfig", false)?,
            pc_constraints: var_value(html, "pcConstraints", false)?,
            offer_constraints: optional_var_value(html, "offerConstraints", false),
            media_constraints: var_value(html, "mediaConstraints", false)?,
        })
    }
}

pub fn is_room_full(html: &str) -> bool {
    html.lines().any(|line| line.trim() == ROOM_FULL_MARKER)
}

/// Returns the value assigned by the first `var <name> = <value>;` line.
pub fn var_value(html: &str, name: &str, strip_quotes: bool) -> SResult<String> {
    optional_var_value(html, name, strip_quotes)
        .ok_or_else(|| SignalingError::MissingVariable(name.to_string()))
}

pub(crate) fn optional_var_value(html: &str, name: &str, strip_quotes: bool) -> Option<String> {
    let value = html.lines().find_map(|line| match_declaration(line, name))?;

    if strip_quotes {
        Some(unquote(value).to_string())
    } else {
        Some(value.to_string())
    }
}

fn match_declaration<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.trim_end_matches('\r')
        .trim_start_matches(' ')
        .strip_prefix("var ")?
        .strip_prefix(name)?
        .strip_prefix(" = ")?
        .strip_suffix(';')
}

fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
