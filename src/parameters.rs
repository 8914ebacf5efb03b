use crate::constraints::{av_constraints, MediaConstraints};
use crate::error::{SResult, SignalingError};
use crate::ice::{ice_servers_from_pc_config, IceServer};
use crate::room_page::RoomPage;
use reqwest::Url;

/// Session parameters of a joined room.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalingParameters {
    pub ice_servers: Vec<IceServer>,
    /// Room URL with query and fragment removed; every other endpoint of the
    /// room server lives below it.
    pub base_url: Url,
    pub channel_token: String,
    pub room_key: String,
    pub client_id: String,
    pub post_message_url: Url,
    pub initiator: bool,
    pub pc_constraints: MediaConstraints,
    pub offer_constraints: Option<MediaConstraints>,
    pub video_constraints: Option<MediaConstraints>,
    pub audio_constraints: Option<MediaConstraints>,
    pub turn_url: Url,
}

impl SignalingParameters {
    pub fn from_room_page(room_url: &Url, page: RoomPage) -> SResult<Self> {
        let base_url = base_url(room_url);

        let mut post_message_url = base_url
            .join("message")
            .map_err(|err| SignalingError::invalid_url(base_url.as_str(), err))?;
        post_message_url
            .query_pairs_mut()
            .append_pair("r", &page.room_key)
            .append_pair("u", &page.client_id);

        let turn_url = room_url
            .join(&page.turn_url)
            .map_err(|err| SignalingError::invalid_url(&page.turn_url, err))?;

        let mut pc_constraints = MediaConstraints::from_json(&page.pc_constraints)?;
        pc_constraints.ensure_dtls_srtp();

        let offer_constraints = page
            .offer_constraints
            .as_deref()
            .map(MediaConstraints::from_json)
            .transpose()?;

        Ok(Self {
            ice_servers: ice_servers_from_pc_config(&page.pc_config)?,
            base_url,
            channel_token: page.channel_token,
            room_key: page.room_key,
            client_id: page.client_id,
            post_message_url,
            initiator: page.initiator.trim() == "1",
            pc_constraints,
            offer_constraints,
            video_constraints: av_constraints("video", &page.media_constraints)?,
            audio_constraints: av_constraints("audio", &page.media_constraints)?,
            turn_url,
        })
    }
}

/// Strips query and fragment and makes sure the path ends with `/` so that
/// relative joins land beside the room page.
fn base_url(room_url: &Url) -> Url {
    let mut base = room_url.clone();
    base.set_query(None);
    base.set_fragment(None);

    if !base.path().ends_with('/') {
        let path = match base.path().rfind('/') {
            Some(index) => base.path()[..=index].to_string(),
            None => "/".to_string(),
        };
        base.set_path(&path);
    }

    base
}
