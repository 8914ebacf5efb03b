use crate::error::{SResult, SignalingError};
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Messages exchanged with the other participant through the room server.
///
/// Serialized as JSON objects tagged by `type`, e.g.
/// `{"type":"candidate","label":0,"id":"0","candidate":"candidate:..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate {
        label: u16,
        id: String,
        candidate: String,
    },
    Bye,
}

impl SignalingMessage {
    pub fn to_json(&self) -> SResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> SResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_session_description(description: &RTCSessionDescription) -> SResult<Self> {
        let sdp = description.sdp.clone();
        match description.sdp_type {
            RTCSdpType::Offer => Ok(Self::Offer { sdp }),
            RTCSdpType::Answer => Ok(Self::Answer { sdp }),
            other => Err(SignalingError::malformed(
                "sdp_type",
                format!("cannot signal a {other} description"),
            )),
        }
    }

    /// Returns `None` for messages that carry no session description.
    pub fn to_session_description(&self) -> SResult<Option<RTCSessionDescription>> {
        let description = match self {
            Self::Offer { sdp } => RTCSessionDescription::offer(sdp.clone())?,
            Self::Answer { sdp } => RTCSessionDescription::answer(sdp.clone())?,
            _ => return Ok(None),
        };
        Ok(Some(description))
    }

    pub fn from_candidate(candidate: RTCIceCandidateInit) -> Self {
        Self::Candidate {
            label: candidate.sdp_mline_index.unwrap_or_default(),
            id: candidate.sdp_mid.unwrap_or_default(),
            candidate: candidate.candidate,
        }
    }

    pub fn to_candidate(&self) -> Option<RTCIceCandidateInit> {
        match self {
            Self::Candidate {
                label,
                id,
                candidate,
            } => Some(RTCIceCandidateInit {
                candidate: candidate.clone(),
                sdp_mid: Some(id.clone()),
                sdp_mline_index: Some(*label),
                username_fragment: None,
            }),
            _ => None,
        }
    }
}
