use crate::error::{SResult, SignalingError};
use serde_json::{Map, Value};

pub const DTLS_SRTP_KEY_AGREEMENT: &str = "DtlsSrtpKeyAgreement";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Mandatory and optional constraints handed to the media library when
/// creating a peer connection or capturing a track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    pub mandatory: Vec<KeyValuePair>,
    pub optional: Vec<KeyValuePair>,
}

impl MediaConstraints {
    /// Parses `{"mandatory": {..}, "optional": [{..}, ..]}`. Either section
    /// may be missing.
    pub fn from_json(raw: &str) -> SResult<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    pub(crate) fn from_value(value: &Value) -> SResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| SignalingError::malformed("constraints", "expected a JSON object"))?;

        let mandatory = match object.get("mandatory") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(entries)) => pairs_from_object(entries),
            Some(_) => {
                return Err(SignalingError::malformed(
                    "constraints.mandatory",
                    "expected a JSON object",
                ))
            }
        };

        let mut optional = Vec::new();
        match object.get("optional") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    let entries = item.as_object().ok_or_else(|| {
                        SignalingError::malformed(
                            "constraints.optional",
                            "expected an array of objects",
                        )
                    })?;
                    optional.extend(pairs_from_object(entries));
                }
            }
            Some(_) => {
                return Err(SignalingError::malformed(
                    "constraints.optional",
                    "expected a JSON array",
                ))
            }
        }

        Ok(Self {
            mandatory,
            optional,
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.mandatory
            .iter()
            .chain(self.optional.iter())
            .any(|pair| pair.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.mandatory.is_empty() && self.optional.is_empty()
    }

    /// Adds `DtlsSrtpKeyAgreement=true` as an optional constraint unless the
    /// key is already present in either list.
    pub fn ensure_dtls_srtp(&mut self) {
        if !self.contains_key(DTLS_SRTP_KEY_AGREEMENT) {
            self.optional
                .push(KeyValuePair::new(DTLS_SRTP_KEY_AGREEMENT, "true"));
        }
    }
}

/// Extracts the audio or video section of the page's `mediaConstraints`.
///
/// `false` or a missing entry disables the track (`None`), `true` enables it
/// with no constraints, and an object is parsed as constraints.
pub fn av_constraints(kind: &str, media_constraints: &str) -> SResult<Option<MediaConstraints>> {
    let value: Value = serde_json::from_str(media_constraints)?;

    match value.get(kind) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::Bool(true)) => Ok(Some(MediaConstraints::default())),
        Some(section @ Value::Object(_)) => MediaConstraints::from_value(section).map(Some),
        Some(other) => Err(SignalingError::malformed(
            kind,
            format!("expected a boolean or object, got {other}"),
        )),
    }
}

fn pairs_from_object(entries: &Map<String, Value>) -> Vec<KeyValuePair> {
    entries
        .iter()
        .map(|(key, value)| KeyValuePair::new(key.as_str(), value_to_string(value)))
        .collect()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
