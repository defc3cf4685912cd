use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description exactly as browsers put it on the wire: `{"type": .., "sdp": ..}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Unit of exchange over the signalling channel.
///
/// Serialized as `{"kind": "offer" | "answer" | "hangup" | "ice-candidate", "data": ..}`.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum Message {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Hangup,
    IceCandidate(IceCandidate),
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Malformed signalling frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unrecognized message kind: {0}")]
    UnknownKind(String),
    #[error("Binary frame is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

// Kind is read first so an unknown kind is told apart from a malformed payload.
#[derive(Deserialize)]
struct Envelope {
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Offer(_) => "offer",
            Message::Answer(_) => "answer",
            Message::Hangup => "hangup",
            Message::IceCandidate(_) => "ice-candidate",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let message = match envelope.kind.as_str() {
            "offer" => Message::Offer(serde_json::from_value(envelope.data)?),
            "answer" => Message::Answer(serde_json::from_value(envelope.data)?),
            "ice-candidate" => Message::IceCandidate(serde_json::from_value(envelope.data)?),
            "hangup" => Message::Hangup,
            _ => return Err(DecodeError::UnknownKind(envelope.kind)),
        };
        Ok(message)
    }

    /// Binary frames carry the same JSON document as UTF-8 bytes.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::decode(std::str::from_utf8(bytes)?)
    }
}
