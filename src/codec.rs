//! Framing for counter-sync traffic on the shared gossip channel.
//!
//! Every gossip payload starts with one kind byte so the channel can carry
//! other traffic next to counter state:
//!
//! ```text
//! [KIND: u8][BODY: N bytes]
//! KIND = b'd'  ->  BODY = {"Action":"merge","Data":<replica state JSON>}
//! ```
//!
//! Decoding is exhaustive: anything that is not a data frame comes back as
//! [`Frame::Unknown`] and unknown actions as [`Action::Other`], so newer
//! peers can introduce message kinds without older nodes failing on them.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

/// Kind byte marking a counter data frame.
pub const DATA_TAG: u8 = b'd';

/// What the receiver should do with a [`SyncMessage`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    /// Merge the payload into local state.
    Merge,
    /// An action this node does not understand, kept by name for logging.
    Other(String),
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        if name.eq_ignore_ascii_case("merge") {
            Self::Merge
        } else {
            Self::Other(name)
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Merge => "merge".to_string(),
            Action::Other(name) => name,
        }
    }
}

/// A synchronization message carried inside a data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessage {
    /// What to do with `payload`.
    pub action: Action,
    /// Serialized replica state. Opaque to the codec beyond being JSON.
    pub payload: Vec<u8>,
}

impl SyncMessage {
    /// A message offering `state` for merging.
    pub fn merge(state: Vec<u8>) -> Self {
        Self {
            action: Action::Merge,
            payload: state,
        }
    }
}

/// A decoded gossip payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Counter sync traffic.
    Data(SyncMessage),
    /// Traffic of some other kind sharing the channel.
    Unknown {
        /// The leading kind byte.
        kind: u8,
        /// Everything after it, untouched.
        body: Vec<u8>,
    },
}

/// Error framing or unframing a gossip payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Nothing to decode.
    #[error("empty frame")]
    Empty,
    /// The body of a data frame is not a valid message.
    #[error("malformed sync message: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The payload handed to the encoder is not a JSON document.
    #[error("sync payload is not valid JSON: {0}")]
    Payload(#[source] serde_json::Error),
}

#[derive(Serialize)]
struct WireOut<'a> {
    #[serde(rename = "Action")]
    action: Action,
    #[serde(rename = "Data")]
    data: &'a RawValue,
}

#[derive(Deserialize)]
struct WireIn<'a> {
    #[serde(rename = "Action", alias = "action")]
    action: Action,
    #[serde(rename = "Data", alias = "data", borrow, default)]
    data: Option<&'a RawValue>,
}

impl Frame {
    /// The kind byte this frame is written with.
    #[must_use]
    pub fn kind(&self) -> u8 {
        match self {
            Self::Data(_) => DATA_TAG,
            Self::Unknown { kind, .. } => *kind,
        }
    }

    /// Write the frame as `[kind][body]`.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Data(msg) => {
                let data: &RawValue =
                    serde_json::from_slice(&msg.payload).map_err(CodecError::Payload)?;
                let wire = WireOut {
                    action: msg.action.clone(),
                    data,
                };
                let mut bytes = Vec::with_capacity(msg.payload.len() + 32);
                bytes.push(DATA_TAG);
                serde_json::to_writer(&mut bytes, &wire).map_err(CodecError::Malformed)?;
                Ok(bytes)
            }
            Self::Unknown { kind, body } => {
                let mut bytes = Vec::with_capacity(body.len() + 1);
                bytes.push(*kind);
                bytes.extend_from_slice(body);
                Ok(bytes)
            }
        }
    }

    /// Parse a raw gossip payload.
    pub fn decode(raw: &[u8]) -> Result<Self, CodecError> {
        let (&kind, body) = raw.split_first().ok_or(CodecError::Empty)?;
        if kind != DATA_TAG {
            return Ok(Self::Unknown {
                kind,
                body: body.to_vec(),
            });
        }

        let wire: WireIn<'_> = serde_json::from_slice(body).map_err(CodecError::Malformed)?;
        Ok(Self::Data(SyncMessage {
            action: wire.action,
            payload: wire
                .data
                .map(|raw| raw.get().as_bytes().to_vec())
                .unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_frame_wire_shape() {
        let frame = Frame::Data(SyncMessage::merge(br#"{"counts":{"a":1}}"#.to_vec()));
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes[0], b'd');
        assert_eq!(
            &bytes[1..],
            br#"{"Action":"merge","Data":{"counts":{"a":1}}}"#
        );
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn decode_accepts_lowercase_keys() {
        let frame = Frame::decode(br#"d{"action":"MERGE","data":[1,2]}"#).unwrap();
        assert_eq!(frame, Frame::Data(SyncMessage::merge(b"[1,2]".to_vec())));
    }

    #[test]
    fn unknown_action_is_preserved() {
        let frame = Frame::decode(br#"d{"Action":"reset","Data":0}"#).unwrap();
        match frame {
            Frame::Data(msg) => assert_eq!(msg.action, Action::Other("reset".into())),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn missing_data_decodes_to_empty_payload() {
        let frame = Frame::decode(br#"d{"Action":"merge"}"#).unwrap();
        assert_eq!(frame, Frame::Data(SyncMessage::merge(Vec::new())));
    }

    #[test]
    fn unknown_kind_passes_through() {
        let frame = Frame::decode(b"xhello").unwrap();
        assert_eq!(frame.kind(), b'x');
        assert_eq!(
            frame,
            Frame::Unknown {
                kind: b'x',
                body: b"hello".to_vec()
            }
        );
        assert_eq!(frame.encode().unwrap(), b"xhello");
    }

    #[test]
    fn empty_frame_is_an_error() {
        assert!(matches!(Frame::decode(&[]), Err(CodecError::Empty)));
    }

    #[test]
    fn malformed_body_is_an_error() {
        for body in [&b"d"[..], b"d{", b"d{\"Data\":1}", b"d\xff\x00"] {
            assert!(matches!(Frame::decode(body), Err(CodecError::Malformed(_))));
        }
    }

    #[test]
    fn encode_rejects_non_json_payload() {
        let frame = Frame::Data(SyncMessage::merge(b"not json".to_vec()));
        assert!(matches!(frame.encode(), Err(CodecError::Payload(_))));
    }
}
