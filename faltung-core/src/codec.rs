//! Binary codec for control and notification events
//!
//! Events are self-describing frames: a version byte, a tag byte, a
//! little-endian payload length, then the payload. A fully empty byte
//! buffer is the canonical encoding of a buffer-size change.

use std::str;
use thiserror::Error;

/// Current frame format version
pub const CODEC_VERSION: u8 = 1;

/// Maximum payload size for path-carrying messages
pub const MAX_PATH_BYTES: usize = 1024;

/// Frame header: version (1) + tag (1) + payload length (4, LE)
const HEADER_LEN: usize = 6;

const TAG_SET_IMPULSE_RESPONSE: u8 = 1;
const TAG_CHANGE_BUFFER_SIZE: u8 = 2;
const TAG_ACTIVE_CONFIGURATION: u8 = 3;

/// Errors that can occur while encoding or decoding events
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("event truncated: {got} of {need} bytes")]
    Truncated { got: usize, need: usize },
    #[error("event carries {got} bytes beyond its declared {need}")]
    Trailing { got: usize, need: usize },
    #[error("unsupported codec version {0}")]
    BadVersion(u8),
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("path payload exceeds maximum length")]
    PathTooLong,
    #[error("path is not valid UTF-8")]
    BadPath(#[from] str::Utf8Error),
}

/// A reconfiguration request carried on the control port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRequest {
    /// Load a new impulse response from the given path
    SetImpulseResponse { path: String },
    /// Reinitialize for the current host buffer size (payload-less)
    ChangeBufferSize,
}

impl ChangeRequest {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            ChangeRequest::SetImpulseResponse { path } => {
                encode_frame(TAG_SET_IMPULSE_RESPONSE, path.as_bytes())
            }
            // the canonical encoding is the empty event
            ChangeRequest::ChangeBufferSize => Ok(Vec::new()),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Ok(ChangeRequest::ChangeBufferSize);
        }
        let (tag, payload) = decode_frame(bytes)?;
        match tag {
            TAG_SET_IMPULSE_RESPONSE => Ok(ChangeRequest::SetImpulseResponse {
                path: str::from_utf8(payload)?.to_owned(),
            }),
            TAG_CHANGE_BUFFER_SIZE => Ok(ChangeRequest::ChangeBufferSize),
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

/// An event emitted on the notify port after a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The configuration now active on the audio path
    ActiveConfiguration { path: String },
}

impl Notification {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Notification::ActiveConfiguration { path } => {
                encode_frame(TAG_ACTIVE_CONFIGURATION, path.as_bytes())
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (tag, payload) = decode_frame(bytes)?;
        match tag {
            TAG_ACTIVE_CONFIGURATION => Ok(Notification::ActiveConfiguration {
                path: str::from_utf8(payload)?.to_owned(),
            }),
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

fn encode_frame(tag: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    if payload.len() > MAX_PATH_BYTES {
        return Err(CodecError::PathTooLong);
    }
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(CODEC_VERSION);
    buf.push(tag);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

fn decode_frame(bytes: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            got: bytes.len(),
            need: HEADER_LEN,
        });
    }
    if bytes[0] != CODEC_VERSION {
        return Err(CodecError::BadVersion(bytes[0]));
    }
    let tag = bytes[1];
    let len = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
    if len > MAX_PATH_BYTES {
        return Err(CodecError::PathTooLong);
    }
    let need = HEADER_LEN + len;
    if bytes.len() < need {
        return Err(CodecError::Truncated {
            got: bytes.len(),
            need,
        });
    }
    // a frame is its own delimiter; excess bytes mean a framing bug
    if bytes.len() > need {
        return Err(CodecError::Trailing {
            got: bytes.len(),
            need,
        });
    }
    Ok((tag, &bytes[HEADER_LEN..need]))
}
