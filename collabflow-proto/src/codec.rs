//! Frame encoding for the realtime channel.
//!
//! Frames are UTF-8 JSON text, one event per frame. The same functions serve
//! both directions: clients encode [`ClientEvent`](crate::event::ClientEvent)
//! and decode [`ServerEvent`](crate::event::ServerEvent); test servers do the
//! reverse.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Maximum accepted frame size in bytes.
pub const MAX_FRAME_LEN: usize = 256 * 1024;

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Frame exceeds [`MAX_FRAME_LEN`].
    #[error("frame too large: {0} bytes")]
    Oversized(usize),
}

/// Encodes an event into a text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode<T: Serialize>(event: &T) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a text frame into an event.
///
/// # Errors
///
/// Returns `CodecError::Oversized` for frames above [`MAX_FRAME_LEN`], or
/// `CodecError::Serialization` when the frame is not a known event shape.
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, CodecError> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(CodecError::Oversized(frame.len()));
    }
    serde_json::from_str(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}
