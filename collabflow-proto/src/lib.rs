//! Shared protocol definitions for the `CollabFlow` realtime board channel.

pub mod codec;
pub mod event;
pub mod task;
pub mod vocab;
