//! `CollabFlow`: real-time collaborative task board client library.

pub mod activity;
pub mod board;
pub mod channel;
pub mod config;
pub mod persist;
pub mod presence;
pub mod schema;
pub mod session;
pub mod sync;
