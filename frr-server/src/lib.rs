//! F1 Race Replay server library
//!
//! Exposes the cache, loader, session and HTTP API so integration tests can
//! drive the engine without binding a port.

pub mod api;
pub mod cache;
pub mod config;
pub mod loader;
pub mod playback;
pub mod session;
pub mod state;
