//! Rusty Relay - a lightweight WebSocket hub implemented in Rust
//!
//! This library tracks many concurrently open WebSocket connections,
//! delivers inbound messages to a single application-supplied handler and
//! fans outbound messages out to one or all peers, without letting a slow
//! or dead peer stall anything else.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;

// Re-export main components
pub use config::{HubConfig, OriginPredicate};
pub use core::{CloseCode, Connection, Hub, Liveness, Message, WsStream};
pub use error::{HubError, Result};
