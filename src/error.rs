use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

use tokio_tungstenite::tungstenite::Error as WsError;

#[derive(Debug)]
pub enum HubError {
    // Registry errors
    RegistryLock(String),

    // Connection errors
    ConnectionClosed,
    OutboxFull,
    Transport(String),

    // Setup errors
    HandlerAlreadyInstalled(&'static str),
    InvalidUrl(String),
    Handshake(String),

    // Payload errors
    Serialization(String),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistryLock(msg) => write!(f, "Registry lock error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection is closed"),
            Self::OutboxFull => {
                write!(f, "Outbound queue full, connection queued for unregistration")
            }
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
            Self::HandlerAlreadyInstalled(event) => {
                write!(f, "A {} handler is already installed", event)
            }
            Self::InvalidUrl(msg) => write!(f, "Invalid endpoint URL: {}", msg),
            Self::Handshake(msg) => write!(f, "Handshake error: {}", msg),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl Error for HubError {}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for HubError {
    fn from(err: PoisonError<T>) -> Self {
        HubError::RegistryLock(format!("Mutex poisoned: {}", err))
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Serialization(err.to_string())
    }
}

impl From<WsError> for HubError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => HubError::ConnectionClosed,
            WsError::Http(resp) => {
                HubError::Handshake(format!("HTTP {}", resp.status()))
            }
            other => HubError::Transport(other.to_string()),
        }
    }
}

impl From<url::ParseError> for HubError {
    fn from(err: url::ParseError) -> Self {
        HubError::InvalidUrl(err.to_string())
    }
}

// Generic result type for the hub
pub type Result<T> = std::result::Result<T, HubError>;
