//! Error types for avdecc-runtime.

use std::fmt;
use std::io;

/// Result type for avdecc-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error while setting up or driving the transport
    Io(io::Error),
    /// Fatal transport failure. The engine instance is no longer usable.
    TransportError,
    /// A command exhausted all retransmission attempts without a response.
    Timeout,
    /// The target entity has not been discovered.
    UnknownRemoteEntity,
    /// The entity is not registered with this engine.
    UnknownLocalEntity,
    /// The entity's advertised type is invalid for the operation.
    InvalidEntityType,
    /// The EntityID is already in use by another registered local entity.
    DuplicateLocalEntityID,
    /// The named network interface was not found.
    InterfaceNotFound,
    /// The named network interface is unusable.
    InterfaceInvalid,
    /// The transport backend is not supported on this platform.
    InterfaceNotSupported,
    /// This message kind cannot be sent through this engine.
    MessageNotSupported,
    /// The engine has shut down; the command was aborted.
    EngineShutDown,
    /// Internal error, please report the issue.
    InternalError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::TransportError => write!(f, "Fatal transport error"),
            Error::Timeout => write!(f, "Command timed out"),
            Error::UnknownRemoteEntity => write!(f, "Unknown remote entity"),
            Error::UnknownLocalEntity => write!(f, "Unknown local entity"),
            Error::InvalidEntityType => write!(f, "Invalid entity type for this operation"),
            Error::DuplicateLocalEntityID => {
                write!(f, "EntityID already in use by another local entity")
            }
            Error::InterfaceNotFound => write!(f, "Network interface not found"),
            Error::InterfaceInvalid => write!(f, "Network interface is invalid"),
            Error::InterfaceNotSupported => write!(f, "Network interface not supported"),
            Error::MessageNotSupported => write!(f, "Message type not supported"),
            Error::EngineShutDown => write!(f, "Engine has shut down"),
            Error::InternalError => write!(f, "Internal error"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
