//! Error types for the CDP proxy.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_cloak::{Result, ProxyServer};
//!
//! async fn example(server: ProxyServer) -> Result<()> {
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Session | [`Error::DuplicateSession`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::transport::Side;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when startup configuration is invalid or the log file
    /// cannot be opened. Fatal at startup.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when an inbound upgrade or an upstream dial fails.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection has been closed.
    ///
    /// Returned by read/write on a [`FramedConnection`] that has already
    /// closed, or that closes while the operation is waiting.
    ///
    /// [`FramedConnection`]: crate::transport::FramedConnection
    #[error("{side} connection closed")]
    ConnectionClosed {
        /// Which side of the pair was closed.
        side: Side,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// A DevTools client is already attached to this target.
    ///
    /// The second client is declined; the existing session is untouched.
    #[error("Target already attached: {path}")]
    DuplicateSession {
        /// The contested target path.
        path: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a closed-connection error for the given side.
    #[inline]
    pub const fn closed(side: Side) -> Self {
        Self::ConnectionClosed { side }
    }

    /// Creates a duplicate-session error.
    #[inline]
    pub fn duplicate_session(path: impl Into<String>) -> Self {
        Self::DuplicateSession { path: path.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed { .. } | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error means the connection is gone.
    ///
    /// A closed connection is the normal end of a session, not a fault.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
