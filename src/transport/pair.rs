//! Paired connections of one debug session.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::transport::FramedConnection;

// ============================================================================
// ConnectionPair
// ============================================================================

/// The two tethered connections of one active debug session.
///
/// A pair is created only after the upstream dial succeeds, so both sides
/// exist for its whole lifetime; neither is ever replaced. The pair is torn
/// down after both relay directions have terminated and the registry entry
/// has been removed.
pub struct ConnectionPair {
    /// The target path this session is attached to.
    target: String,

    /// The DevTools frontend side.
    devtools: Arc<FramedConnection>,

    /// The browser debug target side.
    web: Arc<FramedConnection>,
}

impl ConnectionPair {
    /// Creates a pair for the given target path.
    #[must_use]
    pub fn new(
        target: impl Into<String>,
        devtools: Arc<FramedConnection>,
        web: Arc<FramedConnection>,
    ) -> Self {
        Self {
            target: target.into(),
            devtools,
            web,
        }
    }

    /// Returns the target path this session is attached to.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the DevTools-side connection.
    #[inline]
    #[must_use]
    pub fn devtools(&self) -> &Arc<FramedConnection> {
        &self.devtools
    }

    /// Returns the web-side connection.
    #[inline]
    #[must_use]
    pub fn web(&self) -> &Arc<FramedConnection> {
        &self.web
    }

    /// Starts both framed connections.
    pub fn start(&self) {
        self.devtools.start();
        self.web.start();
    }

    /// Closes both sides. Idempotent, like the closes it delegates to.
    pub fn close_both(&self) {
        self.devtools.close();
        self.web.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
