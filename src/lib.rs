//! cdp-cloak - Anti-anti-debug proxy for Chrome DevTools.
//!
//! This crate sits between a DevTools frontend and a browser's
//! remote-debugging WebSocket endpoint, transparently forwarding both CDP
//! streams while neutralizing the anti-debugging traps pages use to detect
//! inspection.
//!
//! # How It Works
//!
//! Obfuscated sites scatter bare `debugger;` statements so that opening
//! DevTools floods the user with meaningless pauses. The proxy watches the
//! upstream stream for `Debugger.paused` events and answers them itself:
//!
//! - A pause caused by a page-set trap is resumed with an injected
//!   `Debugger.resume` before DevTools ever sees it.
//! - A pause inside the user's sentinel function (installed into pages by a
//!   companion content script) is answered with `Debugger.stepOut`, landing
//!   the user on the code that *called* their breakpoint.
//! - Real breakpoints pass through untouched.
//!
//! Injected commands always use id 0; their responses are filtered out so
//! the DevTools client's request-id accounting stays intact.
//!
//! # Quick Start
//!
//! ```text
//! $ chromium --remote-debugging-port=9222 &
//! $ cdp-cloak --debugger lovedebug --cdp 9221 --port 9222
//! ```
//!
//! Then open DevTools against `ws://localhost:9221/<target-path>` instead
//! of the browser's own endpoint.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Startup configuration (CLI options) |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`intercept`] | Per-direction message handlers |
//! | [`protocol`] | Minimal CDP message shapes and injected payloads |
//! | [`transport`] | Framed connections, session registry, acceptor |

// ============================================================================
// Modules
// ============================================================================

/// Startup configuration.
///
/// All options are read once from the command line at startup.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Direction-specific message handlers.
///
/// The interception and rewrite rules applied to frames in flight.
pub mod intercept;

/// CDP message shapes used for interception.
///
/// Only the intercepted messages are typed; everything else stays opaque.
pub mod protocol;

/// WebSocket transport layer.
///
/// Framed connections, the session pair registry, and the acceptor.
pub mod transport;

// ============================================================================
// Constants
// ============================================================================

/// Attribution string spliced into the rewritten overlay pause banner.
pub const ATTRIBUTION: &str = "cdp-cloak";

// ============================================================================
// Re-exports
// ============================================================================

pub use config::ProxyConfig;
pub use error::{Error, Result};
pub use transport::{ConnectionPair, FramedConnection, PairRegistry, ProxyServer, Side};
