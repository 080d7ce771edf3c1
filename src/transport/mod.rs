//! WebSocket transport layer.
//!
//! Everything that moves bytes lives here: the framed connection façade,
//! the session pair and its registry, and the acceptor with its relay loops.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ProxyServer                           │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ /devtools/page/1 → ConnectionPair (devtools ⟷ web)     │  │
//! │  │ /devtools/page/2 → ConnectionPair (devtools ⟷ web)     │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!        ▲                                          │
//!   DevTools frontend                        browser debug endpoint
//! ```
//!
//! # Session Lifecycle
//!
//! 1. A DevTools client connects; the request path names the debug target
//! 2. The acceptor declines if the target already has a session
//! 3. The matching upstream target is dialed
//! 4. Both sockets are wrapped as [`FramedConnection`]s and paired
//! 5. Two relay loops forward frames (one per direction) until either
//!    socket dies, then the whole pair is torn down
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `framed` | Single-reader single-writer WebSocket façade |
//! | `pair` | The two tethered connections of one session |
//! | `registry` | At-most-one-session-per-target bookkeeping |
//! | `server` | Acceptor and relay loops |

// ============================================================================
// Submodules
// ============================================================================

/// Framed WebSocket connection.
pub mod framed;

/// Paired connections of one debug session.
pub mod pair;

/// Session registry keyed by target path.
pub mod registry;

/// Proxy acceptor and relay loops.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use framed::{FramedConnection, Side, WsStream};
pub use pair::ConnectionPair;
pub use registry::PairRegistry;
pub use server::ProxyServer;
