//! Direction-specific message handlers.
//!
//! Each relay direction consults one handler per frame. A handler either
//! forwards the frame (possibly rewritten) or drops it; when it drops a
//! pause event it may first inject a synthetic command back toward the web
//! side, which is how the proxy answers anti-debug traps on the page's
//! behalf.
//!
//! Frames are classified by substring checks first; JSON parsing happens
//! only when a substring match says it is worthwhile. CDP traffic is chatty
//! and nearly all frames are uninteresting.
//!
//! # Rules
//!
//! | Direction | Match | Action |
//! |-----------|-------|--------|
//! | devtools → web | `Overlay.setPausedInDebuggerMessage` | rewrite the pause banner, forward |
//! | web → devtools | `"id":0` | drop (response to an injected command) |
//! | web → devtools | `Debugger.paused` trap | inject `Debugger.resume`, drop |
//! | web → devtools | `Debugger.paused` in the sentinel | inject `Debugger.stepOut`, drop |
//! | any | anything else | forward unchanged |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio_tungstenite::tungstenite::Utf8Bytes;
use tracing::{debug, error, warn};

use crate::ATTRIBUTION;
use crate::protocol::{self, PauseKind, PausedEvent, PausedParams};
use crate::transport::FramedConnection;

// ============================================================================
// Direction
// ============================================================================

/// Which way a relay loop is forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Frames from the DevTools frontend toward the browser.
    DevtoolsToWeb,
    /// Frames from the browser toward the DevTools frontend.
    WebToDevtools,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DevtoolsToWeb => "devtools -> web",
            Self::WebToDevtools => "web -> devtools",
        })
    }
}

// ============================================================================
// Verdict
// ============================================================================

/// A handler's decision for one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Enqueue this frame (possibly rewritten) on the destination.
    Forward(Utf8Bytes),
    /// The frame goes nowhere; any reply was already injected at the source.
    Drop,
}

// ============================================================================
// SessionInfo
// ============================================================================

/// Per-session context shared by both directions' handlers.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// The target path, for diagnostics.
    pub target: String,
    /// The sentinel function name marking the user's intentional breakpoint.
    pub sentinel: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Runs the handler for `direction` on one frame.
///
/// `source` is the connection the frame was read from; the web→devtools
/// handler writes injected commands back to it.
pub async fn apply(
    direction: Direction,
    source: &FramedConnection,
    info: &SessionInfo,
    frame: Utf8Bytes,
) -> Verdict {
    match direction {
        Direction::DevtoolsToWeb => from_devtools(frame),
        Direction::WebToDevtools => from_web(source, info, frame).await,
    }
}

/// Handler for frames headed from DevTools to the browser.
///
/// Rewrites the first occurrence of the overlay pause banner; everything is
/// forwarded and nothing is ever injected on this side.
fn from_devtools(frame: Utf8Bytes) -> Verdict {
    if frame.as_str().contains(protocol::OVERLAY_SET_PAUSED_MESSAGE) {
        let rewritten = frame.as_str().replacen(
            protocol::PAUSED_BANNER,
            &format!("{} - Surprise {ATTRIBUTION}", protocol::PAUSED_BANNER),
            1,
        );
        return Verdict::Forward(rewritten.into());
    }
    Verdict::Forward(frame)
}

/// Handler for frames headed from the browser to DevTools.
async fn from_web(source: &FramedConnection, info: &SessionInfo, frame: Utf8Bytes) -> Verdict {
    let text = frame.as_str();

    // Responses to commands the proxy injected never reach DevTools, which
    // keeps the client's request-id accounting intact.
    if text.contains(protocol::INJECTED_ID) {
        debug!(target = %info.target, "dropping response to injected command");
        return Verdict::Drop;
    }

    if text.contains(protocol::DEBUGGER_PAUSED)
        && let Ok(event) = serde_json::from_str::<PausedEvent>(text)
        && event.is_paused()
        && handle_paused(source, info, &event.params).await
    {
        debug!(target = %info.target, "pause handled, frame dropped");
        return Verdict::Drop;
    }

    Verdict::Forward(frame)
}

/// Applies the paused-handling rule.
///
/// Returns `true` when the pause was answered by an injected command and
/// the event must not reach DevTools. A parse mismatch or a real breakpoint
/// returns `false`, as does a failed injection: the frame is then forwarded
/// so the user at least sees the pause.
async fn handle_paused(
    source: &FramedConnection,
    info: &SessionInfo,
    params: &PausedParams,
) -> bool {
    match params.classify(&info.sentinel) {
        PauseKind::Breakpoint => false,

        PauseKind::Sentinel => {
            warn!(
                target = %info.target,
                sentinel = %info.sentinel,
                "paused in the sentinel debugger, stepping out"
            );
            inject(source, protocol::STEP_OUT).await
        }

        PauseKind::Trap => {
            debug!(target = %info.target, "anti-debug trap hit, resuming");
            inject(source, protocol::RESUME).await
        }
    }
}

/// Writes a synthetic command back to the web side.
///
/// The command flows through the same outbound channel as forwarded frames,
/// so it is serialized with them rather than racing the socket.
async fn inject(source: &FramedConnection, payload: &'static str) -> bool {
    match source.write(Utf8Bytes::from_static(payload)).await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "failed to inject command, forwarding the pause");
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
