//! CDP message shapes used for interception.
//!
//! The proxy treats almost every frame as an opaque byte sequence; only the
//! few messages it intercepts are given types here, and those types carry
//! the minimum fields needed to classify a pause. Everything else in a frame
//! is ignored, which keeps the proxy tolerant of CDP schema drift.
//!
//! # Intercepted Messages
//!
//! | Message | Direction | Action |
//! |---------|-----------|--------|
//! | `Debugger.paused` | web → devtools | classified via [`PausedParams::classify`] |
//! | `Overlay.setPausedInDebuggerMessage` | devtools → web | banner rewritten |
//! | any frame containing `"id":0` | web → devtools | dropped (response to an injected command) |
//!
//! # Injected Commands
//!
//! The proxy originates exactly two commands, both with `id` 0 so their
//! responses can be filtered out before they reach DevTools:
//! [`STEP_OUT`] and [`RESUME`].

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

// ============================================================================
// Wire Markers
// ============================================================================

/// Method name of the pause event the proxy classifies.
pub const DEBUGGER_PAUSED: &str = "Debugger.paused";

/// Method name of the overlay banner command rewritten on its way upstream.
pub const OVERLAY_SET_PAUSED_MESSAGE: &str = "Overlay.setPausedInDebuggerMessage";

/// The overlay banner text DevTools asks the browser to display.
pub const PAUSED_BANNER: &str = "Paused in debugger";

/// Substring identifying responses to proxy-injected commands.
///
/// DevTools clients use positive ids, so `"id":0` only ever appears in
/// responses to commands the proxy itself sent. A crafted string field
/// containing the marker is an accepted false-positive.
pub const INJECTED_ID: &str = r#""id":0"#;

// ============================================================================
// Injected Payloads
// ============================================================================

/// Steps out of the sentinel frame so the user lands on its caller.
pub const STEP_OUT: &str = r#"{"id":0,"method":"Debugger.stepOut","params":{}}"#;

/// Resumes past an anti-debug trap without surfacing it.
pub const RESUME: &str = r#"{"id":0,"method":"Debugger.resume","params":{"terminateOnResume":false}}"#;

// ============================================================================
// PausedEvent
// ============================================================================

/// A `Debugger.paused` event, parsed only as deep as classification needs.
///
/// # Format
///
/// ```json
/// {
///   "method": "Debugger.paused",
///   "params": {
///     "reason": "other",
///     "hitBreakpoints": [],
///     "callFrames": [{ "functionName": "lovedebug" }, ...]
///   }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct PausedEvent {
    /// Event method name.
    #[serde(default)]
    pub method: String,

    /// Pause details.
    #[serde(default)]
    pub params: PausedParams,
}

impl PausedEvent {
    /// Returns `true` if this event is a `Debugger.paused` notification.
    #[inline]
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.method == DEBUGGER_PAUSED
    }
}

// ============================================================================
// PausedParams
// ============================================================================

/// The fields of a pause event that decide how the proxy reacts.
#[derive(Debug, Default, Deserialize)]
pub struct PausedParams {
    /// Why execution paused (`"other"` for `debugger;` statements).
    #[serde(default)]
    pub reason: String,

    /// Breakpoint ids hit, empty for bare `debugger;` statements.
    #[serde(default, rename = "hitBreakpoints")]
    pub hit_breakpoints: Vec<String>,

    /// Call stack, innermost frame first.
    #[serde(default, rename = "callFrames")]
    pub call_frames: Vec<CallFrame>,
}

/// One stack frame of a pause event.
#[derive(Debug, Deserialize)]
pub struct CallFrame {
    /// Name of the paused function, empty for anonymous frames.
    #[serde(default, rename = "functionName")]
    pub function_name: String,
}

// ============================================================================
// Classification
// ============================================================================

/// What a pause event means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    /// A real breakpoint or a non-`debugger;` pause; forwarded to DevTools.
    Breakpoint,

    /// A pause inside the configured sentinel function; the user asked for
    /// this one, so the proxy steps out to the sentinel's caller.
    Sentinel,

    /// A page-set anti-debug trap; resumed without reaching DevTools.
    Trap,
}

impl PausedParams {
    /// Classifies this pause against the configured sentinel name.
    ///
    /// A pause is a `debugger;` statement when its reason is `"other"` and
    /// no breakpoints were hit; anything else is a [`PauseKind::Breakpoint`].
    /// A `debugger;` pause whose top frame is the sentinel function is
    /// [`PauseKind::Sentinel`]; all others (including an empty stack) are
    /// [`PauseKind::Trap`].
    #[must_use]
    pub fn classify(&self, sentinel: &str) -> PauseKind {
        let is_js_debugger = self.reason == "other" && self.hit_breakpoints.is_empty();
        if !is_js_debugger {
            return PauseKind::Breakpoint;
        }

        let top_frame = self.call_frames.first().map(|f| f.function_name.as_str());
        if top_frame == Some(sentinel) {
            PauseKind::Sentinel
        } else {
            PauseKind::Trap
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
