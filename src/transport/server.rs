//! Proxy acceptor and relay loops.
//!
//! The acceptor terminates WebSocket upgrades from DevTools clients and
//! bootstraps one session per connection:
//!
//! 1. Capture the request path during the upgrade handshake; it identifies
//!    the upstream debug target.
//! 2. Decline the upgrade when the target already has a session.
//! 3. Dial the browser's debug endpoint for that target.
//! 4. Register the pair, start both framed connections, and run one relay
//!    loop per direction until either socket dies.
//! 5. Unregister, close both sides, log the session end.
//!
//! A failed upgrade or a failed session only ever takes down its own task;
//! the accept loop and the registry outlive every session.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{MaybeTlsStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::intercept::{self, Direction, SessionInfo, Verdict};
use crate::transport::{ConnectionPair, FramedConnection, PairRegistry, Side};

// ============================================================================
// ProxyServer
// ============================================================================

/// The CDP proxy server.
///
/// Owns the listener, the session registry, and the configuration-derived
/// upstream base URL. One instance serves any number of concurrent sessions.
///
/// # Example
///
/// ```ignore
/// let server = Arc::new(ProxyServer::bind(ProxyConfig::parse()).await?);
/// server.run().await?;
/// ```
pub struct ProxyServer {
    /// Listener for incoming DevTools connections.
    listener: TcpListener,

    /// Resolved listen address (relevant when bound to port 0).
    local_addr: SocketAddr,

    /// Upstream debug endpoint base; the request path is appended verbatim.
    upstream_base: String,

    /// The sentinel function name from configuration.
    sentinel: String,

    /// Live sessions, at most one per target path.
    registry: PairRegistry,
}

// ============================================================================
// ProxyServer - Constructor
// ============================================================================

impl ProxyServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails; fatal at startup.
    pub async fn bind(config: ProxyConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "proxy listening");

        Ok(Self {
            listener,
            local_addr,
            upstream_base: config.upstream_base(),
            sentinel: config.debugger_name,
            registry: PairRegistry::new(),
        })
    }
}

// ============================================================================
// ProxyServer - Public API
// ============================================================================

impl ProxyServer {
    /// Returns the resolved listen address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the port the proxy listens on.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Accepts DevTools connections until the listener fails.
    ///
    /// Each connection is served on its own task; session failures are
    /// logged and never propagate here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the listener itself fails; this is
    /// terminal for the whole proxy.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            debug!(%addr, "tcp connection accepted");

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_session(stream, addr).await {
                    warn!(error = %e, %addr, "session failed");
                }
            });
        }
    }
}

// ============================================================================
// ProxyServer - Session Bootstrap
// ============================================================================

impl ProxyServer {
    /// Serves one DevTools connection from upgrade to teardown.
    async fn handle_session(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let mut target_path: Option<String> = None;
        let mut declined: Option<String> = None;

        // The target path only exists in the upgrade request, so the
        // duplicate check runs inside the handshake callback, before the
        // upgrade completes. All origins are accepted: loopback tool.
        let upgrade = tokio_tungstenite::accept_hdr_async(
            MaybeTlsStream::Plain(stream),
            |request: &Request, response: Response| {
                let path = request.uri().path().to_string();
                info!(path = %path, %addr, "devtools client requests target");

                if self.registry.contains(&path) {
                    declined = Some(path);
                    let mut reject =
                        ErrorResponse::new(Some("target already attached".to_string()));
                    *reject.status_mut() = StatusCode::CONFLICT;
                    return Err(reject);
                }

                target_path = Some(path);
                Ok(response)
            },
        )
        .await;

        let socket = match upgrade {
            Ok(socket) => socket,
            Err(e) => {
                if let Some(path) = declined {
                    warn!(path = %path, %addr, "target already attached, declining");
                    return Ok(());
                }
                return Err(Error::connection(format!("WebSocket upgrade failed: {e}")));
            }
        };
        let path = target_path
            .ok_or_else(|| Error::connection("upgrade finished without a request path"))?;

        let devtools = FramedConnection::new(Side::Devtools, socket);

        let url = format!("{}{}", self.upstream_base, path);
        debug!(url = %url, "dialing upstream target");
        let web_socket = match connect_async(url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(e) => {
                devtools.close();
                return Err(Error::connection(format!("upstream dial failed: {e}")));
            }
        };
        let web = FramedConnection::new(Side::Web, web_socket);

        let pair = Arc::new(ConnectionPair::new(path.clone(), devtools, web));
        if !self.registry.try_register(&path, Arc::clone(&pair)) {
            // Lost the pre-upgrade race to a simultaneous client on the
            // same path; the registered session must not be disturbed.
            pair.close_both();
            return Err(Error::duplicate_session(path));
        }

        pair.start();
        info!(path = %path, %addr, "session established");

        let session = Arc::new(SessionInfo {
            target: path.clone(),
            sentinel: self.sentinel.clone(),
        });

        let mut devtools_to_web = tokio::spawn(relay(
            Arc::clone(pair.devtools()),
            Arc::clone(pair.web()),
            Direction::DevtoolsToWeb,
            Arc::clone(&session),
        ));
        let mut web_to_devtools = tokio::spawn(relay(
            Arc::clone(pair.web()),
            Arc::clone(pair.devtools()),
            Direction::WebToDevtools,
            Arc::clone(&session),
        ));

        // Either loop ending (error, EOF, or a handler panic) is terminal
        // for the session; closing the pair unblocks the other loop.
        tokio::select! {
            _ = &mut devtools_to_web => {}
            _ = &mut web_to_devtools => {}
        }
        pair.close_both();
        let _ = tokio::join!(devtools_to_web, web_to_devtools);

        self.registry.unregister(&path);
        pair.close_both();
        info!(path = %path, "session ended");

        Ok(())
    }
}

// ============================================================================
// Relay Loop
// ============================================================================

/// Forwards frames from `source` to `destination` through the direction's
/// handler until either side fails.
///
/// Frames are neither skipped nor reordered: one reader, one writer, and a
/// FIFO channel per hop keep source read order equal to destination write
/// order, minus handler-dropped frames. Any read or write error closes both
/// connections, so teardown cascades to the opposite relay too.
async fn relay(
    source: Arc<FramedConnection>,
    destination: Arc<FramedConnection>,
    direction: Direction,
    session: Arc<SessionInfo>,
) {
    loop {
        let frame = match source.read().await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(target = %session.target, %direction, error = %e, "relay source ended");
                break;
            }
        };

        debug!(target = %session.target, %direction, frame = %frame.as_str(), "frame");

        match intercept::apply(direction, &source, &session, frame).await {
            Verdict::Forward(frame) => {
                if let Err(e) = destination.write(frame).await {
                    error!(target = %session.target, %direction, error = %e, "relay write failed");
                    break;
                }
            }
            Verdict::Drop => {}
        }
    }

    source.close();
    destination.close();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    use crate::protocol;
    use crate::transport::WsStream;

    const TRAP_PAUSE: &str = concat!(
        r#"{"method":"Debugger.paused","params":{"reason":"other","#,
        r#""hitBreakpoints":[],"callFrames":[{"functionName":"trap_xyz"}]}}"#,
    );

    const SENTINEL_PAUSE: &str = concat!(
        r#"{"method":"Debugger.paused","params":{"reason":"other","hitBreakpoints":[],"#,
        r#""callFrames":[{"functionName":"lovedebug"},{"functionName":"userCode"}]}}"#,
    );

    const BREAKPOINT_PAUSE: &str = concat!(
        r#"{"method":"Debugger.paused","params":{"reason":"other","#,
        r#""hitBreakpoints":["bp1"],"callFrames":[{"functionName":"foo"}]}}"#,
    );

    /// Fake browser debug endpoint: accepts upgrades on any path and hands
    /// the resulting sockets to the test.
    async fn spawn_upstream() -> (u16, mpsc::Receiver<WsStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
        let port = listener.local_addr().expect("local addr").port();
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let ws = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(stream))
                    .await
                    .expect("upstream upgrade");
                if tx.send(ws).await.is_err() {
                    break;
                }
            }
        });

        (port, rx)
    }

    /// Binds a proxy on a random port in front of the given upstream port.
    async fn spawn_proxy(browser_port: u16) -> Arc<ProxyServer> {
        let config = ProxyConfig {
            cdp_port: 0,
            browser_port,
            ..Default::default()
        };
        let server = Arc::new(ProxyServer::bind(config).await.expect("bind proxy"));
        tokio::spawn(Arc::clone(&server).run());
        server
    }

    async fn connect_client(port: u16, path: &str) -> WsStream {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}{path}"))
            .await
            .expect("client connect");
        ws
    }

    async fn send_text(ws: &mut WsStream, text: &str) {
        ws.send(Message::Text(text.into())).await.expect("send");
    }

    async fn next_text(ws: &mut WsStream) -> String {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame timed out")
            .expect("stream ended")
            .expect("read");
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_frames_forward_both_directions() {
        let (browser_port, mut upstreams) = spawn_upstream().await;
        let server = spawn_proxy(browser_port).await;

        let mut client = connect_client(server.port(), "/p/fwd").await;
        let mut upstream = upstreams.recv().await.expect("upstream session");

        send_text(&mut client, r#"{"id":1,"method":"Runtime.enable","params":{}}"#).await;
        assert_eq!(
            next_text(&mut upstream).await,
            r#"{"id":1,"method":"Runtime.enable","params":{}}"#
        );

        send_text(&mut upstream, r#"{"id":1,"result":{}}"#).await;
        assert_eq!(next_text(&mut client).await, r#"{"id":1,"result":{}}"#);
    }

    #[tokio::test]
    async fn test_trap_pause_resumed_invisibly() {
        let (browser_port, mut upstreams) = spawn_upstream().await;
        let server = spawn_proxy(browser_port).await;

        let mut client = connect_client(server.port(), "/p/trap").await;
        let mut upstream = upstreams.recv().await.expect("upstream session");

        send_text(&mut upstream, TRAP_PAUSE).await;
        assert_eq!(next_text(&mut upstream).await, protocol::RESUME);

        // The response to the injected resume is swallowed too; the next
        // frame the client sees is the marker, proving both were dropped.
        send_text(&mut upstream, r#"{"id":0,"result":{}}"#).await;
        send_text(&mut upstream, r#"{"id":42,"result":{}}"#).await;
        assert_eq!(next_text(&mut client).await, r#"{"id":42,"result":{}}"#);
    }

    #[tokio::test]
    async fn test_sentinel_pause_steps_out() {
        let (browser_port, mut upstreams) = spawn_upstream().await;
        let server = spawn_proxy(browser_port).await;

        let mut client = connect_client(server.port(), "/p/sentinel").await;
        let mut upstream = upstreams.recv().await.expect("upstream session");

        send_text(&mut upstream, SENTINEL_PAUSE).await;
        assert_eq!(next_text(&mut upstream).await, protocol::STEP_OUT);

        send_text(&mut upstream, r#"{"id":7,"result":{}}"#).await;
        assert_eq!(next_text(&mut client).await, r#"{"id":7,"result":{}}"#);
    }

    #[tokio::test]
    async fn test_real_breakpoint_reaches_devtools() {
        let (browser_port, mut upstreams) = spawn_upstream().await;
        let server = spawn_proxy(browser_port).await;

        let mut client = connect_client(server.port(), "/p/bp").await;
        let mut upstream = upstreams.recv().await.expect("upstream session");

        send_text(&mut upstream, BREAKPOINT_PAUSE).await;
        assert_eq!(next_text(&mut client).await, BREAKPOINT_PAUSE);
    }

    #[tokio::test]
    async fn test_overlay_banner_rewritten_on_the_wire() {
        let (browser_port, mut upstreams) = spawn_upstream().await;
        let server = spawn_proxy(browser_port).await;

        let mut client = connect_client(server.port(), "/p/overlay").await;
        let mut upstream = upstreams.recv().await.expect("upstream session");

        send_text(
            &mut client,
            concat!(
                r#"{"id":3,"method":"Overlay.setPausedInDebuggerMessage","#,
                r#""params":{"message":"Paused in debugger"}}"#,
            ),
        )
        .await;

        let received = next_text(&mut upstream).await;
        assert!(received.contains(&format!(
            "Paused in debugger - Surprise {}",
            crate::ATTRIBUTION
        )));
    }

    #[tokio::test]
    async fn test_duplicate_session_declined() {
        let (browser_port, mut upstreams) = spawn_upstream().await;
        let server = spawn_proxy(browser_port).await;

        let mut client_a = connect_client(server.port(), "/p/dup").await;
        let mut upstream = upstreams.recv().await.expect("upstream session");

        // Round-trip proves client A's session is fully registered.
        send_text(&mut upstream, r#"{"id":5,"result":{}}"#).await;
        assert_eq!(next_text(&mut client_a).await, r#"{"id":5,"result":{}}"#);
        assert_eq!(server.session_count(), 1);

        // Client B on the same path is rejected during the handshake.
        let refused =
            tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/p/dup", server.port()))
                .await;
        assert!(refused.is_err());

        // Client A is unaffected.
        send_text(&mut upstream, r#"{"id":6,"result":{}}"#).await;
        assert_eq!(next_text(&mut client_a).await, r#"{"id":6,"result":{}}"#);
        assert_eq!(server.session_count(), 1);
    }

    #[tokio::test]
    async fn test_upstream_dial_failure_closes_client() {
        // A freshly freed port: nothing is listening upstream.
        let dead_port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("local addr").port()
        };
        let server = spawn_proxy(dead_port).await;

        let mut client = connect_client(server.port(), "/p/dead").await;

        // The proxy closes the devtools side shortly after the upgrade.
        let end = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("close timed out");
        assert!(matches!(
            end,
            None | Some(Ok(Message::Close(_))) | Some(Err(_))
        ));
        assert_eq!(server.session_count(), 0);
    }

    #[tokio::test]
    async fn test_client_disconnect_tears_down_session() {
        let (browser_port, mut upstreams) = spawn_upstream().await;
        let server = spawn_proxy(browser_port).await;

        let mut client = connect_client(server.port(), "/p/teardown").await;
        let mut upstream = upstreams.recv().await.expect("upstream session");

        send_text(&mut upstream, r#"{"id":9,"result":{}}"#).await;
        assert_eq!(next_text(&mut client).await, r#"{"id":9,"result":{}}"#);

        client.close(None).await.expect("client close");

        // The upstream side is closed within one frame-processing latency.
        let end = timeout(Duration::from_secs(5), async {
            loop {
                match upstream.next().await {
                    None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(end.is_ok());

        // The path becomes reusable once teardown completes.
        timeout(Duration::from_secs(5), async {
            while server.session_count() != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry entry not removed");

        let mut client2 = connect_client(server.port(), "/p/teardown").await;
        let mut upstream2 = upstreams.recv().await.expect("second upstream session");
        send_text(&mut upstream2, r#"{"id":11,"result":{}}"#).await;
        assert_eq!(next_text(&mut client2).await, r#"{"id":11,"result":{}}"#);
    }
}
