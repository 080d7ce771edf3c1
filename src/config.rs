//! Startup configuration.
//!
//! All options are read once at startup from the command line; nothing is
//! reloaded at runtime.
//!
//! # Options
//!
//! | Flag | Default | Meaning |
//! |------|---------|---------|
//! | `--debugger` | `lovedebug` | Sentinel function name treated as the user's intentional breakpoint |
//! | `--cdp` | 9221 | Port the proxy listens on for DevTools connections |
//! | `--port` | 9222 | Port of the browser's remote-debug endpoint |
//! | `--log` | off | Write verbose logs to `server.log` (truncated on start) |

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

// ============================================================================
// ProxyConfig
// ============================================================================

/// Command-line configuration for the proxy.
///
/// # Example
///
/// ```ignore
/// let config = ProxyConfig::parse();
/// let server = ProxyServer::bind(config).await?;
/// ```
#[derive(Parser, Debug, Clone)]
#[command(name = "cdp-cloak", version, about)]
pub struct ProxyConfig {
    /// The name of the self-defined debugger function.
    ///
    /// A pause inside a function with this name is treated as the user's
    /// intentional breakpoint; every other bare `debugger;` pause is an
    /// anti-debug trap and is resumed transparently.
    #[arg(long = "debugger", value_name = "NAME", default_value = "lovedebug")]
    pub debugger_name: String,

    /// Port to listen on for incoming DevTools connections.
    #[arg(long = "cdp", value_name = "PORT", default_value_t = 9221)]
    pub cdp_port: u16,

    /// Port of the browser's remote debug endpoint.
    #[arg(long = "port", value_name = "PORT", default_value_t = 9222)]
    pub browser_port: u16,

    /// Enable logging to `server.log` (truncated on every start).
    #[arg(long = "log")]
    pub log: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            debugger_name: "lovedebug".to_string(),
            cdp_port: 9221,
            browser_port: 9222,
            log: false,
        }
    }
}

// ============================================================================
// Derived Addresses
// ============================================================================

impl ProxyConfig {
    /// Returns the socket address the proxy listens on.
    ///
    /// Always loopback; this is a local developer tool.
    #[inline]
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.cdp_port)
    }

    /// Returns the upstream debug endpoint base URL.
    ///
    /// The DevTools client's request path is appended verbatim to form the
    /// full dial URL, e.g. `ws://localhost:9222/devtools/page/<id>`.
    #[inline]
    #[must_use]
    pub fn upstream_base(&self) -> String {
        format!("ws://localhost:{}/devtools/page", self.browser_port)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.debugger_name, "lovedebug");
        assert_eq!(config.cdp_port, 9221);
        assert_eq!(config.browser_port, 9222);
        assert!(!config.log);
    }

    #[test]
    fn test_clap_defaults_match_default_impl() {
        let parsed = ProxyConfig::parse_from(["cdp-cloak"]);
        let default = ProxyConfig::default();
        assert_eq!(parsed.debugger_name, default.debugger_name);
        assert_eq!(parsed.cdp_port, default.cdp_port);
        assert_eq!(parsed.browser_port, default.browser_port);
        assert_eq!(parsed.log, default.log);
    }

    #[test]
    fn test_parse_overrides() {
        let config = ProxyConfig::parse_from([
            "cdp-cloak",
            "--debugger",
            "mybreak",
            "--cdp",
            "9331",
            "--port",
            "9332",
            "--log",
        ]);
        assert_eq!(config.debugger_name, "mybreak");
        assert_eq!(config.cdp_port, 9331);
        assert_eq!(config.browser_port, 9332);
        assert!(config.log);
    }

    #[test]
    fn test_listen_addr_is_loopback() {
        let config = ProxyConfig::default();
        let addr = config.listen_addr();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9221);
    }

    #[test]
    fn test_upstream_base_url() {
        let config = ProxyConfig {
            browser_port: 9333,
            ..Default::default()
        };
        assert_eq!(config.upstream_base(), "ws://localhost:9333/devtools/page");
    }
}
