//! Configuration loading and types.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct. Every field has a default, so an empty file (or no
//! file at all) is a valid configuration. Command-line flags override the
//! file; see `main.rs`.

use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Private key for TLS. HTTPS is served when set, plain HTTP otherwise.
    #[serde(default)]
    pub tls_key: Option<String>,

    /// Certificate chain for TLS. Required with `tls_key`, forbidden without it.
    #[serde(default)]
    pub tls_cert: Option<String>,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Largest upload body accepted, in bytes (default 5 GiB).
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls_key: None,
            tls_cert: None,
            shutdown_timeout: default_shutdown_timeout(),
            max_object_size: default_max_object_size(),
        }
    }
}

impl ServerConfig {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn bind_addr(&self) -> String {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        if host.contains(':') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Resolve the listen address. Hostnames are looked up and the first
    /// address returned is used.
    pub async fn resolve_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let bind_addr = self.bind_addr();
        let addr = tokio::net::lookup_host(bind_addr.as_str())
            .await
            .with_context(|| format!("cannot resolve listen address {bind_addr}"))?
            .next()
            .ok_or_else(|| anyhow::anyhow!("listen address {bind_addr} resolved to nothing"));
        addr
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error. `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

impl Config {
    /// Check cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        match (&self.server.tls_key, &self.server.tls_cert) {
            (Some(_), None) => anyhow::bail!("tls_cert is required when tls_key is set"),
            (None, Some(_)) => anyhow::bail!("tls_cert must not be set without tls_key"),
            _ => {}
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("unknown logging.format {other:?} (expected text or json)"),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_object_size() -> u64 {
    5_368_709_120 // 5 GiB
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    // An empty document deserializes as unit, not as an empty map.
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_addr(), "127.0.0.1:8080");
        assert!(config.server.tls_key.is_none());
        assert_eq!(config.server.max_object_size, 5_368_709_120);
        assert_eq!(config.logging.level, "info");
        assert!(config.observability.metrics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_empty_file() {
        let file = write_yaml("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_partial_file() {
        let file = write_yaml(
            "server:\n  host: 0.0.0.0\n  port: 9443\n  tls_key: key.pem\n  tls_cert: cert.pem\nlogging:\n  format: json\n",
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind_addr(), "0.0.0.0:9443");
        assert_eq!(config.server.tls_key.as_deref(), Some("key.pem"));
        assert_eq!(config.server.shutdown_timeout, 30);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config("/nonexistent/s3-path-proxy.yaml").is_err());
    }

    #[test]
    fn test_tls_key_requires_cert() {
        let mut config = Config::default();
        config.server.tls_key = Some("key.pem".into());
        assert!(config.validate().is_err());

        config.server.tls_key = None;
        config.server.tls_cert = Some("cert.pem".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_addr_brackets_ipv6() {
        let mut server = ServerConfig::default();
        server.host = "::1".into();
        assert_eq!(server.bind_addr(), "[::1]:8080");
        server.host = "[::1]".into();
        assert_eq!(server.bind_addr(), "[::1]:8080");
    }

    #[tokio::test]
    async fn test_resolve_listen_addr() {
        let mut server = ServerConfig::default();
        server.port = 9000;

        server.host = "localhost".into();
        let addr = server.resolve_listen_addr().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9000);

        server.host = "::1".into();
        let addr = server.resolve_listen_addr().await.unwrap();
        assert_eq!(addr, "[::1]:9000".parse::<SocketAddr>().unwrap());

        server.host = "0.0.0.0".into();
        let addr = server.resolve_listen_addr().await.unwrap();
        assert_eq!(addr, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());
    }
}
