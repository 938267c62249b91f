//! Runtime tuning configuration for the labelgate proxy.
//!
//! Deployment identity (upstream URL, tenant label, tenant header) comes
//! from the CLI in `main`; this struct carries the tuning knobs, all
//! overridable via `LABELGATE_*` environment variables.

/// Runtime configuration, environment-overridable with defaults.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Enable TCP_NODELAY on accepted and upstream connections
    pub tcp_nodelay: bool,

    /// TCP keepalive interval in seconds
    pub tcp_keepalive_secs: u64,

    /// Maximum concurrent in-flight connections; excess connections are
    /// answered 503 without being served
    pub max_concurrent_streams: usize,

    /// Socket buffer size (SO_RCVBUF / SO_SNDBUF)
    pub socket_buffer_size: usize,

    /// Maximum buffered size for a rewritten API response body.
    /// Rules/alerts bodies are decoded whole, so this bounds per-response
    /// memory; larger bodies fail the response with 502.
    pub resp_buffer_max: usize,

    /// Maximum idle upstream connections kept pooled per host
    pub pool_max_idle_per_host: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            tcp_keepalive_secs: 60,
            max_concurrent_streams: 10000,
            socket_buffer_size: 262144, // 256 KB
            resp_buffer_max: 10 * 1024 * 1024, // 10 MB
            pool_max_idle_per_host: 32,
        }
    }
}

impl GateConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Environment Variables
    ///
    /// - `LABELGATE_TCP_NODELAY` (default: true)
    /// - `LABELGATE_TCP_KEEPALIVE_SECS` (default: 60)
    /// - `LABELGATE_MAX_CONCURRENT_STREAMS` (default: 10000)
    /// - `LABELGATE_SOCKET_BUFFER_SIZE` (default: 262144)
    /// - `LABELGATE_RESP_BUFFER_MAX` (default: 10485760 = 10MB)
    /// - `LABELGATE_POOL_MAX_IDLE_PER_HOST` (default: 32)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            tcp_nodelay: std::env::var("LABELGATE_TCP_NODELAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.tcp_nodelay),

            tcp_keepalive_secs: std::env::var("LABELGATE_TCP_KEEPALIVE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.tcp_keepalive_secs),

            max_concurrent_streams: std::env::var("LABELGATE_MAX_CONCURRENT_STREAMS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_concurrent_streams),

            socket_buffer_size: std::env::var("LABELGATE_SOCKET_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.socket_buffer_size),

            resp_buffer_max: std::env::var("LABELGATE_RESP_BUFFER_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.resp_buffer_max),

            pool_max_idle_per_host: std::env::var("LABELGATE_POOL_MAX_IDLE_PER_HOST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.pool_max_idle_per_host),
        }
    }
}
