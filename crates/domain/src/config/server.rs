use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8000")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Environment variable holding the API bearer token for `/v1` routes.
    /// If the env var is unset or empty, the server logs a warning and
    /// allows unauthenticated access.
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    /// Per-IP token-bucket rate limiting. Disabled when `None`.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Upper bound on in-flight requests across the whole server.
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "127.0.0.1".into(),
            cors: CorsConfig::default(),
            api_token_env: d_api_token_env(),
            rate_limit: None,
            max_concurrent_requests: d_max_concurrent(),
            stream: StreamConfig::default(),
        }
    }
}

/// Server-sent event transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Idle keep-alive ping interval.
    #[serde(default = "d_ping")]
    pub ping_interval_secs: u64,
    /// A single event send blocked longer than this is treated as a client
    /// disconnect.
    #[serde(default = "d_send_timeout")]
    pub send_timeout_secs: u64,
    /// Buffered events between the orchestrator task and the SSE body.
    #[serde(default = "d_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: d_ping(),
            send_timeout_secs: d_send_timeout(),
            channel_capacity: d_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Entries may end in `:*` to allow any port.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8000() -> u16 {
    8000
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:*".into(),
        "http://127.0.0.1:*".into(),
    ]
}
fn d_api_token_env() -> String {
    "CK_API_TOKEN".into()
}
fn d_max_concurrent() -> usize {
    256
}
fn d_ping() -> u64 {
    5
}
fn d_send_timeout() -> u64 {
    300
}
fn d_channel_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_all_defaults() {
        let cfg: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.api_token_env, "CK_API_TOKEN");
        assert!(cfg.rate_limit.is_none());
        assert_eq!(cfg.stream.ping_interval_secs, 5);
        assert_eq!(cfg.stream.send_timeout_secs, 300);
    }

    #[test]
    fn parses_stream_and_rate_limit() {
        let toml_str = r#"
            port = 9000

            [rate_limit]
            requests_per_second = 50
            burst_size = 100

            [stream]
            ping_interval_secs = 15
        "#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.port, 9000);
        let rl = cfg.rate_limit.expect("rate_limit should be Some");
        assert_eq!(rl.burst_size, 100);
        assert_eq!(cfg.stream.ping_interval_secs, 15);
        assert_eq!(cfg.stream.send_timeout_secs, 300);
    }
}
