use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
pub struct Config {
    /// PostgreSQL connection string (required).
    pub db_dsn: String,
    /// Path to the token signing key file (required, at least 64 bytes).
    pub token_key_path: String,
    /// Bind address for the gRPC listener.
    pub grpc_server_address: String,
    /// Bind port for the gRPC listener.
    pub grpc_server_base_port: u16,
    /// Serve TLS with the given certificate and key.
    pub use_tls: bool,
    pub key_file: Option<String>,
    pub crt_file: Option<String>,
    /// Process-wide requests-per-second budget.
    pub rps_limit: u32,
    /// Maximum accepted message size in bytes.
    pub grpc_server_recv_size: usize,
    /// Chunk size for server-streamed resource data.
    pub grpc_server_send_size: usize,
    /// Per-operation database deadline.
    pub db_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `DB_DSN` (required): PostgreSQL connection string.
    /// - `TOKEN_KEY` (required): path to the signing key file.
    /// - `GRPC_SERVER_ADDRESS` (default `0.0.0.0`).
    /// - `GRPC_SERVER_BASE_PORT` (default 8090).
    /// - `USE_TLS` (default false), `KEY_FILE`, `CRT_FILE`.
    /// - `RPS_LIMIT` (default 100).
    /// - `GRPC_SERVER_RECV_SIZE` (default 16 MiB).
    /// - `GRPC_SERVER_SEND_SIZE` (default 2 MiB).
    /// - `DB_TIMEOUT_MS` (default 250).
    pub fn from_env() -> Result<Self, String> {
        let db_dsn = env::var("DB_DSN").map_err(|_| "DB_DSN is required".to_string())?;
        let token_key_path =
            env::var("TOKEN_KEY").map_err(|_| "TOKEN_KEY is required".to_string())?;

        let grpc_server_address =
            env::var("GRPC_SERVER_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());

        let grpc_server_base_port = parse_env("GRPC_SERVER_BASE_PORT", 8090u16)?;

        let use_tls = env::var("USE_TLS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let key_file = env::var("KEY_FILE").ok();
        let crt_file = env::var("CRT_FILE").ok();

        if use_tls && (key_file.is_none() || crt_file.is_none()) {
            return Err("USE_TLS requires KEY_FILE and CRT_FILE".to_string());
        }

        let rps_limit = parse_env("RPS_LIMIT", 100u32)?;
        let grpc_server_recv_size = parse_env("GRPC_SERVER_RECV_SIZE", 16 * 1024 * 1024usize)?;
        let grpc_server_send_size = parse_env("GRPC_SERVER_SEND_SIZE", 2 * 1024 * 1024usize)?;
        let db_timeout_ms = parse_env("DB_TIMEOUT_MS", 250u64)?;

        Ok(Self {
            db_dsn,
            token_key_path,
            grpc_server_address,
            grpc_server_base_port,
            use_tls,
            key_file,
            crt_file,
            rps_limit,
            grpc_server_recv_size,
            grpc_server_send_size,
            db_timeout: Duration::from_millis(db_timeout_ms),
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}
