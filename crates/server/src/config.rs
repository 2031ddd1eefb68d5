// Chat server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The marketplace deploys one chat server process; the
// connection registry is per-process, so there is exactly one of these.

use std::net::SocketAddr;

/// Core chat server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// JWT signing secret for access tokens.
    pub jwt_secret: String,
    /// PostgreSQL connection string. Unset means in-memory stores
    /// (development and tests only; nothing survives a restart).
    pub database_url: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `roomline_server=debug`).
    pub log_filter: String,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `ROOMLINE_SERVER_HOST` | `0.0.0.0` |
    /// | `ROOMLINE_SERVER_PORT` | `8080` |
    /// | `ROOMLINE_SERVER_JWT_SECRET` | dev-only placeholder |
    /// | `ROOMLINE_SERVER_DATABASE_URL` | *(none — in-memory stores)* |
    /// | `ROOMLINE_SERVER_CORS_ORIGINS` | *(none — cors.rs uses dev defaults)* |
    /// | `ROOMLINE_SERVER_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("ROOMLINE_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 =
            env("ROOMLINE_SERVER_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret = env("ROOMLINE_SERVER_JWT_SECRET")
            .unwrap_or_else(|_| "roomline_local_development_jwt_secret_32".into());

        Self {
            listen_addr,
            jwt_secret,
            database_url: env("ROOMLINE_SERVER_DATABASE_URL").ok(),
            cors_origins: env("ROOMLINE_SERVER_CORS_ORIGINS").ok(),
            log_filter: env("ROOMLINE_SERVER_LOG_FILTER").unwrap_or_else(|_| "info".into()),
        }
    }
}
