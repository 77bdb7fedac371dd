use std::collections::HashMap;

use serde::Deserialize;

/// Top-level application configuration.
/// Loaded from environment variables (optionally seeded from `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Origin gate settings
    #[serde(default)]
    pub cors: CorsConfig,
    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Bearer token settings
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP + WebSocket port (default: 4741)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level used when `RUST_LOG` is unset (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Largest request body the pipeline will decode (default: 1 MiB)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// The single client origin allowed to call the API and open sockets.
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret for bearer tokens
    pub jwt_secret: String,
    /// Lifetime of tokens minted by the server (default: 3600 = 1 hour)
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl AppConfig {
    /// Load config from the process environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build config from an explicit set of variables.
    ///
    /// `CG__SECTION__KEY` variables are read first; the conventional
    /// `PORT`, `CLIENT_ORIGIN` and `DATABASE_URL` win over them when set.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, config::ConfigError> {
        let port = vars.get("PORT").cloned();
        let origin = vars.get("CLIENT_ORIGIN").cloned();
        let database_url = vars.get("DATABASE_URL").cloned();

        let cfg = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CG")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars)),
            )
            .set_override_option("server.port", port)?
            .set_override_option("cors.allowed_origin", origin)?
            .set_override_option("database.url", database_url)?
            .build()?;

        cfg.try_deserialize()
    }

    /// Socket address string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: default_allowed_origin(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4741
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_allowed_origin() -> String {
    "http://localhost:7165".to_string()
}
fn default_database_url() -> String {
    "postgres://localhost/chatgate_development".to_string()
}
fn default_max_connections() -> u32 {
    10
}
fn default_token_ttl() -> u64 {
    3600
}
