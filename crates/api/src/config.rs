//! Process configuration, read from environment variables.

use chrono::Duration;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `JWT_SECRET`: HS256 signing key.
    pub jwt_secret: String,
    /// `TOKEN_TTL_SECS`: token lifetime.
    pub token_ttl: Duration,
    /// `BIND_ADDR`
    pub bind_addr: String,
    /// `DATABASE_URL`: Postgres when set, in-memory otherwise.
    pub database_url: Option<String>,
    /// `DATABASE_MAX_CONNECTIONS`
    pub database_max_connections: u32,
    /// `SEED_ON_STARTUP`
    pub seed_on_startup: bool,
    /// `SEED_PASSWORD`: password of every seeded account.
    pub seed_password: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or unparsable values fall back
    /// to development defaults (with a warning where the default is insecure).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let jwt_secret = lookup("JWT_SECRET").filter(|s| !s.is_empty()).unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let token_ttl_secs = parsed(&lookup, "TOKEN_TTL_SECS", 3600i64).max(1);
        let seed_password = lookup("SEED_PASSWORD").unwrap_or_else(|| "changeme".to_string());

        Self {
            jwt_secret,
            token_ttl: Duration::seconds(token_ttl_secs),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32),
            seed_on_startup: parsed(&lookup, "SEED_ON_STARTUP", true),
            seed_password,
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "unparsable config value; using default");
            default
        }),
    }
}
