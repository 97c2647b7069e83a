use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Argon2id work factor.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_url: String,
    pub timeout_secs: u64,
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Clear the stored refresh token when the password changes.
    pub revoke_sessions_on_password_change: bool,
    /// Mark auth cookies `Secure`.
    pub secure_cookies: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub storage: StorageConfig,
    pub session: SessionPolicy,
    /// Browser origins allowed to send credentialed requests; `*` mirrors any.
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;

        let jwt = JwtConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "vidtube".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "vidtube-users".into()),
            access_ttl_minutes: parsed("ACCESS_TOKEN_TTL_MINUTES", 15),
            refresh_ttl_minutes: parsed("REFRESH_TOKEN_TTL_MINUTES", 60 * 24 * 14),
        };
        anyhow::ensure!(
            jwt.access_secret != jwt.refresh_secret,
            "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ"
        );

        let password = PasswordConfig {
            memory_kib: parsed("ARGON2_MEMORY_KIB", 19 * 1024),
            iterations: parsed("ARGON2_ITERATIONS", 2),
            parallelism: parsed("ARGON2_PARALLELISM", 1),
        };

        let endpoint = required("S3_ENDPOINT")?;
        let bucket = required("S3_BUCKET")?;
        let public_url = std::env::var("S3_PUBLIC_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let storage = StorageConfig {
            access_key: required("S3_ACCESS_KEY")?,
            secret_key: required("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_url,
            timeout_secs: parsed("STORAGE_TIMEOUT_SECS", 15),
            endpoint,
            bucket,
        };

        let session = SessionPolicy {
            revoke_sessions_on_password_change: flag("REVOKE_SESSIONS_ON_PASSWORD_CHANGE", false)?,
            secure_cookies: is_production(std::env::var("APP_ENV").ok().as_deref()),
        };

        let cors_origins = cors_origins(
            &std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".into()),
        )?;

        Ok(Self {
            database_url,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10),
            db_acquire_timeout_secs: parsed("DB_ACQUIRE_TIMEOUT_SECS", 5),
            jwt,
            password,
            storage,
            session,
            cors_origins,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_or(key, std::env::var(key).ok(), default)
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!(%key, value = %raw, "unparseable config value, using default");
            default
        }
    }
}

/// Boolean switches fail startup on unrecognised values.
fn flag(key: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(key) {
        Ok(raw) => parse_flag(&raw)
            .with_context(|| format!("{key} must be true/false, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn cors_origins(raw: &str) -> anyhow::Result<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();
    anyhow::ensure!(!origins.is_empty(), "CORS_ORIGIN must name at least one origin");
    for origin in &origins {
        HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin {origin:?}"))?;
    }
    Ok(origins)
}

fn is_production(app_env: Option<&str>) -> bool {
    app_env.is_some_and(|v| v.eq_ignore_ascii_case("production"))
}
