use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Expiry windows for the stored (non-JWT) token kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub verification_ttl_hours: i64,
    pub reset_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub tokens: TokenConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "agrilink".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "agrilink-app".into()),
            ttl_minutes: env_i64("JWT_TTL_MINUTES", 60),
        };
        let tokens = TokenConfig {
            verification_ttl_hours: env_i64("VERIFICATION_TTL_HOURS", 24),
            reset_ttl_minutes: env_i64("RESET_TTL_MINUTES", 60),
            refresh_ttl_days: env_i64("REFRESH_TTL_DAYS", 7),
        };
        Ok(Self {
            database_url,
            jwt,
            tokens,
        })
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}
