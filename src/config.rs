use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// OpenAI-compatible chat completions endpoint used for photo analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub s3: S3Config,
    pub vision: VisionConfig,
    pub analyze_per_minute: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Only `DATABASE_URL` and `JWT_SECRET` are required; everything else
    /// has a local-development default.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));
        let env_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.into());
        fn parsed<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
            raw.and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
        }
        let env_parse_i64 = |key: &str, default: i64| parsed(get(key), default);

        let database_url = required("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "caltrack"),
            audience: env_or("JWT_AUDIENCE", "caltrack-users"),
            ttl_minutes: env_parse_i64("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse_i64("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 30),
            reset_ttl_minutes: env_parse_i64("JWT_RESET_TTL_MINUTES", 10),
        };
        let s3 = S3Config {
            endpoint: env_or("S3_ENDPOINT", "http://localhost:9000"),
            bucket: env_or("S3_BUCKET", "meal-photos"),
            access_key: env_or("S3_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("S3_SECRET_KEY", "minioadmin"),
            region: env_or("S3_REGION", "us-east-1"),
        };
        let vision = VisionConfig {
            api_key: env_or("VISION_API_KEY", ""),
            base_url: env_or("VISION_BASE_URL", "https://api.openai.com/v1"),
            model: env_or("VISION_MODEL", "gpt-5-nano"),
        };
        if vision.api_key.is_empty() {
            warn!("VISION_API_KEY is not set; photo analysis requests will fail");
        }
        Ok(Self {
            database_url,
            jwt,
            s3,
            vision,
            analyze_per_minute: parsed(get("ANALYZE_RATE_LIMIT_PER_MINUTE"), 5),
        })
    }
}
