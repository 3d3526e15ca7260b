use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Base URL of the SPA, used to build verification links.
    pub frontend_url: String,
    /// Webhook of the external mail transport. When absent, mail dispatch
    /// degrades to a log line.
    pub mail_webhook: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "educours".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "educours-web".into()),
            ttl_days: std::env::var("JWT_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(7),
        };
        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .trim_end_matches('/')
            .to_string();
        let mail_webhook = std::env::var("MAIL_WEBHOOK_URL").ok();
        Ok(Self {
            database_url,
            jwt,
            frontend_url,
            mail_webhook,
        })
    }
}
