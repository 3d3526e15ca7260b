use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

/// External mail transport. Registration and resend-verification dispatch
/// through this seam fire-and-forget: a failed send is logged, never rolled
/// back into the request that triggered it.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, to: &str, name: &str, link: &str) -> anyhow::Result<()>;
}

/// Posts the message to the mail transport's webhook.
pub struct HttpMailer {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_verification(&self, to: &str, name: &str, link: &str) -> anyhow::Result<()> {
        let body = json!({
            "to": to,
            "template": "verify-email",
            "subject": "Verify your Educours account",
            "name": name,
            "link": link,
        });
        let res = self.http.post(&self.endpoint).json(&body).send().await?;
        res.error_for_status()?;
        info!(to = %to, "verification mail dispatched");
        Ok(())
    }
}

/// Logs instead of sending. Used when no webhook is configured and in tests.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_verification(&self, to: &str, _name: &str, link: &str) -> anyhow::Result<()> {
        debug!(to = %to, link = %link, "mail transport not configured; verification link not sent");
        Ok(())
    }
}
