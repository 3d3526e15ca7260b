use async_trait::async_trait;
use thiserror::Error;

use crate::auth::dto::AuthResponse;
use crate::auth::repo_types::PublicUser;

/// Client-side API failure. Network unreachability is kept apart from server
/// responses so the UI can show "check your connection" instead of a generic
/// failure.
#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("network unreachable: {0}")]
    Network(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("server responded {status}")]
    Server { status: u16 },
}

impl ApiClientError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Outbound contract of the session layer: exchange a stored token for the
/// current user, or for a fresh token.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn rehydrate(&self, token: &str) -> Result<PublicUser, ApiClientError>;
    async fn refresh(&self, token: &str) -> Result<AuthResponse, ApiClientError>;
}

/// Talks to the Educours backend over HTTP, attaching the bearer token to
/// every call.
pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        res: reqwest::Response,
    ) -> Result<T, ApiClientError> {
        let status = res.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiClientError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiClientError::Server {
                status: status.as_u16(),
            });
        }
        res.json::<T>()
            .await
            .map_err(|e| ApiClientError::Network(e.to_string()))
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn rehydrate(&self, token: &str) -> Result<PublicUser, ApiClientError> {
        let res = self
            .http
            .get(format!("{}/api/auth/me", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiClientError::Network(e.to_string()))?;
        Self::decode(res).await
    }

    async fn refresh(&self, token: &str) -> Result<AuthResponse, ApiClientError> {
        let res = self
            .http
            .post(format!("{}/api/auth/refresh", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiClientError::Network(e.to_string()))?;
        Self::decode(res).await
    }
}
