use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::auth::repo_types::PublicUser;
use crate::client::api::{ApiClientError, AuthApi};
use crate::client::routes;

/// Where the session token is persisted between application starts. The SPA
/// backs this with browser storage; tests and native shells use the in-memory
/// impl.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str);
    fn clear(&self);
}

pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn save(&self, token: &str) {
        *self.token.lock().unwrap() = Some(token.to_string());
    }

    fn clear(&self) {
        *self.token.lock().unwrap() = None;
    }
}

/// The authenticated user as cached by the client: public projection plus the
/// permission set its role implies.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: PublicUser,
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn from_user(user: PublicUser) -> Self {
        let permissions = routes::permissions_for(user.role)
            .iter()
            .map(|p| p.to_string())
            .collect();
        Self { user, permissions }
    }

    pub fn has_all(&self, required: &[&str]) -> bool {
        required.iter().all(|p| self.permissions.contains(*p))
    }
}

#[derive(Default)]
struct Inner {
    principal: Option<Principal>,
    initialized: bool,
    expired_notice: bool,
}

/// Client session: the one source of truth for "who is logged in". Explicitly
/// constructed and injected, with an `init`/`teardown` lifecycle tied to
/// application startup and logout.
pub struct SessionContext {
    api: Arc<dyn AuthApi>,
    tokens: Arc<dyn TokenStore>,
    inner: RwLock<Inner>,
}

impl SessionContext {
    pub fn new(api: Arc<dyn AuthApi>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            api,
            tokens,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Startup rehydration: exchange a persisted token for the current user.
    /// Idempotent once the session has settled.
    pub async fn init(&self) {
        if self.is_initialized() {
            return;
        }
        self.rehydrate().await;
    }

    /// Settle the session against the server. A 401 destroys the stored token
    /// (it no longer authenticates anything); a network or server failure
    /// leaves the session unsettled so the next navigation retries.
    pub async fn rehydrate(&self) {
        let Some(token) = self.tokens.load() else {
            let mut inner = self.inner.write().unwrap();
            inner.principal = None;
            inner.initialized = true;
            return;
        };

        match self.api.rehydrate(&token).await {
            Ok(user) => {
                let mut inner = self.inner.write().unwrap();
                inner.principal = Some(Principal::from_user(user));
                inner.initialized = true;
            }
            Err(ApiClientError::Unauthorized) => {
                debug!("stored token rejected; clearing session");
                self.tokens.clear();
                let mut inner = self.inner.write().unwrap();
                inner.principal = None;
                inner.initialized = true;
            }
            Err(e) => {
                warn!(error = %e, "session rehydration failed, will retry");
                let mut inner = self.inner.write().unwrap();
                inner.principal = None;
                inner.initialized = false;
            }
        }
    }

    /// Adopt a freshly issued token + user, e.g. right after login or
    /// registration.
    pub fn establish(&self, token: &str, user: PublicUser) {
        self.tokens.save(token);
        let mut inner = self.inner.write().unwrap();
        inner.principal = Some(Principal::from_user(user));
        inner.initialized = true;
    }

    /// Destroy the session: forget the token and the cached principal.
    pub fn logout(&self) {
        self.tokens.clear();
        let mut inner = self.inner.write().unwrap();
        inner.principal = None;
        inner.initialized = true;
    }

    pub fn teardown(&self) {
        self.logout();
        self.inner.write().unwrap().expired_notice = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().unwrap().initialized
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().unwrap().principal.is_some()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.inner.read().unwrap().principal.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.tokens.load()
    }

    pub fn note_session_expired(&self) {
        self.inner.write().unwrap().expired_notice = true;
    }

    /// One-shot read of the "session expired" notice for the UI.
    pub fn take_expired_notice(&self) -> bool {
        let mut inner = self.inner.write().unwrap();
        std::mem::take(&mut inner.expired_notice)
    }

    /// Whether the held token expires within `threshold`. Reads the `exp`
    /// claim without signature verification; the client holds no key and only
    /// uses this as a refresh hint, never as an authorization decision.
    pub fn token_expires_within(&self, threshold: Duration) -> bool {
        let Some(token) = self.tokens.load() else {
            return false;
        };
        let Some(exp) = token_expiry_unix(&token) else {
            return false;
        };
        let now = OffsetDateTime::now_utc().unix_timestamp();
        exp - now < threshold.as_secs() as i64
    }

    /// Best-effort silent refresh. A refresh that loses the race with logout
    /// has its result dropped; a failure is logged and the session is left
    /// as-is (the user is logged out only when the token actually expires on
    /// a later request).
    pub async fn try_refresh(&self) {
        let Some(token) = self.tokens.load() else {
            return;
        };
        match self.api.refresh(&token).await {
            Ok(resp) => {
                if self.tokens.load().is_none() {
                    debug!("refresh completed after logout; discarding result");
                    return;
                }
                self.tokens.save(&resp.token);
                let mut inner = self.inner.write().unwrap();
                inner.principal = Some(Principal::from_user(resp.user));
                inner.initialized = true;
                debug!("session token silently refreshed");
            }
            Err(e) => {
                warn!(error = %e, "silent token refresh failed");
            }
        }
    }
}

#[derive(Deserialize)]
struct ExpOnly {
    exp: usize,
}

fn token_expiry_unix(token: &str) -> Option<i64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    decode::<ExpOnly>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|d| d.claims.exp as i64)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::auth::dto::AuthResponse;
    use crate::auth::repo_types::Role;

    pub fn sample_public_user(role: Role, verified: bool, active: bool) -> PublicUser {
        PublicUser {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            first_name: "Sam".into(),
            last_name: "Lee".into(),
            avatar_url: None,
            role,
            is_active: active,
            is_verified: verified,
        }
    }

    /// Scripted server double for session/guard tests.
    pub struct MockApi {
        pub user: PublicUser,
        pub rehydrate_result: MockResult,
        pub refresh_token: String,
        pub rehydrate_calls: AtomicUsize,
        pub refresh_calls: AtomicUsize,
        /// Delay applied to refresh, to exercise the logout race.
        pub refresh_delay: Option<Duration>,
    }

    #[derive(Clone, Copy)]
    pub enum MockResult {
        Ok,
        Unauthorized,
        Network,
    }

    impl MockApi {
        pub fn new(user: PublicUser) -> Self {
            Self {
                user,
                rehydrate_result: MockResult::Ok,
                refresh_token: "refreshed-token".into(),
                rehydrate_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                refresh_delay: None,
            }
        }
    }

    #[async_trait]
    impl AuthApi for MockApi {
        async fn rehydrate(&self, _token: &str) -> Result<PublicUser, ApiClientError> {
            self.rehydrate_calls.fetch_add(1, Ordering::SeqCst);
            match self.rehydrate_result {
                MockResult::Ok => Ok(self.user.clone()),
                MockResult::Unauthorized => Err(ApiClientError::Unauthorized),
                MockResult::Network => Err(ApiClientError::Network("offline".into())),
            }
        }

        async fn refresh(&self, _token: &str) -> Result<AuthResponse, ApiClientError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.refresh_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(AuthResponse {
                token: self.refresh_token.clone(),
                user: self.user.clone(),
            })
        }
    }

    pub fn session_with(api: MockApi, token: Option<&str>) -> (Arc<SessionContext>, Arc<MockApi>) {
        let api = Arc::new(api);
        let tokens: Arc<dyn TokenStore> = match token {
            Some(t) => Arc::new(MemoryTokenStore::with_token(t)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        let session = Arc::new(SessionContext::new(api.clone(), tokens));
        (session, api)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use jsonwebtoken::{encode, EncodingKey, Header};
    use time::Duration as TimeDuration;

    use super::test_support::{sample_public_user, session_with, MockApi, MockResult};
    use super::*;
    use crate::auth::repo_types::Role;

    fn token_expiring_in(seconds: i64) -> String {
        #[derive(serde::Serialize)]
        struct MiniClaims {
            sub: String,
            exp: i64,
        }
        let claims = MiniClaims {
            sub: "test".into(),
            exp: (OffsetDateTime::now_utc() + TimeDuration::seconds(seconds)).unix_timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"irrelevant"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn init_without_token_settles_as_guest() {
        let user = sample_public_user(Role::Student, true, true);
        let (session, api) = session_with(MockApi::new(user), None);
        session.init().await;
        assert!(session.is_initialized());
        assert!(!session.is_authenticated());
        assert_eq!(api.rehydrate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn init_with_token_rehydrates_principal() {
        let user = sample_public_user(Role::Teacher, true, true);
        let (session, api) = session_with(MockApi::new(user), Some("stored-token"));
        session.init().await;
        assert!(session.is_authenticated());
        let principal = session.principal().unwrap();
        assert_eq!(principal.user.role, Role::Teacher);
        assert!(principal.has_all(&["courses:manage"]));
        assert!(!principal.has_all(&["users:manage"]));
        assert_eq!(api.rehydrate_calls.load(Ordering::SeqCst), 1);

        // Settled sessions do not rehydrate again.
        session.init().await;
        assert_eq!(api.rehydrate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_token_is_cleared() {
        let user = sample_public_user(Role::Student, true, true);
        let mut api = MockApi::new(user);
        api.rehydrate_result = MockResult::Unauthorized;
        let (session, _api) = session_with(api, Some("stale-token"));
        session.init().await;
        assert!(session.is_initialized());
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
    }

    #[tokio::test]
    async fn network_failure_leaves_session_unsettled() {
        let user = sample_public_user(Role::Student, true, true);
        let mut api = MockApi::new(user);
        api.rehydrate_result = MockResult::Network;
        let (session, _api) = session_with(api, Some("token"));
        session.init().await;
        assert!(!session.is_initialized());
        assert!(!session.is_authenticated());
        // Token survives a connectivity blip.
        assert!(session.token().is_some());
    }

    #[tokio::test]
    async fn establish_and_logout_lifecycle() {
        let user = sample_public_user(Role::Student, true, true);
        let (session, _api) = session_with(MockApi::new(user.clone()), None);
        session.establish("fresh-token", user);
        assert!(session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("fresh-token"));

        session.logout();
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
        assert!(session.is_initialized());
    }

    #[tokio::test]
    async fn teardown_clears_pending_notices() {
        let user = sample_public_user(Role::Student, true, true);
        let (session, _api) = session_with(MockApi::new(user.clone()), None);
        session.establish("token", user);
        session.note_session_expired();
        session.teardown();
        assert!(!session.is_authenticated());
        assert!(!session.take_expired_notice());
    }

    #[tokio::test]
    async fn try_refresh_swaps_token_and_principal() {
        let user = sample_public_user(Role::Student, true, true);
        let (session, api) = session_with(MockApi::new(user), Some("old-token"));
        session.init().await;
        session.try_refresh().await;
        assert_eq!(session.token().as_deref(), Some("refreshed-token"));
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_result_dropped_after_logout() {
        let user = sample_public_user(Role::Student, true, true);
        let mut api = MockApi::new(user);
        api.refresh_delay = Some(Duration::from_millis(20));
        let (session, _api) = session_with(api, Some("old-token"));
        session.init().await;

        let refresher = {
            let session = session.clone();
            tokio::spawn(async move { session.try_refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        session.logout();
        refresher.await.unwrap();

        assert!(session.token().is_none());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn expiry_threshold_reads_the_exp_claim() {
        let user = sample_public_user(Role::Student, true, true);
        let near = token_expiring_in(5 * 60);
        let (session, _api) = session_with(MockApi::new(user.clone()), Some(&near));
        assert!(session.token_expires_within(Duration::from_secs(15 * 60)));
        assert!(!session.token_expires_within(Duration::from_secs(60)));

        let far = token_expiring_in(6 * 24 * 60 * 60);
        let (session, _api) = session_with(MockApi::new(user), Some(&far));
        assert!(!session.token_expires_within(Duration::from_secs(15 * 60)));
    }

    #[tokio::test]
    async fn opaque_token_never_reports_near_expiry() {
        let user = sample_public_user(Role::Student, true, true);
        let (session, _api) = session_with(MockApi::new(user), Some("not-a-jwt"));
        assert!(!session.token_expires_within(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn expired_notice_is_one_shot() {
        let user = sample_public_user(Role::Student, true, true);
        let (session, _api) = session_with(MockApi::new(user), None);
        assert!(!session.take_expired_notice());
        session.note_session_expired();
        assert!(session.take_expired_notice());
        assert!(!session.take_expired_notice());
    }
}
