use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::client::routes::{self, RouteMeta};
use crate::client::session::SessionContext;

const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Outcome of a navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Redirect(String),
}

/// The navigation guard: one authoritative state machine evaluated before
/// every route transition, first match wins. Evaluations are serialized so a
/// navigation arriving while another is awaiting rehydration sees the settled
/// session, never a stale snapshot.
pub struct NavigationGuard {
    session: Arc<SessionContext>,
    nav_lock: Mutex<()>,
    refresh_threshold: Duration,
}

impl NavigationGuard {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self {
            session,
            nav_lock: Mutex::new(()),
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
        }
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub async fn evaluate(
        &self,
        path: &str,
        query: &[(String, String)],
        meta: &RouteMeta,
    ) -> Decision {
        let _serialized = self.nav_lock.lock().await;

        // Any link may force a logout or carry an expiry notice via query
        // params; both are stripped from the URL so a reload cannot re-trigger
        // them.
        let logout_param = query_flag(query, "logout");
        let expired_param = query_flag(query, "session_expired");
        if logout_param || expired_param {
            if expired_param {
                self.session.note_session_expired();
            }
            debug!(path, "logout via query parameter convention");
            self.session.logout();
            return Decision::Redirect(without_special_params(path, query));
        }

        // Suspend the navigation until a stored token has been exchanged for
        // the current user (or rejected).
        if !self.session.is_initialized() {
            self.session.rehydrate().await;
        }

        let principal = self.session.principal();

        if meta.guest_only {
            if let Some(p) = &principal {
                return Decision::Redirect(routes::home_route(Some(p.user.role)).to_string());
            }
        }

        if meta.needs_principal() {
            let Some(p) = &principal else {
                return Decision::Redirect(login_redirect(path));
            };

            if let Some(required) = meta.required_role {
                if p.user.role != required {
                    // Never let the navigation through, even transiently;
                    // send the principal to their own home.
                    return Decision::Redirect(
                        routes::home_route(Some(p.user.role)).to_string(),
                    );
                }
            }

            if !p.has_all(meta.required_permissions) {
                return Decision::Redirect(routes::UNAUTHORIZED.to_string());
            }

            if meta.requires_verified && !p.user.is_verified {
                return Decision::Redirect(routes::VERIFY_EMAIL_PROMPT.to_string());
            }

            if meta.requires_active && !p.user.is_active {
                return Decision::Redirect(routes::SUSPENDED.to_string());
            }
        }

        self.maybe_refresh();
        Decision::Proceed
    }

    /// Opportunistic silent refresh when the token nears expiry. Runs in the
    /// background and never blocks the navigation; a failure leaves the
    /// session untouched.
    fn maybe_refresh(&self) {
        if self.session.is_authenticated()
            && self.session.token_expires_within(self.refresh_threshold)
        {
            let session = self.session.clone();
            tokio::spawn(async move {
                session.try_refresh().await;
            });
        }
    }
}

fn query_flag(query: &[(String, String)], key: &str) -> bool {
    query.iter().any(|(k, v)| k == key && v == "true")
}

fn login_redirect(return_to: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("return_to", return_to)
        .finish();
    format!("{}?{}", routes::LOGIN, query)
}

fn without_special_params(path: &str, query: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (k, v) in query {
        if k != "logout" && k != "session_expired" {
            serializer.append_pair(k, v);
            any = true;
        }
    }
    if any {
        format!("{}?{}", path, serializer.finish())
    } else {
        path.to_string()
    }
}
