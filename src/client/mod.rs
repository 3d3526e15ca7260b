//! Embeddable client core for the Educours SPA: the session store, the
//! outbound API seam and the navigation guard. Constructed explicitly at
//! application startup and injected into the router, never a module-level
//! singleton.

pub mod api;
pub mod guard;
pub mod routes;
pub mod session;

pub use api::{ApiClientError, AuthApi, HttpAuthApi};
pub use guard::{Decision, NavigationGuard};
pub use routes::RouteMeta;
pub use session::{MemoryTokenStore, Principal, SessionContext, TokenStore};
