use crate::auth::repo_types::Role;

pub const LOGIN: &str = "/login";
pub const UNAUTHORIZED: &str = "/unauthorized";
pub const VERIFY_EMAIL_PROMPT: &str = "/verify-email";
pub const SUSPENDED: &str = "/account-suspended";
pub const DASHBOARD: &str = "/dashboard";
pub const STUDENT_HOME: &str = "/student";
pub const TEACHER_HOME: &str = "/teacher";
pub const ADMIN_HOME: &str = "/admin";

/// Role-appropriate landing route; no known role falls back to the generic
/// dashboard.
pub fn home_route(role: Option<Role>) -> &'static str {
    match role {
        Some(Role::Student) => STUDENT_HOME,
        Some(Role::Teacher) => TEACHER_HOME,
        Some(Role::Admin) => ADMIN_HOME,
        None => DASHBOARD,
    }
}

/// Fine-grained permission set each role implies. Routes may require any
/// subset of these on top of a role check. The sets nest upward
/// (student ⊂ teacher ⊂ admin), so a higher role is never bounced from a
/// route a lower one can reach.
pub fn permissions_for(role: Role) -> &'static [&'static str] {
    match role {
        Role::Student => &["courses:view", "lessons:view", "payments:own"],
        Role::Teacher => &[
            "courses:view",
            "lessons:view",
            "payments:own",
            "courses:manage",
            "videos:manage",
        ],
        Role::Admin => &[
            "courses:view",
            "lessons:view",
            "payments:own",
            "courses:manage",
            "videos:manage",
            "users:manage",
            "platform:admin",
        ],
    }
}

/// Per-route requirements declared by the route table and enforced by the
/// navigation guard before the route renders. Any requirement beyond
/// `guest_only` implies an authenticated principal.
#[derive(Debug, Clone, Default)]
pub struct RouteMeta {
    pub requires_auth: bool,
    pub guest_only: bool,
    pub required_role: Option<Role>,
    pub required_permissions: &'static [&'static str],
    pub requires_verified: bool,
    pub requires_active: bool,
}

impl RouteMeta {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn guest_only() -> Self {
        Self {
            guest_only: true,
            ..Self::default()
        }
    }

    pub fn authenticated() -> Self {
        Self {
            requires_auth: true,
            ..Self::default()
        }
    }

    pub fn role(mut self, role: Role) -> Self {
        self.requires_auth = true;
        self.required_role = Some(role);
        self
    }

    pub fn permissions(mut self, permissions: &'static [&'static str]) -> Self {
        self.requires_auth = true;
        self.required_permissions = permissions;
        self
    }

    pub fn verified(mut self) -> Self {
        self.requires_auth = true;
        self.requires_verified = true;
        self
    }

    pub fn active(mut self) -> Self {
        self.requires_auth = true;
        self.requires_active = true;
        self
    }

    pub(crate) fn needs_principal(&self) -> bool {
        self.requires_auth
            || self.required_role.is_some()
            || !self.required_permissions.is_empty()
            || self.requires_verified
            || self.requires_active
    }
}
