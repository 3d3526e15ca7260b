use serde::{Deserialize, Serialize};

use crate::auth::repo_types::{PublicUser, Role};

/// Request body for user registration. Fields default so an incomplete body
/// still reaches the handler and earns a 400 instead of a deserialization
/// rejection.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Response returned after register, login or refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn auth_response_serialization() {
        let response = AuthResponse {
            token: "abc.def.ghi".into(),
            user: PublicUser {
                id: Uuid::new_v4(),
                email: "test@example.com".into(),
                first_name: "Test".into(),
                last_name: "User".into(),
                avatar_url: None,
                role: Role::Student,
                is_active: true,
                is_verified: false,
            },
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("\"token\""));
        assert!(!json.contains("password"));
    }

    #[test]
    fn register_request_tolerates_missing_fields() {
        // Same contract as login: presence is the handler's 400, not the
        // extractor's 422.
        let req: RegisterRequest = serde_json::from_str(r#"{"email":"a@b.co"}"#).unwrap();
        assert_eq!(req.email, "a@b.co");
        assert!(req.first_name.is_empty());
        assert!(req.last_name.is_empty());
        assert!(req.password.is_empty());
        assert!(req.role.is_none());
    }

    #[test]
    fn login_request_tolerates_missing_fields() {
        // Presence is checked by the handler so the response can be a clean
        // 400 rather than a deserialization error.
        let req: LoginRequest = serde_json::from_str("{}").unwrap();
        assert!(req.email.is_empty());
        assert!(req.password.is_empty());
    }
}
