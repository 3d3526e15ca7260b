use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse,
            RegisterRequest, ResendVerificationRequest, UpdateProfileRequest,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo_types::{NewUser, PublicUser, Role, User},
    },
    error::ApiError,
    state::AppState,
};

const VERIFICATION_TTL_HOURS: i64 = 24;
const MIN_PASSWORD_LEN: usize = 8;
const VERIFICATION_TOKEN_LEN: usize = 48;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify-email/:token", get(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/me", get(get_me))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/profile", axum::routing::patch(update_profile))
        .route("/auth/password", put(change_password))
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn new_verification_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFICATION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|d| d.code())
        .map(|c| c == "23505")
        .unwrap_or(false)
}

/// Dispatch the verification mail without tying its outcome to the request:
/// account creation stands even if the transport is down, and the resend
/// endpoint exists to recover a lost mail.
fn dispatch_verification(state: &AppState, email: String, name: String, token: &str) {
    let link = format!("{}/verify-email/{}", state.config.frontend_url, token);
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send_verification(&email, &name, &link).await {
            warn!(error = %e, to = %email, "verification mail dispatch failed");
        }
    });
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    if payload.first_name.trim().is_empty()
        || payload.last_name.trim().is_empty()
        || payload.email.trim().is_empty()
        || payload.password.is_empty()
    {
        warn!("registration with missing fields");
        return Err(ApiError::Validation("Missing required fields".into()));
    }

    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::Validation("Password too short".into()));
    }

    let role = payload.role.unwrap_or(Role::Student);
    if role == Role::Admin {
        warn!(email = %payload.email, "attempt to self-register as admin");
        return Err(ApiError::Validation(
            "Admin accounts cannot be self-registered".into(),
        ));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(&payload.password)?;
    let verification_token = new_verification_token();
    let new = NewUser {
        email: payload.email.clone(),
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        password_hash: hash,
        role,
        verification_token: verification_token.clone(),
        verification_expires_at: OffsetDateTime::now_utc()
            + TimeDuration::hours(VERIFICATION_TTL_HOURS),
    };

    let user = match User::create(&state.db, new).await {
        Ok(u) => u,
        // Unique index is the authority; the pre-check above only covers the
        // common case, not two concurrent registrations.
        Err(e) if is_unique_violation(&e) => return Err(ApiError::DuplicateEmail),
        Err(e) => return Err(e.into()),
    };

    dispatch_verification(
        &state,
        user.email.clone(),
        format!("{} {}", user.first_name, user.last_name),
        &verification_token,
    );

    // Registration logs the user in right away; the unverified flag only
    // blocks the next fresh login, not this session.
    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, &user.email, user.role)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::MissingCredentials);
    }
    payload.email = normalize_email(&payload.email);

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::InvalidCredentials);
        }
    };

    if !user.is_active {
        warn!(user_id = %user.id, "login on disabled account");
        return Err(ApiError::AccountDisabled);
    }
    if !user.is_verified {
        warn!(user_id = %user.id, "login on unverified account");
        return Err(ApiError::EmailNotVerified);
    }

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    User::touch_last_login(&state.db, user.id).await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, &user.email, user.role)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(user),
    }))
}

#[instrument(skip(state))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = User::consume_verification_token(&state.db, &token)
        .await?
        .ok_or(ApiError::InvalidVerificationToken)?;

    info!(user_id = %user.id, email = %user.email, "email verified");
    Ok(Json(MessageResponse {
        message: "Email verified successfully",
    }))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = normalize_email(&payload.email);

    // Same response whether or not the account exists.
    if let Some(user) = User::find_by_email(&state.db, &email).await? {
        if !user.is_verified {
            let token = new_verification_token();
            let expires = OffsetDateTime::now_utc() + TimeDuration::hours(VERIFICATION_TTL_HOURS);
            User::rotate_verification_token(&state.db, user.id, &token, expires).await?;
            dispatch_verification(
                &state,
                user.email.clone(),
                format!("{} {}", user.first_name, user.last_name),
                &token,
            );
        }
    }

    Ok(Json(MessageResponse {
        message: "If the account exists, a verification email has been sent",
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, auth.id)
        .await?
        .ok_or(ApiError::InvalidToken)?;
    Ok(Json(PublicUser::from(user)))
}

/// Re-issue a fresh token against a still-valid bearer. The user is re-read
/// so role changes propagate and a disabled account cannot extend its session.
#[instrument(skip(state))]
pub async fn refresh(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = User::find_by_id(&state.db, auth.id)
        .await?
        .ok_or(ApiError::InvalidToken)?;

    if !user.is_active {
        return Err(ApiError::AccountDisabled);
    }
    if !user.is_verified {
        return Err(ApiError::EmailNotVerified);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, &user.email, user.role)?;

    info!(user_id = %user.id, "session token refreshed");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(user),
    }))
}

/// Stateless acknowledgment: there is no revocation store, the client discards
/// its token and the server only logs the event.
#[instrument]
pub async fn logout(auth: AuthUser) -> Result<Json<MessageResponse>, ApiError> {
    info!(user_id = %auth.id, "user logged out");
    Ok(Json(MessageResponse {
        message: "Logged out",
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    if let Some(name) = payload.first_name.as_deref() {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("First name cannot be empty".into()));
        }
    }
    if let Some(name) = payload.last_name.as_deref() {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("Last name cannot be empty".into()));
        }
    }

    let user = User::update_profile(
        &state.db,
        auth.id,
        payload.first_name.as_deref().map(str::trim),
        payload.last_name.as_deref().map(str::trim),
        payload.avatar_url.as_deref(),
    )
    .await?
    .ok_or(ApiError::InvalidToken)?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation("Password too short".into()));
    }

    let user = User::find_by_id(&state.db, auth.id)
        .await?
        .ok_or(ApiError::InvalidToken)?;

    if !verify_password(&payload.current_password, &user.password_hash)? {
        warn!(user_id = %user.id, "password change with wrong current password");
        return Err(ApiError::InvalidCredentials);
    }

    let hash = hash_password(&payload.new_password)?;
    User::set_password_hash(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password changed");
    Ok(Json(MessageResponse {
        message: "Password updated",
    }))
}
