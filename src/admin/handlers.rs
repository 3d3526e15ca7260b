use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    admin::{
        dto::{ListQuery, SetActiveRequest, SetRoleRequest},
        repo::AuditEntry,
    },
    auth::{
        extractors::AdminUser,
        repo_types::{PublicUser, User},
    },
    error::ApiError,
    state::AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Administrative command surface. Replaces one-off account-patching scripts:
/// every command is role-gated, idempotent and audited.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id/role", patch(set_role))
        .route("/admin/users/:id/active", patch(set_active))
        .route("/admin/users/:id/verify", post(force_verify))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);
    let users = User::list(&state.db, limit, offset).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn set_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let mut tx = state.db.begin().await.context("begin transaction")?;

    let user = User::set_role(&mut *tx, id, payload.role)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    AuditEntry::record(
        &mut *tx,
        admin.id,
        "set_role",
        user.id,
        json!({ "role": payload.role }),
    )
    .await?;

    tx.commit().await.context("commit transaction")?;

    info!(actor = %admin.id, target = %user.id, role = %payload.role, "admin set role");
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state, payload))]
pub async fn set_active(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let mut tx = state.db.begin().await.context("begin transaction")?;

    let user = User::set_active(&mut *tx, id, payload.active)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    AuditEntry::record(
        &mut *tx,
        admin.id,
        "set_active",
        user.id,
        json!({ "active": payload.active }),
    )
    .await?;

    tx.commit().await.context("commit transaction")?;

    info!(actor = %admin.id, target = %user.id, active = payload.active, "admin set active flag");
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state))]
pub async fn force_verify(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, ApiError> {
    let mut tx = state.db.begin().await.context("begin transaction")?;

    let user = User::mark_verified(&mut *tx, id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    AuditEntry::record(&mut *tx, admin.id, "force_verify", user.id, json!({})).await?;

    tx.commit().await.context("commit transaction")?;

    info!(actor = %admin.id, target = %user.id, "admin forced email verification");
    Ok(Json(PublicUser::from(user)))
}
