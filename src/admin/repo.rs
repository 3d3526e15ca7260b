use uuid::Uuid;

/// One row per administrative command: who did what to whom. Written inside
/// the same transaction as the mutation it describes, so neither lands
/// without the other.
pub struct AuditEntry;

impl AuditEntry {
    pub async fn record<'e, E>(
        db: E,
        actor_id: Uuid,
        action: &str,
        target_id: Uuid,
        detail: serde_json::Value,
    ) -> anyhow::Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            "INSERT INTO admin_audit (actor_id, action, target_id, detail) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(actor_id)
        .bind(action)
        .bind(target_id)
        .bind(detail)
        .execute(db)
        .await?;
        Ok(())
    }
}
