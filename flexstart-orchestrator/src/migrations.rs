use sqlx::{Pool, Postgres};

pub async fn run_inline_migrations(pool: &Pool<Postgres>) {
    println!("📦 Running Migrations (Inline Schema)...");

    // Minimal schema: idempotency table + action log
    let schema_sql = r#"
        CREATE TABLE IF NOT EXISTS start_instance_failures (
            dedup_key TEXT PRIMARY KEY,
            event_time TIMESTAMPTZ NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_start_failures_expires
            ON start_instance_failures (expires_at);
        CREATE TABLE IF NOT EXISTS recovery_logs (
            id UUID PRIMARY KEY,
            action_type VARCHAR(100) NOT NULL,
            component VARCHAR(50) NOT NULL DEFAULT 'orchestrator',
            status VARCHAR(50) NOT NULL,
            error_message TEXT,
            instance_id TEXT,
            metadata JSONB,
            created_at TIMESTAMPTZ DEFAULT NOW(),
            completed_at TIMESTAMPTZ,
            duration_ms INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_recovery_logs_instance
            ON recovery_logs (instance_id, created_at)
    "#;

    for statement in schema_sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            let _ = sqlx::query(stmt).execute(pool).await;
        }
    }

    println!("✅ Migrations (Inline) Applied");
}
