use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Append-only document rows; nothing in the crate updates or deletes them
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vehicle_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document TEXT NOT NULL,
            inserted_at INTEGER NOT NULL,
            mapper_version TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vehicle_documents_inserted_at ON vehicle_documents(inserted_at, id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vehicle_documents_mapper_version ON vehicle_documents(mapper_version)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
