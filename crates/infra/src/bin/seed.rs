//! `guardian-seed`: create the schema and seed the built-in catalog.

use anyhow::Context;

use guardian_infra::config::GuardianConfig;
use guardian_infra::seed::seed_catalog;
use guardian_infra::store::PostgresRbacStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GuardianConfig::from_env()?;
    guardian_observability::init(config.log_format);
    config.log_summary();

    let database_url = config
        .database_url
        .as_deref()
        .context("GUARDIAN_DATABASE_URL (or DATABASE_URL) must be set to seed Postgres")?;

    let store = PostgresRbacStore::connect(database_url, config.db_max_connections)
        .await
        .context("failed to connect to Postgres")?;
    store.ensure_schema().await.context("failed to apply schema")?;

    let report = seed_catalog(&store).await.context("failed to seed catalog")?;
    tracing::info!(
        permissions_inserted = report.permissions_inserted,
        roles_inserted = report.roles_inserted,
        "seed complete"
    );
    Ok(())
}
