use anyhow::Context;
use tracing::info;

use crate::analytics::schema::migrations;
use crate::analytics::ClickHouseStore;
use crate::config::AppConfig;

pub async fn run(config: &AppConfig, print: bool) -> anyhow::Result<()> {
    if print {
        for (_, ddl) in migrations() {
            println!("{};", ddl.trim());
        }
        return Ok(());
    }

    let store = ClickHouseStore::new(&config.analytics).context("invalid analytics configuration")?;
    store
        .create_database()
        .await
        .with_context(|| format!("failed to create database {}", store.database()))?;

    for (table, ddl) in migrations() {
        store
            .execute(ddl)
            .await
            .with_context(|| format!("failed to create table {}", table))?;
        info!("Ensured table {}.{}", store.database(), table);
    }

    Ok(())
}
