//! Prints every registered client application.

use std::io::Write;

use anyhow::Context;
use userbase::apps::Application;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
    let db = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;

    let apps = Application::list(&db).await;
    db.close().await;

    let apps = apps.map_err(|e| {
        tracing::error!(error = ?e, "failed to list applications");
        e
    })?;
    let mut out = std::io::stdout().lock();
    for app in apps {
        writeln!(out, "{}", app.listing_line())?;
    }
    Ok(())
}
