use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jcyl_bot::alerts::{AlertService, TelegramNotifier};
use jcyl_bot::catalog::{CatalogClient, SearchAggregator, TotalCache};
use jcyl_bot::db::{self, PgStore};
use jcyl_bot::settings::Settings;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting JCYL open data alert service");

    let settings = Settings::from_env()?;

    let pool = PgPool::connect(&settings.database_url)
        .await
        .context("Failed to connect to database")?;
    db::init_database_schema(&pool).await?;
    let store = Arc::new(PgStore::new(pool));

    let client = CatalogClient::from_config(settings.api_config())
        .context("Failed to build catalog client")?;
    let search = Arc::new(SearchAggregator::new(
        Arc::new(client),
        Arc::new(TotalCache::new()),
    ));

    let bot = Bot::new(settings.telegram_bot_token.clone());
    let alerts = AlertService::new(
        search,
        store.clone(),
        store,
        Arc::new(TelegramNotifier::new(bot)),
    )
    .with_enabled(settings.alerts_enabled);

    let hours = settings.alerts_check_interval_hours.max(1);
    info!(hours, "Alert checks scheduled");
    let mut interval = tokio::time::interval(Duration::from_secs(hours * 3600));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                alerts.check_and_notify_changes().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
