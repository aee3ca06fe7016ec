//! Storefront Checkout - cart, pricing and checkout service

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_checkout::api::{self, AppState};
use storefront_checkout::domain::ports::{CartStore, EventPublisher, OrderGateway};
use storefront_checkout::infrastructure::{InMemoryCartStore, InMemoryOrderGateway, NatsEventPublisher, NoopEventPublisher, PgCartStore, PgOrderGateway};
use storefront_checkout::{CheckoutService, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let settings = Arc::new(config.load_settings()?);
    tracing::info!(site = %settings.site_name, delivery_options = settings.available_delivery_dates.len(), "site settings loaded");

    let (store, orders): (Arc<dyn CartStore>, Arc<dyn OrderGateway>) = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            (Arc::new(PgCartStore::new(db.clone())), Arc::new(PgOrderGateway::new(db)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, sessions and orders are kept in memory");
            (Arc::new(InMemoryCartStore::new()), Arc::new(InMemoryOrderGateway::new()))
        }
    };

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsEventPublisher::new(client, config.nats_subject_prefix.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, checkout events will not be published");
                Arc::new(NoopEventPublisher)
            }
        },
        None => Arc::new(NoopEventPublisher),
    };

    let app = api::router(AppState { checkout: CheckoutService::new(settings, store, orders, events).with_submit_timeout(config.submit_timeout) });

    tracing::info!("Storefront checkout listening on {}", config.socket_addr());
    axum::serve(tokio::net::TcpListener::bind(config.socket_addr()).await?, app).await?;
    Ok(())
}
