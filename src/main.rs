//! Spice coupons - coupon eligibility and discount service

use std::sync::Arc;
use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use spice_coupons::{config::Config, http, publisher::EventPublisher, service::CouponService, store::{CouponStore, InMemoryCouponStore, PgCouponStore}};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let store: Arc<dyn CouponStore> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(config.max_connections).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Arc::new(PgCouponStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, coupons are kept in memory only");
            Arc::new(InMemoryCouponStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, coupon events will not be published"); None }
        },
        None => None,
    };

    let app = http::router(CouponService::new(store, EventPublisher::new(nats)));
    tracing::info!("spice-coupons listening on {}", config.bind_addr());
    axum::serve(tokio::net::TcpListener::bind(config.bind_addr()).await?, app).await?;
    Ok(())
}
