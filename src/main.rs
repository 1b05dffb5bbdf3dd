use std::sync::Arc;

use mirror_worker::cli::Cli;
use mirror_worker::config::Settings;
use mirror_worker::health::{self, HealthCheck};
use mirror_worker::network::Crawler;
use mirror_worker::{broker::QueueManager, logging, pipeline, state::UrlStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    if let Some(level) = &cli.log_level {
        std::env::set_var("RUST_LOG", level);
    }
    logging::init_logging();

    let settings = Arc::new(Settings::from_env()?);

    let store = UrlStore::connect(
        &settings.redis_addr,
        &settings.redis_key_prefix,
        settings.ttl_expire,
        settings.ttl_extend,
    )
    .await?;
    tracing::info!(addr = %settings.redis_addr, "Connected to URL state store");

    let queue_manager = Arc::new(
        QueueManager::connect(
            &settings.amqp_addr,
            &settings.exchange_name,
            &settings.queue_name,
        )
        .await?,
    );
    tracing::info!(
        addr = %settings.amqp_addr,
        exchange = %settings.exchange_name,
        queue = %settings.queue_name,
        "Connected to AMQP broker"
    );

    let crawler = Crawler::from_settings(&settings)?;
    tracing::info!(
        user_agent = %settings.user_agent(),
        threads = settings.crawler_threads,
        mirror_root = %settings.mirror_root.display(),
        "Crawler ready"
    );

    let consumer_tag = format!(
        "mirror-worker-{}",
        gethostname::gethostname().to_string_lossy()
    );
    let consumer = queue_manager.consume(&consumer_tag).await?;

    let _stages = pipeline::spawn(
        Arc::clone(&settings),
        store.clone(),
        Arc::clone(&queue_manager),
        crawler,
        consumer,
    );

    let health_check = Arc::new(HealthCheck::new(store.clone(), Arc::clone(&queue_manager)));
    tracing::info!(port = settings.http_port, "Serving healthcheck");
    let server = warp::serve(health::routes(health_check)).run(([0, 0, 0, 0], settings.http_port));

    // No cooperative drain: unacked jobs are redelivered on next start.
    tokio::select! {
        _ = server => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    store.close().await;
    if let Err(e) = queue_manager.close().await {
        tracing::warn!(error = %e, "Broker close failed");
    }

    Ok(())
}
