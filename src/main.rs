mod auction;
mod clock;
mod config;
mod error;
mod event;
mod event_log;
mod listing;
mod notification;
mod persistence;
mod progress;
mod review;
mod service;
mod store;
mod trade;
mod types;
mod user;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env_or_default()?;

    match &config.database_url {
        Some(url) => {
            let persistence = persistence::PostgresPersistence::connect(url, config.db_pool_size)?;
            persistence.migrate()?;
            let (event_writer, event_reader) =
                event_log::new_postgres_shared(config.event_poll_interval);
            run(
                &config,
                persistence,
                store::Stores::postgres(),
                event_writer,
                event_reader,
            )
        }
        None => {
            let (event_writer, event_reader) = event_log::new_in_memory_shared();
            run(
                &config,
                persistence::InMemoryPersistence::new(),
                store::Stores::in_memory(),
                event_writer,
                event_reader,
            )
        }
    }
}

fn run<P: persistence::Persistence>(
    config: &config::Config,
    persistence: P,
    stores: store::Stores<P>,
    event_writer: event_log::SharedWriter<P>,
    event_reader: event_log::SharedReader<P>,
) -> Result<()> {
    let clock = clock::SystemClock::new_shared();

    let engine = service::AuctionEngine::new(
        persistence.clone(),
        stores.clone(),
        event_writer.clone(),
        clock.clone(),
        config.engine,
    );
    let market = service::Marketplace::new(
        persistence.clone(),
        stores.clone(),
        event_writer.clone(),
        clock.clone(),
        config.commission,
    );
    let app = service::router(service::AppState {
        engine: engine.clone(),
        market,
    });

    let svc_ctr = service::ServiceControl::new(persistence, stores.progress.clone());

    ctrlc::set_handler({
        let svc_ctr = svc_ctr.clone();
        move || {
            info!("Stopping all services...");
            svc_ctr.stop_all();
        }
    })?;

    for handle in vec![
        svc_ctr.spawn_log_follower(
            service::Settlement::new(
                stores.clone(),
                event_writer.clone(),
                config.commission,
                clock.clone(),
            ),
            event_reader.clone(),
        ),
        svc_ctr.spawn_log_follower(
            service::Notifier::new(stores.notifications.clone(), clock.clone()),
            event_reader.clone(),
        ),
        svc_ctr.spawn_loop(service::Scheduler::new(engine, config.scheduler_tick)),
        svc_ctr.spawn_loop(service::HttpServer::new(config.http_addr, app)?),
    ] {
        handle.join()?
    }

    Ok(())
}

#[cfg(test)]
mod tests;
