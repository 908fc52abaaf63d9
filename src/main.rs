use std::{process, sync::Arc};

use thumbd::{
    cache::{CacheConfig, CacheStore, KeyDeriver},
    config::{self, Command, Settings},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        InfraError::configuration(format!("failed to load configuration: {err}"))
    })?;

    telemetry::init(&settings.logging)?;

    let store = CacheStore::open(CacheConfig::from(&settings.cache))?;

    match cli_args.command {
        Some(Command::Clean(_)) => run_clean(&store),
        Some(Command::Serve(_)) | None => run_serve(&settings, store).await,
    }
}

fn run_clean(store: &CacheStore) -> Result<(), InfraError> {
    let removed = store.purge_expired()?;
    info!(
        target = "thumbd::clean",
        removed,
        directory = %store.config().directory.display(),
        "Purged expired cache entries"
    );
    Ok(())
}

async fn run_serve(settings: &Settings, store: CacheStore) -> Result<(), InfraError> {
    let state = HttpState::new(settings, Arc::new(store), KeyDeriver::from_current_exe())
        .map_err(|err| InfraError::configuration(err.to_string()))?;
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr).await?;
    info!(
        target = "thumbd::serve",
        addr = %settings.server.addr,
        document_root = %settings.source.document_root.display(),
        cache = %settings.cache.directory.display(),
        "Listening for thumbnail requests"
    );

    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}
