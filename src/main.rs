use std::{process, sync::Arc};

use purgeman::{
    application::{
        error::AppError,
        resolver::{IdentifierResolver, MetadataIndex, Resolution},
    },
    config,
    infra::telemetry,
    service::{self, PurgeService},
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

fn report_application_error(error: &AppError) {
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

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Purge(args) => run_purge(settings, args).await,
        config::Command::Resolve(args) => run_resolve(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let service = PurgeService::connect(&settings).await?;
    service.run(shutdown_signal()).await
}

async fn run_purge(settings: config::Settings, args: config::PurgeArgs) -> Result<(), AppError> {
    if settings.cache.targets.is_empty() {
        return Err(AppError::validation(
            "purge requires at least one cache target",
        ));
    }

    let dispatcher = service::build_dispatcher(&settings)?;
    let report = dispatcher.purge(&args.path).await;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(status) => println!("ok\t{}\t{status}", outcome.target_url),
            Err(err) => println!("failed\t{}\t{err}", outcome.target_url),
        }
    }

    if !report.is_complete_success() {
        return Err(AppError::PurgeIncomplete {
            path: report.path.clone(),
            failed: report.failed(),
            total: report.outcomes.len(),
        });
    }
    Ok(())
}

async fn run_resolve(
    settings: config::Settings,
    args: config::ResolveArgs,
) -> Result<(), AppError> {
    let session = Arc::new(service::connect_storage(&settings.storage).await?);
    let index: Arc<dyn MetadataIndex> = session.clone();
    let resolver = IdentifierResolver::new(index, settings.storage.uuid_attribute.clone());

    let resolution = resolver.resolve(&args.identifier).await;
    session.release();

    match resolution {
        Resolution::Resolved(path) => {
            println!("{path}");
            Ok(())
        }
        Resolution::NotFound => Err(AppError::unresolved(args.identifier, "no matching entry")),
        Resolution::Ambiguous { matches } => Err(AppError::unresolved(
            args.identifier,
            format!("{matches} entries match"),
        )),
        Resolution::Failed(err) => Err(AppError::unresolved(args.identifier, err.to_string())),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
