//! Process-level wiring: owns the storage session and the ingest listener.
//!
//! Both resources are acquired in [`PurgeService::connect`] and released when
//! [`PurgeService::run`] returns or [`PurgeService::shutdown`] is called.
//! Either path consumes the service, so release happens once.

use std::{future::Future, net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    application::{
        dispatcher::{BasicCredentials, PurgeDispatcher},
        error::AppError,
        handler::EventHandler,
        resolver::{IdentifierResolver, MetadataIndex},
    },
    config::{Settings, StorageSettings},
    infra::{
        client::build_http_client,
        error::InfraError,
        http::{IngestState, build_router},
        irods::IrodsSession,
    },
};

pub struct PurgeService {
    session: Arc<IrodsSession>,
    listener: TcpListener,
    handler: Arc<EventHandler>,
}

impl PurgeService {
    pub async fn connect(settings: &Settings) -> Result<Self, AppError> {
        info!("Connecting to iRODS");
        let session = Arc::new(connect_storage(&settings.storage).await?);

        let dispatcher = match build_dispatcher(settings) {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                session.release();
                return Err(err);
            }
        };
        if dispatcher.targets().is_empty() {
            warn!("No cache targets configured; events will be resolved but purge nothing");
        }

        let index: Arc<dyn MetadataIndex> = session.clone();
        let resolver = IdentifierResolver::new(index, settings.storage.uuid_attribute.clone());
        let handler = Arc::new(EventHandler::new(resolver, dispatcher));

        let listener = match TcpListener::bind(settings.ingest.addr).await {
            Ok(listener) => listener,
            Err(err) => {
                session.release();
                return Err(InfraError::from(err).into());
            }
        };

        Ok(Self {
            session,
            listener,
            handler,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        self.listener
            .local_addr()
            .map_err(|err| AppError::from(InfraError::from(err)))
    }

    pub fn handler(&self) -> Arc<EventHandler> {
        self.handler.clone()
    }

    /// Serve change events until `shutdown` resolves, then release resources.
    pub async fn run<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            session,
            listener,
            handler,
        } = self;

        info!(
            addr = ?listener.local_addr().ok(),
            targets = handler.dispatcher().targets().len(),
            "Starting the purge service"
        );

        let router = build_router(IngestState { handler });
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| AppError::unexpected(format!("ingest server error: {err}")));

        release(&session);
        result
    }

    /// Release resources without serving.
    pub fn shutdown(self) {
        release(&self.session);
    }
}

fn release(session: &IrodsSession) {
    info!("Destroying the purge service");
    session.release();
}

pub async fn connect_storage(storage: &StorageSettings) -> Result<IrodsSession, AppError> {
    let api_url = storage
        .api_url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("storage api_url is not configured"))?;

    let client = build_http_client(None)?;
    IrodsSession::connect(client, api_url, credentials(storage))
        .await
        .map_err(|err| AppError::from(InfraError::storage(format!("failed to connect: {err}"))))
}

pub fn build_dispatcher(settings: &Settings) -> Result<PurgeDispatcher, AppError> {
    let client = build_http_client(settings.purge.request_timeout)?;
    Ok(PurgeDispatcher::new(
        client,
        settings.cache.targets.clone(),
        credentials(&settings.storage),
    ))
}

fn credentials(storage: &StorageSettings) -> BasicCredentials {
    BasicCredentials::new(storage.username.clone(), storage.password.clone())
}
