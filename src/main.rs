mod admin;
mod api;
mod config;
mod error;
mod fcm;
mod identity;
mod logging;
mod metrics;
mod models;
mod notify;
mod retention;
mod store;
mod triggers;

#[cfg(test)]
mod testutil;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::mpsc};
use tracing::info;

use admin::{AdminGuard, DeletionOrchestrator, ProvisioningService};
use fcm::FcmClient;
use identity::HttpIdentityProvider;
use notify::Notifier;
use retention::RetentionSweeper;
use store::{DocumentStore, PgDocumentStore};
use triggers::TriggerHandler;

fn main() -> Result<()> {
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async {
        logging::setup_logging();
        dotenv::dotenv().ok();

        info!("Starting delivery backend");

        let config = config::Config::from_env()?;

        let db_pool = store::init_db_pool(&config.database_url).await?;
        let document_store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(db_pool));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let gateway = Arc::new(FcmClient::new(
            http.clone(),
            config.fcm_send_url.clone(),
            config.fcm_server_key.clone(),
        ));
        let identity: Arc<dyn identity::IdentityProvider> = Arc::new(HttpIdentityProvider::new(
            http,
            config.identity_api_url.clone(),
            config.identity_api_key.clone(),
        ));

        let notifier = Arc::new(Notifier::new(document_store.clone(), gateway));
        let provisioning = Arc::new(ProvisioningService::new(
            document_store.clone(),
            identity.clone(),
            AdminGuard::new(document_store.clone()),
        ));
        let deletion = Arc::new(DeletionOrchestrator::new(
            document_store.clone(),
            identity.clone(),
            AdminGuard::new(document_store.clone()),
        ));

        // Store-change events flow webhook -> channel -> trigger consumer
        let (event_sender, event_receiver) = mpsc::channel(1000);

        let trigger_handle = tokio::spawn(triggers::run_trigger_consumer(
            event_receiver,
            TriggerHandler::new(document_store.clone(), notifier.clone()),
        ));

        let retention_handle = tokio::spawn(retention::run_retention_scheduler(
            RetentionSweeper::new(document_store.clone(), config.retention_days),
        ));

        let api_state = Arc::new(api::ApiState {
            notifier,
            provisioning,
            deletion,
            identity,
            event_sender,
            webhook_secret: config.webhook_secret.clone(),
        });
        let api_router = api::create_api_router(api_state);

        let bind_address = config.api_bind_address.clone();
        let api_handle = tokio::spawn(async move {
            info!("Starting API server on {}", bind_address);
            let listener = tokio::net::TcpListener::bind(&bind_address)
                .await
                .expect("failed to bind API address");
            axum::serve(listener, api_router)
                .await
                .expect("API server failed");
        });

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal, shutting down");
            }
        }

        api_handle.abort();
        trigger_handle.abort();
        retention_handle.abort();

        info!("Shutdown complete");
        Ok(())
    })
}
