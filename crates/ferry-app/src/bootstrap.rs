use std::net::SocketAddr;
use std::sync::Arc;

use ferry_config::{ListenerConfig, LogSettings, ReplicationConfig};
use ferry_replication::{
    AccessTokenCache, CopyOrchestrator, DispatchFilter, Dispatcher, Endpoints, EventHandler,
    ManagedSecrets,
};
use ferry_storage::{
    AzureFileShareClient, AzureQueueClient, KeyVaultClient, ManagedIdentityCredential,
    build_http_client,
};
use ferry_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::routes::{AppState, router};

/// Dependencies required to boot the replicator.
pub(crate) struct BootstrapDependencies {
    logging: LogSettings,
    listener: ListenerConfig,
    metrics: Metrics,
    handler: Arc<EventHandler>,
}

impl BootstrapDependencies {
    /// Wire production clients from loaded configuration.
    pub(crate) fn from_config(config: &ReplicationConfig) -> AppResult<Self> {
        let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let timeout = config.copy.request_timeout;
        let http = build_http_client(timeout)
            .map_err(|err| AppError::storage("storage.http_client", err))?;

        let credential = Arc::new(ManagedIdentityCredential::from_env(
            http.clone(),
            config.identity_client_id.clone(),
        ));
        let vault = Arc::new(KeyVaultClient::new(
            http.clone(),
            config.vault.url.clone(),
            credential,
        ));
        let tokens = AccessTokenCache::new(
            vault,
            ManagedSecrets {
                destination: config.destination.secret_name.clone(),
                source: config.source.secret_name.clone(),
                queue: config.queue.secret_name.clone(),
            },
            config.refresh_margin,
            metrics.clone(),
        )
        .with_call_timeout(timeout);

        let files = Arc::new(AzureFileShareClient::new(http.clone()));
        let queue = Arc::new(AzureQueueClient::new(http));
        let handler = EventHandler::new(
            Arc::new(tokens),
            CopyOrchestrator::new(files, config.copy.max_attempts, timeout),
            Dispatcher::new(
                DispatchFilter::new(
                    config.dispatch.folder.clone(),
                    config.dispatch.extension.clone(),
                ),
                queue,
                config.queue.queue_name.clone(),
                timeout,
            ),
            Endpoints {
                source: config.source.url.clone(),
                destination: config.destination.url.clone(),
                queue: config.queue.url.clone(),
            },
            metrics.clone(),
        );

        Ok(Self {
            logging: config.logging.clone(),
            listener: config.listener,
            metrics,
            handler: Arc::new(handler),
        })
    }
}

/// Entry point for the replicator boot sequence.
///
/// # Errors
///
/// Returns an error if configuration is invalid, logging cannot be installed
/// or the listener fails.
pub async fn run_app() -> AppResult<()> {
    let config =
        ReplicationConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
    let dependencies = BootstrapDependencies::from_config(&config)?;
    run_app_with(dependencies).await
}

/// Boot sequence over injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let BootstrapDependencies {
        logging,
        listener,
        metrics,
        handler,
    } = dependencies;

    init_logging(&LoggingConfig {
        level: &logging.level,
        format: LogFormat::from_name(logging.format.as_deref()),
        build_sha: LoggingConfig::default().build_sha,
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!("ferry replicator starting");

    if let Err(err) = handler.tokens().fresh_tokens().await {
        warn!(error = %err, "initial token fetch failed; retrying on first notification");
    }

    let addr = SocketAddr::new(listener.bind_addr, listener.port);
    let tcp = TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::io("listener.bind", err))?;
    info!(%addr, "listening for storage notifications");

    let app = router(AppState::new(handler, metrics));
    axum::serve(tcp, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::io("server.serve", err))?;

    info!("ferry replicator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> anyhow::Result<ReplicationConfig> {
        let env: HashMap<&str, &str> = HashMap::from([
            ("externalDataUrl", "https://external.blob.core.windows.net"),
            ("externalDataSecretName", "external-sas"),
            ("internalDataUrl", "https://internal.file.core.windows.net"),
            ("internalDataSecretName", "internal-sas"),
            ("processingQueueUrl", "https://internal.queue.core.windows.net"),
            ("processingQueueSecretName", "queue-sas"),
            ("vaultName", "ferry-vault"),
        ]);
        Ok(ReplicationConfig::from_lookup(|key| {
            env.get(key).map(|value| (*value).to_string())
        })?)
    }

    #[test]
    fn dependencies_follow_configuration() -> anyhow::Result<()> {
        let config = config()?;
        let dependencies = BootstrapDependencies::from_config(&config)?;

        assert_eq!(dependencies.listener, config.listener);
        assert_eq!(dependencies.logging, config.logging);
        assert!(dependencies.metrics.render()?.contains("directories_created_total"));
        assert!(
            dependencies
                .handler
                .tokens()
                .freshness_check(&ferry_test_support::fixtures::token("?sig=a", 24))
        );
        Ok(())
    }
}
