//! geoportal-webhook-server: receives portal webhooks and reconciles item
//! sharing from tags.
//!
//! Configuration is read from the environment (see `config`).

use std::sync::Arc;

use anyhow::Context;
use geoportal_webhook_core::dispatch::EventDispatcher;
use geoportal_webhook_core::notify::NotificationEmitter;
use geoportal_webhook_core::policy::PolicySource;
use geoportal_webhook_server::arcgis::ArcGisPortal;
use geoportal_webhook_server::config::{PolicySourceConfig, Settings, API_TITLE, API_VERSION};
use geoportal_webhook_server::policy_source::{FeatureTablePolicySource, YamlPolicySource};
use geoportal_webhook_server::router::{build_router, AppState};
use geoportal_webhook_server::teams::TeamsNotifier;
use geoportal_webhook_server::worker::{spawn_worker, WorkQueue};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,geoportal_webhook_server=debug,geoportal_webhook_core=debug".into()
            }),
        )
        .init();

    let settings = Settings::from_env()?;
    tracing::info!("{} {} starting", API_TITLE, API_VERSION);
    tracing::debug!(?settings, "loaded settings");

    let portal = Arc::new(ArcGisPortal::connect(&settings).await?);

    let policies: Arc<dyn PolicySource> = match &settings.policy {
        PolicySourceConfig::FeatureService { item_id, layer } => {
            tracing::info!(item_id = %item_id, layer, "tag policies from feature service");
            Arc::new(FeatureTablePolicySource::new(
                Arc::clone(&portal),
                item_id.clone(),
                *layer,
            ))
        }
        PolicySourceConfig::YamlFile(path) => {
            tracing::info!(path = %path.display(), "tag policies from YAML file");
            Arc::new(YamlPolicySource::new(path.clone()))
        }
    };

    let notifier = Arc::new(TeamsNotifier::new(settings.teams_notification_url.clone())?);
    let dispatcher = Arc::new(EventDispatcher::new(
        portal.clone(),
        policies,
        NotificationEmitter::new(notifier),
    ));

    let (queue, rx) = WorkQueue::new(settings.queue_capacity);
    let worker = spawn_worker(rx, dispatcher);

    let app = build_router(AppState::new(queue, portal));
    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", settings.bind_addr))?;
    tracing::info!("listening on {}", settings.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router held the last queue sender; the worker drains what is left and exits.
    worker.await.context("webhook worker panicked")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
