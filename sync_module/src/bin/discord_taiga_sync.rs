use std::sync::Arc;

use serenity::http::Http;
use tokio::sync::watch;
use tracing::{error, info};

use sync_module::gateway::build_client;
use sync_module::{
    ChatApi, CorrelationStore, EventRouter, ProjectDirectory, SerenityChat, StatusPoller,
    SyncConfig,
};
use tracker_module::{TaigaClient, TrackerApi};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = SyncConfig::from_env()?;
    info!(
        "syncing {} project(s), store at {}",
        config.projects.len(),
        config.database_path.display()
    );

    let store = Arc::new(CorrelationStore::open(&config.database_path)?);
    let tracker: Arc<dyn TrackerApi> = Arc::new(TaigaClient::new(config.taiga.clone()));
    let directory = Arc::new(ProjectDirectory::resolve(&config.projects, tracker.as_ref()).await?);
    let chat: Arc<dyn ChatApi> = Arc::new(SerenityChat::new(Arc::new(Http::new(
        &config.discord_token,
    ))));

    let router = Arc::new(EventRouter::new(
        tracker.clone(),
        chat.clone(),
        store.clone(),
        directory.clone(),
    ));
    let poller = StatusPoller::new(tracker, chat, store, directory, config.poll_interval);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_task = tokio::spawn(async move { poller.run(shutdown_rx).await });

    let mut client = build_client(&config.discord_token, router).await?;
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shard_manager.shutdown_all().await;
        }
    });

    info!("starting Discord gateway client");
    if let Err(err) = client.start().await {
        error!("Discord client stopped with error: {}", err);
    }

    let _ = shutdown_tx.send(true);
    poller_task.await?;
    info!("shutdown complete");
    Ok(())
}
