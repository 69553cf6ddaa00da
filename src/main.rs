//! CLI for RelayChat
//!
//! Subcommands:
//! - `server`: run the WebSocket server
//! - `provision`: register an app key for a tenant

use std::sync::Arc;

use clap::Parser;
use relaychat::auth::HttpTokenValidator;
use relaychat::broker::{Broker, FleetTransport, LocalFleet, RedisFleet};
use relaychat::config::{FleetBackend, Settings, StoreBackend, load_config};
use relaychat::hub::Hub;
use relaychat::persistence::{AppInfo, Queue, RedisStore, SledStore, Store};
use relaychat::session::SessionContext;
use relaychat::transport::start_websocket_server;
use relaychat::utils::{Result, logging};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "relaychat")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Register an app key and the tenant it belongs to
    Provision {
        /// Key clients present at login
        #[arg(long)]
        app_key: String,
        /// Tenant endpoint that validates tokens
        #[arg(long)]
        api: String,
        /// Project (tenant scope) the key logs users into
        #[arg(long)]
        project: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.log.level);

    let result = match cmd {
        Command::Server => run_server(settings).await,
        Command::Provision {
            app_key,
            api,
            project,
        } => provision(settings, &app_key, api, project).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn open_queue(settings: &Settings) -> Result<Queue> {
    let store: Arc<dyn Store> = match settings.store.backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&settings.store.redis_url).await?),
        StoreBackend::Sled => Arc::new(SledStore::open(&settings.store.sled_path)?),
    };
    let (chat_prefix, app_prefix) = settings.key_prefixes();
    Ok(Queue::new(store, chat_prefix, app_prefix))
}

async fn run_server(settings: Settings) -> Result<()> {
    let queue = open_queue(&settings).await?;
    let transport: Arc<dyn FleetTransport> = match settings.fleet.backend {
        FleetBackend::Redis => Arc::new(RedisFleet::new(&settings.fleet.redis_url)?),
        FleetBackend::Local => Arc::new(LocalFleet::default()),
    };

    let broker = Arc::new(Broker::new(
        settings.service.topic.clone(),
        queue,
        transport,
    ));
    broker.init().await?;

    let (hub, hub_handle) = Hub::new(settings.session.auth_grace());
    tokio::spawn(hub.run());
    hub_handle.spawn_sweeper(settings.session.sweep_interval());

    if let Err(e) = broker.subscribe(hub_handle.clone()).await {
        error!("Fleet subscription failed, serving local sessions only: {}", e);
    }

    let ctx = SessionContext {
        broker,
        hub: hub_handle,
        validator: Arc::new(HttpTokenValidator::new()),
        settings: settings.session.clone(),
    };

    let addr = settings.listen_addr();
    tokio::select! {
        result = start_websocket_server(&addr, ctx) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn provision(settings: Settings, app_key: &str, api: String, project: String) -> Result<()> {
    let queue = open_queue(&settings).await?;
    queue
        .provision_app(
            app_key,
            &AppInfo {
                api,
                project_id: project,
            },
        )
        .await?;
    info!(%app_key, "Provisioned app");
    Ok(())
}
