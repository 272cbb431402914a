use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod migrate;
mod rpc;
mod supervisor;
mod syncer;
mod threshold_monitor;
mod validator;

use config::DaemonConfig;
use rpc::{ControlService, ProtocolService, PublicService};
use supervisor::Supervisor;

/// The drand multi-beacon daemon.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory holding every beacon id's key/group/db state.
    #[arg(long)]
    folder: Option<PathBuf>,
    /// Address the Control service listens on (loopback only).
    #[arg(long)]
    control: Option<String>,
    /// Address the Protocol (peer-to-peer) service listens on.
    #[arg(long)]
    private_listen: Option<String>,
    /// Address the Public service listens on.
    #[arg(long)]
    public_listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut cfg = DaemonConfig::load()?;
    if let Some(folder) = cli.folder {
        cfg.data_root = folder.to_string_lossy().into_owned();
    }
    if let Some(control) = cli.control {
        cfg.control_listen = control;
    }
    if let Some(private) = cli.private_listen {
        cfg.private_listen = private;
    }
    if let Some(public) = cli.public_listen {
        cfg.public_listen = public;
    }
    cfg.store()?;

    let config_root = PathBuf::from(&cfg.data_root);
    let migrated = migrate::check_and_migrate(&config_root)?;
    if migrated {
        tracing::info!("migrated legacy single-beacon data layout into multibeacon/default");
    }

    let identity = load_or_init_identity(&config_root)?;
    let supervisor = Supervisor::new(identity.clone(), config_root.clone());

    if let Ok(paths) = std::fs::read_dir(config_root.join("multibeacon")) {
        for entry in paths.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let beacon_id = entry.file_name().to_string_lossy().into_owned();
            if let Err(err) = load_beacon(&supervisor, &config_root, &beacon_id).await {
                tracing::warn!(beacon_id, %err, "failed to load beacon at startup");
            }
        }
    }

    tokio::spawn(Arc::clone(&supervisor).run_dkg_listener());

    let pool = Arc::new(drand_net::PeerPool::new());

    let control_addr = cfg.control_listen.parse()?;
    let control_supervisor = Arc::clone(&supervisor);
    let control_root = config_root.clone();
    let control_pool = Arc::clone(&pool);
    let control_server = tokio::spawn(async move {
        Server::builder()
            .add_service(drand_proto::control_server::ControlServer::new(ControlService::new(
                control_supervisor,
                control_root,
                control_pool,
            )))
            .serve(control_addr)
            .await
    });

    let private_addr = cfg.private_listen.parse()?;
    let protocol_supervisor = Arc::clone(&supervisor);
    let local_address = cfg.private_listen.clone();
    let local_key = identity.clone();
    let private_server = tokio::spawn(async move {
        Server::builder()
            .add_service(drand_proto::protocol_server::ProtocolServer::new(ProtocolService::new(
                protocol_supervisor,
                local_address,
                local_key,
            )))
            .serve(private_addr)
            .await
    });

    let public_addr = cfg.public_listen.parse()?;
    let public_supervisor = Arc::clone(&supervisor);
    let public_server = tokio::spawn(async move {
        Server::builder()
            .add_service(drand_proto::public_server::PublicServer::new(PublicService::new(
                public_supervisor,
            )))
            .serve(public_addr)
            .await
    });

    tokio::select! {
        result = control_server => { result??; }
        result = private_server => { result??; }
        result = public_server => { result??; }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            supervisor.shutdown(None).await;
        }
    }

    Ok(())
}

async fn load_beacon(
    supervisor: &Arc<Supervisor>,
    config_root: &std::path::Path,
    beacon_id: &str,
) -> anyhow::Result<()> {
    let paths = config::BeaconPaths::new(config_root, beacon_id);
    let group = paths.load_group()?;
    let share = paths.load_share()?;
    let store: Arc<dyn drand_store::ChainStore> =
        Arc::new(drand_store::SledStore::open(paths.db_dir())?);
    supervisor
        .load_beacon(beacon_id.to_string(), group, share, store)
        .await?;
    Ok(())
}

/// Loads this node's identity key pair, generating one on first run.
fn load_or_init_identity(config_root: &std::path::Path) -> anyhow::Result<Vec<u8>> {
    let path = config_root.join("identity.key");
    if let Ok(bytes) = std::fs::read(&path) {
        return Ok(bytes);
    }
    std::fs::create_dir_all(config_root)?;
    let mut key = vec![0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), key.as_mut_slice());
    std::fs::write(&path, &key)?;
    Ok(key)
}
