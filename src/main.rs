use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use distributed_atomspace::atom::{AtomSpace, MemoryStore};
use distributed_atomspace::cluster::DistributedCluster;
use distributed_atomspace::config::ClusterConfig;
use distributed_atomspace::storage::DistributedStorageNode;
use distributed_atomspace::storage::handlers::{handle_get_atom, handle_stats, handle_store_atom};
use distributed_atomspace::storage::protocol::{ENDPOINT_ATOM, ENDPOINT_ATOMS, ENDPOINT_STATS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const HTTP_PORT_OFFSET: u16 = 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        eprintln!(
            "Usage: {} [--config <file.toml>] [--bind <host:port>] [--seed <host:port>]...",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:17001", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:17002 --seed 127.0.0.1:17001",
            args[0]
        );
        return Ok(());
    }

    let mut config_path: Option<String> = None;
    let mut bind_addr: Option<SocketAddr> = None;
    let mut seed_nodes: Vec<String> = vec![];

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--config", Some(path)) => {
                config_path = Some(path.clone());
                i += 2;
            }
            ("--bind", Some(addr)) => {
                bind_addr = Some(addr.parse()?);
                i += 2;
            }
            ("--seed", Some(addr)) => {
                seed_nodes.push(addr.clone());
                i += 2;
            }
            (flag, None) if flag.starts_with("--") => {
                anyhow::bail!("{} requires a value", flag);
            }
            _ => {
                i += 1;
            }
        }
    }

    // 1. Configuration:
    let mut config = match &config_path {
        Some(path) => ClusterConfig::from_toml_file(path)?,
        None => ClusterConfig::default(),
    };
    if let Some(addr) = bind_addr {
        config.host = addr.ip().to_string();
        config.port = addr.port();
    }
    config.seed_nodes.extend(seed_nodes);
    config.validate()?;

    // 2. Cluster node:
    let space = AtomSpace::new();
    let cluster = DistributedCluster::new(config.clone(), space);
    let cluster_addr = cluster.start().await?;
    tracing::info!("Node ID: {}", cluster.local_id());

    // 3. Storage layer:
    let storage = DistributedStorageNode::new(cluster.clone(), Arc::new(MemoryStore::new()));

    if config.seed_nodes.is_empty() {
        tracing::info!("Starting as seed node (founder)");
    } else {
        tracing::info!("Seed nodes: {:?}", config.seed_nodes);
        if !cluster.join_seeds().await {
            tracing::warn!("No seed accepted the join; running alone until peers arrive");
        }
    }

    // 4. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_STATS, get(handle_stats))
        .route(ENDPOINT_ATOMS, post(handle_store_atom))
        .route(ENDPOINT_ATOM, get(handle_get_atom))
        .layer(Extension(storage.clone()));

    // 5. Spawn stats reporter:
    let stats_cluster = cluster.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let members = stats_cluster.membership().members();
            let heartbeat = stats_cluster.heartbeat_stats();
            tracing::info!(
                "Cluster stats: {} member(s), {} atom(s), heartbeat every {} ms",
                members.len(),
                stats_cluster.atomspace().len(),
                heartbeat.current_interval_ms
            );
            for node in members {
                tracing::info!(
                    "  - {} {} {:?} (atoms={}, load={:.2})",
                    node.id,
                    node.addr(),
                    node.status,
                    node.atomspace_size,
                    node.load_factor
                );
            }
        }
    });

    // 6. Start HTTP server:
    let http_addr = SocketAddr::new(
        cluster_addr.ip(),
        cluster_addr.port().wrapping_add(HTTP_PORT_OFFSET),
    );
    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    let shutdown_cluster = cluster.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            shutdown_cluster.stop().await;
        })
        .await?;

    tracing::info!("Node {} stopped ({} atoms stored locally)", cluster.local_id(), storage.stats().local_atoms);
    Ok(())
}
