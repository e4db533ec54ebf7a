use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use ring_cluster::config::ClusterConfig;
use ring_cluster::node::runtime::NodeRuntime;
use ring_cluster::registry::handlers;
use ring_cluster::registry::service::MembershipRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        usage(&args[0]);
        std::process::exit(1);
    }

    let mut role: Option<String> = None;
    let mut address: Option<String> = None;
    let mut force_leave = false;
    let mut cfg = ClusterConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--role" => {
                role = Some(args[i + 1].clone());
                i += 2;
            }
            "--address" => {
                address = Some(args[i + 1].clone());
                i += 2;
            }
            "--registry" => {
                cfg.registry_http = args[i + 1].clone();
                i += 2;
            }
            "--local-dir" => {
                cfg.local_dir = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            "--replica-dir" => {
                cfg.replica_dir = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            "--nodes-file" => {
                cfg.nodes_file = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            "--force-leave" => {
                force_leave = true;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    match role.as_deref() {
        Some("registry") => run_registry(cfg).await,
        Some("node") => {
            let Some(address) = address else {
                eprintln!("--address is required for --role node");
                std::process::exit(1);
            };
            run_node(cfg, address, force_leave).await
        }
        _ => {
            usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn usage(program: &str) {
    eprintln!("Usage: {} --role registry|node [options]", program);
    eprintln!(
        "  registry: {} --role registry [--registry <bind:port>] [--nodes-file <path>]",
        program
    );
    eprintln!(
        "  node:     {} --role node --address <host> [--registry <host:port>]",
        program
    );
    eprintln!("                [--local-dir <dir>] [--replica-dir <dir>] [--force-leave]");
}

/// Runs the naming service: protocol listeners plus the HTTP admin surface.
async fn run_registry(cfg: ClusterConfig) -> anyhow::Result<()> {
    let http_addr: SocketAddr = cfg.registry_http.parse()?;
    let registry = Arc::new(MembershipRegistry::open(cfg));

    registry.clone().start().await?;

    let app = handlers::router(registry);
    tracing::info!("registry admin surface on {}", http_addr);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs a storage node until interrupted, then leaves gracefully.
async fn run_node(cfg: ClusterConfig, address: String, force_leave: bool) -> anyhow::Result<()> {
    tracing::info!("starting node {}", address);
    let runtime = NodeRuntime::start(cfg, address).await?;

    tracing::info!("node running; Ctrl+C to leave the ring");
    tokio::signal::ctrl_c().await?;

    if let Err(e) = runtime.leave(force_leave).await {
        // Replicas were not handed off; stay registered so an operator can
        // restart the node or retry with --force-leave.
        tracing::error!("graceful leave failed, replicas preserved on disk: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
