use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kvm_gateway::adb::DeviceBus;
use kvm_gateway::config::ConfigStore;
use kvm_gateway::state::AppState;
use kvm_gateway::utils::bind_tcp_listener;
use kvm_gateway::web;

/// Log level for the application.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Command-line arguments for the gateway.
#[derive(Parser, Debug)]
#[command(name = "kvm-gateway")]
#[command(version, about = "Multi-client Android screen/audio streaming and control gateway", long_about = None)]
struct CliArgs {
    /// Bind address (overrides configuration file).
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// Static-file HTTP port (overrides configuration file).
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// WebSocket gateway port (overrides configuration file).
    #[arg(short = 'w', long, value_name = "PORT")]
    websocket_port: Option<u16>,

    /// Data directory holding the configuration file (default: /etc/kvm-gateway).
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for debug, -vv for trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting kvm-gateway v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = args.data_dir.unwrap_or_else(get_data_dir);
    tracing::info!("Data directory: {}", data_dir.display());
    tokio::fs::create_dir_all(&data_dir).await?;

    let config_path = data_dir.join("kvm-gateway.toml");
    let config_store = ConfigStore::new(&config_path).await?;
    let mut config = config_store.get().as_ref().clone();

    if let Some(addr) = args.address {
        config.web.bind_address = addr;
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if let Some(port) = args.websocket_port {
        config.web.websocket_port = port;
    }
    config_store.set(config.clone()).await?;

    let bind_ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid bind address: {}", config.web.bind_address))?;
    let http_addr = SocketAddr::new(bind_ip, config.web.http_port);
    let websocket_addr = SocketAddr::new(bind_ip, config.web.websocket_port);

    let device_bus = DeviceBus::new(&config.adb.adb_path);
    let root_cancel = tokio_util::sync::CancellationToken::new();
    let state = AppState::new(config_store, device_bus, root_cancel.clone());

    let static_router = web::static_router(&config.web.static_dir);
    let gateway_router = web::gateway_router(state.clone());

    let http_listener = tokio::net::TcpListener::from_std(bind_tcp_listener(http_addr)?)?;
    let websocket_listener = tokio::net::TcpListener::from_std(bind_tcp_listener(websocket_addr)?)?;
    tracing::info!("Static file listener on http://{}", http_addr);
    tracing::info!("WebSocket gateway listener on ws://{}", websocket_addr);

    let mut shutdown_rx = state.shutdown_signal();
    let shutdown_tx = state.shutdown_tx.clone();
    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    let http_server = axum::serve(http_listener, static_router).with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
    });
    let mut shutdown_rx_ws = state.shutdown_signal();
    let gateway_server = axum::serve(websocket_listener, gateway_router).with_graceful_shutdown(async move {
        let _ = shutdown_rx_ws.recv().await;
    });

    tokio::select! {
        _ = shutdown_signal => {}
        result = http_server => {
            if let Err(e) = result {
                tracing::error!("static file server error: {e}");
            }
        }
        result = gateway_server => {
            if let Err(e) = result {
                tracing::error!("gateway server error: {e}");
            }
        }
    }

    root_cancel.cancel();
    tracing::info!("server shutdown complete");
    Ok(())
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "kvm_gateway=error,tower_http=error",
        LogLevel::Warn => "kvm_gateway=warn,tower_http=warn",
        LogLevel::Info => "kvm_gateway=info,tower_http=info",
        LogLevel::Debug => "kvm_gateway=debug,tower_http=debug",
        LogLevel::Trace => "kvm_gateway=trace,tower_http=debug",
    };

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {err}");
    }
}

fn get_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("KVM_GATEWAY_DATA_DIR") {
        return PathBuf::from(path);
    }
    PathBuf::from("/etc/kvm-gateway")
}
