//! NetGoat Proxy - reverse-proxying security gateway
//!
//! Wires the subsystems together: embedded store, config streaming manager
//! and its connector, challenge store and sweeper, response cache, anomaly
//! classifier, and the gateway router. Serves plain HTTP by default, TLS
//! when `ssl.enabled` is set.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use netgoat_proxy::anomaly::{AnomalyDetector, AnomalySettings};
use netgoat_proxy::cache::ResponseCache;
use netgoat_proxy::challenge::ChallengeStore;
use netgoat_proxy::config::GatewayConfig;
use netgoat_proxy::connector;
use netgoat_proxy::database::Store;
use netgoat_proxy::error_pages::ErrorPageStore;
use netgoat_proxy::gateway::{build_router, GatewayState};
use netgoat_proxy::proxy::UpstreamClient;
use netgoat_proxy::streaming::Manager;
use netgoat_proxy::waf::WafEngine;

/// NetGoat Proxy - reverse-proxying security gateway
#[derive(Parser, Debug)]
#[command(name = "netgoat-proxy")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yml", env = "NETGOAT_CONFIG")]
    config: PathBuf,

    /// Override the listen port
    #[arg(long, env = "NETGOAT_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "NETGOAT_LOG_LEVEL")]
    log_level: String,

    /// Enable JSON log format
    #[arg(long, env = "NETGOAT_JSON_LOGS")]
    json_logs: bool,

    /// Data directory for the embedded store and snapshot recovery file
    #[arg(long, default_value = "./database", env = "NETGOAT_DATA_DIR")]
    data_dir: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting NetGoat Proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {:?}", args.config);

    let config = match GatewayConfig::load(&args.config) {
        Ok(config) => {
            info!(
                debug_logs = config.debug_logs,
                honeypot = config.honeypot,
                auth_enabled = config.auth.enabled,
                "Loaded configuration"
            );
            config
        }
        Err(e) => {
            warn!(error = %e, "Could not read configuration, using defaults");
            GatewayConfig::default()
        }
    };

    if args.validate {
        info!("Configuration validation successful, exiting");
        return Ok(());
    }

    let config = Arc::new(config);

    std::fs::create_dir_all(&args.data_dir)
        .map_err(|e| anyhow::anyhow!("failed to create data directory: {}", e))?;

    // Embedded store
    let store = Arc::new(Store::open(args.data_dir.join("proxy.db"))?);

    // Config streaming manager with durable recovery
    let manager = Arc::new(Manager::new(args.data_dir.join("config-snapshot.json")));

    info!("Applying initial configuration from snapshot");
    store.apply_snapshot(&manager.snapshot());

    // Connector to the external configuration API
    let mut background = Vec::new();
    if let Some(api_url) = config.api_stream_url() {
        let api_key = config.api_stream_key().unwrap_or_default();
        if api_key.is_empty() {
            warn!("API stream URL set but no API key provided; external updates will likely be unauthorized");
        }
        background.push(tokio::spawn(connector::run(
            Arc::clone(&manager),
            api_url,
            api_key,
        )));
    } else {
        info!("No API stream URL configured, running in offline mode with local configuration");
    }

    // Subscriber applying snapshots to the store
    {
        let store = Arc::clone(&store);
        let mut updates = manager.subscribe();
        background.push(tokio::spawn(async move {
            info!("Config update subscriber started");
            while let Some(snapshot) = updates.recv().await {
                store.apply_snapshot(&snapshot);
            }
        }));
    }

    // Static error pages
    let pages = Arc::new(ErrorPageStore::from_config(&config));

    // Response cache
    let cache = if config.cache.enabled {
        let ttl = Duration::from_secs(config.cache.effective_ttl_seconds());
        let max_entries = config.cache.effective_max_entries();
        let max_body_bytes = config.cache.effective_max_body_bytes();
        info!(
            ttl_seconds = ttl.as_secs(),
            max_entries, max_body_bytes, "Response cache enabled"
        );
        Some(Arc::new(ResponseCache::new(ttl, max_entries, max_body_bytes)))
    } else {
        None
    };

    // Anomaly classifier subprocess
    let detector = if config.anomaly.enabled {
        let settings = AnomalySettings {
            enabled: true,
            threshold: config.anomaly.effective_threshold(),
            model_path: config.anomaly.effective_model_path().to_string(),
            scaler_path: config.anomaly.effective_scaler_path().to_string(),
            python_script: config.anomaly.effective_python_script().to_string(),
        };
        match AnomalyDetector::spawn(settings) {
            Ok(detector) => {
                info!(
                    model = config.anomaly.effective_model_path(),
                    threshold = config.anomaly.effective_threshold(),
                    "Anomaly detection configured"
                );
                Some(Arc::new(detector))
            }
            Err(e) => {
                warn!(error = %e, "Failed to initialize anomaly detector");
                None
            }
        }
    } else {
        None
    };

    // Challenge store with minute sweeper
    let challenges = Arc::new(ChallengeStore::new());
    background.push(challenges.spawn_sweeper());
    info!("Challenge system initialized");

    let state = GatewayState {
        config: Arc::clone(&config),
        store,
        challenges,
        cache,
        waf: Arc::new(WafEngine::new()),
        manager: Arc::clone(&manager),
        detector,
        pages,
        upstream: UpstreamClient::new(),
    };

    let router = build_router(state);

    tokio::select! {
        result = run_server(Arc::clone(&config), args.port, router) => {
            if let Err(e) = result {
                error!(error = %e, "Server failed");
                return Err(e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
        }
    }

    // Graceful shutdown: close subscriber channels, stop background tasks
    info!("Shutting down...");
    manager.close();
    for task in background {
        task.abort();
    }

    info!("NetGoat Proxy shutdown complete");
    Ok(())
}

/// Bind and run the listener, TLS or plain per configuration
async fn run_server(
    config: Arc<GatewayConfig>,
    port_override: Option<u16>,
    router: axum::Router,
) -> anyhow::Result<()> {
    let app = router.into_make_service_with_connect_info::<SocketAddr>();

    if config.ssl.enabled {
        let port = if config.ssl.port.is_empty() {
            ":8443".to_string()
        } else {
            config.ssl.port.clone()
        };
        let addr = listen_addr(&port, port_override)?;
        let tls = RustlsConfig::from_pem_file(&config.ssl.cert_file, &config.ssl.key_file)
            .await
            .map_err(|e| anyhow::anyhow!("TLS configuration error: {}", e))?;
        info!(%addr, "Reverse proxy listening (HTTPS)");
        axum_server::bind_rustls(addr, tls).serve(app).await?;
    } else {
        let addr = listen_addr(":8080", port_override)?;
        info!(%addr, "Reverse proxy listening (HTTP)");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
    }

    Ok(())
}

/// Resolve a ":port"-style config value with an optional CLI override
fn listen_addr(configured: &str, override_port: Option<u16>) -> anyhow::Result<SocketAddr> {
    let port = match override_port {
        Some(port) => port,
        None => configured
            .trim_start_matches(':')
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("invalid listen port: {}", configured))?,
    };
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}

/// Initialize logging
fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}

/// Wait for OS shutdown signal
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("Failed to install SIGQUIT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigquit.recv() => {
            info!("Received SIGQUIT");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    std::future::pending::<()>().await;
}
