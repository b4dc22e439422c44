// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Bondline Curve Node
//!
//! Entry point for the `bondline-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires the curve engine to the reference
//! token and role registry, and serves the HTTP/WS API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     start the node
//! - `quote`   price a bond offline against a fixed rate
//! - `version` print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;
mod snapshot;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use bondline_contracts::{MintAuthority, Role, RoleRegistry, TokenLedger};
use bondline_protocol::engine::{CurveState, NativeAmount, OpenGate};
use bondline_protocol::oracle::{StaticRateSource, SystemClock, TickOracle};
use bondline_protocol::{CurveEngine, Fixed};

use cli::{BondlineNodeCli, Commands};
use config::NodeConfig;
use logging::LogFormat;
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BondlineNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Quote(args) => quote(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Everything the node wires together at start-up.
struct Deployment {
    roles: Arc<RoleRegistry>,
    token: Arc<TokenLedger>,
    oracle: Arc<TickOracle>,
    engine: Arc<CurveEngine>,
}

/// Builds the contracts, oracle and engine described by `config`.
///
/// Roles from the config are granted here. A snapshot restored afterwards
/// replaces them wholesale.
fn deploy(config: &NodeConfig) -> Result<Deployment> {
    let roles = Arc::new(RoleRegistry::new(config.admin.clone()));
    roles
        .grant_role(&config.admin, Role::Minter, &config.engine_identity)
        .context("failed to grant minter role to the engine")?;
    for governor in &config.governors {
        roles
            .grant_role(&config.admin, Role::Governor, governor)
            .with_context(|| format!("failed to grant governor role to {governor}"))?;
    }
    for bonder in &config.bonders {
        roles
            .grant_role(&config.admin, Role::Bonder, bonder)
            .with_context(|| format!("failed to grant bonder role to {bonder}"))?;
    }

    let token = Arc::new(TokenLedger::new(
        config.token_name.clone(),
        config.token_symbol.clone(),
        config.token_decimals(),
        Arc::clone(&roles),
    ));

    let oracle = Arc::new(TickOracle::for_window(
        Arc::new(SystemClock),
        config.observation_capacity,
        config.curve.twap_window_secs,
    ));
    if let Some(tick) = config.initial_tick {
        oracle
            .record(tick)
            .context("failed to record initial oracle tick")?;
    }

    let engine = CurveEngine::new(
        &config.curve,
        oracle.clone(),
        Arc::new(MintAuthority::new(
            Arc::clone(&token),
            config.engine_identity.clone(),
        )),
        roles.clone(),
    )
    .context("invalid curve configuration")?;

    Ok(Deployment {
        roles,
        token,
        oracle,
        engine: Arc::new(engine),
    })
}

/// Starts the node: API server, metrics endpoint, and periodic snapshots.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format);

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting bondline-node"
    );

    std::fs::create_dir_all(&args.data_dir).with_context(|| {
        format!(
            "failed to create data directory: {}",
            args.data_dir.display()
        )
    })?;

    let config = NodeConfig::load(args.config.as_deref(), &args.data_dir)?;
    let deployment = deploy(&config)?;

    // --- Restore ---
    let snapshot_path = snapshot::snapshot_path(&args.data_dir);
    if let Some(snap) = snapshot::load(&snapshot_path)? {
        tracing::info!(taken_at = %snap.taken_at, "restoring snapshot");
        snap.apply(&deployment.engine, &deployment.token, &deployment.roles);
        if let Err(e) = deployment.engine.audit() {
            tracing::warn!("restored state does not balance: {}", e);
        }
    }

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    if let Ok(status) = deployment.engine.status() {
        node_metrics.observe_status(&status);
    }

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: Arc::clone(&deployment.engine),
        token: Arc::clone(&deployment.token),
        roles: Arc::clone(&deployment.roles),
        oracle: Arc::clone(&deployment.oracle),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Periodic snapshots ---
    let snapshot_loop = {
        let engine = Arc::clone(&deployment.engine);
        let token = Arc::clone(&deployment.token);
        let roles = Arc::clone(&deployment.roles);
        let metrics = Arc::clone(&node_metrics);
        let path = snapshot_path.clone();
        let period = std::time::Duration::from_secs(args.snapshot_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Ok(status) = engine.status() {
                    metrics.observe_status(&status);
                }
                let written = snapshot::persist(
                    Arc::clone(&engine),
                    Arc::clone(&token),
                    Arc::clone(&roles),
                    path.clone(),
                )
                .await;
                if let Err(e) = written {
                    tracing::error!("periodic snapshot failed: {:#}", e);
                }
            }
        })
    };

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    snapshot_loop.abort();
    write_final_snapshot(&deployment, &snapshot_path).await?;
    tracing::info!("bondline-node stopped");
    Ok(())
}

async fn write_final_snapshot(deployment: &Deployment, path: &Path) -> Result<()> {
    snapshot::persist(
        Arc::clone(&deployment.engine),
        Arc::clone(&deployment.token),
        Arc::clone(&deployment.roles),
        path.to_path_buf(),
    )
    .await
    .context("failed to write final snapshot")?;
    tracing::info!(path = %path.display(), "final snapshot written");
    Ok(())
}

/// Prices a bond against a fixed rate and prints the quote as JSON.
///
/// Runs the same engine code path as the node, against a throwaway ledger
/// and an open access gate.
fn quote(args: cli::QuoteArgs) -> Result<()> {
    logging::init_logging("bondline_node=warn", LogFormat::Pretty);

    let data_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let config = NodeConfig::load(args.config.as_deref(), &data_dir)?;

    let roles = Arc::new(RoleRegistry::new(config.admin.clone()));
    let token = Arc::new(TokenLedger::new(
        config.token_name.clone(),
        config.token_symbol.clone(),
        config.token_decimals(),
        Arc::clone(&roles),
    ));
    let engine = CurveEngine::new(
        &config.curve,
        Arc::new(StaticRateSource::new(args.rate)),
        Arc::new(MintAuthority::new(token, config.engine_identity.clone())),
        Arc::new(OpenGate),
    )
    .context("invalid curve configuration")?;

    let mut state = CurveState::new(&config.curve);
    state.curve_supply = Fixed::from_int(i128::from(args.supply)).context("supply out of range")?;
    engine.restore(state);

    let quote = engine
        .quote(NativeAmount::new(args.value))
        .context("quote failed")?;
    let body = serde_json::to_string_pretty(&api::QuoteResponse::from(quote))
        .context("failed to encode quote")?;
    println!("{}", body);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("bondline-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
