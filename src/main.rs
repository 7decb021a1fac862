// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgeplane::{
    config::ControllerConfig,
    constants::{DEFAULT_TXT_TTL_SECS, TOKIO_WORKER_THREADS},
    dns::{CloudflareProvider, DnsProvider, DnsRecord, HickoryInspector, RecordComparator},
    proxy::{
        certificate_map, render, ExecutionStrategy, ProxyValidator, RenderSettings,
        SignalReloader,
    },
    reconcilers::{CycleOutcome, ManagerSettings, ReconciliationManager},
    store::{ConfigStore, FileStore},
};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reverse-proxy configuration, TLS material and DNS reconciliation.
#[derive(Debug, Parser)]
#[command(name = "edgeplane", version, about)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, short, global = true, env = "EDGEPLANE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the reconciliation loop until interrupted
    Run,
    /// Run one reconciliation cycle now, bypassing the debounce window
    Reconcile,
    /// Print the configuration rendered from the desired state
    Render {
        /// Print only the content hash
        #[arg(long)]
        hash: bool,
    },
    /// Write, validate and reload a configuration file as-is
    Apply { file: PathBuf },
    /// Manage and inspect public DNS records
    #[command(subcommand)]
    Dns(DnsCommand),
}

#[derive(Debug, Subcommand)]
enum DnsCommand {
    /// Ensure an A record
    EnsureA {
        domain: String,
        ip: Ipv4Addr,
        #[command(flatten)]
        proxy: ProxiedFlag,
    },
    /// Ensure an AAAA record
    EnsureAaaa {
        domain: String,
        ip: Ipv6Addr,
        #[command(flatten)]
        proxy: ProxiedFlag,
    },
    /// Ensure a CNAME record
    EnsureCname {
        domain: String,
        target: String,
        #[command(flatten)]
        proxy: ProxiedFlag,
    },
    /// Ensure a TXT record with an exact value
    EnsureTxt {
        fqdn: String,
        value: String,
        #[arg(long, default_value_t = DEFAULT_TXT_TTL_SECS)]
        ttl: u32,
    },
    /// Delete TXT records with an exact value
    DeleteTxt { fqdn: String, value: String },
    /// Compare desired records (YAML list) against live DNS
    Check { records: PathBuf },
}

#[derive(Debug, Args)]
struct ProxiedFlag {
    /// Route traffic through the provider's proxy
    #[arg(long)]
    proxied: bool,
}

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("edgeplane")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = ControllerConfig::load(cli.config.as_deref())?;
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    match cli.command {
        Command::Run => run(&config, shutdown).await,
        Command::Reconcile => {
            let manager = build_manager(&config)?;
            report_cycle(manager.force_reconcile(&shutdown).await?);
            Ok(())
        }
        Command::Render { hash } => render_config(&config, hash).await,
        Command::Apply { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let manager = build_manager(&config)?;
            report_cycle(manager.apply_configuration(&content, &shutdown).await?);
            Ok(())
        }
        Command::Dns(command) => dns(&config, command, &shutdown).await,
    }
}

/// Initialize logging.
///
/// Format: timestamp file:line LEVEL message. Respects `RUST_LOG` (default `info`)
/// and `RUST_LOG_FORMAT=json`.
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    debug!("Logging initialized with file and line number tracking");
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Received interrupt");
    }
    token.cancel();
}

fn build_manager(config: &ControllerConfig) -> Result<ReconciliationManager> {
    let strategy = ExecutionStrategy::from_config(&config.proxy);
    let timeout = config.reconcile.operation_timeout();
    info!(
        strategy = strategy.name(),
        state_file = %config.state_file.display(),
        "Building reconciliation manager"
    );

    let manager = ReconciliationManager::new(
        Arc::new(FileStore::new(&config.state_file)),
        Arc::new(ProxyValidator::new(strategy.clone(), timeout)),
        Arc::new(SignalReloader::new(strategy, timeout)),
        ManagerSettings::from_config(config),
    );
    manager.initialize()?;
    Ok(manager)
}

async fn run(config: &ControllerConfig, shutdown: CancellationToken) -> Result<()> {
    info!("Starting edgeplane reconciliation loop");
    let manager = build_manager(config)?;

    // Reconcile once up front so a restart converges without waiting for a change
    match manager.force_reconcile(&shutdown).await {
        Ok(outcome) => report_cycle(outcome),
        Err(e) => error!(reason = e.reason(), "Initial reconciliation failed: {e}"),
    }

    manager.run(shutdown).await?;
    info!("edgeplane stopped");
    Ok(())
}

async fn render_config(config: &ControllerConfig, hash_only: bool) -> Result<()> {
    let store = FileStore::new(&config.state_file);
    let routes = store.routes_with_services().await?;
    let certificates = certificate_map(store.list_certificates().await?);
    let rendered = render(
        &routes,
        &certificates,
        &RenderSettings {
            cert_dir: config.proxy.cert_dir.clone(),
        },
    )?;

    if hash_only {
        println!("{}", rendered.hash);
    } else {
        print!("{}", rendered.text);
    }
    Ok(())
}

fn report_cycle(outcome: CycleOutcome) {
    match outcome {
        CycleOutcome::Unchanged { hash } => info!(hash = %hash, "Configuration unchanged"),
        CycleOutcome::Applied {
            snapshot_id,
            hash,
            validation,
            reload,
        } => info!(
            snapshot_id,
            hash = %hash,
            validation = ?validation,
            reload = ?reload,
            "Configuration applied"
        ),
    }
}

async fn dns(
    config: &ControllerConfig,
    command: DnsCommand,
    cancel: &CancellationToken,
) -> Result<()> {
    let (name, outcome) = match command {
        DnsCommand::Check { records } => return check_records(config, &records, cancel).await,
        DnsCommand::DeleteTxt { fqdn, value } => {
            let deleted = provider(config)?.delete_txt(&fqdn, &value, cancel).await?;
            info!(fqdn = %fqdn, deleted, "TXT cleanup finished");
            println!("deleted {deleted}");
            return Ok(());
        }
        DnsCommand::EnsureA { domain, ip, proxy } => {
            let outcome = provider(config)?
                .ensure_a(&domain, ip, proxy.proxied, cancel)
                .await?;
            (domain, outcome)
        }
        DnsCommand::EnsureAaaa { domain, ip, proxy } => {
            let outcome = provider(config)?
                .ensure_aaaa(&domain, ip, proxy.proxied, cancel)
                .await?;
            (domain, outcome)
        }
        DnsCommand::EnsureCname {
            domain,
            target,
            proxy,
        } => {
            let outcome = provider(config)?
                .ensure_cname(&domain, &target, proxy.proxied, cancel)
                .await?;
            (domain, outcome)
        }
        DnsCommand::EnsureTxt { fqdn, value, ttl } => {
            let outcome = provider(config)?
                .ensure_txt(&fqdn, &value, ttl, cancel)
                .await?;
            (fqdn, outcome)
        }
    };

    info!(name = %name, outcome = %outcome, "DNS record ensured");
    println!("{outcome}");
    Ok(())
}

fn provider(config: &ControllerConfig) -> Result<CloudflareProvider> {
    CloudflareProvider::new(
        &config.dns.api_base_url,
        config.dns.require_api_token()?,
        config.dns.request_timeout(),
    )
}

async fn check_records(
    config: &ControllerConfig,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let desired: Vec<DnsRecord> = serde_yaml::from_str(&text)
        .with_context(|| format!("Invalid record list {}", path.display()))?;

    let inspector =
        HickoryInspector::new(config.dns.nameserver_addr()?, config.dns.request_timeout());
    let diff = RecordComparator::new(Arc::new(inspector))
        .compare(&desired, cancel)
        .await?;

    for record in &diff.missing {
        println!("missing  {record}");
    }
    for record in &diff.extra {
        println!("extra    {record}");
    }
    info!(summary = %diff.summary(), "DNS comparison finished");

    if !diff.is_converged() {
        bail!("live DNS differs from desired records: {}", diff.summary());
    }
    println!("{}", diff.summary());
    Ok(())
}
