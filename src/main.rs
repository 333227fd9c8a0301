use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use pipehub::config::load_config;
use pipehub::lifecycle::signals::spawn_signal_listener;
use pipehub::observability::{logging, metrics, LogFormat};
use pipehub::pipe::RegistryError;
use pipehub::routing::RoutingTable;
use pipehub::{Hub, PipeCatalog, StartupError};

#[derive(Parser)]
#[command(name = "pipehub")]
#[command(version, about = "HTTP front-end that routes requests through chains of pipes", long_about = None)]
struct Cli {
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub
    Start {
        #[arg(short, long)]
        config: PathBuf,

        /// Serve Prometheus metrics on this address
        #[arg(long)]
        metrics_address: Option<SocketAddr>,
    },
    /// Validate a config file and print a summary
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.log_format) {
        eprintln!("failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Start {
            config,
            metrics_address,
        } => start(config, metrics_address).await,
        Commands::Check { config } => check(config),
    }
}

async fn start(path: PathBuf, metrics_address: Option<SocketAddr>) -> ExitCode {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pipehub starting");

    let hub = match bootstrap(&path).await {
        Ok(hub) => hub,
        Err(e) => {
            tracing::error!(config = %path.display(), error = %e, "Startup failed");
            eprintln!("pipehub: {e}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match hub.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            eprintln!("pipehub: {e}");
            hub.abort().await;
            return ExitCode::FAILURE;
        }
    };

    // Only once the config is known good and the hub's own port is bound.
    if let Some(addr) = metrics_address {
        match metrics::install_prometheus(addr) {
            // Pipes were counted before a recorder existed.
            Ok(()) => metrics::record_pipes_active(hub.pipe_count()),
            Err(e) => {
                tracing::error!(metrics_address = %addr, error = %e, "Failed to start metrics exporter")
            }
        }
    }

    spawn_signal_listener(hub.shutdown());
    let report = hub.run(listener).await;

    for failure in &report.close_failures {
        tracing::warn!(failure = %failure, "Pipe not closed cleanly");
    }
    tracing::info!(reason = %report.reason, drained = report.drained, "Exiting");
    ExitCode::SUCCESS
}

async fn bootstrap(path: &Path) -> Result<Hub, StartupError> {
    let config = load_config(path)?;
    Hub::bootstrap(&config, &PipeCatalog::with_builtins()).await
}

fn check(path: PathBuf) -> ExitCode {
    let summarize = || -> Result<RoutingTable, StartupError> {
        let config = load_config(&path)?;
        let table = RoutingTable::build(&config)?;

        let catalog = PipeCatalog::with_builtins();
        if let Some(decl) = config
            .pipes
            .iter()
            .find(|decl| catalog.resolve(&decl.identity, &decl.version).is_none())
        {
            return Err(RegistryError::UnknownModule {
                alias: decl.alias.clone(),
                identity: decl.identity.clone(),
                version: decl.version.clone(),
                available: catalog.versions(&decl.identity),
            }
            .into());
        }
        Ok(table)
    };

    match summarize() {
        Ok(table) => {
            let settings = table.settings();
            println!("{}: ok", path.display());
            println!("  port: {}", settings.port());
            match settings.graceful_shutdown {
                Some(grace) => println!("  graceful shutdown: {grace:?}"),
                None => println!("  graceful shutdown: none"),
            }
            let mut routes: Vec<_> = table.routes().collect();
            routes.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
            for route in routes {
                println!(
                    "  {} -> [{}] -> {}",
                    route.endpoint,
                    route.chain.join(", "),
                    route.origin
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}
