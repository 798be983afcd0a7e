mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use rh_core::config::Config;
use rh_core::LibraryId;
use rh_server::indexer::IndexMode;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting reelhouse");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    rh_server::start(config).await?;
    Ok(())
}

async fn index_library(library_id: &str, full: bool, config_path: Option<&Path>) -> Result<()> {
    let library_id: LibraryId = library_id
        .parse()
        .with_context(|| format!("invalid library id {library_id:?}"))?;
    let config = Config::load_or_default(config_path);

    let report = rh_server::index_once(&config, library_id, IndexMode::from_full(full)).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.root_missing {
        anyhow::bail!("library root does not exist");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Media root: {}", config.media.root.display());
    println!("  Auth enabled: {}", config.auth.enabled);
    println!("  Index workers: {}", config.indexer.workers);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose picks the default level.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelhouse=trace,rh_server=trace,rh_db=debug,rh_core=debug,tower_http=debug".to_string()
        } else {
            "reelhouse=info,rh_server=info,rh_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Index { library_id, full } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(index_library(&library_id, full, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelhouse {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
