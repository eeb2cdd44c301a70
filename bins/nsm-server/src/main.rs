mod config;

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nsm_cells::CellRouter;
use nsm_config::{Config, ConfigManager};
use nsm_manager::{AdminConsole, Backends, NamespaceManager, NamespaceMessage};
use nsm_provider::{MemoryNameSpaceProvider, NameSpaceProvider};
use nsm_types::{DatabaseId, Subject};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Namespace manager server
#[derive(Parser, Debug)]
#[command(name = "nsm-server", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "nsm-server.toml")]
    config: String,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,

    /// Do not read admin commands from stdin
    #[arg(long)]
    no_console: bool,
}

struct Server {
    router: CellRouter<NamespaceMessage>,
    manager: Arc<NamespaceManager>,
}

/// An in-memory namespace with one directory per configured database.
fn build_provider(config: &ServerConfig) -> anyhow::Result<Arc<MemoryNameSpaceProvider>> {
    let (hsm, storage_class) = config.storage_class()?;
    let mut provider = MemoryNameSpaceProvider::new().with_storage_class(hsm, storage_class);
    for db in &config.databases {
        provider = provider.with_database(&db.prefix, DatabaseId(db.id))?;
    }
    let root = Subject::root();
    for db in &config.databases {
        // parents first
        let mut path = String::new();
        for part in db.prefix.split('/').filter(|p| !p.is_empty()) {
            path.push('/');
            path.push_str(part);
            if provider.path_to_id(&root, &path, true).is_err() {
                provider.create_directory(&root, &path, None, None, 0o755)?;
            }
        }
    }
    Ok(Arc::new(provider))
}

fn start(config: &ServerConfig) -> anyhow::Result<Server> {
    let provider = build_provider(config)?;
    let router = CellRouter::new(config.domain.clone());
    let manager = NamespaceManager::start(
        config.manager.clone(),
        Backends::in_memory(provider),
        router.endpoint(config.cell_name.clone()),
    )?;
    router.register(config.cell_name.clone(), manager.receiver());
    info!(cell = %config.cell_name, domain = %config.domain, "namespace manager cell registered");
    Ok(Server { router, manager })
}

fn load_config(path: &str) -> anyhow::Result<ConfigManager<ServerConfig>> {
    if Path::new(path).exists() {
        ConfigManager::load(path).with_context(|| format!("loading {}", path))
    } else {
        let config = ServerConfig::default();
        config.validate()?;
        Ok(ConfigManager::new(config))
    }
}

fn spawn_console(manager: Arc<NamespaceManager>) -> std::io::Result<()> {
    let console = AdminConsole::new(manager);
    std::thread::Builder::new()
        .name("nsm-console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                println!("{}", console.execute(&line));
            }
        })?;
    Ok(())
}

/// Serve until CTRL+C or SIGTERM; SIGHUP re-reads the hot-updatable
/// settings.
async fn serve(config: &ConfigManager<ServerConfig>, manager: &NamespaceManager) -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received CTRL+C");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                return Ok(());
            }
            _ = sighup.recv() => match config.reload() {
                Ok(()) => manager.apply_config(&config.get().manager),
                Err(e) => warn!("configuration reload failed: {}", e),
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        println!("{}", ServerConfig::default().render());
        return Ok(());
    }

    let config = load_config(&args.config)?;
    let current = config.get();
    let _guard = nsm_logging::init_logging(&current.log)?;
    info!(config = %args.config, "Starting namespace manager server");

    let server = start(&current)?;
    if !args.no_console {
        spawn_console(server.manager.clone())?;
    }

    serve(&config, &server.manager).await?;

    info!("Namespace manager server shutting down");
    server.manager.shutdown();
    server.router.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsm_cells::{CellAddress, CellStub};
    use nsm_manager::Operation;
    use nsm_types::AttributeKinds;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_provider_has_database_roots() {
        let mut config = ServerConfig::default();
        config.databases.push(crate::config::DatabaseConfig {
            prefix: "/pnfs/site/b".into(),
            id: 4,
        });
        let provider = build_provider(&config).unwrap();
        let root = Subject::root();
        let data = provider.path_to_id(&root, "/data", true).unwrap();
        let b = provider.path_to_id(&root, "/pnfs/site/b", true).unwrap();
        assert_eq!(data.database_id(), DatabaseId(1));
        assert_eq!(b.database_id(), DatabaseId(4));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = load_config("/nonexistent/nsm-server.toml").unwrap();
        assert_eq!(config.get().cell_name, "PnfsManager");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cell_name = \"other\"").unwrap();
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.get().cell_name, "other");
    }

    #[tokio::test]
    async fn test_server_answers_requests() {
        let config = ServerConfig::default();
        let server = start(&config).unwrap();
        let stub = CellStub::new(server.router.endpoint("client"))
            .with_destination(CellAddress::new(&config.cell_name, &config.domain))
            .with_timeout(Duration::from_secs(10));

        let reply = tokio::task::spawn_blocking(move || {
            stub.send_and_wait(
                NamespaceMessage::new(Operation::create_directory(0o755, AttributeKinds::empty()))
                    .with_path("/data/dir"),
            )
        })
        .await
        .unwrap()
        .unwrap();
        assert!(reply.is_ok());
        assert!(reply.id.is_some());

        server.manager.shutdown();
        server.router.shutdown();
    }
}
