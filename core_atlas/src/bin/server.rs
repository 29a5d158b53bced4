use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use atlas_store::MemoryStore;
use core_atlas::pipeline::{spawn_colony_loop, spawn_entity_loop, WorldState};
use core_atlas::{network, ServiceConfig, WorldGrid};

#[derive(Parser, Debug)]
#[command(author, version, about = "Atlas world-state aggregation service", long_about = None)]
struct Cli {
    /// Path to the service configuration document.
    #[arg(long, default_value = "./config.json")]
    config: PathBuf,
    /// Path to the world-grid geometry document.
    #[arg(long, default_value = "./ServerGrid.json")]
    grid: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match ServiceConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load service config");
            process::exit(1);
        }
    };
    let grid = match WorldGrid::from_file(&cli.grid) {
        Ok(grid) => Arc::new(grid),
        Err(err) => {
            error!(error = %err, "failed to load world grid config");
            process::exit(1);
        }
    };

    // Local runs are backed by the in-memory store; production embeds a
    // client for the real store behind the same trait.
    let store = match &config.fixture_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(contents) => match MemoryStore::from_fixture(&contents) {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    error!(error = %err, fixture = %path.display(), "bad store fixture");
                    process::exit(1);
                }
            },
            Err(err) => {
                error!(error = %err, fixture = %path.display(), "unreadable store fixture");
                process::exit(1);
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let state = Arc::new(WorldState::new());
    let broadcast = network::start_snapshot_server(config.snapshot_bind).map(Arc::new);

    info!(
        snapshot_bind = %config.snapshot_bind,
        islands = grid.island_count(),
        "atlas world-state service ready"
    );

    let mut workers = Vec::new();
    if config.colony_fetch_rate_secs > 0 {
        workers.push(spawn_colony_loop(
            Arc::clone(&store),
            Arc::clone(&grid),
            config.clone(),
            Arc::clone(&state),
            broadcast.clone(),
        ));
    }
    if config.entity_fetch_rate_secs > 0 {
        workers.push(spawn_entity_loop(
            Arc::clone(&store),
            config.clone(),
            Arc::clone(&state),
        ));
    }

    if workers.is_empty() {
        error!("both poll loops are disabled, nothing to do");
        process::exit(1);
    }
    for worker in workers {
        let _ = worker.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_defaults_and_overrides() {
        Cli::command().debug_assert();

        let cli = Cli::parse_from(["server"]);
        assert_eq!(cli.config, PathBuf::from("./config.json"));
        assert_eq!(cli.grid, PathBuf::from("./ServerGrid.json"));

        let cli = Cli::parse_from(["server", "--config", "/etc/atlas.json", "--grid", "g.json"]);
        assert_eq!(cli.config, PathBuf::from("/etc/atlas.json"));
        assert_eq!(cli.grid, PathBuf::from("g.json"));
    }

    #[test]
    fn flag_without_value_is_rejected() {
        assert!(Cli::try_parse_from(["server", "--config"]).is_err());
    }
}
