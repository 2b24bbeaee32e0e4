//! k2bypass: manage VPN exclusion lists from the command line.

use clap::{Parser, Subcommand, ValueEnum};
use k2bypass::hostname::{init_public_suffix_list_from_file, is_public_suffix_list_installed};
use k2bypass::{
    BypassListFile, ExclusionDto, ExclusionsManager, ExclusionsMode, JsonFileSettingsStore,
    ManagerConfig, ServicesCatalog,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "k2bypass")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Manage VPN exclusion lists", long_about = None)]
struct Cli {
    /// Configuration file (JSON or YAML)
    #[arg(short, long, env = "K2BYPASS_CONFIG", default_value = "k2bypass.json")]
    config: PathBuf,

    /// Override the settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Override the service catalog file
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Regular,
    Selective,
}

impl From<ModeArg> for ExclusionsMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Regular => ExclusionsMode::Regular,
            ModeArg::Selective => ExclusionsMode::Selective,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the exclusions tree of the current mode
    List {
        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },

    /// Add a URL or hostname
    Add { url: String },

    /// Remove a node by id
    Remove { id: String },

    /// Toggle a node by id
    Toggle { id: String },

    /// Add services by id
    AddServices {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Remove present services, add absent ones
    ToggleServices {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Restore a service to its catalog definition
    ResetService { id: String },

    /// Show or switch the exclusions mode
    Mode { mode: Option<String> },

    /// Check whether a URL goes through the VPN
    Check { url: String },

    /// Route a URL through the VPN
    EnableVpn { url: String },

    /// Route a URL around the VPN
    DisableVpn { url: String },

    /// Print the enabled hostnames of a mode, one per line
    Export {
        #[arg(value_enum)]
        mode: Option<ModeArg>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add hostnames from a file, one per line
    Import {
        input: PathBuf,

        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Remove every exclusion of both modes
    Clear,

    /// List catalog services and their state
    Services,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ManagerConfig::load(&cli.config)?;
    if let Some(settings) = cli.settings {
        config.settings_path = settings;
    }
    if let Some(catalog) = cli.catalog {
        config.catalog_path = Some(catalog);
    }

    if let Some(path) = &config.public_suffix_list_path {
        init_public_suffix_list_from_file(path)?;
    }
    log::debug!(
        "Using {} public suffix list",
        if is_public_suffix_list_installed() {
            "installed"
        } else {
            "bundled"
        }
    );

    let catalog = match &config.catalog_path {
        Some(path) => ServicesCatalog::load(path)?,
        None => ServicesCatalog::empty(),
    };

    let manager = ExclusionsManager::new(
        Arc::new(catalog),
        Arc::new(JsonFileSettingsStore::new(&config.settings_path)),
        Arc::new(BypassListFile::new(&config.bypass_list_path)),
    );
    manager.init().await?;

    match cli.command {
        Commands::List { json } => {
            let tree = manager.get_exclusions().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                print_tree(&tree, 0);
            }
        }
        Commands::Add { url } => {
            let added = manager.add_url_to_exclusions(&url).await?;
            println!("Added {} exclusions", added);
        }
        Commands::Remove { id } => {
            let removed = manager.remove_exclusion(&id).await?;
            println!("Removed {} exclusions", removed);
        }
        Commands::Toggle { id } => {
            let state = manager.toggle_exclusion_state(&id).await?;
            println!("{} is now {}", id, state);
        }
        Commands::AddServices { ids } => {
            let added = manager.add_services(&ids).await?;
            println!("Added {} exclusions", added);
        }
        Commands::ToggleServices { ids } => {
            let result = manager.toggle_services(&ids).await?;
            println!("Added {}, deleted {} exclusions", result.added, result.deleted);
        }
        Commands::ResetService { id } => {
            manager.reset_service_data(&id).await?;
            println!("Reset service {}", id);
        }
        Commands::Mode { mode } => match mode {
            Some(name) => {
                manager.set_mode_by_name(&name).await?;
                println!("Mode set to {}", manager.current_mode());
            }
            None => {
                let mode = manager.current_mode();
                println!("{} ({})", mode, mode.display_name());
            }
        },
        Commands::Check { url } => {
            let enabled = manager.is_vpn_enabled_by_url(&url);
            println!("{}: VPN {}", url, if enabled { "on" } else { "off" });
        }
        Commands::EnableVpn { url } => {
            let changed = manager.enable_vpn_by_url(&url).await?;
            println!("Changed {} exclusions", changed);
        }
        Commands::DisableVpn { url } => {
            let changed = manager.disable_vpn_by_url(&url).await?;
            println!("Changed {} exclusions", changed);
        }
        Commands::Export { mode, output } => {
            let mode = mode.map(ExclusionsMode::from).unwrap_or(manager.current_mode());
            let hostnames = match mode {
                ExclusionsMode::Regular => manager.get_regular_exclusions().await?,
                ExclusionsMode::Selective => manager.get_selective_exclusions().await?,
            };
            match output {
                Some(path) => {
                    fs::write(&path, format!("{}\n", hostnames))?;
                    println!("Exported {} mode to {:?}", mode, path);
                }
                None => println!("{}", hostnames),
            }
        }
        Commands::Import { input, mode } => {
            let mode = mode.map(ExclusionsMode::from).unwrap_or(manager.current_mode());
            let text = fs::read_to_string(&input)?;
            let added = manager.import_exclusions(mode, &text).await?;
            println!("Imported {} exclusions into {} mode", added, mode);
        }
        Commands::Clear => {
            manager.clear_exclusions_data().await?;
            println!("Cleared all exclusions");
        }
        Commands::Services => {
            for status in manager.get_services().await? {
                let state = status
                    .state
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<20} {:<24} {:<16} {}",
                    status.service.service_id,
                    status.service.service_name,
                    state,
                    status.service.domains.join(", ")
                );
            }
        }
    }

    Ok(())
}

fn print_tree(node: &ExclusionDto, depth: usize) {
    if depth > 0 {
        println!(
            "{}{} [{}] {}",
            "  ".repeat(depth - 1),
            node.hostname,
            node.state,
            node.id
        );
    }
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}
