use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use plugin_hub_core::config::{default_base_dir, Config};
use plugin_hub_core::{Diagnostic, PluginHubError, PluginManager, Result};

mod args;
use args::{Cli, Commands, ConfigAction, Shell};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let base_dir = resolve_base_dir(cli.base_dir);

    let result = match cli.command {
        Some(Commands::List) => handle_list(&base_dir, cli.quiet).await,
        Some(Commands::Available) => handle_available(&base_dir, cli.quiet).await,
        Some(Commands::Mcp) => handle_mcp(&base_dir).await,
        Some(Commands::Paths {
            marketplace,
            plugin,
        }) => handle_paths(&base_dir, &marketplace, &plugin).await,
        Some(Commands::Install {
            marketplace,
            plugin,
            url,
        }) => handle_install(&base_dir, &marketplace, &plugin, url.as_deref()).await,
        Some(Commands::Uninstall {
            marketplace,
            plugin,
        }) => handle_uninstall(&base_dir, &marketplace, &plugin).await,
        Some(Commands::Config { action }) => handle_config(action, &base_dir),
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(())
        }
        None => {
            Cli::command().print_help().ok();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn resolve_base_dir(cli_base: Option<PathBuf>) -> PathBuf {
    if let Some(base) = cli_base {
        return base;
    }

    if let Ok(base) = std::env::var("PLUGIN_HUB_BASE") {
        return PathBuf::from(base);
    }

    default_base_dir().unwrap_or_else(|_| PathBuf::from(".plugin-hub"))
}

fn load_manager(base_dir: &Path) -> Result<PluginManager> {
    let config = Config::load(base_dir)?;
    Ok(PluginManager::from_config(base_dir, &config))
}

fn print_diagnostics(diagnostics: &[Diagnostic], quiet: bool) {
    if quiet {
        return;
    }
    for diagnostic in diagnostics {
        eprintln!("{} {}", "[WARN]".yellow().bold(), diagnostic);
    }
}

async fn handle_list(base_dir: &Path, quiet: bool) -> Result<()> {
    let manager = load_manager(base_dir)?;
    let report = manager.discover_installed_plugins().await;

    if report.items.is_empty() {
        println!("No installed plugins.");
    } else {
        println!();
        for plugin in &report.items {
            println!(
                "{} {}",
                plugin.source.cyan().bold(),
                plugin.version.as_deref().unwrap_or("").dimmed()
            );
            if let Some(description) = &plugin.description {
                println!("  {}", description);
            }
            println!("  {}", plugin.path.display().to_string().dimmed());
        }
        println!();
    }

    print_diagnostics(&report.diagnostics, quiet);
    Ok(())
}

async fn handle_available(base_dir: &Path, quiet: bool) -> Result<()> {
    let manager = load_manager(base_dir)?;
    let report = manager.discover_available_plugins().await;

    if report.items.is_empty() {
        println!("No plugins available to install.");
    } else {
        println!();
        for plugin in &report.items {
            println!(
                "{}:{}",
                plugin.marketplace.cyan(),
                plugin.name.cyan().bold()
            );
            if let Some(description) = &plugin.description {
                println!("  {}", description);
            }
            if let Some(category) = &plugin.category {
                println!("  {} {}", "category:".dimmed(), category);
            }
            if !plugin.tags.is_empty() {
                println!("  {} {}", "tags:".dimmed(), plugin.tags.join(", "));
            }
            println!("  {}", plugin.source_url.dimmed());
        }
        println!();
    }

    print_diagnostics(&report.diagnostics, quiet);
    Ok(())
}

async fn handle_mcp(base_dir: &Path) -> Result<()> {
    let manager = load_manager(base_dir)?;
    let records = manager.discover_plugin_mcp_servers().await;

    if records.is_empty() {
        println!("No MCP servers declared by installed plugins.");
        return Ok(());
    }

    println!();
    for record in records.iter() {
        println!("{}", record.source.cyan().bold());
        for (name, config) in &record.servers {
            println!("  {} {}", name.green(), config);
        }
    }
    println!();
    Ok(())
}

async fn handle_paths(base_dir: &Path, marketplace: &str, plugin: &str) -> Result<()> {
    let manager = load_manager(base_dir)?;
    let report = manager.discover_installed_plugins().await;

    let info = report
        .items
        .iter()
        .find(|p| p.marketplace == marketplace && p.name == plugin)
        .ok_or_else(|| PluginHubError::PluginNotFound {
            name: plugin.to_string(),
            marketplace: marketplace.to_string(),
        })?;

    let paths = manager.component_paths(info);
    println!("{} {}", "plugin:".dimmed(), info.path.display());
    println!("{} {}", "commands:".dimmed(), paths.commands.display());
    println!("{} {}", "skills:".dimmed(), paths.skills.display());
    println!("{} {}", "agents:".dimmed(), paths.agents.display());
    Ok(())
}

async fn handle_install(
    base_dir: &Path,
    marketplace: &str,
    plugin: &str,
    url: Option<&str>,
) -> Result<()> {
    let manager = load_manager(base_dir)?;

    let url = match url {
        Some(url) => url.to_string(),
        None => manager
            .discover_available_plugins()
            .await
            .items
            .into_iter()
            .find(|p| p.marketplace == marketplace && p.name == plugin)
            .map(|p| p.source_url)
            .ok_or_else(|| PluginHubError::PluginNotFound {
                name: plugin.to_string(),
                marketplace: marketplace.to_string(),
            })?,
    };

    println!("{} {}@{} from {}", "Installing".cyan(), plugin, marketplace, url);
    let entry = manager.install_plugin(marketplace, plugin, &url).await?;

    println!(
        "{} {}@{} {} -> {}",
        "Installed:".green(),
        plugin,
        marketplace,
        entry.version,
        entry.install_path.display()
    );
    if let Some(sha) = &entry.commit_sha {
        println!("  {} {}", "commit:".dimmed(), sha);
    }
    Ok(())
}

async fn handle_uninstall(base_dir: &Path, marketplace: &str, plugin: &str) -> Result<()> {
    let manager = load_manager(base_dir)?;

    match manager.uninstall_plugin(marketplace, plugin).await? {
        Some(entry) => println!(
            "{} {}@{} ({})",
            "Uninstalled:".green(),
            plugin,
            marketplace,
            entry.install_path.display()
        ),
        None => println!("{}@{} was not installed", plugin, marketplace),
    }
    Ok(())
}

fn handle_config(action: ConfigAction, base_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(base_dir)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(PluginHubError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(base_dir)?;
            config.set(&key, &value)?;
            config.save(base_dir)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(base_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            let path = Config::path(base_dir);
            println!("{}", path.display());
        }
        ConfigAction::Init => {
            let path = Config::init(base_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "plugin-hub", &mut io::stdout());
}
