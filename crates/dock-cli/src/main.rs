//! plugdock CLI
//!
//! Thin command surface over the orchestration core. Notifications from
//! the core are streamed to the terminal while commands run.

mod cli;
mod error;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use dock_core::{AppContext, Notification, PluginStatus, Severity};
use dock_pm::UvCli;
use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands, EnvAction};
use error::{CliError, Result};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing if verbose
    if cli.verbose {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| CliError::user(format!("failed to set tracing subscriber: {e}")))?;
        tracing::debug!("Verbose mode enabled");
    }

    let root = std::fs::canonicalize(&cli.root)?;
    let (ctx, notifications) = AppContext::new(&root, Arc::new(UvCli::new()))?;
    let printer = tokio::spawn(print_notifications(notifications));

    let result = match cli.command {
        Some(cmd) => execute_command(&ctx, cmd).await,
        None => {
            println!("{} plugin aggregator", "plugdock".green().bold());
            println!();
            println!("Run {} for available commands.", "plugdock --help".cyan());
            Ok(())
        }
    };

    // Let queued notifications drain before exiting
    tokio::time::sleep(Duration::from_millis(100)).await;
    printer.abort();
    result
}

async fn execute_command(ctx: &Arc<AppContext>, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::List => cmd_list(ctx),
        Commands::Start { name, watch } => cmd_start(ctx, &name, watch).await,
        Commands::Stop { name } => cmd_stop(ctx, &name).await,
        Commands::Uninstall { name } => cmd_uninstall(ctx, &name).await,
        Commands::Deps { name } => cmd_deps(ctx, &name),
        Commands::Sync => cmd_sync(ctx).await,
        Commands::Install { spec } => {
            ctx.install_package(&spec).await?;
            Ok(())
        }
        Commands::Packages => cmd_packages(ctx).await,
        Commands::Envs { refresh } => cmd_envs(ctx, refresh).await,
        Commands::Env { action } => match action {
            EnvAction::Create { name, python } => {
                ctx.create_environment(&name, python.as_deref()).await?;
                Ok(())
            }
            EnvAction::Delete { name } => {
                ctx.delete_environment(&name).await?;
                Ok(())
            }
            EnvAction::Use { name } => {
                ctx.set_current_environment(&name)?;
                Ok(())
            }
        },
    }
}

fn cmd_list(ctx: &AppContext) -> Result<()> {
    let plugins = ctx.plugins();
    if plugins.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }
    for plugin in plugins {
        println!(
            "{} {} {} {} {}",
            plugin.icon,
            plugin.name.bold(),
            format!("v{}", plugin.version).dimmed(),
            status_badge(plugin.status),
            plugin.description.dimmed(),
        );
    }
    Ok(())
}

async fn cmd_start(ctx: &Arc<AppContext>, name: &str, watch: bool) -> Result<()> {
    if !ctx.start_plugin(name).await? {
        return Err(CliError::user(format!("{name} was not started")));
    }
    println!("{} {name}", "started".green());

    if watch {
        println!("{}", "watching; press Ctrl-C to stop the plugin".dimmed());
        tokio::signal::ctrl_c().await?;
        ctx.stop_plugin(name).await?;
    }
    Ok(())
}

async fn cmd_stop(ctx: &AppContext, name: &str) -> Result<()> {
    if ctx.stop_plugin(name).await? {
        println!("{} {name}", "stopped".green());
    } else {
        println!("{name} is not running");
    }
    Ok(())
}

async fn cmd_uninstall(ctx: &AppContext, name: &str) -> Result<()> {
    if ctx.uninstall_plugin(name).await? {
        println!("{} {name}", "uninstalled".green());
    } else {
        return Err(CliError::user(format!("could not uninstall {name}")));
    }
    Ok(())
}

fn cmd_deps(ctx: &AppContext, name: &str) -> Result<()> {
    let constraints = ctx.plugin_dependencies(name)?;
    if constraints.is_empty() {
        println!("{name} declares no dependencies");
        return Ok(());
    }
    for constraint in constraints {
        println!(
            "{}{}  {}",
            constraint.package.bold(),
            constraint.specifier,
            format!("(from {})", constraint.source_plugin).dimmed()
        );
    }
    Ok(())
}

async fn cmd_sync(ctx: &AppContext) -> Result<()> {
    ctx.sync_dependencies().await?;
    println!("{}", "dependencies in sync".green());
    Ok(())
}

async fn cmd_packages(ctx: &AppContext) -> Result<()> {
    let packages = ctx.installed_packages().await?;
    if packages.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }
    for package in packages {
        println!("{} {}", package.name.bold(), package.version.dimmed());
    }
    Ok(())
}

async fn cmd_envs(ctx: &AppContext, refresh: bool) -> Result<()> {
    let envs = if refresh {
        ctx.refresh_environments().await?
    } else {
        ctx.environments()
    };
    if envs.is_empty() {
        println!("No environments known. Create one with {}", "plugdock env create <name>".cyan());
        return Ok(());
    }
    for env in envs {
        let marker = if env.is_active { "*".green().bold() } else { " ".normal() };
        println!(
            "{marker} {} {} {} packages, {:.1} MiB",
            env.name.bold(),
            env.python_version.dimmed(),
            env.packages_count,
            env.size_bytes as f64 / (1024.0 * 1024.0),
        );
    }
    Ok(())
}

fn status_badge(status: PluginStatus) -> colored::ColoredString {
    match status {
        PluginStatus::Stopped => "stopped".dimmed(),
        PluginStatus::Starting => "starting".yellow(),
        PluginStatus::Running => "running".green(),
        PluginStatus::Stopping => "stopping".yellow(),
        PluginStatus::Error => "error".red(),
    }
}

async fn print_notifications(mut notifications: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = notifications.recv().await {
        let tag = match notification.severity {
            Severity::Info => notification.title.cyan(),
            Severity::Warning => notification.title.yellow(),
            Severity::Error => notification.title.red().bold(),
        };
        eprintln!("[{tag}] {}", notification.message);
    }
}
