//! CLI argument parsing using clap derive

use clap::{Parser, Subcommand};

/// plugdock - run and manage plugin bundles in shared environments
#[derive(Parser, Debug)]
#[command(name = "plugdock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project root holding config.toml, plugins/ and envs/
    #[arg(long, default_value = ".")]
    pub root: String,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List discovered plugins and their status
    List,

    /// Start a plugin (syncs dependencies first)
    Start {
        /// Plugin name
        name: String,
        /// Keep attached, streaming notifications until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Stop a running plugin
    Stop {
        /// Plugin name
        name: String,
    },

    /// Uninstall a plugin (stops it first if running)
    Uninstall {
        /// Plugin name
        name: String,
    },

    /// Show the dependency constraints a plugin declares
    Deps {
        /// Plugin name
        name: String,
    },

    /// Resolve and sync all plugin dependencies into the active environment
    Sync,

    /// Install one package into the active environment
    Install {
        /// Package spec, e.g. `psutil` or `psutil>=7.1.0`
        spec: String,
    },

    /// List packages installed in the active environment
    Packages,

    /// List managed environments
    Envs {
        /// Rescan environments on disk instead of using the cached list
        #[arg(long)]
        refresh: bool,
    },

    /// Manage environments
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
}

/// Environment subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum EnvAction {
    /// Create a new environment
    Create {
        /// Environment name
        name: String,
        /// Python version to pin (defaults to the configured one)
        #[arg(short, long)]
        python: Option<String>,
    },

    /// Delete an environment
    Delete {
        /// Environment name
        name: String,
    },

    /// Make an environment the active one
    Use {
        /// Environment name
        name: String,
    },
}
