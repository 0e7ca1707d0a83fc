//! tilde CLI library
//!
//! Argument parsing and command dispatch for the `tilde` binary, kept in a
//! library so the commands can be driven from tests.

pub mod cmd;
pub mod command;
pub mod common;
pub mod error;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tilde_config::Config;
use tilde_core::Umask;
use tracing::debug;

use command::Command;
use common::{GlobalOptions, ResolvedPaths, RuntimeContext};

/// tilde - manage your dotfiles
#[derive(Parser)]
#[command(name = "tilde")]
#[command(about = "Manage your dotfiles with tilde")]
#[command(version)]
#[command(long_about = "Manage your dotfiles with tilde

The source directory describes the desired state of your home directory.
Entry names carry attributes as prefixes and suffixes: dot_bashrc becomes
.bashrc, private_dot_ssh a private .ssh directory, executable_ a file with
execute permission, and a .tmpl suffix marks a template.")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Path to the source directory
    #[arg(long, global = true, env = "TILDE_SOURCE_DIR", value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Path to the destination directory (usually $HOME)
    #[arg(long, global = true, env = "TILDE_DEST_DIR", value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Path to the config file
    #[arg(long, global = true, env = "TILDE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the persistent state database
    #[arg(
        long = "state",
        global = true,
        env = "TILDE_STATE_FILE",
        value_name = "FILE"
    )]
    pub state_file: Option<PathBuf>,

    /// Enable verbose output (shows DEBUG level logs and every system call)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to a file
    #[arg(long, global = true, env = "TILDE_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Continue with the next target after an error
    #[arg(short, long, global = true)]
    pub keep_going: bool,

    /// Overwrite targets that changed since tilde last wrote them
    #[arg(long, global = true)]
    pub force: bool,

    /// Show what would change without changing anything
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for tilde CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Add targets to the source directory
    Add(cmd::add::AddCommand),

    /// Apply the source state to the destination
    Apply(cmd::apply::ApplyCommand),

    /// Print the target contents of files, scripts and symlinks
    Cat(cmd::cat::CatCommand),

    /// Change the attributes of targets
    Chattr(cmd::chattr::ChattrCommand),

    /// Print the template data
    Data(cmd::data::DataCommand),

    /// Show the status of managed targets
    Status(cmd::status::StatusCommand),

    /// Inspect or reset the persistent state
    #[command(subcommand)]
    State(StateCommands),
}

/// Persistent state commands
#[derive(Subcommand)]
pub enum StateCommands {
    /// Print every bucket
    Dump {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: cmd::Format,
    },

    /// Forget what was written and which scripts ran
    Reset {
        /// Only delete this bucket
        #[arg(long)]
        bucket: Option<String>,
    },
}

/// Main entry point for the CLI logic
///
/// # Errors
///
/// Returns an error if logging cannot be set up or the command fails
pub fn run(cli: Cli) -> Result<()> {
    tilde_config::logging::init(cli.verbose, cli.log_file.as_deref())
        .context("Failed to initialize logging")?;
    execute(cli)
}

/// Resolve configuration and run the command, without touching logging
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails
pub fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let paths = determine_paths(&cli, &config)?;
    let umask = match config.umask()? {
        Some(umask) => umask,
        None => Umask::probe(),
    };
    let options = GlobalOptions {
        keep_going: cli.keep_going || config.general.keep_going,
        force: cli.force,
        dry_run: cli.dry_run,
        verbose: cli.verbose,
    };
    debug!(
        source = %paths.source_dir,
        dest = %paths.dest_dir,
        state = %paths.state_file.display(),
        umask = %umask,
        "Resolved paths"
    );

    let context = RuntimeContext::new(config, paths, umask, options)?;
    execute_command(cli.command, &context)
}

fn load_config(cli: &Cli) -> Result<Config> {
    match cli.config.clone().or_else(tilde_config::default_config_file) {
        Some(path) => Config::load_or_default(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Determine source, destination and state paths from CLI and config
fn determine_paths(cli: &Cli, config: &Config) -> Result<ResolvedPaths> {
    let source_dir = cli
        .source
        .clone()
        .or_else(|| config.general.source_dir.clone())
        .or_else(tilde_config::default_source_dir)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Could not determine source directory. Please specify with --source or set in config file."
            )
        })?;

    let dest_dir = cli
        .dest
        .clone()
        .or_else(|| config.general.dest_dir.clone())
        .or_else(::dirs::home_dir)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Could not determine destination directory (home directory not found). \
                 Please specify with --dest or set in config file."
            )
        })?;

    let state_file = cli
        .state_file
        .clone()
        .or_else(tilde_config::default_state_file)
        .ok_or_else(|| {
            anyhow::anyhow!("Could not determine persistent state file. Please specify with --state.")
        })?;

    Ok(ResolvedPaths::resolve(&source_dir, &dest_dir, &state_file)?)
}

/// Execute the command based on the command type
fn execute_command(command: Commands, context: &RuntimeContext) -> Result<()> {
    match command {
        Commands::Add(add_cmd) => add_cmd.execute(context)?,
        Commands::Apply(apply_cmd) => apply_cmd.execute(context)?,
        Commands::Cat(cat_cmd) => cat_cmd.execute(context)?,
        Commands::Chattr(chattr_cmd) => chattr_cmd.execute(context)?,
        Commands::Data(data_cmd) => data_cmd.execute(context)?,
        Commands::Status(status_cmd) => status_cmd.execute(context)?,
        Commands::State(StateCommands::Dump { format }) => cmd::state::dump(context, format)?,
        Commands::State(StateCommands::Reset { bucket }) => {
            cmd::state::reset(context, bucket.as_deref())?;
        }
    }
    Ok(())
}
