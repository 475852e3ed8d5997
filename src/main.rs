// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::Level;

use droidget::colors::{progress_bar, separator, status_color, BOLD, BRIGHT_CYAN, DIM, GREEN, RESET};
use droidget::config::{config_path, Config};
use droidget::download::GroupId;
use droidget::error::{config_error, format_simple_error, replay_error, ErrorBuilder};
use droidget::filepicker::{DialogConfig, ExtensionFilter, SelectionType};
use droidget::notify::{
    ConsoleRenderer, DownloadRow, HttpIconFetcher, IconFetcher, MemoryRenderer,
    NotificationRenderer,
};
use droidget::replay::{run_script, ReplayReport, Script};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// droidget - download groups and notifications for F-Droid style repositories.
#[derive(Parser)]
#[command(name = "droidget")]
#[command(version = VERSION)]
#[command(about = "Download groups and notifications for F-Droid style repositories.")]
#[command(long_about = "droidget - F-Droid style package client core\n\n\
    Group id of a package:  droidget group-id org.fdroid.fdroid\n\
    Replay a session:       droidget replay session.json\n\
    Certificate hash:       droidget fingerprint cert.der\n\
    Find APK files:         droidget scan ~/Downloads --ext apk,obb\n\
    Configure:              droidget config show")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use this config file instead of ~/.droidget/config.json
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Quiet mode: only errors are logged
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Verbose mode: log every engine event and reconciler decision
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the download group id of a package
    ///
    /// Example:
    ///   droidget group-id org.fdroid.fdroid
    GroupId {
        /// Package name
        package: String,
    },

    /// Drive the in-memory engine from a JSON script and render notifications
    ///
    /// Examples:
    ///   droidget replay session.json
    ///   droidget replay session.json --json
    Replay {
        /// Script with apps and steps
        script: PathBuf,

        /// Print the final notifications and download rows as JSON
        #[arg(long)]
        json: bool,

        /// Fetch large icons over HTTP
        #[arg(long)]
        icons: bool,
    },

    /// Print the SHA-256 fingerprint of a DER certificate
    ///
    /// Example:
    ///   droidget fingerprint signer.der
    Fingerprint {
        /// DER-encoded certificate
        cert: PathBuf,
    },

    /// List files in a directory accepted by the extension filter
    ///
    /// Examples:
    ///   droidget scan /mnt/sdcard --ext apk,obb
    ///   droidget scan /mnt --dirs
    Scan {
        /// Directory to list (defaults to /mnt)
        dir: Option<PathBuf>,

        /// Accepted extensions, comma separated
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,

        /// Only list directories
        #[arg(long)]
        dirs: bool,
    },

    /// View or change configuration
    ///
    /// Examples:
    ///   droidget config show
    ///   droidget config set-active-downloads 5
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Number of files downloaded at the same time
    SetActiveDownloads { count: usize },

    /// Attempts per file before it is reported as failed
    SetRetries { attempts: u32 },

    /// HTTP proxy, omit to clear
    SetProxy { proxy: Option<String> },

    /// Install completed downloads without asking
    SetPrivilegedInstall {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Where downloaded files land
    SetDownloadDir { dir: PathBuf },

    /// Add a package to the blacklist, or remove it if already listed
    Blacklist { package: String },
}

fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.verbose || config.debug {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let path = cli.config.clone().unwrap_or_else(config_path);

    let config = match Config::load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", config_error(&path, &e));
            std::process::exit(1);
        }
    };
    init_tracing(&cli, &config);

    if let Err(e) = run(cli.command, config, &path) {
        eprintln!("{}", format_simple_error(&format!("{:#}", e)));
        std::process::exit(1);
    }
}

fn run(command: Commands, config: Config, config_file: &Path) -> Result<()> {
    match command {
        Commands::GroupId { package } => {
            println!("{}", GroupId::for_package(&package));
        }
        Commands::Replay { script, json, icons } => {
            // The blocking HTTP client must be built and dropped outside the runtime
            let fetcher: Option<Arc<dyn IconFetcher>> = if icons {
                Some(Arc::new(HttpIconFetcher::new(config.proxy.as_deref())?))
            } else {
                None
            };
            let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
            let replayed = runtime.block_on(handle_replay(&script, json, fetcher.clone(), &config));
            drop(runtime);
            if let Err(e) = replayed {
                eprintln!("{}", replay_error(&script, &e));
                std::process::exit(1);
            }
        }
        Commands::Fingerprint { cert } => {
            println!("{}", droidget::cert::fingerprint_file(&cert)?);
        }
        Commands::Scan { dir, ext, dirs } => {
            handle_scan(dir, ext, dirs)?;
        }
        Commands::Config { command } => {
            handle_config(command, config, config_file)?;
        }
    }
    Ok(())
}

async fn handle_replay(
    script: &Path,
    json: bool,
    fetcher: Option<Arc<dyn IconFetcher>>,
    config: &Config,
) -> Result<()> {
    let script = Script::load(script)?;

    let renderer: Arc<dyn NotificationRenderer> = if json {
        Arc::new(MemoryRenderer::new())
    } else {
        Arc::new(ConsoleRenderer)
    };

    let report = run_script(&script, config, renderer, fetcher).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ReplayReport) {
    println!();
    println!("{BRIGHT_CYAN}{BOLD}=== Downloads ({} steps) ==={RESET}", report.steps);
    if report.rows.is_empty() {
        println!("  {DIM}(none){RESET}");
    }
    for row in &report.rows {
        print_row(row);
    }
    println!("{}", separator(40));
    println!("  Notifications on screen: {}", report.notifications.len());
    println!();
}

fn print_row(row: &DownloadRow) {
    let color = status_color(row.state);
    println!("  {BOLD}{}{RESET} {}{}{RESET}", row.title, color, row.status);
    println!("    {}  {}", progress_bar(row.progress, 20), row.size);
    if !row.speed.is_empty() || !row.eta.is_empty() {
        println!("    {DIM}{} {}{RESET}", row.speed, row.eta);
    }
    println!("    {DIM}{}{RESET}", row.path);
}

fn handle_scan(dir: Option<PathBuf>, ext: Vec<String>, dirs_only: bool) -> Result<()> {
    let mut dialog = DialogConfig::default().with_extensions(ext);
    if dirs_only {
        dialog.selection_type = SelectionType::Dir;
    }
    let dir = dir.unwrap_or_else(|| dialog.root.clone());
    let filter = ExtensionFilter::new(&dialog);

    for path in filter.list(&dir)? {
        if path.is_dir() {
            println!("{}/", path.display().to_string().cyan());
        } else {
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn handle_config(command: Option<ConfigCommands>, mut config: Config, path: &Path) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{BRIGHT_CYAN}{BOLD}=== droidget Configuration ==={RESET}");
            println!();
            println!("  Active downloads:   {}", config.active_downloads);
            println!("  Retry attempts:     {}", config.auto_retry_max_attempts);
            println!("  Retry on network:   {}", config.retry_on_network_gain);
            println!("  Progress interval:  {} ms", config.progress_interval_ms);
            println!("  Hash check:         {}", config.hash_check);
            println!("  Privileged install: {}", config.privileged_install);
            println!("  Sync group id:      {}", config.sync_group_id);
            println!("  Bundle retention:   {} s", config.bundle_retention_secs);
            println!("  Download dir:       {}", config.download_dir.display());
            println!(
                "  Proxy:              {}",
                config.proxy.as_deref().unwrap_or(&format!("{DIM}(not set){RESET}"))
            );
            if config.blacklist.is_empty() {
                println!("  Blacklist:          {DIM}(empty){RESET}");
            } else {
                let listed: Vec<&str> = config.blacklist.iter().collect();
                println!("  Blacklist:          {}", listed.join(", "));
            }
            println!();
            println!("Config file: {}", path.display());
            println!();
            return Ok(());
        }
        Some(ConfigCommands::SetActiveDownloads { count }) => {
            config.active_downloads = count;
        }
        Some(ConfigCommands::SetRetries { attempts }) => {
            config.auto_retry_max_attempts = attempts;
        }
        Some(ConfigCommands::SetProxy { proxy }) => {
            config.proxy = proxy;
        }
        Some(ConfigCommands::SetPrivilegedInstall { enabled }) => {
            config.privileged_install = enabled;
        }
        Some(ConfigCommands::SetDownloadDir { dir }) => {
            config.download_dir = dir;
        }
        Some(ConfigCommands::Blacklist { package }) => {
            let listed = config.blacklist.toggle(&package);
            let verb = if listed { "added to" } else { "removed from" };
            println!("{} {} blacklist", package, verb);
        }
    }

    if let Err(e) = config.save_to(path) {
        let msg = ErrorBuilder::new("Failed to save configuration")
            .cause(format!("{:#}", e))
            .fix(format!("Check that {} is writable", path.display()))
            .build();
        eprintln!("{}", msg);
        std::process::exit(1);
    }
    println!("{GREEN}[✓]{RESET} Configuration saved");
    Ok(())
}
