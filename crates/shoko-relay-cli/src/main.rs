use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, config, daemon, export, map, sync_watched, vfs};
use shoko_relay_config::PathManager;
use std::path::PathBuf;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "shoko-relay")]
#[command(about = "Shoko Relay - Plex layout and watched state for a Shoko collection")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Read series and watch state from a snapshot directory instead of Shoko
    #[arg(long, global = true, value_name = "DIR")]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how the files of a series map onto Plex seasons and episodes
    #[command(long_about = "Build the file mappings of one Shoko series and print them. Use --trace to see every step of the mapping decision for each file, or --metadata to print the Plex metadata documents the series would be served as.")]
    Map {
        /// Shoko series id
        series_id: u64,

        /// Print the per-file decision trace and save it as a report
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "metadata")]
        trace: bool,

        /// Print Plex metadata JSON (series, seasons, or the episodes of --season)
        #[arg(long, action = ArgAction::SetTrue)]
        metadata: bool,

        /// Limit output to one Plex season number
        #[arg(long, allow_negative_numbers = true)]
        season: Option<i32>,
    },
    /// Build the symlinked Plex folder layout for one or more series
    #[command(long_about = "Create the virtual file system: one folder per series with Plex season folders holding symlinks to the real files. Without series ids every series in the collection is linked.")]
    Vfs {
        /// Shoko series ids (defaults to every series)
        series: Vec<u64>,

        /// Show the planned links without touching the disk
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,

        /// Keep existing series folders instead of removing them before relinking
        #[arg(long, action = ArgAction::SetTrue)]
        no_clean: bool,
    },
    /// Copy Plex watched state into Shoko (one-time run)
    #[command(long_about = "Mark episodes watched in Shoko for every item the Plex admin (and configured extra users) have watched in the Shoko Relay library section. Every decision is recorded in an audit report under the data directory.")]
    SyncWatched {
        /// Evaluate everything but write nothing to Shoko
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,

        /// Only sync the Plex admin account
        #[arg(long, action = ArgAction::SetTrue)]
        admin_only: bool,

        /// Only look at items viewed within this many hours
        #[arg(long, value_name = "HOURS")]
        lookback_hours: Option<u32>,

        /// Print the last saved report instead of running a sync
        #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["dry_run", "admin_only", "lookback_hours"])]
        last: bool,
    },
    /// Run the watched sync on a schedule
    #[command(long_about = "Run Shoko Relay in the foreground and sync watched state according to the configured cron schedule. An initial sync runs on startup unless --no-startup-sync is given. Stop with Ctrl-C.")]
    Daemon {
        /// Cron schedule with seconds (e.g. '0 0 */6 * * *' for every 6 hours)
        #[arg(long, value_name = "SCHEDULE")]
        schedule: Option<String>,

        /// Skip initial sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,

        /// Write logs to the daily rotating daemon log file instead of stderr
        #[arg(long, action = ArgAction::SetTrue)]
        log_to_file: bool,
    },
    /// Save Shoko series as snapshot files for offline use
    #[command(long_about = "Fetch series from Shoko and write one JSON snapshot per series. Snapshots can be used with --snapshot by every other command.")]
    Export {
        /// Shoko series ids (defaults to every series)
        series: Vec<u64>,

        /// Target directory (defaults to the data directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Configure credentials and settings
    #[command(long_about = "Manage configuration and credentials for Shoko Relay. Tokens and API keys are kept in credentials.toml next to config.toml.")]
    Config {
        #[command(subcommand)]
        cmd: Option<ConfigCommands>,
    },
    /// Clear stored reports or credentials
    #[command(long_about = "Remove saved watched-sync reports and mapping traces, stored credentials, or both.")]
    Clear {
        /// Clear reports and credentials
        #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["reports", "credentials"])]
        all: bool,

        /// Clear saved reports and traces
        #[arg(long, action = ArgAction::SetTrue)]
        reports: bool,

        /// Clear stored credentials
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration (masks sensitive data)
    Show {
        /// Show secrets unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },

    /// Configure the Plex server, library section and tokens
    #[command(long_about = "Configure the Plex server that hosts the Shoko Relay library. With --user the token is stored for that extra (managed or home) user and the user is added to the watched sync.")]
    Plex {
        /// Plex token (if not provided, will prompt)
        #[arg(long)]
        token: Option<String>,

        /// Plex server URL
        #[arg(long)]
        server_url: Option<String>,

        /// Key of the library section holding the Shoko Relay shows
        #[arg(long)]
        library_section: Option<String>,

        /// Store the token for this extra Plex user instead of the admin
        #[arg(long)]
        user: Option<String>,
    },

    /// Configure the Shoko server and API key
    Shoko {
        /// Shoko API key (if not provided, will prompt)
        #[arg(long)]
        api_key: Option<String>,

        /// Shoko server URL
        #[arg(long)]
        server_url: Option<String>,
    },

    /// Check the configuration file and stored credentials
    Validate,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Daemon { log_to_file: true, .. } => Some(PathManager::default().daemon_log_file()),
        _ => None,
    };
    logging::init_logging_with_file(cli.verbose, cli.quiet, log_file)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);
    let snapshot = cli.snapshot;

    match cli.command {
        Commands::Map {
            series_id,
            trace,
            metadata,
            season,
        } => map::run_map(series_id, trace, metadata, season, snapshot, &output).await,
        Commands::Vfs {
            series,
            dry_run,
            no_clean,
        } => vfs::run_vfs(series, dry_run, no_clean, snapshot, &output).await,
        Commands::SyncWatched {
            dry_run,
            admin_only,
            lookback_hours,
            last,
        } => {
            if last {
                sync_watched::show_last_report(&output)
            } else {
                sync_watched::run_sync_watched(dry_run, admin_only, lookback_hours, snapshot, &output).await
            }
        }
        Commands::Daemon {
            schedule,
            no_startup_sync,
            ..
        } => daemon::run_daemon(schedule, no_startup_sync, snapshot, &output).await,
        Commands::Export { series, dir } => export::run_export(series, dir, &output).await,
        Commands::Config { cmd } => {
            let cmd = cmd.unwrap_or(ConfigCommands::Show { full: false });
            config::run_config(cmd, &output).await
        }
        Commands::Clear {
            all,
            reports,
            credentials,
        } => clear::run_clear(all, reports, credentials, &output),
    }
}
