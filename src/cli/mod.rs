pub mod apps;
pub mod daemon_path;
pub mod output;
pub mod process;
pub mod settings;

use std::path::PathBuf;

use anyhow::Result;
use apps::{process_apps_command, process_classify_command, AppsCommand, ClassifyCommand};
use clap::{Parser, Subcommand};
use output::{print_report, print_status};
use process::{kill_previous_servers, restart_server};
use settings::{process_settings_command, SettingsCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{start_daemon, storage::documents::DataFiles},
    utils::{
        clock::{Clock, DefaultClock},
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "backtowork", version, long_about = None)]
#[command(about = "Earn points by working, spend them on entertainment", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {},
    #[command(about = "Run a daemon directly in current console. Used for debugging")]
    Serve {},
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Show the balance and what the daemon is doing")]
    Status {},
    #[command(about = "Show daily reports")]
    Report {
        #[arg(long, short, default_value_t = 7, help = "Number of most recent days to show")]
        days: usize,
    },
    #[command(about = "Manage productivity, entertainment and neutral keywords")]
    Apps {
        #[command(subcommand)]
        command: AppsCommand,
    },
    #[command(about = "Show how an application would be classified")]
    Classify {
        #[command(flatten)]
        command: ClassifyCommand,
    },
    #[command(about = "Show or change settings. A running daemon applies them on restart")]
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => ensure_dir(std::path::absolute(dir)?)?,
        None => create_application_default_path()?,
    };
    let files = DataFiles::new(dir.clone())?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &files.logs(), logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => restart_server(&dir),
        Commands::Stop {} => {
            let stopped = kill_previous_servers()?;
            println!("Stopped {stopped} daemon(s)");
            Ok(())
        }
        Commands::Serve {} => start_daemon(dir).await,
        Commands::Status {} => {
            let status = files.status().peek().await?;
            let ledger = files.points().peek().await?.unwrap_or_default();
            let reports = files.daily_reports().peek().await?.unwrap_or_default();
            print_status(status.as_ref(), &ledger, &reports, DefaultClock.today());
            Ok(())
        }
        Commands::Report { days } => {
            let reports = files.daily_reports().peek().await?.unwrap_or_default();
            print_report(&reports, days);
            Ok(())
        }
        Commands::Apps { command } => process_apps_command(&files, command).await,
        Commands::Classify { command } => process_classify_command(&files, command).await,
        Commands::Settings { command } => process_settings_command(&files, command).await,
    }
}
