/// The daemon's main loop
mod app;
/// Definition of command-line args
mod args;
/// Finding finished runs and their sample sheets
mod discover;
/// External command execution
mod exec;
/// Filesystem operations
mod fs;
/// Inventory management behind `flowcell-manager`
mod manager;
/// Finished, finalized and error messages
mod notify;
/// Combined command-line and config file run settings
mod settings;
/// SIGHUP-interruptible sleep
mod sleeper;
/// The processing stages and their sequencing
mod stages;
/// Text UI
mod ui;

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use manager::{Listing, Manager};

// exported for tests:
pub use app::{App, PassOutcome};
pub use args::{Args, ManagerArgs, ManagerCommand};
pub use notify::{Kind, Message, Notifier};
pub use settings::Settings;

/// Run the daemon.
pub fn run() -> Result<()> {
    let args = Args::parse();
    let settings: Settings = args.try_into()?;
    init_logging(settings.verbose, settings.log_file.as_deref())?;
    log::info!("using config {:?}", settings.config_path);

    let app = App::new(settings);
    app.run()
}

/// Run the inventory management tool.
pub fn run_manager() -> Result<()> {
    let args = ManagerArgs::parse();
    init_logging(args.verbose, None)?;
    let config = settings::manager_config(&args)?;
    run_manager_command(&config, &args.command, args.verbose > 0)
}

/// Dispatch one `flowcell-manager` subcommand against the configured ledger.
pub fn run_manager_command(
    config: &flowcell::StaticConfig,
    command: &ManagerCommand,
    verbose: bool,
) -> Result<()> {
    let fs = fs::Fs::new([&config.paths.output_dir, &config.paths.manager_dir], false);
    let ledger = ledger::Ledger::open(&config.ledger_path())?;

    let force = match command {
        ManagerCommand::Archive { force, .. } | ManagerCommand::Rerun { force, .. } => *force,
        _ => false,
    };
    let ui = ui::Ui::new(verbose, force);
    let mut manager = Manager::new(ledger, &fs, &ui);

    let listing = match command {
        ManagerCommand::Add {
            project,
            path,
            timestamp,
        } => {
            manager.add(project, path, *timestamp)?;
            let ledger = manager.ledger();
            log::info!("{:?} has {} rows", ledger.path(), ledger.entries().len());
            return Ok(());
        }
        ManagerCommand::Archive { flowcell, .. } => {
            manager.archive(flowcell)?;
            return Ok(());
        }
        ManagerCommand::Rerun { flowcell, .. } => {
            manager.rerun(flowcell)?;
            return Ok(());
        }
        ManagerCommand::List => Listing::All,
        ManagerCommand::ListProcessed => Listing::Processed,
        ManagerCommand::ListProject { project } => Listing::Project(project.clone()),
        ManagerCommand::ListFlowcell { flowcell } => Listing::Flowcell(flowcell.clone()),
    };

    let entries = manager.listing(&listing)?;
    manager::print_entries(&mut std::io::stdout().lock(), entries)?;
    Ok(())
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let log_level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    match log_file {
        Some(path) => simple_logging::log_to_file(path, log_level)?,
        None => simple_logging::log_to_stderr(log_level),
    }
    Ok(())
}
