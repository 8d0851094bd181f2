use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ledger::Stamp;

const CMD_NAME: &str = "bfq";
const MANAGER_CMD_NAME: &str = "flowcell-manager";
pub const DEFAULT_CONFIG: &str = "/config/bcl2fastq.ini";

/// Stores the daemon's command-line args format.
#[derive(Parser, Debug)]
#[command(name = CMD_NAME, version, about = "Process finished sequencing runs", long_about = None)]
pub struct Args {
    /// Config file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    #[arg(env = "BFQ_CONFIG")]
    pub config: PathBuf,

    /// Print additional info (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Do one scan of the instrument dirs, then exit
    #[arg(long)]
    pub once: bool,

    /// Log to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Convert with bcl2fastq instead of bcl-convert
    #[arg(long, env = "FORCE_BCL2FASTQ")]
    pub force_bcl2fastq: bool,

    /// Test flowcell whose stats were made by bcl2fastq
    #[arg(long, env = "BFQ_TEST")]
    pub test_fixture: bool,

    /// Scratch space for per-project analysis
    #[arg(long, value_name = "DIR", env = "TMPDIR")]
    pub scratch_dir: Option<PathBuf>,
}

/// Stores the management tool's command-line args format.
#[derive(Parser, Debug)]
#[command(name = MANAGER_CMD_NAME, version, about = "Manage the inventory of processed flowcells", long_about = None)]
pub struct ManagerArgs {
    /// Config file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    #[arg(env = "BFQ_CONFIG")]
    pub config: PathBuf,

    /// Print additional info (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: ManagerCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ManagerCommand {
    /// Add a project to the inventory file
    Add {
        /// GCF project number
        project: String,
        /// Flowcell path
        path: PathBuf,
        /// ISO date and time, e.g. 2024-04-16T08:00:00
        timestamp: Stamp,
    },
    /// Archive the flowcell by deleting fastq files and .7za archives
    Archive {
        /// Path to flowcell to be archived
        flowcell: PathBuf,
        /// Don't ask for confirmation
        #[arg(long)]
        force: bool,
    },
    /// Rerun the flowcell by deleting the output directory
    Rerun {
        /// Path to flowcell to be deleted
        flowcell: PathBuf,
        /// Don't ask for confirmation
        #[arg(long)]
        force: bool,
    },
    /// List all flowcells
    List,
    /// List only flowcells processed by bfq
    ListProcessed,
    /// List processed flowcells of one project
    ListProject {
        project: String,
    },
    /// List processed rows of one flowcell
    ListFlowcell {
        flowcell: PathBuf,
    },
}
