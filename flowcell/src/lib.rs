/// Immutable settings loaded once from the ini file
mod config;
pub use config::{Concurrency, Email, Paths, StaticConfig, System, DEFAULT_COMPLETION_FILES};

/// Per-flowcell mutable state
mod run;
pub use run::RunContext;

/// [CustomOptions] from the sample sheet
mod options;
pub use options::{read_custom_options, RunOptions};

/// Library prep kinds and what each implies for the pipeline
mod libprep;
pub use libprep::{ConverterFamily, Libprep, PrepPolicy, TenXKit};

/// Tool command templates
mod template;
pub use template::{Template, Vars};

/// Recognizing project identifiers in output paths
mod project;
pub use project::{project_id, project_names};

/// Marker, report and archive file names shared by the daemon and the manager.
pub mod names {
    pub const CONVERT_DONE: &str = "bcl.done";
    pub const FILES_RENAMED: &str = "files.renamed";
    pub const DEDUP_DONE: &str = "clumpify.done";
    pub const QC_DONE: &str = "qc.done";
    pub const ANALYSIS_DONE: &str = "analysis.made";
    pub const STATS_DONE: &str = "stats.made";
    pub const ARCHIVE_DONE: &str = "archive.made";
    pub const FLOWCELL_DONE: &str = "fastq.made";

    pub const SAMPLE_SHEET: &str = "SampleSheet.csv";
    pub const SUBMISSION_FORM: &str = "Sample-Submission-Form.xlsx";
    pub const LEDGER_FILE: &str = "flowcells.processed";
    pub const QC_PREFIX: &str = "QC_";
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No usable sample sheet or sample submission form found for {0}")]
    MissingSampleSheet(String),
    #[error("Config file is missing required value [{0}] {1}")]
    MissingConfigValue(&'static str, &'static str),
    #[error("Invalid value in config file [{0}] {1}: \"{2}\"")]
    InvalidConfigValue(&'static str, String, String),
    #[error("No command template configured for \"{0}\"")]
    UnknownCommand(String),
    #[error("Command template \"{0}\" uses undefined placeholder {{{1}}}")]
    UndefinedPlaceholder(String, String),
    #[error("No analysis pipeline configured for library prep \"{0}\"")]
    NoPipeline(String),
    #[error("Not a flowcell directory: {0}")]
    InvalidRunDir(String),
    #[error("No flowcell is currently being processed")]
    NoActiveRun,
    #[error(transparent)]
    Syntax(#[from] syntax::Error),
}
