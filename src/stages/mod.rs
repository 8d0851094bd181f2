use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context as _, Result};

use flowcell::{project_names, RunContext, StaticConfig};
use util::Timer;

use crate::exec::Runner;
use crate::fs::{paths, Fs};
use crate::ui::Ui;

/// BCL to FASTQ conversion
mod convert;
pub use convert::Convert;

/// Normalizing converter file names
mod rename;
pub use rename::Rename;

/// Read deduplication
mod dedup;
pub use dedup::Dedup;

/// Trimming, decontamination and read quality
mod qc;
pub use qc::Qc;

/// md5 sums of fastqs and archives
mod checksum;
pub use checksum::{ArchiveChecksum, FastqChecksum};

/// Per-project analysis workflow
mod analysis;
pub use analysis::Analysis;

/// Sequencer run statistics
mod stats;
pub use stats::Stats;

/// Per-project delivery archives
mod archive;
pub use archive::Archive;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No fastq files found under {0}")]
    NoFastqs(String),
    #[error("No read quality output for project {0}")]
    MissingQcOutput(String),
    #[error("Expected output not found: {0}")]
    MissingOutput(String),
}

/// What a stage needs to do its work on the current flowcell.
pub struct Context<'a> {
    pub config: &'a StaticConfig,
    pub run: &'a RunContext,
    pub fs: &'a Fs,
    pub runner: Runner<'a>,
    /// problems that didn't fail the flowcell but belong in the finished message
    notes: Mutex<Vec<String>>,
}

impl<'a> Context<'a> {
    pub fn new(config: &'a StaticConfig, run: &'a RunContext, fs: &'a Fs) -> Self {
        Self {
            config,
            run,
            fs,
            runner: Runner::new(config, fs),
            notes: Mutex::new(Vec::with_capacity(0)),
        }
    }

    pub fn output(&self) -> Result<&Path> {
        Ok(self.run.output_path()?)
    }

    /// Log file for `stage` of the current run.
    pub fn log(&self, stage: &str) -> PathBuf {
        paths::stage_log(&self.config.paths.log_dir, self.run.run_id(), stage)
    }

    pub fn note(&self, msg: String) {
        log::warn!("{}: {msg}", self.run.run_id());
        if let Ok(mut notes) = self.notes.lock() {
            notes.push(msg);
        }
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes.lock().map(|n| n.clone()).unwrap_or_default()
    }

    /// Every fastq in a project directory of the output, sorted.
    pub fn fastqs(&self) -> Result<Vec<PathBuf>> {
        let output = self.output()?;
        let mut found = self.fs.glob(output, "*/*.fastq.gz")?;
        found.extend(self.fs.glob(output, "*/*/*.fastq.gz")?);
        found.sort();
        Ok(found)
    }

    /// Projects with at least one fastq in the output.
    pub fn projects(&self) -> Result<Vec<String>> {
        let output = self.output()?;
        let fastqs = self.fastqs()?;
        let relative = fastqs.iter().filter_map(|f| f.strip_prefix(output).ok());
        Ok(project_names(relative).into_iter().collect())
    }

    pub fn project_fastqs(&self, project: &str) -> Result<Vec<PathBuf>> {
        self.fs.glob(self.output()?.join(project), "**/*.fastq.gz")
    }

    /// The project a file under the output belongs to.
    pub fn project_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(self.output().ok()?).ok()?;
        project_names([relative]).into_iter().next()
    }

    /// Fastqs grouped into read pairs, R2 files attached to their R1.
    pub fn read_pairs(&self) -> Result<Vec<ReadPair>> {
        Ok(ReadPair::group(self.fastqs()?))
    }
}

/// One R1 fastq and, for paired-end runs, its R2 mate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    pub r1: PathBuf,
    pub r2: Option<PathBuf>,
}

impl ReadPair {
    pub fn group(fastqs: Vec<PathBuf>) -> Vec<Self> {
        let mates: Vec<PathBuf> = fastqs.iter().filter_map(|f| mate_of(f)).collect();
        fastqs
            .into_iter()
            .filter(|f| !mates.contains(f))
            .map(|r1| {
                let r2 = mate_of(&r1).filter(|m| m.exists());
                Self { r1, r2 }
            })
            .collect()
    }

    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.r1).chain(self.r2.iter())
    }
}

/// `x_R1.fastq.gz` -> `x_R2.fastq.gz`
fn mate_of(fastq: &Path) -> Option<PathBuf> {
    let name = fastq.file_name()?.to_str()?;
    let idx = name.rfind("_R1")?;
    let mate = format!("{}_R2{}", &name[..idx], &name[idx + 3..]);
    Some(fastq.with_file_name(mate))
}

/// Quoted path, ready for a command template.
pub(crate) fn arg(path: &Path) -> String {
    crate::exec::quote(path)
}

/// One step of the pipeline.
///
/// A stage with a marker is skipped when its marker exists, and the marker is
/// written (with the returned text) only after `run` succeeds. Stages without
/// a marker decide for themselves what is already done.
pub trait Stage {
    fn name(&self) -> &'static str;

    fn marker(&self) -> Option<&'static str>;

    /// Do the work; the returned text goes into the marker file.
    fn run(&self, ctx: &Context) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Completed,
}

/// A fixed, ordered list of stages.
pub struct Sequencer {
    stages: Vec<Box<dyn Stage>>,
}

impl Sequencer {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Everything up to the finished message.
    pub fn processing() -> Self {
        Self::new(vec![
            Box::new(Convert),
            Box::new(Rename),
            Box::new(Dedup),
            Box::new(Qc),
            Box::new(FastqChecksum),
            Box::new(Analysis),
            Box::new(Stats),
        ])
    }

    /// Packaging for delivery, after the finished message.
    pub fn finalizing() -> Self {
        Self::new(vec![Box::new(Archive), Box::new(ArchiveChecksum)])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, stopping at the first failure.
    pub fn run(&self, ctx: &Context, ui: &Ui) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            outcomes.push(run_stage(stage.as_ref(), ctx, ui)?);
        }
        Ok(outcomes)
    }
}

pub fn run_stage(stage: &dyn Stage, ctx: &Context, ui: &Ui) -> Result<Outcome> {
    let run_id = ctx.run.run_id();
    let marker = match stage.marker() {
        Some(name) => Some(paths::marker(ctx.output()?, name)),
        None => None,
    };
    if let Some(marker) = &marker {
        if ctx.fs.exists(marker) {
            log::debug!("{run_id}: {} marker found, skipping", stage.name());
            ui.stage_skipped(run_id, stage.name());
            return Ok(Outcome::Skipped);
        }
    }

    ui.stage_started(run_id, stage.name());
    let timer = Timer::now();
    let content = stage
        .run(ctx)
        .with_context(|| format!("{} stage failed for {run_id}", stage.name()))?;
    if let Some(marker) = &marker {
        ctx.fs.write_file(marker, &content)?;
    }
    ui.stage_completed(run_id, stage.name(), timer.elapsed());
    Ok(Outcome::Completed)
}
