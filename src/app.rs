use std::path::{Path, PathBuf};

use anyhow::Result;

use flowcell::{names, RunContext, StaticConfig};
use ledger::{Ledger, Stamp};
use util::Timer;

use crate::discover;
use crate::fs::{paths, Fs};
use crate::notify::{self, MailNotifier, Notifier};
use crate::settings::Settings;
use crate::sleeper::Sleeper;
use crate::stages::{Context, Sequencer};
use crate::ui::Ui;

const GIB: f64 = (1u64 << 30) as f64;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Insufficient free space in {0:?}: {1:.1} GiB free, {2:.1} GiB required")]
    InsufficientSpace(PathBuf, f64, f64),
}

/// What happened to one candidate flowcell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// already in the ledger, or its sample sheet isn't there yet
    Skipped,
    Finished,
}

/// Counts from one scan over the instrument dirs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    pub candidates: usize,
    pub finished: usize,
    pub failed: usize,
    /// the pass stopped early for lack of disk space
    pub aborted: bool,
}

impl PassOutcome {
    /// Delivering a flowcell can take many hours, so after one is delivered
    /// the next scan starts at once instead of after `sleeptime`.
    pub fn rescan_now(&self) -> bool {
        self.finished > 0 && !self.aborted
    }
}

/// The daemon: scans for finished runs and takes each through the stages,
/// one flowcell at a time.
pub struct App {
    settings: Settings,
    fs: Fs,
    ui: Ui,
    notifier: Box<dyn Notifier>,
    run: RunContext,
}

/// Dirs the daemon may write to.
pub fn writable_dirs(config: &StaticConfig) -> Vec<PathBuf> {
    let p = &config.paths;
    vec![
        p.output_dir.clone(),
        p.log_dir.clone(),
        p.report_dir.clone(),
        p.manager_dir.clone(),
        p.scratch_dir.clone(),
    ]
}

impl App {
    /// Create a new `App` that mails its messages.
    pub fn new(settings: Settings) -> Self {
        let fs = Fs::new(writable_dirs(&settings.config), false);
        let notifier = MailNotifier::new(settings.config.clone(), fs.clone());
        Self::with_notifier(settings, Box::new(notifier))
    }

    pub fn with_notifier(settings: Settings, notifier: Box<dyn Notifier>) -> Self {
        let fs = Fs::new(writable_dirs(&settings.config), false);
        let ui = Ui::new(settings.verbose > 0, true);
        Self {
            settings,
            fs,
            ui,
            notifier,
            run: RunContext::new(),
        }
    }

    /// Scan, process, sleep, forever; or a single scan with `--once`.
    pub fn run(mut self) -> Result<()> {
        if self.settings.once {
            let outcome = self.scan_pass()?;
            log::info!("single pass done: {:?}", outcome);
            return Ok(());
        }

        let mut sleeper = Sleeper::new()?;
        loop {
            match self.scan_pass() {
                Ok(outcome) if outcome.rescan_now() => continue,
                Ok(outcome) => log::debug!("pass done: {:?}", outcome),
                Err(e) => log::error!("scan failed: {e:#}"),
            }
            sleeper.sleep(self.settings.config.system.sleep);
        }
    }

    /// Look at every finished run once.
    pub fn scan_pass(&mut self) -> Result<PassOutcome> {
        // reopened every pass so flowcell-manager edits are seen:
        let mut ledger = Ledger::open(&self.settings.config.ledger_path())?;
        let candidates = discover::scan(&self.settings.config, &self.fs)?;
        self.ui
            .verbose_msg(&format!("{} finished runs found", candidates.len()));
        let mut outcome = PassOutcome {
            candidates: candidates.len(),
            ..PassOutcome::default()
        };

        for flowcell in &candidates {
            log::debug!("considering {:?}", flowcell);
            let result = self.process(flowcell, &mut ledger);
            match result {
                Ok(Processed::Finished) => outcome.finished += 1,
                Ok(Processed::Skipped) => {}
                Err(e) => {
                    outcome.failed += 1;
                    self.report_failure(&e);
                    if matches!(e.downcast_ref::<Error>(), Some(Error::InsufficientSpace(..))) {
                        outcome.aborted = true;
                    }
                }
            }
            self.run.reset();
            if outcome.aborted {
                break;
            }
        }
        Ok(outcome)
    }

    /// Take one flowcell as far as it will go.
    fn process(&mut self, flowcell: &Path, ledger: &mut Ledger) -> Result<Processed> {
        let timer = Timer::now();
        let config = &self.settings.config;
        self.run.begin(flowcell, &config.paths.output_dir)?;
        if discover::is_processed(ledger, &self.run)? {
            log::debug!("already processed: {}", self.run.run_id());
            return Ok(Processed::Skipped);
        }

        let lookup = discover::locate_sample_sheet(&self.run, &self.fs)?;
        let applied = self
            .run
            .apply_custom(lookup.options, lookup.sample_sheet, lookup.submission_form);
        match applied {
            Err(flowcell::Error::MissingSampleSheet(run_id)) => {
                log::info!("{run_id}: no sample sheet or submission form yet");
                return Ok(Processed::Skipped);
            }
            other => other?,
        }
        self.run.set_pipeline_from(config)?;
        check_free_space(config, &self.fs)?;

        let run = &self.run;
        let ctx = Context::new(config, run, &self.fs);
        Sequencer::processing().run(&ctx, &self.ui)?;
        notify::send_finished(self.notifier.as_ref(), &ctx, timer.elapsed())?;

        let finalize_timer = Timer::now();
        Sequencer::finalizing().run(&ctx, &self.ui)?;
        mark_finished(&ctx, ledger)?;
        let msg = notify::finalized(&ctx, finalize_timer.elapsed(), timer.elapsed())?;
        self.notifier.send(&msg)?;

        timer.log_elapsed(&format!("processing {}", run.run_id()));
        Ok(Processed::Finished)
    }

    fn report_failure(&self, err: &anyhow::Error) {
        let run_id = match self.run.run_id() {
            "" => "bfq",
            id => id,
        };
        self.ui.flowcell_failed(run_id, err);
        log::error!("{run_id}: {err:#}");
        let summary = match err.downcast_ref::<Error>() {
            Some(Error::InsufficientSpace(..)) => "Insufficient free space!",
            None => "Got an error while processing the flowcell.",
        };
        let msg = notify::error(run_id, summary, err);
        if let Err(e) = self.notifier.send(&msg) {
            log::error!("{run_id}: unable to send error message: {e:#}");
        }
    }
}

/// The output dir needs at least `[System] minspace` GiB free.
fn check_free_space(config: &StaticConfig, fs: &Fs) -> Result<()> {
    let dir = &config.paths.output_dir;
    let (free, _) = fs.disk_space(dir)?;
    let free = free as f64 / GIB;
    let need = config.system.min_space_gib;
    log::debug!("free GiB in output dir: {free:.1} (need {need:.1})");
    if free < need {
        return Err(Error::InsufficientSpace(dir.clone(), free, need).into());
    }
    Ok(())
}

/// Write the flowcell's final marker and give each project a ledger row,
/// unless it already has one.
fn mark_finished(ctx: &Context, ledger: &mut Ledger) -> Result<()> {
    let output = ctx.output()?;
    ctx.fs
        .write_file(paths::marker(output, names::FLOWCELL_DONE), "")?;
    let now = Stamp::now();
    for project in ctx.projects()? {
        let known = ledger.rows_for(output)?.iter().any(|e| e.project == project);
        if !known {
            ledger.append(&project, output, now)?;
        }
    }
    log::info!("bfq finished processing for {:?}", output);
    Ok(())
}
