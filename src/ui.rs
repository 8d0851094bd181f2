use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;

use util::format_duration;

/// All interactions with the text UI should go through this struct.
pub struct Ui {
    /// -v setting, displays extra text info to user
    pub verbose: bool,
    /// --force setting, skips all points where the user is asked to confirm
    override_confirmation: bool,
    /// buffer to hold strings internally when getting input
    strbuf: RefCell<String>,
}

impl Ui {
    pub fn new(verbose: bool, override_confirmation: bool) -> Self {
        Self {
            verbose,
            override_confirmation,
            // Refcell so we can call confirm() w/o needing a unique reference:
            strbuf: RefCell::new(String::with_capacity(16)),
        }
    }

    /// True when confirmations are skipped.
    pub fn is_forced(&self) -> bool {
        self.override_confirmation
    }

    /// Ask a yes/no question; only `yes` or `y` count as yes.
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.override_confirmation {
            return Ok(true);
        }
        eprint!("{} (yes/no): ", prompt);

        let mut strbuf = self.strbuf.borrow_mut();

        strbuf.clear();
        std::io::stdin().read_line(&mut strbuf)?;
        let answer = strbuf.trim().to_ascii_lowercase();
        Ok(answer == "yes" || answer == "y")
    }

    pub fn stage_skipped(&self, run_id: &str, stage: &str) {
        if self.verbose {
            eprintln!("{} {run_id}: {stage} already done", "SKIP".yellow());
        }
    }

    pub fn stage_started(&self, run_id: &str, stage: &str) {
        eprintln!("{} {run_id}: {stage}", "RUN".magenta());
    }

    pub fn stage_completed(&self, run_id: &str, stage: &str, elapsed: Duration) {
        eprintln!(
            "{} {run_id}: {stage} ({})",
            "COMPLETED".green(),
            format_duration(elapsed)
        );
    }

    pub fn flowcell_failed(&self, run_id: &str, err: &anyhow::Error) {
        eprintln!("{} {run_id}: {err:#}", "FAILED".red());
    }

    pub fn deletion_plan(&self, n: usize, from: &Path) {
        eprintln!("{}: {n} items from {}", "DELETING".red(), from.display());
    }

    pub fn deleting(&self, i: usize, n: usize, path: &Path) {
        eprintln!("[{i}/{n}] {} {}", "Deleting".red(), path.display());
    }

    pub fn verbose_msg(&self, msg: &str) {
        if self.verbose {
            eprintln!("{}", msg);
        }
    }
}
