use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;

use ledger::{Entry, Ledger, Stamp};

use crate::fs::Fs;
use crate::ui::Ui;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No such flowcell in inventory: {0}")]
    NotInInventory(String),
}

/// Which ledger rows to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    All,
    /// processed or archived
    Processed,
    Project(String),
    Flowcell(PathBuf),
}

/// Operations on delivered flowcells and the ledger that records them.
pub struct Manager<'a> {
    ledger: Ledger,
    fs: &'a Fs,
    ui: &'a Ui,
}

impl<'a> Manager<'a> {
    pub fn new(ledger: Ledger, fs: &'a Fs, ui: &'a Ui) -> Self {
        Self { ledger, fs, ui }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Record a project as delivered from `flowcell` at `timestamp`.
    pub fn add(&mut self, project: &str, flowcell: &Path, timestamp: Stamp) -> Result<()> {
        self.ledger.append(project, flowcell, timestamp)?;
        Ok(())
    }

    /// Delete the bulky data of a delivered flowcell (project dirs, bams,
    /// fastqs and archives) and stamp its rows as archived.
    /// Returns false if the user declined.
    pub fn archive(&mut self, flowcell: &Path) -> Result<bool> {
        let rows = self.rows(flowcell)?;
        if !self.confirm_deletion(&rows)? {
            return Ok(false);
        }

        let deletions = self.deletions(flowcell, &rows)?;
        self.ui.deletion_plan(deletions.len(), flowcell);
        for (i, item) in deletions.iter().enumerate() {
            self.ui.deleting(i + 1, deletions.len(), item);
            self.fs.delete(item)?;
        }
        let n = self.ledger.mark_archived(flowcell, Stamp::now())?;
        log::info!("marked {n} ledger rows for {:?} as archived", flowcell);
        Ok(true)
    }

    /// Delete a flowcell's whole output dir and forget it, so the daemon
    /// processes it again. Returns false if the user declined.
    pub fn rerun(&mut self, flowcell: &Path) -> Result<bool> {
        let rows = self.rows(flowcell)?;
        if !self.confirm_deletion(&rows)? {
            return Ok(false);
        }

        let fs = self.fs;
        let ui = self.ui;
        let n = self.ledger.rerun(flowcell, |dir| {
            ui.deletion_plan(1, dir);
            fs.delete(dir)
        })?;
        log::info!("removed {n} ledger rows for {:?}", flowcell);
        Ok(true)
    }

    /// Everything `archive` removes, in deletion order.
    pub fn deletions(&self, flowcell: &Path, rows: &[Entry]) -> Result<Vec<PathBuf>> {
        let mut deletions: Vec<PathBuf> = rows.iter().map(|r| flowcell.join(&r.project)).collect();
        deletions.dedup();
        for pattern in ["**/*.bam", "**/*.bam.bai"] {
            deletions.extend(self.fs.glob(flowcell, pattern)?);
        }
        for pattern in ["*.fastq.gz", "*.7za"] {
            deletions.extend(self.fs.glob(flowcell, pattern)?);
        }
        // bams inside a project dir go with the dir:
        let dirs: Vec<PathBuf> = deletions.iter().filter(|d| d.is_dir()).cloned().collect();
        deletions.retain(|d| dirs.contains(d) || !dirs.iter().any(|dir| d.starts_with(dir)));
        Ok(deletions)
    }

    pub fn listing(&self, which: &Listing) -> Result<Vec<&Entry>> {
        Ok(match which {
            Listing::All => self.ledger.entries().iter().collect(),
            Listing::Processed => self.ledger.processed().collect(),
            Listing::Project(project) => self.ledger.for_project(project).collect(),
            Listing::Flowcell(flowcell) => self
                .ledger
                .rows_for(flowcell)?
                .into_iter()
                .filter(|e| e.timestamp.is_set())
                .collect(),
        })
    }

    fn rows(&self, flowcell: &Path) -> Result<Vec<Entry>> {
        let rows: Vec<Entry> = self
            .ledger
            .rows_for(flowcell)?
            .into_iter()
            .cloned()
            .collect();
        if rows.is_empty() {
            return Err(Error::NotInInventory(flowcell.to_string_lossy().into_owned()).into());
        }
        Ok(rows)
    }

    fn confirm_deletion(&self, rows: &[Entry]) -> Result<bool> {
        if !self.ui.is_forced() {
            eprintln!("Please confirm deletion of the following flowcell and the contained projects.\n");
            print_entries(&mut std::io::stderr(), rows)?;
        }
        let confirmed = self.ui.confirm("Delete?")?;
        if !confirmed {
            eprintln!("Skipping...");
        }
        Ok(confirmed)
    }
}

/// Tab-separated rows under a header line.
pub fn print_entries<'e, W, I>(out: &mut W, entries: I) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'e Entry>,
{
    writeln!(out, "Project \t Flowcell path \t Timestamp \t Archived")?;
    for e in entries {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            e.project, e.flowcell_path, e.timestamp, e.archived
        )?;
    }
    Ok(())
}
