use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

mod stamp;
pub use stamp::Stamp;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid timestamp in ledger: \"{0}\"")]
    InvalidTimestamp(String),
    #[error("Unable to read ledger {0:?}")]
    Read(PathBuf, #[source] csv::Error),
    #[error("Unable to write ledger {0:?}")]
    Write(PathBuf, #[source] csv::Error),
    #[error("Unable to replace ledger {0:?}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Unable to delete output for {0}")]
    Cleanup(String, #[source] anyhow::Error),
    #[error(transparent)]
    PathEncoding(#[from] util::PathEncodingError),
}

/// One row of the ledger: a project delivered from a flowcell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub project: String,
    pub flowcell_path: String,
    pub timestamp: Stamp,
    pub archived: Stamp,
}

/// The `project,flowcell_path,timestamp,archived` table recording which
/// flowcells have been processed and archived.
///
/// The whole file is read on `open` and rewritten on every mutation.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<Entry>,
}

/// Flowcell paths are compared as strings; ignore a trailing slash.
fn key(flowcell: &Path) -> Result<&str, Error> {
    let s = util::path_str(flowcell)?;
    Ok(match s.trim_end_matches('/') {
        "" => s,
        trimmed => trimmed,
    })
}

impl Ledger {
    /// Read the ledger at `path`, creating an empty one if it doesn't exist.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let mut ledger = Self {
            path: path.to_path_buf(),
            entries: Vec::new(),
        };
        if path.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_path(path)
                .map_err(|e| Error::Read(ledger.path.clone(), e))?;
            for row in reader.deserialize() {
                ledger
                    .entries
                    .push(row.map_err(|e| Error::Read(ledger.path.clone(), e))?);
            }
            log::debug!("read {} ledger rows from {:?}", ledger.entries.len(), path);
        } else {
            log::info!("creating empty ledger at {:?}", path);
            ledger.save()?;
        }
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Every row for `flowcell`, processed or not.
    pub fn rows_for(&self, flowcell: &Path) -> Result<Vec<&Entry>, Error> {
        let key = key(flowcell)?;
        Ok(self
            .entries
            .iter()
            .filter(|e| e.flowcell_path == key)
            .collect())
    }

    pub fn exists(&self, flowcell: &Path) -> Result<bool, Error> {
        let key = key(flowcell)?;
        Ok(self.entries.iter().any(|e| e.flowcell_path == key))
    }

    /// Rows that were processed or archived.
    pub fn processed(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(|e| e.timestamp.is_set() || e.archived.is_set())
    }

    /// Processed rows for one project.
    pub fn for_project<'a, 'b>(
        &'a self,
        project: &'b str,
    ) -> impl Iterator<Item = &'a Entry> + 'b
    where
        'a: 'b,
    {
        self.entries
            .iter()
            .filter(move |e| e.project == project && e.timestamp.is_set())
    }

    pub fn append(
        &mut self,
        project: &str,
        flowcell: &Path,
        timestamp: impl Into<Stamp>,
    ) -> Result<(), Error> {
        let entry = Entry {
            project: project.to_owned(),
            flowcell_path: key(flowcell)?.to_owned(),
            timestamp: timestamp.into(),
            archived: Stamp::Unset,
        };
        log::debug!("ledger: adding {} {}", entry.project, entry.flowcell_path);
        self.entries.push(entry);
        self.save()
    }

    /// Set the archived time on every row for `flowcell`. Returns how many rows matched.
    pub fn mark_archived(&mut self, flowcell: &Path, at: impl Into<Stamp>) -> Result<usize, Error> {
        let key = key(flowcell)?.to_owned();
        let at = at.into();
        let mut n = 0;
        for entry in self.entries.iter_mut().filter(|e| e.flowcell_path == key) {
            entry.archived = at;
            n += 1;
        }
        if n > 0 {
            self.save()?;
        }
        Ok(n)
    }

    /// Drop every row for `flowcell`. Returns how many rows were removed.
    pub fn remove(&mut self, flowcell: &Path) -> Result<usize, Error> {
        let key = key(flowcell)?.to_owned();
        let before = self.entries.len();
        self.entries.retain(|e| e.flowcell_path != key);
        let n = before - self.entries.len();
        if n > 0 {
            self.save()?;
        }
        Ok(n)
    }

    /// Delete the flowcell's output with `delete_output`, then forget it.
    /// Rows are only removed once the output is gone.
    pub fn rerun<F>(&mut self, flowcell: &Path, delete_output: F) -> Result<usize, Error>
    where
        F: FnOnce(&Path) -> anyhow::Result<()>,
    {
        let key = key(flowcell)?.to_owned();
        delete_output(flowcell).map_err(|e| Error::Cleanup(key, e))?;
        self.remove(flowcell)
    }

    /// Rewrite the whole file, via a sibling temp file so a crash never truncates it.
    fn save(&self) -> Result<(), Error> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut writer =
            csv::Writer::from_path(&tmp).map_err(|e| Error::Write(self.path.clone(), e))?;
        if self.entries.is_empty() {
            writer
                .write_record(["project", "flowcell_path", "timestamp", "archived"])
                .map_err(|e| Error::Write(self.path.clone(), e))?;
        }
        for entry in &self.entries {
            writer
                .serialize(entry)
                .map_err(|e| Error::Write(self.path.clone(), e))?;
        }
        writer
            .flush()
            .map_err(|e| Error::Io(self.path.clone(), e))?;
        drop(writer);
        fs::rename(&tmp, &self.path).map_err(|e| Error::Io(self.path.clone(), e))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::{bail, Result};
    use chrono::NaiveDateTime;

    const FC: &str = "/out/240415_A01990_0345_BHXXXXXX";

    fn at(s: &str) -> Result<NaiveDateTime> {
        Ok(NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")?)
    }

    #[test]
    fn test_open_creates_header() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("flowcells.processed");
        let ledger = Ledger::open(&path)?;
        assert!(ledger.entries().is_empty());
        assert_eq!(
            "project,flowcell_path,timestamp,archived\n",
            fs::read_to_string(&path)?
        );
        Ok(())
    }

    #[test]
    fn test_append_and_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("flowcells.processed");
        let mut ledger = Ledger::open(&path)?;
        ledger.append("GCF-2024-001", Path::new(FC), at("2024-04-16T08:00:00")?)?;
        ledger.append("GCF-2024-002", Path::new(&format!("{FC}/")), at("2024-04-16T08:00:00")?)?;
        assert_eq!(
            "project,flowcell_path,timestamp,archived\n\
             GCF-2024-001,/out/240415_A01990_0345_BHXXXXXX,2024-04-16T08:00:00,0\n\
             GCF-2024-002,/out/240415_A01990_0345_BHXXXXXX,2024-04-16T08:00:00,0\n",
            fs::read_to_string(&path)?
        );

        let ledger = Ledger::open(&path)?;
        assert!(ledger.exists(Path::new(FC))?);
        assert!(!ledger.exists(Path::new("/out/other"))?);
        assert_eq!(2, ledger.rows_for(Path::new(FC))?.len());
        assert_eq!(1, ledger.for_project("GCF-2024-002").count());

        // rows outlive the project name they were looked up by:
        let rows: Vec<&Entry> = {
            let project = String::from("GCF-2024-002");
            ledger.for_project(&project).collect()
        };
        assert_eq!("GCF-2024-002", rows[0].project);
        Ok(())
    }

    #[test]
    fn test_reads_legacy_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("flowcells.processed");
        fs::write(
            &path,
            "project,flowcell_path,timestamp,archived\n\
             GCF-2020-100,/out/a,2020-01-02 03:04:05.678901,0\n\
             GCF-2020-101,/out/b,0,0\n\
             GCF-2020-102,/out/c,0,2021-02-03 04:05:06\n",
        )?;
        let ledger = Ledger::open(&path)?;
        let processed: Vec<_> = ledger.processed().map(|e| e.project.as_str()).collect();
        assert_eq!(vec!["GCF-2020-100", "GCF-2020-102"], processed);
        Ok(())
    }

    #[test]
    fn test_mark_archived_updates_in_place() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("flowcells.processed");
        let mut ledger = Ledger::open(&path)?;
        ledger.append("GCF-2024-001", Path::new(FC), at("2024-04-16T08:00:00")?)?;
        ledger.append("GCF-2024-003", Path::new("/out/other"), at("2024-04-17T08:00:00")?)?;

        assert_eq!(1, ledger.mark_archived(Path::new(FC), at("2024-06-01T12:00:00")?)?);
        assert_eq!(0, ledger.mark_archived(Path::new("/out/none"), Stamp::now())?);

        let ledger = Ledger::open(&path)?;
        assert_eq!(2, ledger.entries().len());
        let row = ledger.rows_for(Path::new(FC))?[0];
        assert_eq!("2024-06-01T12:00:00", row.archived.to_string());
        assert_eq!(Stamp::Unset, ledger.rows_for(Path::new("/out/other"))?[0].archived);
        Ok(())
    }

    #[test]
    fn test_rerun() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("flowcells.processed");
        let mut ledger = Ledger::open(&path)?;
        ledger.append("GCF-2024-001", Path::new(FC), at("2024-04-16T08:00:00")?)?;
        ledger.append("GCF-2024-002", Path::new(FC), at("2024-04-16T08:00:00")?)?;

        // failed cleanup keeps the rows:
        let res = ledger.rerun(Path::new(FC), |_| bail!("permission denied"));
        assert!(matches!(res, Err(Error::Cleanup(..))));
        assert!(ledger.exists(Path::new(FC))?);

        let mut deleted = None;
        let n = ledger.rerun(Path::new(FC), |p| {
            deleted = Some(p.to_path_buf());
            Ok(())
        })?;
        assert_eq!(2, n);
        assert_eq!(Some(PathBuf::from(FC)), deleted);
        assert!(!Ledger::open(&path)?.exists(Path::new(FC))?);
        Ok(())
    }
}
