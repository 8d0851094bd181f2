use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use util::PathEncodingError;

/// Utility fns
mod ops;

/// Defines fns for creating common paths in the output directory
pub mod paths;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Path is neither file nor dir: {0}")]
    UnknownPathType(String),
    #[error("Can't perform IO operation: \"{0}\" is not whitelisted")]
    NotWhitelisted(String),
    #[error("Invalid glob pattern \"{0}\"")]
    BadPattern(String, #[source] glob::PatternError),
}

/// All file operations in the crate should go through this struct.
///
/// All destructive operations check that the path in question is a child of
/// one of the whitelisted prefixes (output, log, report dirs etc.),
/// otherwise they will not be performed. Commands run through `exec`
/// are not covered by this check.
#[derive(Debug, Clone)]
pub struct Fs {
    /// The directories we are allowed to modify
    prefixes: Vec<PathBuf>,
    /// if true, prevents all destructive operations
    dry_run: bool,
}

impl Fs {
    /// Create a new `Fs` that may modify anything under `prefixes`.
    pub fn new<I, P>(prefixes: I, dry_run: bool) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.as_ref().to_path_buf())
                .collect(),
            dry_run,
        }
    }

    /// Check if path exists on disk.
    pub fn exists<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        path.exists() || path.is_symlink()
    }

    /// Check if path exists and is a directory.
    pub fn is_dir<T: AsRef<Path>>(&self, path: T) -> Result<bool> {
        let path = path.as_ref();
        if path.is_dir() || (path.is_symlink() && path.canonicalize()?.is_dir()) {
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Create a directory (uses `std::fs::create_dir_all`, so an entire tree of dirs can be created).
    pub fn create_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))?;
        Ok(())
    }

    /// Create parent directory of a given path.
    pub fn create_parent_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            self.create_dir(parent)?;
        }
        Ok(())
    }

    /// Open a file for appending, creating it (and its parent dir) if needed.
    pub fn append_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        self.create_parent_dir(path)?;
        let f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {:?} for append", path))?;
        Ok(f)
    }

    /// Create (or truncate) a file, and return a writable `File` handle.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        self.create_parent_dir(path)?;
        let f = fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        Ok(f)
    }

    /// Write entire str to a file.
    pub fn write_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::write(path, text).with_context(|| format!("writing file {:?}", path))?;
        Ok(())
    }

    /// Move a file within the whitelisted area.
    pub fn rename<T: AsRef<Path>, U: AsRef<Path>>(&self, from: T, to: U) -> Result<()> {
        let (from, to) = (from.as_ref(), to.as_ref());
        self.check_whitelist(from)?;
        self.check_whitelist(to)?;
        fs::rename(from, to).with_context(|| format!("moving {:?} to {:?}", from, to))?;
        Ok(())
    }

    /// Delete a file.
    pub fn delete_file<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::remove_file(path).with_context(|| format!("deleting file {:?}", path))?;
        Ok(())
    }

    /// Recursively delete a directory.
    pub fn delete_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::remove_dir_all(path).with_context(|| format!("deleting dir {:?}", path))?;
        Ok(())
    }

    /// Delete a file, symlink or directory tree; missing paths are ignored.
    pub fn delete<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        if path.is_symlink() || path.is_file() {
            self.delete_file(path)
        } else if path.is_dir() {
            self.delete_dir(path)
        } else {
            Ok(())
        }
    }

    /// Symlink `symlink` to `tgt`.
    pub fn symlink<T: AsRef<Path>, U: AsRef<Path>>(&self, tgt: T, symlink: U) -> Result<()> {
        let (tgt, symlink) = (tgt.as_ref(), symlink.as_ref());
        self.check_whitelist(symlink)?;
        ops::symlink(tgt, symlink)
            .with_context(|| format!("symlinking {:?} to {:?}", symlink, tgt))?;
        Ok(())
    }

    /// Copy `src` to `tgt`, recursively if `src` is a directory.
    pub fn copy<T: AsRef<Path>, U: AsRef<Path>>(&self, src: T, tgt: U) -> Result<()> {
        let (src, tgt) = (src.as_ref(), tgt.as_ref());
        self.check_whitelist(tgt)?;
        ops::copy(src, tgt).with_context(|| format!("copying {:?} to {:?}", src, tgt))?;
        Ok(())
    }

    /// Replace `tgt` with a fresh copy of `src`.
    pub fn replace_with_copy<T: AsRef<Path>, U: AsRef<Path>>(&self, src: T, tgt: U) -> Result<()> {
        let tgt = tgt.as_ref();
        self.delete(tgt)?;
        self.create_parent_dir(tgt)?;
        self.copy(src, tgt)
    }

    /// Read entire file into a String.
    pub fn read_to_string<T: AsRef<Path>>(&self, path: T) -> Result<String> {
        let path = path.as_ref();
        fs::read_to_string(path).with_context(|| format!("reading {:?}", path))
    }

    /// Paths matching `pattern` under `dir`, sorted. `dir` itself is matched literally.
    pub fn glob<T: AsRef<Path>>(&self, dir: T, pattern: &str) -> Result<Vec<PathBuf>> {
        let dir = util::path_str(dir.as_ref())?;
        let full = format!("{}/{}", glob::Pattern::escape(dir), pattern);
        let paths = glob::glob(&full).map_err(|e| Error::BadPattern(full.clone(), e))?;
        let mut found = Vec::new();
        for path in paths {
            found.push(path.with_context(|| format!("matching {full}"))?);
        }
        found.sort();
        Ok(found)
    }

    /// Modification time of `path`.
    pub fn modified<T: AsRef<Path>>(&self, path: T) -> Result<SystemTime> {
        let path = path.as_ref();
        let meta = fs::metadata(path).with_context(|| format!("reading metadata of {:?}", path))?;
        Ok(meta.modified()?)
    }

    /// True if `derived` exists and was modified after every path in `sources`.
    pub fn is_current<'a, T, I>(&self, derived: T, sources: I) -> Result<bool>
    where
        T: AsRef<Path>,
        I: IntoIterator<Item = &'a PathBuf>,
    {
        let derived = derived.as_ref();
        if !derived.exists() {
            return Ok(false);
        }
        let derived_time = self.modified(derived)?;
        for src in sources {
            if self.modified(src)? > derived_time {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Free and total bytes on the filesystem holding `path`.
    pub fn disk_space<T: AsRef<Path>>(&self, path: T) -> Result<(u64, u64)> {
        let path = path.as_ref();
        let free = fs2::available_space(path).with_context(|| format!("statting {:?}", path))?;
        let total = fs2::total_space(path).with_context(|| format!("statting {:?}", path))?;
        Ok((free, total))
    }

    fn is_whitelisted<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }

    fn check_whitelist(&self, path: &Path) -> Result<()> {
        if self.dry_run || !self.is_whitelisted(path) {
            Err(Error::NotWhitelisted(path.to_str().ok_or(PathEncodingError)?.to_owned()).into())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_whitelist() -> Result<()> {
        let dir = tempdir()?;
        let allowed = dir.path().join("out");
        let fs = Fs::new([&allowed], false);
        fs.create_dir(allowed.join("run"))?;
        fs.write_file(allowed.join("run/bcl.done"), "")?;

        let err = fs.write_file(dir.path().join("elsewhere"), "").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotWhitelisted(_))
        ));

        let dry = Fs::new([&allowed], true);
        assert!(dry.delete(allowed.join("run")).is_err());
        assert!(allowed.join("run/bcl.done").exists());
        Ok(())
    }

    #[test]
    fn test_glob_and_currency() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new([dir.path()], false);
        fs.create_dir(dir.path().join("GCF-2024-001"))?;
        let fastq = dir.path().join("GCF-2024-001/S1_R1.fastq.gz");
        fs.write_file(&fastq, "reads")?;
        fs.write_file(dir.path().join("GCF-2024-001/notes.txt"), "")?;

        let found = fs.glob(dir.path(), "*/*.fastq.gz")?;
        assert_eq!(vec![fastq.clone()], found);

        let md5 = dir.path().join("md5sum_GCF-2024-001_fastq.txt");
        assert!(!fs.is_current(&md5, [&fastq])?);
        sleep(Duration::from_millis(20));
        fs.write_file(&md5, "abc  S1_R1.fastq.gz\n")?;
        assert!(fs.is_current(&md5, [&fastq])?);
        Ok(())
    }
}
