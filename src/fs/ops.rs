use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;

use util::PathEncodingError;

use super::Error;

/// Copy `src` to `tgt`. Directories are merged into an existing `tgt`,
/// overwriting files of the same name.
pub fn copy(src: &Path, tgt: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        replace_symlink(&fs::read_link(src)?, tgt)?;
    } else if meta.is_file() {
        fs::copy(src, tgt)?;
    } else if meta.is_dir() {
        merge_dir(src, tgt, src, tgt)?;
    } else {
        return Err(
            Error::UnknownPathType(src.to_str().ok_or(PathEncodingError)?.to_owned()).into(),
        );
    }
    Ok(())
}

fn merge_dir(src_root: &Path, tgt_root: &Path, src: &Path, tgt: &Path) -> Result<()> {
    fs::create_dir_all(tgt)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src_entry = entry.path();
        let tgt_entry = tgt.join(entry.file_name());
        if ty.is_symlink() {
            let link = relink(src_root, tgt_root, fs::read_link(&src_entry)?);
            replace_symlink(&link, &tgt_entry)?;
        } else if ty.is_dir() {
            merge_dir(src_root, tgt_root, &src_entry, &tgt_entry)?;
        } else if ty.is_file() {
            fs::copy(&src_entry, &tgt_entry)?;
        } else {
            return Err(Error::UnknownPathType(
                src_entry.to_str().ok_or(PathEncodingError)?.to_owned(),
            )
            .into());
        }
    }
    Ok(())
}

/// Links pointing inside the copied tree point inside the copy;
/// relative and external links are kept as they are.
fn relink(src_root: &Path, tgt_root: &Path, link: PathBuf) -> PathBuf {
    match link.strip_prefix(src_root) {
        Ok(rel) if link.is_absolute() => tgt_root.join(rel),
        _ => link,
    }
}

fn replace_symlink(tgt: &Path, link: &Path) -> io::Result<()> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(link)?,
        Ok(_) => fs::remove_file(link)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    symlink(tgt, link)
}

/// Create `link` pointing at `tgt`. `tgt` may be relative to the link's directory.
pub fn symlink(tgt: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(tgt, link)?;

    #[cfg(windows)]
    if link.parent().map_or(false, |dir| dir.join(tgt).is_dir()) {
        std::os::windows::fs::symlink_dir(tgt, link)?;
    } else {
        std::os::windows::fs::symlink_file(tgt, link)?;
    }
    Ok(())
}
