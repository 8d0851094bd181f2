use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use flowcell::names;

use super::{Context, Stage};

static SAMPLE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_S[0-9]+").expect("valid sample number regex"));

/// Drop the converter's `_S<n>` and `_001` decorations from fastq names.
pub struct Rename;

impl Stage for Rename {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn marker(&self) -> Option<&'static str> {
        Some(names::FILES_RENAMED)
    }

    fn run(&self, ctx: &Context) -> Result<String> {
        if !ctx.run.policy().rename_fastqs {
            log::info!("{}: keeping converter file names", ctx.run.run_id());
            return Ok(String::new());
        }
        let mut renamed = 0;
        for fastq in ctx.fastqs()? {
            if let Some(new) = normalized(&fastq) {
                log::debug!("moving {:?} to {:?}", fastq, new);
                ctx.fs.rename(&fastq, &new)?;
                renamed += 1;
            }
        }
        log::info!("{}: renamed {renamed} fastq files", ctx.run.run_id());
        Ok(String::new())
    }
}

/// New path for a converter-named fastq, or `None` if it is already clean.
fn normalized(fastq: &Path) -> Option<PathBuf> {
    let name = fastq.file_name()?.to_str()?;
    let stem = name.strip_suffix("_001.fastq.gz")?;
    let stem = SAMPLE_NUMBER.replace_all(stem, "");
    Some(fastq.with_file_name(format!("{stem}.fastq.gz")))
}

#[cfg(test)]
mod test {
    use super::super::testing::Fixture;
    use super::*;

    #[test]
    fn test_normalized() {
        let n = |s: &str| normalized(Path::new(s)).map(|p| p.to_string_lossy().into_owned());
        assert_eq!(
            Some("/o/GCF-2024-001/A1_R1.fastq.gz".to_owned()),
            n("/o/GCF-2024-001/A1_S12_R1_001.fastq.gz")
        );
        assert_eq!(None, n("/o/GCF-2024-001/A1_R1.fastq.gz"));
        // directories keep their names:
        assert_eq!(
            Some("/o/P_S1/x_R2.fastq.gz".to_owned()),
            n("/o/P_S1/x_S3_R2_001.fastq.gz")
        );
    }

    #[test]
    fn test_rename_stage() -> Result<()> {
        let fx = Fixture::new("")?;
        fx.touch("GCF-2024-001/A1_S1_R1_001.fastq.gz")?;
        fx.touch("GCF-2024-001/sub/B2_S2_R1_001.fastq.gz")?;
        Rename.run(&fx.ctx())?;
        assert!(fx.output().join("GCF-2024-001/A1_R1.fastq.gz").exists());
        assert!(fx.output().join("GCF-2024-001/sub/B2_R1.fastq.gz").exists());
        assert!(!fx.output().join("GCF-2024-001/A1_S1_R1_001.fastq.gz").exists());
        Ok(())
    }

    #[test]
    fn test_ten_x_names_kept() -> Result<()> {
        let fx = Fixture::with_options(
            "",
            &[("Libprep", "10X Genomics Chromium Single Cell 3p GEM Library & Gel Bead Kit v3")],
        )?;
        let original = fx.touch("GCF-2024-001/A1_S1_L001_R1_001.fastq.gz")?;
        Rename.run(&fx.ctx())?;
        assert!(original.exists());
        Ok(())
    }
}
