//! Names of the files bfq writes for a flowcell, relative to the
//! output, log, report and scratch roots.

use std::path::{Path, PathBuf};

use flowcell::names;

/// $OUTPUT/run_id/<marker>
pub fn marker(output: &Path, name: &str) -> PathBuf {
    output.join(name)
}

/// $LOG/run_id.log
pub fn conversion_log(log_dir: &Path, run_id: &str) -> PathBuf {
    log_dir.join(format!("{run_id}.log"))
}

/// $LOG/run_id/stage.log
pub fn stage_log(log_dir: &Path, run_id: &str, stage: &str) -> PathBuf {
    log_dir.join(run_id).join(format!("{stage}.log"))
}

/// $REPORT/run_id.error
pub fn error_report(report_dir: &Path, run_id: &str) -> PathBuf {
    report_dir.join(format!("{run_id}.error"))
}

/// $REPORT/run_id.kind.ext, for messages other than errors
pub fn message_report(report_dir: &Path, run_id: &str, kind: &str, ext: &str) -> PathBuf {
    report_dir.join(format!("{run_id}.{kind}.{ext}"))
}

/// $OUTPUT/run_id/md5sum_<project>_fastq.txt
pub fn fastq_checksum(output: &Path, project: &str) -> PathBuf {
    output.join(format!("md5sum_{project}_fastq.txt"))
}

/// $OUTPUT/run_id/md5sum_<archive stem>_archive.txt
pub fn archive_checksum(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let name = format!("md5sum_{stem}_archive.txt");
    archive.with_file_name(name)
}

/// $OUTPUT/run_id/<name>_<date>.7za
pub fn archive(output: &Path, name: &str, date: &str) -> PathBuf {
    output.join(format!("{name}_{date}.7za"))
}

/// $OUTPUT/run_id/encryption.<name>
pub fn password_file(output: &Path, name: &str) -> PathBuf {
    output.join(format!("encryption.{name}"))
}

/// $OUTPUT/run_id/QC_<project>
pub fn qc_dir(output: &Path, project: &str) -> PathBuf {
    output.join(format!("{}{project}", names::QC_PREFIX))
}

/// $SCRATCH/<project>_<date>
pub fn analysis_dir(scratch: &Path, project: &str, date: &str) -> PathBuf {
    scratch.join(format!("{project}_{date}"))
}

/// $SCRATCH/<project>_<date>/data/tmp/<pipeline>/bfq
pub fn analysis_results(scratch: &Path, project: &str, date: &str, pipeline: &str) -> PathBuf {
    analysis_dir(scratch, project, date)
        .join("data")
        .join("tmp")
        .join(pipeline)
        .join("bfq")
}

/// $OUTPUT/run_id/multiqc_<project>_<date>.html
pub fn multiqc_report(output: &Path, project: &str, date: &str) -> PathBuf {
    output.join(format!("multiqc_{project}_{date}.html"))
}

/// $OUTPUT/run_id/all_samples_web_summary_<project>_<date>.html
pub fn single_cell_summary(output: &Path, project: &str, date: &str) -> PathBuf {
    output.join(format!("all_samples_web_summary_{project}_{date}.html"))
}

/// $OUTPUT/run_id/<project>_samplesheet.tsv
pub fn sample_info(output: &Path, project: &str) -> PathBuf {
    output.join(format!("{project}_samplesheet.tsv"))
}

/// $OUTPUT/run_id/Stats/sequencer_stats_<p1>_<p2>.html
pub fn sequencer_stats<S: AsRef<str>>(output: &Path, projects: &[S]) -> PathBuf {
    let joined: Vec<&str> = projects.iter().map(AsRef::as_ref).collect();
    output
        .join("Stats")
        .join(format!("sequencer_stats_{}.html", joined.join("_")))
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn test_archive_paths() {
        let out = Path::new("/out/240415_A01990_0345_BHXXXXXX");
        let arch = archive(out, "QC_GCF-2024-001", "240415");
        assert_eq!(out.join("QC_GCF-2024-001_240415.7za"), arch);
        assert_eq!(
            out.join("md5sum_QC_GCF-2024-001_240415_archive.txt"),
            archive_checksum(&arch)
        );
        assert_eq!(
            out.join("Stats/sequencer_stats_GCF-2024-001_GCF-2024-002.html"),
            sequencer_stats(out, &["GCF-2024-001", "GCF-2024-002"])
        );
    }
}
