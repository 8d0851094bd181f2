use std::path::{Path, PathBuf};

use anyhow::Result;

use flowcell::{names, read_custom_options, RunContext, RunOptions, StaticConfig};
use ledger::Ledger;

use crate::fs::Fs;

/// Run folders whose instrument has written its completion file, sorted.
pub fn scan(config: &StaticConfig, fs: &Fs) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for root in &config.paths.instrument_roots {
        if !root.is_dir() {
            log::debug!("instrument root {:?} not found", root);
            continue;
        }
        for (instrument, completion_file) in config.instruments() {
            let pattern = format!("*_{instrument}_*/{completion_file}");
            for signal in fs.glob(root, &pattern)? {
                if let Some(dir) = signal.parent() {
                    found.push(dir.to_path_buf());
                }
            }
        }
    }
    found.sort();
    found.dedup();
    log::debug!("found {} finished runs", found.len());
    Ok(found)
}

/// True if the ledger already has rows for the run's output dir.
pub fn is_processed(ledger: &Ledger, run: &RunContext) -> Result<bool> {
    let output = run.output_path()?;
    Ok(ledger.exists(output)? && !rerun_requested(run))
}

/// Whether an already processed run should be processed again.
/// Always no: reruns are started with `flowcell-manager rerun`.
fn rerun_requested(_run: &RunContext) -> bool {
    false
}

/// Where a run's sample sheet and submission form were found.
#[derive(Debug, Default)]
pub struct SampleSheetLookup {
    pub options: Option<RunOptions>,
    pub sample_sheet: Option<PathBuf>,
    pub submission_form: Option<PathBuf>,
}

impl SampleSheetLookup {
    pub fn is_complete(&self) -> bool {
        self.options.is_some() && self.sample_sheet.is_some() && self.submission_form.is_some()
    }
}

/// Find the sample sheet (the first `SampleSheet*.csv` with custom options)
/// and the submission form. Once a run has an output dir, that is where
/// they are looked for; otherwise they are taken from the run folder and
/// copied into a new output dir.
pub fn locate_sample_sheet(run: &RunContext, fs: &Fs) -> Result<SampleSheetLookup> {
    let output = run.output_path()?;
    let from_output = output.is_dir();
    let dir = if from_output {
        output
    } else {
        run.flowcell_path()?
    };

    let mut lookup = SampleSheetLookup::default();
    for sheet in fs.glob(dir, "SampleSheet*.csv")? {
        match read_custom_options(&sheet) {
            Ok(Some(options)) => {
                lookup.options = Some(options);
                lookup.sample_sheet = Some(sheet);
                break;
            }
            Ok(None) => log::debug!("{:?} has no custom options", sheet),
            Err(e) => log::warn!("skipping sample sheet: {e:#}"),
        }
    }
    lookup.submission_form = fs
        .glob(dir, "*Sample-Submission-Form*.xlsx")?
        .into_iter()
        .next();

    if from_output || !lookup.is_complete() {
        return Ok(lookup);
    }

    log::info!("found a new flowcell: {}", run.run_id());
    fs.create_dir(output)?;
    lookup.sample_sheet = copy_into(fs, lookup.sample_sheet, output, names::SAMPLE_SHEET)?;
    lookup.submission_form =
        copy_into(fs, lookup.submission_form, output, names::SUBMISSION_FORM)?;
    Ok(lookup)
}

fn copy_into(fs: &Fs, src: Option<PathBuf>, dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    let Some(src) = src else {
        return Ok(None);
    };
    let tgt = dir.join(name);
    if src != tgt {
        fs.copy(&src, &tgt)?;
    }
    Ok(Some(tgt))
}

#[cfg(test)]
mod test {
    use super::*;
    use ledger::Stamp;
    use std::fs;
    use tempfile::TempDir;

    const SHEET: &str = "[Header]\nDate,2024-04-15\n\
        [CustomOptions]\nLibprep,Lexogen mRNA\nSensitiveData,true\n\
        [Data]\nSample_ID,Sample_Project\nA1,GCF-2024-001\n";

    struct Setup {
        dir: TempDir,
        config: StaticConfig,
        fs: Fs,
    }

    impl Setup {
        fn new() -> Result<Self> {
            let dir = tempfile::tempdir()?;
            let d = dir.path().display();
            let config = StaticConfig::from_ini_str(&format!(
                "[Paths]\ninstrument_roots = {d}/nova, {d}/ekista\n\
                 outputDir = {d}/out\nlogDir = {d}/logs\n"
            ))?;
            let fs = Fs::new([dir.path().join("out")], false);
            fs::create_dir_all(dir.path().join("out"))?;
            Ok(Self { dir, config, fs })
        }

        fn run_folder(&self, root: &str, name: &str, signal: Option<&str>) -> Result<PathBuf> {
            let dir = self.dir.path().join(root).join(name);
            fs::create_dir_all(&dir)?;
            if let Some(signal) = signal {
                fs::write(dir.join(signal), "")?;
            }
            Ok(dir)
        }

        fn begin(&self, flowcell: &Path) -> Result<RunContext> {
            let mut run = RunContext::new();
            run.begin(flowcell, &self.config.paths.output_dir)?;
            Ok(run)
        }
    }

    #[test]
    fn test_scan() -> Result<()> {
        let s = Setup::new()?;
        let nova = s.run_folder("nova", "240415_A01990_0345_BHXXXXXX", Some("CopyComplete.txt"))?;
        // still copying:
        s.run_folder("nova", "240416_A01990_0346_AHYYYYYY", None)?;
        // wrong completion file for this instrument:
        s.run_folder("ekista", "240301_NB501038_0101_AHZZZZ", Some("CopyComplete.txt"))?;
        let ekista = s.run_folder(
            "ekista",
            "240302_NB501038_0102_AHWWWW",
            Some("RunCompletionStatus.xml"),
        )?;
        assert_eq!(vec![ekista, nova], scan(&s.config, &s.fs)?);
        Ok(())
    }

    #[test]
    fn test_scan_single_candidate_not_in_ledger() -> Result<()> {
        let s = Setup::new()?;
        let nova = s.run_folder("nova", "240415_A01990_0345_BHXXXXXX", Some("CopyComplete.txt"))?;
        let candidates = scan(&s.config, &s.fs)?;
        assert_eq!(vec![nova.clone()], candidates);

        let mut ledger = Ledger::open(&s.config.ledger_path())?;
        let run = s.begin(&nova)?;
        assert!(!is_processed(&ledger, &run)?);

        ledger.append("GCF-2024-001", run.output_path()?, Stamp::now())?;
        assert!(is_processed(&ledger, &run)?);
        Ok(())
    }

    #[test]
    fn test_sheet_copied_from_run_folder() -> Result<()> {
        let s = Setup::new()?;
        let run_dir = s.run_folder("nova", "240415_A01990_0345_BHXXXXXX", None)?;
        fs::write(run_dir.join("SampleSheet_old.csv"), "[Header]\n[Data]\n")?;
        fs::write(run_dir.join("SampleSheet.csv"), SHEET)?;
        fs::write(run_dir.join("GCF-2024-001-Sample-Submission-Form.xlsx"), "xlsx")?;
        let run = s.begin(&run_dir)?;

        let lookup = locate_sample_sheet(&run, &s.fs)?;
        assert!(lookup.is_complete());
        let output = run.output_path()?;
        assert_eq!(Some(output.join("SampleSheet.csv")), lookup.sample_sheet);
        assert_eq!(
            Some(output.join("Sample-Submission-Form.xlsx")),
            lookup.submission_form
        );
        assert_eq!(SHEET, fs::read_to_string(output.join("SampleSheet.csv"))?);
        let options = lookup.options.unwrap_or_default();
        assert_eq!("Lexogen mRNA", options.libprep);
        assert!(options.sensitive_data);
        Ok(())
    }

    #[test]
    fn test_incomplete_run_folder_left_alone() -> Result<()> {
        let s = Setup::new()?;
        let run_dir = s.run_folder("nova", "240415_A01990_0345_BHXXXXXX", None)?;
        fs::write(run_dir.join("SampleSheet.csv"), SHEET)?;
        let run = s.begin(&run_dir)?;

        let lookup = locate_sample_sheet(&run, &s.fs)?;
        assert!(!lookup.is_complete());
        assert!(!run.output_path()?.exists());
        Ok(())
    }

    #[test]
    fn test_output_dir_preferred() -> Result<()> {
        let s = Setup::new()?;
        let run_dir = s.run_folder("nova", "240415_A01990_0345_BHXXXXXX", None)?;
        fs::write(run_dir.join("SampleSheet.csv"), SHEET)?;
        fs::write(run_dir.join("Sample-Submission-Form.xlsx"), "")?;
        let run = s.begin(&run_dir)?;
        let output = run.output_path()?;
        fs::create_dir_all(output)?;
        let edited = SHEET.replace("Lexogen mRNA", "Qiaseq miRNA");
        fs::write(output.join("SampleSheet.csv"), &edited)?;
        fs::write(output.join("Sample-Submission-Form.xlsx"), "")?;

        let lookup = locate_sample_sheet(&run, &s.fs)?;
        assert_eq!("Qiaseq miRNA", lookup.options.unwrap_or_default().libprep);
        Ok(())
    }
}
